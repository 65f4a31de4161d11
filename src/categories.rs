// Category book - shortnames, descriptions and keybinds
//
// Loaded from a JSON array of items:
//
//   [
//     {"key": "f", "shortname": "FOOD", "description": "Groceries"},
//     {"key": "h", "shortname": "HOME", "description": "Household",
//      "subcategories": [
//        {"key": "r", "shortname": "RENT", "description": "Rent"}
//      ]}
//   ]
//
// An item with subcategories contributes only its children as categories,
// and its key opens a second keybind level.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One entry of the category file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryItem {
    pub key: String,
    pub shortname: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcategories: Vec<CategoryItem>,
}

/// Target of a first-level key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Keybind {
    Leaf(String),
    Group(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Default)]
pub struct CategoryBook {
    descriptions: BTreeMap<String, String>,
    keybinds: BTreeMap<String, Keybind>,
}

impl CategoryBook {
    pub fn from_items(items: Vec<CategoryItem>) -> Self {
        let mut book = CategoryBook::default();

        for item in items {
            if item.subcategories.is_empty() {
                let shortname = item.shortname.to_uppercase();
                book.keybinds
                    .insert(item.key, Keybind::Leaf(shortname.clone()));
                book.descriptions.insert(shortname, item.description);
                continue;
            }

            let mut group = BTreeMap::new();
            for sub in item.subcategories {
                let shortname = sub.shortname.to_uppercase();
                group.insert(sub.key, shortname.clone());
                book.descriptions.insert(shortname, sub.description);
            }
            book.keybinds.insert(item.key, Keybind::Group(group));
        }

        book
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let items: Vec<CategoryItem> =
            serde_json::from_str(text).context("Category file is not a list of category items")?;
        Ok(Self::from_items(items))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read category file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn contains(&self, shortname: &str) -> bool {
        self.descriptions.contains_key(shortname)
    }

    pub fn description(&self, shortname: &str) -> Option<&str> {
        self.descriptions.get(shortname).map(String::as_str)
    }

    /// Known shortnames in sorted order.
    pub fn shortnames(&self) -> Vec<&str> {
        self.descriptions.keys().map(String::as_str).collect()
    }

    pub fn descriptions(&self) -> &BTreeMap<String, String> {
        &self.descriptions
    }

    pub fn keybind(&self, key: &str) -> Option<&Keybind> {
        self.keybinds.get(key)
    }

    pub fn keybinds(&self) -> &BTreeMap<String, Keybind> {
        &self.keybinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"key": "f", "shortname": "food", "description": "Groceries"},
        {"key": "i", "shortname": "INGRESO", "description": "Income"},
        {"key": "h", "shortname": "HOME", "description": "Household", "subcategories": [
            {"key": "r", "shortname": "RENT", "description": "Rent"},
            {"key": "u", "shortname": "UTILITIES", "description": "Power and water"}
        ]}
    ]"#;

    #[test]
    fn test_flattens_subcategories() {
        let book = CategoryBook::from_json(SAMPLE).unwrap();
        assert_eq!(book.shortnames(), vec!["FOOD", "INGRESO", "RENT", "UTILITIES"]);
        assert!(!book.contains("HOME"));
        assert_eq!(book.description("RENT"), Some("Rent"));
        assert_eq!(book.len(), 4);
    }

    #[test]
    fn test_keybind_tree() {
        let book = CategoryBook::from_json(SAMPLE).unwrap();
        assert_eq!(book.keybind("f"), Some(&Keybind::Leaf("FOOD".to_string())));
        match book.keybind("h") {
            Some(Keybind::Group(group)) => {
                assert_eq!(group.get("r").map(String::as_str), Some("RENT"));
                assert_eq!(group.len(), 2);
            }
            other => panic!("expected a group, got {:?}", other),
        }
        assert_eq!(book.keybind("x"), None);
    }

    #[test]
    fn test_keybinds_serialize_as_plain_map() {
        let book = CategoryBook::from_json(SAMPLE).unwrap();
        let json = serde_json::to_value(book.keybinds()).unwrap();
        assert_eq!(json["f"], "FOOD");
        assert_eq!(json["h"]["u"], "UTILITIES");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        fs::write(&path, SAMPLE).unwrap();

        let book = CategoryBook::load(&path).unwrap();
        assert!(book.contains("FOOD"));

        let missing = CategoryBook::load(&dir.path().join("nope.json"));
        assert!(missing.is_err());
    }

    #[test]
    fn test_rejects_malformed_file() {
        assert!(CategoryBook::from_json("{\"key\": 1}").is_err());
        assert!(CategoryBook::from_json("[{\"key\": \"a\"}]").is_err());
    }
}
