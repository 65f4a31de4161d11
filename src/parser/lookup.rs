// Lookups against known sets: categories, keybinds, record columns

use crate::categories::{CategoryBook, Keybind};
use crate::error::{ParseError, ParseResult};
use rand::seq::SliceRandom;
use rand::Rng;

/// Short keys accepted for record columns.
pub const COLUMN_KEYBINDS: [(&str, &str); 8] = [
    ("d", "date"),
    ("a", "amount"),
    ("am", "amount"),
    ("cur", "currency"),
    ("desc", "description"),
    ("c", "category"),
    ("cat", "category"),
    ("i", "id"),
];

/// Resolve a category shortname. Empty input picks one at random.
pub fn parse_category(book: &CategoryBook, text: &str) -> ParseResult<String> {
    parse_category_with(book, text, &mut rand::thread_rng())
}

pub fn parse_category_with<R: Rng + ?Sized>(
    book: &CategoryBook,
    text: &str,
    rng: &mut R,
) -> ParseResult<String> {
    let text = text.trim();

    if text.is_empty() {
        return book
            .shortnames()
            .choose(rng)
            .map(|name| name.to_string())
            .ok_or_else(|| ParseError::lookup("there are no categories to choose from"));
    }

    let shortname = text.to_uppercase();
    if book.contains(&shortname) {
        Ok(shortname)
    } else {
        Err(ParseError::lookup(format!(
            "'{}' is not a known category",
            text
        )))
    }
}

/// Resolve `key` (and `subkey` for grouped keys) to a category shortname.
pub fn parse_keybind(book: &CategoryBook, key: &str, subkey: Option<&str>) -> ParseResult<String> {
    let key = key.trim();
    match book.keybind(key) {
        None => Err(ParseError::lookup(format!("'{}' is not a valid keybind", key))),
        Some(Keybind::Leaf(shortname)) => Ok(shortname.clone()),
        Some(Keybind::Group(group)) => {
            let subkey = subkey.map(str::trim).ok_or_else(|| {
                ParseError::lookup(format!("keybind '{}' needs a second key", key))
            })?;
            group.get(subkey).cloned().ok_or_else(|| {
                ParseError::lookup(format!(
                    "'{}' is not a valid subcategory of '{}'",
                    subkey, key
                ))
            })
        }
    }
}

/// Resolve a column by keybind, by name, or by position in `columns`.
pub fn parse_column(text: &str, columns: &[&str], keybinds: &[(&str, &str)]) -> ParseResult<String> {
    let text = text.trim();

    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        let index: usize = text
            .parse()
            .map_err(|_| ParseError::value(format!("'{}' can't be that large", text)))?;
        return columns
            .get(index)
            .map(|c| c.to_string())
            .ok_or_else(|| ParseError::value(format!("'{}' can't be that large", text)));
    }

    if let Some((_, column)) = keybinds.iter().find(|(key, _)| *key == text) {
        if columns.contains(column) {
            return Ok(column.to_string());
        }
    }

    if columns.contains(&text) {
        return Ok(text.to_string());
    }

    Err(ParseError::lookup(format!(
        "could not parse '{}' as a valid column",
        text
    )))
}
