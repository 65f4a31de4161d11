use crate::db::Record;
use crate::parser::Period;
use crate::plot::{drilldown, Chart, DailySeries, MonthlySeries, PeriodBreakdown};
use crate::report::truncate;
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Cell, Chart as LineChart, Dataset, GraphType, Paragraph,
        Row, Table, TableState,
    },
    Frame, Terminal,
};
use rusqlite::Connection;
use std::io;

const PALETTE: [Color; 6] = [
    Color::Cyan,
    Color::Green,
    Color::Magenta,
    Color::Blue,
    Color::LightRed,
    Color::White,
];

const FOCUS: Color = Color::Yellow;

pub struct App {
    pub view: Chart,
    /// Currency tab of the breakdown.
    pub currency: usize,
    /// Category row of the breakdown.
    pub state: TableState,
    pub details: Option<Vec<Record>>,
}

impl App {
    pub fn new(view: Chart) -> Self {
        let mut state = TableState::default();
        if let Chart::Breakdown(data) = &view {
            if data.currencies.first().map_or(false, |c| !c.categories.is_empty()) {
                state.select(Some(0));
            }
        }
        Self {
            view,
            currency: 0,
            state,
            details: None,
        }
    }

    fn category_count(&self) -> usize {
        match &self.view {
            Chart::Breakdown(data) => data
                .currencies
                .get(self.currency)
                .map_or(0, |c| c.categories.len()),
            _ => 0,
        }
    }

    pub fn next_currency(&mut self) {
        if let Chart::Breakdown(data) = &self.view {
            if data.currencies.is_empty() {
                return;
            }
            self.currency = (self.currency + 1) % data.currencies.len();
            self.details = None;
            self.state.select(if self.category_count() > 0 { Some(0) } else { None });
        }
    }

    pub fn next(&mut self) {
        let len = self.category_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
        self.details = None;
    }

    pub fn previous(&mut self) {
        let len = self.category_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
        self.details = None;
    }

    /// (period, category, currency) of the selected bar.
    pub fn selection(&self) -> Option<(Period, &str, &str)> {
        let Chart::Breakdown(data) = &self.view else {
            return None;
        };
        let currency = data.currencies.get(self.currency)?;
        let (category, _) = currency.categories.get(self.state.selected()?)?;
        Some((data.period, category.as_str(), currency.currency.as_str()))
    }

    pub fn toggle_details(&mut self, conn: &Connection) -> Result<()> {
        if self.details.is_some() {
            self.details = None;
            return Ok(());
        }
        if let Some((period, category, currency)) = self.selection() {
            let records = drilldown(conn, period, category, currency)?;
            self.details = Some(records);
        }
        Ok(())
    }
}

pub fn run_ui(app: &mut App, conn: &Connection) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, conn);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    conn: &Connection,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Esc if app.details.is_some() => app.details = None,
                KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_details(conn)?,
                KeyCode::Tab => app.next_currency(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // Plot area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    match app.view.clone() {
        Chart::Breakdown(data) => render_breakdown(f, chunks[0], app, &data),
        Chart::Monthly {
            title,
            series,
            focus,
        } => render_monthly(f, chunks[0], &title, &series, focus),
        Chart::Daily {
            currency,
            months,
            today,
        } => render_daily(f, chunks[0], &currency, &months, today),
    }

    render_status_bar(f, chunks[1], app);
}

fn render_breakdown(f: &mut Frame, area: Rect, app: &mut App, data: &PeriodBreakdown) {
    let Some(currency) = data.currencies.get(app.currency) else {
        let empty = Paragraph::new(format!("No spending in {}", data.period)).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Categories {} ", data.period)),
        );
        f.render_widget(empty, area);
        return;
    };

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(if app.details.is_some() {
            [Constraint::Percentage(55), Constraint::Percentage(45)]
        } else {
            [Constraint::Percentage(100), Constraint::Percentage(0)]
        })
        .split(area);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(4)])
        .split(columns[0]);

    let selected = app.state.selected();
    let bars: Vec<Bar> = currency
        .categories
        .iter()
        .enumerate()
        .map(|(i, (category, total))| {
            let style = if Some(i) == selected {
                Style::default().fg(FOCUS)
            } else {
                Style::default().fg(PALETTE[app.currency % PALETTE.len()])
            };
            Bar::default()
                .label(Line::from(truncate(category, 14)))
                .value(total.max(0.0).round() as u64)
                .text_value(format!("{:.2}", total))
                .style(style)
        })
        .collect();

    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(
                    " {} {} total {:.2} ",
                    data.period, currency.currency, currency.total
                )),
        )
        .direction(Direction::Horizontal)
        .bar_width(1)
        .bar_gap(0)
        .data(BarGroup::default().bars(&bars));
    f.render_widget(chart, left[0]);

    let converted: Vec<Span> = data
        .converted
        .iter()
        .flat_map(|(cur, total)| {
            [
                Span::styled(format!("{:.2} {}", total, cur), Style::default().fg(Color::Cyan)),
                Span::raw("   "),
            ]
        })
        .collect();
    let totals = Paragraph::new(vec![Line::from(""), Line::from(converted)]).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" All currencies "),
    );
    f.render_widget(totals, left[1]);

    if let Some(records) = &app.details {
        render_details(f, columns[1], records);
    }
}

fn render_details(f: &mut Frame, area: Rect, records: &[Record]) {
    let header = Row::new(["Id", "Date", "Amount", "Description"].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    }))
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows = records.iter().map(|r| {
        Row::new(vec![
            Cell::from(r.id.map(|id| id.to_string()).unwrap_or_default()),
            Cell::from(r.date.to_string()),
            Cell::from(format!("{:.2}", r.amount)),
            Cell::from(truncate(&r.description, 30)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(11),
            Constraint::Length(10),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(FOCUS))
            .title(format!(" {} records ", records.len())),
    );
    f.render_widget(table, area);
}

fn y_bounds<'a>(values: impl Iterator<Item = &'a f64>) -> [f64; 2] {
    let max = values.fold(0.0_f64, |acc, v| acc.max(*v));
    [0.0, if max > 0.0 { max * 1.1 } else { 1.0 }]
}

fn y_labels(bounds: [f64; 2]) -> Vec<Span<'static>> {
    vec![
        Span::raw(format!("{:.0}", bounds[0])),
        Span::raw(format!("{:.0}", bounds[1] / 2.0)),
        Span::raw(format!("{:.0}", bounds[1])),
    ]
}

/// One chart per currency, stacked; currencies rarely share a scale.
fn render_monthly(f: &mut Frame, area: Rect, title: &str, series: &[MonthlySeries], focus: Period) {
    if series.is_empty() {
        let empty = Paragraph::new("No data")
            .block(Block::default().borders(Borders::ALL).title(format!(" {} ", title)));
        f.render_widget(empty, area);
        return;
    }

    let mut periods: Vec<Period> = series
        .iter()
        .flat_map(|s| s.points.iter().map(|(p, _)| *p))
        .collect();
    periods.sort();
    periods.dedup();
    let x_of = |p: &Period| periods.iter().position(|q| q == p).unwrap_or(0) as f64;

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Ratio(1, series.len() as u32); series.len()])
        .split(area);

    for (i, line) in series.iter().enumerate() {
        let points: Vec<(f64, f64)> = line.points.iter().map(|(p, v)| (x_of(p), *v)).collect();
        let marked: Vec<(f64, f64)> = line
            .value_at(focus)
            .map(|v| vec![(x_of(&focus), v)])
            .unwrap_or_default();

        let datasets = vec![
            Dataset::default()
                .name(line.currency.clone())
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(PALETTE[i % PALETTE.len()]))
                .data(&points),
            Dataset::default()
                .name(focus.to_string())
                .marker(Marker::Block)
                .graph_type(GraphType::Scatter)
                .style(Style::default().fg(FOCUS))
                .data(&marked),
        ];

        let y = y_bounds(line.points.iter().map(|(_, v)| v));
        let x_labels = match (periods.first(), periods.last()) {
            (Some(first), Some(last)) => vec![Span::raw(first.to_string()), Span::raw(last.to_string())],
            _ => Vec::new(),
        };

        let chart = LineChart::new(datasets)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" {} {} ", title, line.currency)),
            )
            .x_axis(
                Axis::default()
                    .bounds([0.0, (periods.len().max(2) - 1) as f64])
                    .labels(x_labels),
            )
            .y_axis(Axis::default().bounds(y).labels(y_labels(y)));
        f.render_widget(chart, rows[i]);
    }
}

/// Cumulative spending by day of month; the focus month in yellow, a red
/// rule on today's day.
fn render_daily(f: &mut Frame, area: Rect, currency: &str, months: &[DailySeries], today: NaiveDate) {
    let lines: Vec<Vec<(f64, f64)>> = months
        .iter()
        .map(|m| {
            m.points
                .iter()
                .map(|p| (p.date.day() as f64, p.cumulative))
                .collect()
        })
        .collect();
    let daily: Vec<(f64, f64)> = months
        .iter()
        .filter(|m| m.focus)
        .flat_map(|m| m.points.iter().map(|p| (p.date.day() as f64, p.total)))
        .collect();

    let y = y_bounds(
        months
            .iter()
            .flat_map(|m| m.points.iter().map(|p| &p.cumulative)),
    );

    let in_focus = months.iter().any(|m| m.focus && m.period.contains(today));
    let today_rule: Vec<(f64, f64)> = if in_focus {
        let day = today.day() as f64;
        vec![(day, y[0]), (day, y[1])]
    } else {
        Vec::new()
    };

    let mut datasets: Vec<Dataset> = months
        .iter()
        .zip(&lines)
        .enumerate()
        .map(|(i, (month, points))| {
            let color = if month.focus {
                FOCUS
            } else {
                PALETTE[i % PALETTE.len()]
            };
            Dataset::default()
                .name(month.period.to_string())
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(points)
        })
        .collect();
    datasets.push(
        Dataset::default()
            .name("daily")
            .marker(Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Gray))
            .data(&daily),
    );
    datasets.push(
        Dataset::default()
            .name("today")
            .marker(Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Red))
            .data(&today_rule),
    );

    let chart = LineChart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Daily spending {} ", currency)),
        )
        .x_axis(
            Axis::default()
                .title("day")
                .bounds([1.0, 31.0])
                .labels(vec![Span::raw("1"), Span::raw("15"), Span::raw("31")]),
        )
        .y_axis(Axis::default().bounds(y).labels(y_labels(y)));
    f.render_widget(chart, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    if matches!(app.view, Chart::Breakdown(_)) {
        spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(" Currency | "));
        spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(" Category | "));
        spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(" Records | "));
    }
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(status_bar, area);
}
