use std::path::Path;

use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

pub const DEFAULT_WARNING_DAYS: i64 = 30;

// Header area inspected for expiry information: first two rows, first three
// columns of the first sheet.
const SCAN_ROWS: u32 = 2;
const SCAN_COLS: u32 = 3;

const STOP_GLYPHS: [char; 2] = ['🛑', '⛔'];
const WARNING_GLYPH: char = '⚠';

const SPREADSHEET_TYPES: [&str; 4] = ["xlsx", "xls", "xlsm", "ods"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    None,
    Warning,
    Expired,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::None => "none",
            AlertStatus::Warning => "warning",
            AlertStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Date(NaiveDate),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertOutcome {
    pub status: AlertStatus,
    /// True when an override glyph decided the status.
    pub forced: bool,
    pub expiry_date: Option<NaiveDate>,
}

impl AlertOutcome {
    pub fn none() -> Self {
        Self {
            status: AlertStatus::None,
            forced: false,
            expiry_date: None,
        }
    }
}

pub fn is_spreadsheet(file_type: &str) -> bool {
    SPREADSHEET_TYPES.contains(&file_type)
}

static TEXT_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2})[/-](\d{2})[/-](\d{4})").unwrap());

/// Classifies the header-area cells of a spreadsheet. Pure: given the same
/// grid, date and threshold, the outcome is identical.
///
/// The first usable expiry value wins, searched in priority order: a native
/// date cell, a numeric date serial, a `DD/MM/YYYY` / `DD-MM-YYYY`
/// substring. Override glyphs are scanned independently afterwards and take
/// precedence over the computed date-based status.
pub fn classify_cells(grid: &[Vec<CellValue>], today: NaiveDate, warning_days: i64) -> AlertOutcome {
    let expiry_date = find_expiry_date(grid);
    let date_status = match expiry_date {
        Some(expiry) => status_for_expiry(expiry, today, warning_days),
        None => AlertStatus::None,
    };

    let (status, forced) = match glyph_override(grid) {
        Some(overridden) => (overridden, true),
        None => (date_status, false),
    };

    AlertOutcome {
        status,
        forced,
        expiry_date,
    }
}

pub fn status_for_expiry(expiry: NaiveDate, today: NaiveDate, warning_days: i64) -> AlertStatus {
    if expiry < today {
        AlertStatus::Expired
    } else if expiry - today <= Duration::days(warning_days) {
        AlertStatus::Warning
    } else {
        AlertStatus::None
    }
}

fn find_expiry_date(grid: &[Vec<CellValue>]) -> Option<NaiveDate> {
    // Priority 1: native date cells.
    if let Some(date) = scan(grid, |cell| match cell {
        CellValue::Date(date) => Some(*date),
        _ => None,
    }) {
        return Some(date);
    }

    // Priority 2: numeric serials (days since 1899-12-30, Excel epoch).
    if let Some(date) = scan(grid, |cell| match cell {
        CellValue::Number(serial) => date_from_serial(*serial),
        _ => None,
    }) {
        return Some(date);
    }

    // Priority 3: date-shaped substrings.
    scan(grid, |cell| match cell {
        CellValue::Text(text) => date_from_text(text),
        _ => None,
    })
}

fn scan<T>(grid: &[Vec<CellValue>], mut extract: impl FnMut(&CellValue) -> Option<T>) -> Option<T> {
    for row in grid.iter().take(SCAN_ROWS as usize) {
        for cell in row.iter().take(SCAN_COLS as usize) {
            if let Some(value) = extract(cell) {
                return Some(value);
            }
        }
    }
    None
}

fn glyph_override(grid: &[Vec<CellValue>]) -> Option<AlertStatus> {
    let mut warning_seen = false;
    for row in grid.iter().take(SCAN_ROWS as usize) {
        for cell in row.iter().take(SCAN_COLS as usize) {
            if let CellValue::Text(text) = cell {
                if text.chars().any(|ch| STOP_GLYPHS.contains(&ch)) {
                    return Some(AlertStatus::Expired);
                }
                if text.contains(WARNING_GLYPH) {
                    warning_seen = true;
                }
            }
        }
    }
    warning_seen.then_some(AlertStatus::Warning)
}

fn date_from_serial(serial: f64) -> Option<NaiveDate> {
    // Only accept values in a plausible date range (roughly 1954..2119).
    if !(20_000.0..=80_000.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial as i64))
}

fn date_from_text(text: &str) -> Option<NaiveDate> {
    for captures in TEXT_DATE.captures_iter(text) {
        let day: u32 = captures[1].parse().ok()?;
        let month: u32 = captures[2].parse().ok()?;
        let year: i32 = captures[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }
    None
}

/// Opens a downloaded spreadsheet and classifies its header cells. Files
/// that are not spreadsheets, cannot be opened, or hold no usable cell all
/// classify as `none` without failing the caller.
pub fn classify_file(
    path: &Path,
    file_type: &str,
    today: NaiveDate,
    warning_days: i64,
) -> AlertOutcome {
    if !is_spreadsheet(file_type) {
        return AlertOutcome::none();
    }

    match read_header_cells(path) {
        Ok(grid) => classify_cells(&grid, today, warning_days),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read spreadsheet, treating as no alert");
            AlertOutcome::none()
        }
    }
}

fn read_header_cells(path: &Path) -> anyhow::Result<Vec<Vec<CellValue>>> {
    use calamine::{open_workbook_auto, Data, Reader};

    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names().to_vec();
    let first_sheet = sheet_names
        .first()
        .ok_or_else(|| anyhow::anyhow!("workbook has no sheets"))?;
    let range = workbook.worksheet_range(first_sheet)?;

    let mut grid = Vec::with_capacity(SCAN_ROWS as usize);
    for row in 0..SCAN_ROWS {
        let mut cells = Vec::with_capacity(SCAN_COLS as usize);
        for col in 0..SCAN_COLS {
            let cell = match range.get_value((row, col)) {
                Some(Data::DateTime(dt)) => dt
                    .as_datetime()
                    .map(|naive| CellValue::Date(naive.date()))
                    .unwrap_or(CellValue::Empty),
                Some(Data::DateTimeIso(text)) => text
                    .get(..10)
                    .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
                    .map(CellValue::Date)
                    .unwrap_or_else(|| CellValue::Text(text.clone())),
                Some(Data::Float(value)) => CellValue::Number(*value),
                Some(Data::Int(value)) => CellValue::Number(*value as f64),
                Some(Data::String(text)) => CellValue::Text(text.clone()),
                _ => CellValue::Empty,
            };
            cells.push(cell);
        }
        grid.push(cells);
    }

    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn grid_with(cell: CellValue) -> Vec<Vec<CellValue>> {
        vec![vec![cell]]
    }

    #[test]
    fn empty_grid_classifies_as_none() {
        let outcome = classify_cells(&[], today(), DEFAULT_WARNING_DAYS);
        assert_eq!(outcome, AlertOutcome::none());
    }

    #[test]
    fn past_date_is_expired() {
        let expired = today() - Duration::days(1);
        let outcome = classify_cells(
            &grid_with(CellValue::Date(expired)),
            today(),
            DEFAULT_WARNING_DAYS,
        );
        assert_eq!(outcome.status, AlertStatus::Expired);
        assert_eq!(outcome.expiry_date, Some(expired));
    }

    #[test]
    fn exactly_thirty_days_out_is_warning() {
        let expiry = today() + Duration::days(30);
        let outcome = classify_cells(
            &grid_with(CellValue::Date(expiry)),
            today(),
            DEFAULT_WARNING_DAYS,
        );
        assert_eq!(outcome.status, AlertStatus::Warning);
    }

    #[test]
    fn thirty_one_days_out_is_none() {
        let expiry = today() + Duration::days(31);
        let outcome = classify_cells(
            &grid_with(CellValue::Date(expiry)),
            today(),
            DEFAULT_WARNING_DAYS,
        );
        assert_eq!(outcome.status, AlertStatus::None);
        assert_eq!(outcome.expiry_date, Some(expiry));
    }

    #[test]
    fn today_itself_is_warning_not_expired() {
        let outcome = classify_cells(
            &grid_with(CellValue::Date(today())),
            today(),
            DEFAULT_WARNING_DAYS,
        );
        assert_eq!(outcome.status, AlertStatus::Warning);
    }

    #[test]
    fn custom_threshold_changes_the_boundary() {
        let expiry = today() + Duration::days(45);
        let outcome = classify_cells(&grid_with(CellValue::Date(expiry)), today(), 60);
        assert_eq!(outcome.status, AlertStatus::Warning);
    }

    #[test]
    fn numeric_serial_is_decoded() {
        // 2024-03-31 is serial 45382 relative to the 1899-12-30 epoch.
        let outcome = classify_cells(
            &grid_with(CellValue::Number(45_382.0)),
            today(),
            DEFAULT_WARNING_DAYS,
        );
        assert_eq!(
            outcome.expiry_date,
            NaiveDate::from_ymd_opt(2024, 3, 31)
        );
        assert_eq!(outcome.status, AlertStatus::Warning);
    }

    #[test]
    fn slash_and_dash_text_dates_are_parsed() {
        for text in ["Scadenza: 15/04/2024", "Scadenza 15-04-2024"] {
            let outcome = classify_cells(
                &grid_with(CellValue::Text(text.to_string())),
                today(),
                DEFAULT_WARNING_DAYS,
            );
            assert_eq!(outcome.expiry_date, NaiveDate::from_ymd_opt(2024, 4, 15));
        }
    }

    #[test]
    fn native_date_takes_priority_over_text() {
        let native = today() + Duration::days(100);
        let grid = vec![vec![
            CellValue::Text("01/01/2020".to_string()),
            CellValue::Date(native),
        ]];
        let outcome = classify_cells(&grid, today(), DEFAULT_WARNING_DAYS);
        assert_eq!(outcome.expiry_date, Some(native));
    }

    #[test]
    fn stop_glyph_forces_expired_over_far_future_date() {
        let grid = vec![vec![
            CellValue::Date(today() + Duration::days(365)),
            CellValue::Text("🛑 bloccato".to_string()),
        ]];
        let outcome = classify_cells(&grid, today(), DEFAULT_WARNING_DAYS);
        assert_eq!(outcome.status, AlertStatus::Expired);
        assert!(outcome.forced);
    }

    #[test]
    fn date_derived_status_is_not_marked_forced() {
        let outcome = classify_cells(
            &grid_with(CellValue::Date(today() - Duration::days(1))),
            today(),
            DEFAULT_WARNING_DAYS,
        );
        assert_eq!(outcome.status, AlertStatus::Expired);
        assert!(!outcome.forced);
    }

    #[test]
    fn warning_glyph_forces_warning_without_any_date() {
        let outcome = classify_cells(
            &grid_with(CellValue::Text("⚠ verificare".to_string())),
            today(),
            DEFAULT_WARNING_DAYS,
        );
        assert_eq!(outcome.status, AlertStatus::Warning);
        assert_eq!(outcome.expiry_date, None);
    }

    #[test]
    fn stop_glyph_wins_over_warning_glyph() {
        let grid = vec![vec![
            CellValue::Text("⚠".to_string()),
            CellValue::Text("⛔".to_string()),
        ]];
        let outcome = classify_cells(&grid, today(), DEFAULT_WARNING_DAYS);
        assert_eq!(outcome.status, AlertStatus::Expired);
    }

    #[test]
    fn cells_outside_header_area_are_ignored() {
        let mut grid = vec![
            vec![CellValue::Empty; 3],
            vec![CellValue::Empty; 3],
            vec![CellValue::Date(today() - Duration::days(10)); 3],
        ];
        grid[0].push(CellValue::Date(today() - Duration::days(10)));
        let outcome = classify_cells(&grid, today(), DEFAULT_WARNING_DAYS);
        assert_eq!(outcome.status, AlertStatus::None);
    }

    #[test]
    fn non_spreadsheet_types_skip_classification() {
        assert!(!is_spreadsheet("pdf"));
        assert!(is_spreadsheet("xlsx"));
        let outcome = classify_file(
            Path::new("/nonexistent/file.pdf"),
            "pdf",
            today(),
            DEFAULT_WARNING_DAYS,
        );
        assert_eq!(outcome, AlertOutcome::none());
    }
}
