use once_cell::sync::Lazy;
use regex::Regex;

/// Structured form of a conforming document filename:
/// `<dotted-path>_<title>_Rev.<n>_<YYYY-MM-DD>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    pub hierarchical_path: String,
    pub title: String,
    pub revision: u32,
    pub date: String,
    pub file_type: String,
}

impl ParsedFilename {
    pub fn revision_label(&self) -> String {
        format!("Rev.{}", self.revision)
    }
}

// Title segment: unicode letters/digits, spaces and light punctuation, but
// never the `_`/`-` separators the pattern itself uses. The date is checked
// by shape only, not calendar validity.
static FILENAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d+(?:\.\d+)*)[_-]([\p{L}\p{N} .,()'&]+)[_-]Rev\.(\d+)[_-](\d{4}-\d{2}-\d{2})\.([A-Za-z0-9]+)$",
    )
    .unwrap()
});

/// Parses a raw filename into its structured parts. Returns `None` for
/// anything that does not match the naming convention; callers treat that as
/// "not a managed document, skip". Pure and deterministic.
pub fn parse_filename(filename: &str) -> Option<ParsedFilename> {
    let captures = FILENAME_PATTERN.captures(filename)?;

    let revision: u32 = captures[3].parse().ok()?;

    Some(ParsedFilename {
        hierarchical_path: captures[1].to_string(),
        title: captures[2].trim().to_string(),
        revision,
        date: captures[4].to_string(),
        file_type: captures[5].to_lowercase(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_filename() {
        let parsed = parse_filename("8.2.1_Gestione Ordini_Rev.3_2024-01-15.xlsx").unwrap();
        assert_eq!(parsed.hierarchical_path, "8.2.1");
        assert_eq!(parsed.title, "Gestione Ordini");
        assert_eq!(parsed.revision, 3);
        assert_eq!(parsed.revision_label(), "Rev.3");
        assert_eq!(parsed.date, "2024-01-15");
        assert_eq!(parsed.file_type, "xlsx");
    }

    #[test]
    fn parses_accented_title_and_uppercase_extension() {
        let parsed = parse_filename("4.1_Qualità e Sicurezza_Rev.12_2023-11-02.PDF").unwrap();
        assert_eq!(parsed.title, "Qualità e Sicurezza");
        assert_eq!(parsed.revision, 12);
        assert_eq!(parsed.file_type, "pdf");
    }

    #[test]
    fn accepts_dash_separators() {
        let parsed = parse_filename("7_Audit Interno-Rev.2-2024-06-30.docx").unwrap();
        assert_eq!(parsed.hierarchical_path, "7");
        assert_eq!(parsed.revision, 2);
    }

    #[test]
    fn zero_padded_revision_parses_as_integer() {
        let parsed = parse_filename("1.2_Manuale_Rev.03_2024-02-01.pdf").unwrap();
        assert_eq!(parsed.revision, 3);
    }

    #[test]
    fn rejects_filename_without_revision_marker() {
        assert!(parse_filename("8.2.1_Gestione Ordini_2024-01-15.xlsx").is_none());
    }

    #[test]
    fn rejects_plain_filename() {
        assert!(parse_filename("Gestione Ordini.xlsx").is_none());
    }

    #[test]
    fn rejects_non_numeric_path() {
        assert!(parse_filename("a.b_Titolo_Rev.1_2024-01-15.xlsx").is_none());
    }

    #[test]
    fn rejects_missing_date() {
        assert!(parse_filename("8.2_Titolo_Rev.1.xlsx").is_none());
    }

    #[test]
    fn rejects_title_with_no_valid_characters() {
        assert!(parse_filename("8.2__Rev.1_2024-01-15.xlsx").is_none());
        assert!(parse_filename("8.2_///_Rev.1_2024-01-15.xlsx").is_none());
    }

    #[test]
    fn date_is_validated_by_shape_only() {
        // Not a real calendar date, but shaped correctly.
        let parsed = parse_filename("2_Registro_Rev.1_2024-13-45.xlsx").unwrap();
        assert_eq!(parsed.date, "2024-13-45");
    }
}
