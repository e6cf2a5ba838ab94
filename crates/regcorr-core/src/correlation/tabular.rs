//! Delimited-text tables (`.csv`, `.tsv`, `.txt`, `.1D`).

use std::path::Path;
use std::sync::LazyLock;

use ndarray::Array2;
use regex::Regex;

use super::ArtifactError;
use crate::identity::{ArtifactKind, TableFormat};

/// Cell values read as NaN.
pub const MISSING_MARKERS: &[&str] = &["", "NA", "N/A", "n/a", "nan", "NaN", "null"];

/// Field separator of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Comma,
    /// Runs of spaces or tabs.
    Whitespace,
}

impl Delimiter {
    fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self {
            Delimiter::Tab => line.split('\t').collect(),
            Delimiter::Comma => line.split(',').collect(),
            Delimiter::Whitespace => line.split_whitespace().collect(),
        }
    }
}

/// Pick the delimiter from the first data line, skipping `#` comments.
pub fn sniff_delimiter(text: &str) -> Delimiter {
    let first = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'));
    match first {
        Some(line) if line.contains('\t') => Delimiter::Tab,
        Some(line) if line.contains(',') => Delimiter::Comma,
        _ => Delimiter::Whitespace,
    }
}

fn delimiter_for(format: TableFormat, text: &str) -> Delimiter {
    match format {
        TableFormat::Tsv => Delimiter::Tab,
        TableFormat::Csv => Delimiter::Comma,
        TableFormat::Txt | TableFormat::OneD => sniff_delimiter(text),
    }
}

static NUMERIC: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").ok());

fn looks_numeric(field: &str) -> bool {
    NUMERIC.as_ref().is_some_and(|re| re.is_match(field))
}

fn clean_field(field: &str) -> &str {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
        .trim()
}

fn parse_cell(field: &str) -> Option<f64> {
    if MISSING_MARKERS.contains(&field) {
        return Some(f64::NAN);
    }
    field.parse::<f64>().ok()
}

/// A parsed table: numeric payload plus the columns that were set aside.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    /// Non-numeric columns, treated as row labels.
    pub index_columns: Vec<String>,
    /// Rows × numeric columns.
    pub values: Array2<f64>,
}

/// Parse `text` as a table of the given format.
pub fn parse_table(text: &str, format: TableFormat) -> Result<Table, String> {
    let delimiter = delimiter_for(format, text);
    let mut rows: Vec<Vec<&str>> = text
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .filter(|line| !line.trim().is_empty())
        .map(|line| delimiter.split(line).into_iter().map(clean_field).collect())
        .collect();

    if rows.is_empty() {
        return Err("table is empty".to_string());
    }

    let header: Vec<String> = if rows[0].iter().all(|f| looks_numeric(f)) {
        (0..rows[0].len()).map(|i| i.to_string()).collect()
    } else {
        rows.remove(0).into_iter().map(str::to_string).collect()
    };
    let width = header.len();

    if let Some((line, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(format!(
            "row {} has {} fields, expected {width}",
            line + 1,
            row.len()
        ));
    }

    let mut numeric_columns = Vec::new();
    let mut index_columns = Vec::new();
    for (col, name) in header.iter().enumerate() {
        let parsed: Option<Vec<f64>> = rows.iter().map(|row| parse_cell(row[col])).collect();
        match parsed {
            Some(values) => numeric_columns.push(values),
            None => index_columns.push(name.clone()),
        }
    }
    if numeric_columns.is_empty() {
        return Err("no numeric columns".to_string());
    }

    let n_rows = rows.len();
    let n_cols = numeric_columns.len();
    let values = Array2::from_shape_fn((n_rows, n_cols), |(r, c)| numeric_columns[c][r]);

    Ok(Table {
        header,
        index_columns,
        values,
    })
}

/// Read the table at `path`; the format follows its extension.
pub fn read_table(path: &Path) -> Result<Table, ArtifactError> {
    let display = path.display().to_string();
    let format = match ArtifactKind::of(&display) {
        Some(ArtifactKind::Table(format)) => format,
        _ => {
            return Err(ArtifactError::Read {
                path: display,
                detail: "not a tabular artifact".to_string(),
            })
        }
    };
    let text = std::fs::read_to_string(path).map_err(|e| ArtifactError::Read {
        path: display.clone(),
        detail: e.to_string(),
    })?;
    parse_table(&text, format).map_err(|detail| ArtifactError::Read {
        path: display,
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_past_comments() {
        assert_eq!(sniff_delimiter("# a,b\n1\t2\n"), Delimiter::Tab);
        assert_eq!(sniff_delimiter("# x\n\n1,2\n"), Delimiter::Comma);
        assert_eq!(sniff_delimiter("1  2   3\n"), Delimiter::Whitespace);
    }

    #[test]
    fn header_and_index_columns() {
        let text = "sub,trans_x,rot_y\nsub-1,0.1,0.2\nsub-1,0.3,NA\n";
        let table = parse_table(text, TableFormat::Csv).unwrap();
        assert_eq!(table.header, vec!["sub", "trans_x", "rot_y"]);
        assert_eq!(table.index_columns, vec!["sub"]);
        assert_eq!(table.values.dim(), (2, 2));
        assert_eq!(table.values[[1, 0]], 0.3);
        assert!(table.values[[1, 1]].is_nan());
    }

    #[test]
    fn numeric_header_means_headerless() {
        let text = "1 2 3\n4 5 6\n";
        let table = parse_table(text, TableFormat::OneD).unwrap();
        assert_eq!(table.header, vec!["0", "1", "2"]);
        assert_eq!(table.values.dim(), (2, 3));
        assert_eq!(table.values[[0, 0]], 1.0);
    }

    #[test]
    fn quoted_fields_and_inline_comments() {
        let text = "\"a\"\t\"b\"\n1\t2 # trailing note\n3\t4\n";
        let table = parse_table(text, TableFormat::Tsv).unwrap();
        assert_eq!(table.header, vec!["a", "b"]);
        assert_eq!(table.values[[0, 1]], 2.0);
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = parse_table("a,b\n1,2\n3\n", TableFormat::Csv).unwrap_err();
        assert!(err.contains("row 2"));
    }

    #[test]
    fn all_text_table_rejected() {
        assert!(parse_table("a,b\nx,y\n", TableFormat::Csv).is_err());
        assert!(parse_table("# only comments\n", TableFormat::Txt).is_err());
    }

    #[test]
    fn read_table_reports_path() {
        let err = read_table(Path::new("/nope/missing.csv")).unwrap_err();
        assert!(err.to_string().contains("/nope/missing.csv"));
    }
}
