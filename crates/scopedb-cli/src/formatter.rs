//! Output formatters for query results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use scopedb_proto::{Record, Value};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format rows returned by a query.
    fn format_records(&self, records: &[Record]) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_records(&self, records: &[Record]) -> String {
        let Some(first) = records.first() else {
            return "No results".to_string();
        };

        let mut table = Table::new();
        table.set_header(first.columns().iter().map(Cell::new).collect::<Vec<_>>());
        for record in records {
            table.add_row(
                record
                    .values()
                    .iter()
                    .map(|v| Cell::new(v.to_string()))
                    .collect::<Vec<_>>(),
            );
        }

        format!("{}\n{} row(s)", table, records.len())
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_records(&self, records: &[Record]) -> String {
        serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({
            "error": error
        })
        .to_string()
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_records(&self, records: &[Record]) -> String {
        let Some(first) = records.first() else {
            return String::new();
        };

        let header: Vec<String> = first.columns().iter().map(|c| escape_header(c)).collect();
        let mut output = header.join(",");
        output.push('\n');
        for record in records {
            let cells: Vec<String> = record.values().iter().map(format_value_csv).collect();
            output.push_str(&cells.join(","));
            output.push('\n');
        }
        output
    }

    fn format_error(&self, error: &str) -> String {
        format!("error\n\"{}\"", escape_csv(error))
    }
}

/// Format a Value for CSV output.
fn format_value_csv(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => format!("\"{}\"", escape_csv(s)),
        _ => value.to_string(),
    }
}

/// Quote a column name when it holds a separator, quote or line break.
fn escape_header(name: &str) -> String {
    if name.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", escape_csv(name))
    } else {
        name.to_string()
    }
}

/// Escape a string for CSV.
fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<Record> {
        vec![
            Record::from_pairs([
                ("id", Value::Int64(1)),
                ("isolate", Value::from("A4/M1027")),
                ("country", Value::Null),
            ]),
            Record::from_pairs([
                ("id", Value::Int64(2)),
                ("isolate", Value::from("say \"MC58\"")),
                ("country", Value::from("UK")),
            ]),
        ]
    }

    #[test]
    fn test_table_format() {
        let output = TableFormatter.format_records(&records());
        assert!(output.contains("isolate"));
        assert!(output.contains("A4/M1027"));
        assert!(output.contains("NULL"));
        assert!(output.ends_with("2 row(s)"));
        assert_eq!(TableFormatter.format_records(&[]), "No results");
    }

    #[test]
    fn test_json_format() {
        let output = JsonFormatter.format_records(&records());
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["id"], 1);
        assert_eq!(parsed[0]["country"], serde_json::Value::Null);
        assert_eq!(parsed[1]["country"], "UK");
        // Columns keep their query order.
        assert!(output.find("\"id\"").unwrap() < output.find("\"isolate\"").unwrap());
    }

    #[test]
    fn test_csv_format() {
        let output = CsvFormatter.format_records(&records());
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "id,isolate,country");
        assert_eq!(lines[1], "1,\"A4/M1027\",");
        assert_eq!(lines[2], "2,\"say \"\"MC58\"\"\",\"UK\"");
    }

    #[test]
    fn test_csv_header_is_escaped() {
        let records = vec![Record::from_pairs([
            ("id", Value::Int64(1)),
            ("count(*), total", Value::Int64(2)),
        ])];
        let output = CsvFormatter.format_records(&records);
        assert_eq!(output.lines().next(), Some("id,\"count(*), total\""));
    }

    #[test]
    fn test_error_formats() {
        assert_eq!(TableFormatter.format_error("boom"), "Error: boom");
        assert!(JsonFormatter.format_error("boom").contains("\"error\""));
        assert_eq!(CsvFormatter.format_error("a\"b"), "error\n\"a\"\"b\"");
    }
}
