//! Minimal CSV table handling
//!
//! Artifacts and the sleep export are small, flat CSV files. This module
//! renders and parses them with RFC 4180 quoting.

use crate::error::EtlError;

/// A header row plus data rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Index of a column by header name
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Render the table as CSV text
    pub fn to_csv(&self) -> String {
        let mut output = String::new();

        let header_line: Vec<String> = self.headers.iter().map(|h| escape_field(h)).collect();
        output.push_str(&header_line.join(","));
        output.push('\n');

        for row in &self.rows {
            let row_line: Vec<String> = row.iter().map(|c| escape_field(c)).collect();
            output.push_str(&row_line.join(","));
            output.push('\n');
        }

        output
    }

    /// Parse CSV text. The first record is the header; blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self, EtlError> {
        let mut records = parse_records(text)?.into_iter();

        let headers = records
            .next()
            .ok_or_else(|| EtlError::InvalidArtifact("CSV has no header row".to_string()))?;

        let mut table = CsvTable::new(headers);
        for (index, record) in records.enumerate() {
            if record.len() != table.headers.len() {
                return Err(EtlError::InvalidArtifact(format!(
                    "row {} has {} fields, expected {}",
                    index + 1,
                    record.len(),
                    table.headers.len()
                )));
            }
            table.push_row(record);
        }

        Ok(table)
    }
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
    {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn parse_records(text: &str) -> Result<Vec<Vec<String>>, EtlError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                field_started = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                field_started = true;
            }
            '\r' => {}
            '\n' => {
                if field_started || !field.is_empty() || !record.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                field_started = false;
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(EtlError::InvalidArtifact(
            "unterminated quoted field".to_string(),
        ));
    }

    if field_started || !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}
