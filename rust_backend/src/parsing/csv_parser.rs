use csv::StringRecord;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::core::domain::{Field, RawRecord};
use crate::error::{EtlError, EtlResult};

/// How the source headers map onto canonical fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSchema {
    pub headers: Vec<String>,
    pub column_map: BTreeMap<Field, usize>,
    /// `(column index, header)` of every header no field claimed
    pub unmapped: Vec<(usize, String)>,
}

impl SourceSchema {
    /// Resolve headers against the alias table of every field.
    ///
    /// For each field the first alias present among the headers wins; a column
    /// is claimed by at most one field.
    pub fn resolve(headers: &StringRecord) -> Self {
        let headers: Vec<String> = headers.iter().map(normalize_header_name).collect();

        let mut column_map = BTreeMap::new();
        let mut claimed = HashSet::new();

        for field in Field::ALL {
            let found = field.aliases().iter().find_map(|alias| {
                headers
                    .iter()
                    .position(|h| h == alias)
                    .filter(|idx| !claimed.contains(idx))
            });

            if let Some(idx) = found {
                debug!("Mapped '{}' to column '{}'", field, headers[idx]);
                claimed.insert(idx);
                column_map.insert(field, idx);
            }
        }

        let unmapped = headers
            .iter()
            .enumerate()
            .filter(|(idx, h)| !claimed.contains(idx) && !h.is_empty())
            .map(|(idx, h)| (idx, h.clone()))
            .collect();

        Self {
            headers,
            column_map,
            unmapped,
        }
    }

    /// Required fields with no matching header.
    pub fn missing(&self, required: &[Field]) -> Vec<Field> {
        required
            .iter()
            .copied()
            .filter(|f| !self.column_map.contains_key(f))
            .collect()
    }

    /// Canonical name to source header, for reporting.
    pub fn mapping(&self) -> BTreeMap<String, String> {
        self.column_map
            .iter()
            .map(|(field, idx)| (field.canonical_name().to_string(), self.headers[*idx].clone()))
            .collect()
    }

    pub fn unmapped_columns(&self) -> Vec<String> {
        self.unmapped.iter().map(|(_, h)| h.clone()).collect()
    }

    fn to_raw_record(&self, line: usize, record: &StringRecord) -> RawRecord {
        let mut raw = RawRecord::new(line);

        for (field, idx) in &self.column_map {
            if let Some(value) = record.get(*idx) {
                raw.set(*field, value);
            }
        }

        for (idx, header) in &self.unmapped {
            if let Some(value) = record.get(*idx).map(str::trim).filter(|v| !v.is_empty()) {
                raw.extra.insert(header.clone(), value.to_string());
            }
        }

        raw
    }
}

/// A source row the CSV reader could not decode.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRow {
    pub line: usize,
    pub message: String,
}

/// Output of `load`: resolved schema plus every row of the source.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub schema: SourceSchema,
    pub records: Vec<RawRecord>,
    pub malformed: Vec<MalformedRow>,
}

impl RawTable {
    pub fn rows_read(&self) -> usize {
        self.records.len() + self.malformed.len()
    }
}

/// Load a raw sales extract from a CSV file.
///
/// # Errors
/// * `EtlError::Io` if the file cannot be opened or read
/// * `EtlError::Schema` if a required column has no matching header
pub fn load_csv(path: &Path, required: &[Field]) -> EtlResult<RawTable> {
    let file = File::open(path).map_err(|e| EtlError::io(path, e))?;
    let table = read_table(file, required).map_err(|e| match e {
        // Attach the path to I/O failures surfaced by the reader.
        EtlError::Csv(err) if err.is_io_error() => match err.into_kind() {
            csv::ErrorKind::Io(io) => EtlError::io(path, io),
            other => EtlError::Serialization(format!("{:?}", other)),
        },
        other => other,
    })?;

    info!(
        "Loaded {} rows ({} malformed) from {}",
        table.rows_read(),
        table.malformed.len(),
        path.display()
    );
    Ok(table)
}

/// Load a raw sales extract from any reader (in-memory data, stdin, tests).
pub fn load_csv_reader<R: Read>(reader: R, required: &[Field]) -> EtlResult<RawTable> {
    read_table(reader, required)
}

fn read_table<R: Read>(reader: R, required: &[Field]) -> EtlResult<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let schema = SourceSchema::resolve(&headers);

    let missing = schema.missing(required);
    if !missing.is_empty() {
        return Err(EtlError::Schema {
            missing: missing
                .iter()
                .map(|f| f.canonical_name().to_string())
                .collect(),
        });
    }

    if !schema.unmapped.is_empty() {
        info!("Unmapped columns: {:?}", schema.unmapped_columns());
    }

    let width = schema.headers.len();
    let mut records = Vec::new();
    let mut malformed = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        // records() starts on the line after the header
        let fallback_line = idx + 2;

        match result {
            Ok(record) => {
                let line = record
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);

                if record.len() > width {
                    malformed.push(MalformedRow {
                        line,
                        message: format!("expected {} fields, found {}", width, record.len()),
                    });
                    continue;
                }

                records.push(schema.to_raw_record(line, &record));
            }
            Err(e) if e.is_io_error() => return Err(EtlError::Csv(e)),
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                warn!("Malformed CSV record at line {}: {}", line, e);
                malformed.push(MalformedRow {
                    line,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(RawTable {
        schema,
        records,
        malformed,
    })
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').to_string()
}
