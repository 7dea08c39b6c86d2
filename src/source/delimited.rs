//! Delimited-file backend
//!
//! The data file starts with a label row and a kind-flag row (`0` numeric,
//! `1` categorical); every following row is data. Units and legends come from
//! an optional sibling file named `<stem>_descr.<ext>`. It repeats the label
//! and kind rows, which must agree with the data file, followed by the units
//! row and the legend rows:
//!
//! ```text
//! elnino.csv               elnino_descr.csv
//! ----------               ----------------
//! year,zone,temp           year,zone,temp
//! 0,1,0                    0,1,0
//! 1997,0,24.1              yr,,C
//! 1998,?,25.3              ,0=north,
//!                          ,1=south,
//! ```
//!
//! A description file that starts directly with the units row is accepted too.

use super::{build_description, coerce_tokens, CursorError, CursorResult, RecordSource, SourceKind};
use crate::config::DelimitedConfig;
use crate::types::{Record, SourceDescription, VariableKind};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Cursor backend over a delimited text file
pub struct DelimitedSource {
    path: PathBuf,
    config: DelimitedConfig,
    description: SourceDescription,
    reader: Option<csv::Reader<File>>,
    data_start: csv::Position,
    row: csv::ByteRecord,
    dropped: u64,
}

impl std::fmt::Debug for DelimitedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelimitedSource")
            .field("path", &self.path)
            .field("arity", &self.description.arity())
            .field("open", &self.reader.is_some())
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl DelimitedSource {
    /// Open a data file, read its header rows and its description file
    pub fn open(path: impl AsRef<Path>, config: &DelimitedConfig) -> CursorResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = reader_for(&path, config)?;
        let mut row = csv::ByteRecord::new();

        let (labels, kinds) = read_header(&mut reader, &mut row, config)?;
        let data_start = reader.position().clone();

        let descr_rows = match descr_path(&path, &config.descr_suffix) {
            Some(descr) if descr.is_file() => {
                tracing::debug!("Reading description file {}", descr.display());
                read_descr_rows(&descr, config)?
            }
            _ => Vec::new(),
        };
        let descr_rows = strip_descr_header(&labels, &kinds, &descr_rows)?;
        let description = build_description(&labels, &kinds, descr_rows)?;

        tracing::info!(
            "Opened delimited source {} with {} columns",
            path.display(),
            description.arity()
        );

        Ok(Self {
            path,
            config: config.clone(),
            description,
            reader: Some(reader),
            data_start,
            row,
            dropped: 0,
        })
    }

    /// Path of the data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows dropped since open because they could not be coerced
    pub fn dropped_rows(&self) -> u64 {
        self.dropped
    }

    fn coerce_row(&self) -> Option<Record> {
        let mut fields = Vec::with_capacity(self.row.len());
        for field in self.row.iter() {
            fields.push(std::str::from_utf8(field).ok()?);
        }
        coerce_tokens(fields, self.description.arity(), &self.config.missing_marker)
    }
}

impl RecordSource for DelimitedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Delimited
    }

    fn description(&self) -> &SourceDescription {
        &self.description
    }

    fn next_record(&mut self) -> CursorResult<Record> {
        loop {
            let reader = self.reader.as_mut().ok_or(CursorError::SourceClosed)?;
            if !reader.read_byte_record(&mut self.row)? {
                return Err(CursorError::EndOfSource);
            }
            match self.coerce_row() {
                Some(record) => return Ok(record),
                None => {
                    self.dropped += 1;
                    tracing::debug!(
                        "Dropping row {} of {}",
                        self.row.position().map(|p| p.line()).unwrap_or(0),
                        self.path.display()
                    );
                }
            }
        }
    }

    fn rewind(&mut self) -> CursorResult<()> {
        let reader = self.reader.as_mut().ok_or(CursorError::SourceClosed)?;
        reader.seek(self.data_start.clone())?;
        Ok(())
    }

    fn try_copy(&self) -> CursorResult<Box<dyn RecordSource + Send>> {
        if self.reader.is_none() {
            return Err(CursorError::SourceClosed);
        }
        let mut reader = reader_for(&self.path, &self.config)?;
        reader.seek(self.data_start.clone())?;

        Ok(Box::new(Self {
            path: self.path.clone(),
            config: self.config.clone(),
            description: self.description.clone(),
            reader: Some(reader),
            data_start: self.data_start.clone(),
            row: csv::ByteRecord::new(),
            dropped: 0,
        }))
    }

    fn close(&mut self) -> CursorResult<()> {
        if self.reader.take().is_some() {
            tracing::debug!(
                "Closed {} ({} rows dropped)",
                self.path.display(),
                self.dropped
            );
        }
        Ok(())
    }
}

/// Each physical line is one row; quotes are ordinary characters
fn reader_for(path: &Path, config: &DelimitedConfig) -> CursorResult<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .delimiter(config.delimiter_byte())
        .from_path(path)?)
}

fn text_fields(row: &csv::ByteRecord) -> CursorResult<Vec<String>> {
    row.iter()
        .map(|field| {
            std::str::from_utf8(field)
                .map(|s| s.trim().to_string())
                .map_err(|e| CursorError::Description(format!("header is not UTF-8: {}", e)))
        })
        .collect()
}

fn read_header(
    reader: &mut csv::Reader<File>,
    row: &mut csv::ByteRecord,
    config: &DelimitedConfig,
) -> CursorResult<(Vec<String>, Vec<VariableKind>)> {
    if config.header_rows == 0 {
        return Err(CursorError::Description(
            "at least one header row is required".to_string(),
        ));
    }

    if !reader.read_byte_record(row)? {
        return Err(CursorError::Description("missing label row".to_string()));
    }
    let labels = text_fields(row)?;

    let kinds = if config.header_rows >= 2 {
        if !reader.read_byte_record(row)? {
            return Err(CursorError::Description("missing kind row".to_string()));
        }
        text_fields(row)?
            .iter()
            .map(|flag| {
                VariableKind::from_flag(flag).ok_or_else(|| {
                    CursorError::Description(format!("invalid kind flag {:?}", flag))
                })
            })
            .collect::<CursorResult<Vec<_>>>()?
    } else {
        vec![VariableKind::Numeric; labels.len()]
    };

    for _ in 2..config.header_rows {
        if !reader.read_byte_record(row)? {
            break;
        }
    }

    Ok((labels, kinds))
}

/// Sibling description file: `<stem><suffix>.<ext>`
pub(crate) fn descr_path(path: &Path, suffix: &str) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let mut name = format!("{}{}", stem, suffix);
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    Some(path.with_file_name(name))
}

fn read_descr_rows(path: &Path, config: &DelimitedConfig) -> CursorResult<Vec<Vec<String>>> {
    let mut reader = reader_for(path, config)?;
    let mut row = csv::ByteRecord::new();
    let mut rows = Vec::new();
    while reader.read_byte_record(&mut row)? {
        rows.push(text_fields(&row)?);
    }
    Ok(rows)
}

/// Skip the label and kind rows of a description file, checking they match
fn strip_descr_header<'a>(
    labels: &[String],
    kinds: &[VariableKind],
    rows: &'a [Vec<String>],
) -> CursorResult<&'a [Vec<String>]> {
    let Some(first) = rows.first() else {
        return Ok(rows);
    };
    if first.as_slice() != labels {
        return Ok(rows);
    }

    let flags: Vec<&str> = kinds.iter().map(|k| k.flag()).collect();
    match rows.get(1) {
        Some(row) if row.iter().map(String::as_str).eq(flags.iter().copied()) => Ok(&rows[2..]),
        _ => Err(CursorError::Description(
            "description file kinds disagree with the data file".to_string(),
        )),
    }
}
