//! Data cursors over heterogeneous sources
//!
//! A [`DataCursor`] is what plot widgets consume. It wraps exactly one backend
//! implementing [`RecordSource`] and gives all of them the same contract:
//!
//! - [`DataCursor::describe`] - Column metadata, fixed when the source is opened
//! - [`DataCursor::next_record`] - The next complete record, or [`CursorError::EndOfSource`]
//! - [`DataCursor::rewind`] - Restart from the first data row (no-op for streams)
//! - [`DataCursor::copy`] - An independent cursor over the same source
//! - [`DataCursor::close`] - Release every owned resource, exactly once
//!
//! # Backends
//!
//! - [`RelationalSource`] - First table of an SQLite database
//! - [`DelimitedSource`] - Comma-separated file with header rows and a sibling description file
//! - [`StreamingSource`] - Live TCP stream fed through an [`IngestPipeline`](crate::stream::IngestPipeline)
//!
//! # Row filtering
//!
//! Every value of a record must coerce to `f64`. A row containing the
//! missing-value marker, an empty cell or a non-numeric token is dropped as a
//! whole and the backend moves on to the next physical row.

pub mod delimited;
pub mod error;
pub mod relational;
pub mod streaming;

pub use delimited::DelimitedSource;
pub use error::{CursorError, CursorResult};
pub use relational::RelationalSource;
pub use streaming::StreamingSource;

use crate::config::IngestConfig;
use crate::types::{LegendEntry, Record, SourceDescription, VariableDescriptor, VariableKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Which backend a cursor wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// SQLite database
    Relational,
    /// Delimited text file
    Delimited,
    /// Live TCP stream
    Streaming,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Relational => write!(f, "relational"),
            SourceKind::Delimited => write!(f, "delimited"),
            SourceKind::Streaming => write!(f, "streaming"),
        }
    }
}

/// Where to open a cursor from
///
/// Parses from `sqlite:<path>`, `csv:<path>`, `listen:<port>` or
/// `dial:<host>:<port>`. A bare path is relational when its extension is
/// `db`, `sqlite` or `sqlite3` and delimited otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceSpec {
    /// SQLite database file
    Relational { path: PathBuf },
    /// Delimited data file
    Delimited { path: PathBuf },
    /// Accept one stream connection on a local port
    Listen { port: u16 },
    /// Connect to a streaming peer
    Dial { address: String },
}

impl SourceSpec {
    /// Backend this spec opens
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceSpec::Relational { .. } => SourceKind::Relational,
            SourceSpec::Delimited { .. } => SourceKind::Delimited,
            SourceSpec::Listen { .. } | SourceSpec::Dial { .. } => SourceKind::Streaming,
        }
    }
}

impl FromStr for SourceSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("sqlite:") {
            return Ok(SourceSpec::Relational { path: path.into() });
        }
        if let Some(path) = s.strip_prefix("csv:") {
            return Ok(SourceSpec::Delimited { path: path.into() });
        }
        if let Some(port) = s.strip_prefix("listen:") {
            let port = port
                .parse()
                .map_err(|_| format!("invalid port {:?}", port))?;
            return Ok(SourceSpec::Listen { port });
        }
        if let Some(address) = s.strip_prefix("dial:") {
            if address.is_empty() {
                return Err("missing address".to_string());
            }
            return Ok(SourceSpec::Dial {
                address: address.to_string(),
            });
        }
        if s.is_empty() {
            return Err("empty source".to_string());
        }

        let path = PathBuf::from(s);
        let relational = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "db" | "sqlite" | "sqlite3"))
            .unwrap_or(false);

        Ok(if relational {
            SourceSpec::Relational { path }
        } else {
            SourceSpec::Delimited { path }
        })
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Relational { path } => write!(f, "sqlite:{}", path.display()),
            SourceSpec::Delimited { path } => write!(f, "csv:{}", path.display()),
            SourceSpec::Listen { port } => write!(f, "listen:{}", port),
            SourceSpec::Dial { address } => write!(f, "dial:{}", address),
        }
    }
}

/// One backend behind a [`DataCursor`]
///
/// Implementations own their handles exclusively; a copy opens new handles
/// rather than sharing a position with the original.
#[cfg_attr(test, mockall::automock)]
pub trait RecordSource {
    /// Which backend this is
    fn kind(&self) -> SourceKind;

    /// Column metadata captured when the source was opened
    fn description(&self) -> &SourceDescription;

    /// Next complete record, skipping malformed rows
    fn next_record(&mut self) -> CursorResult<Record>;

    /// Restart from the first data row
    fn rewind(&mut self) -> CursorResult<()>;

    /// Open an independent source positioned at the first data row
    fn try_copy(&self) -> CursorResult<Box<dyn RecordSource + Send>>;

    /// Release owned resources
    fn close(&mut self) -> CursorResult<()>;
}

/// Uniform iteration over any source
pub struct DataCursor {
    source: Box<dyn RecordSource + Send>,
    closed: bool,
}

impl fmt::Debug for DataCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataCursor")
            .field("kind", &self.source.kind())
            .field("arity", &self.arity())
            .field("closed", &self.closed)
            .finish()
    }
}

impl DataCursor {
    /// Open the source named by `spec`
    pub fn open(spec: &SourceSpec, config: &IngestConfig) -> CursorResult<Self> {
        tracing::info!("Opening {}", spec);
        let source: Box<dyn RecordSource + Send> = match spec {
            SourceSpec::Relational { path } => {
                Box::new(RelationalSource::open(path, &config.relational)?)
            }
            SourceSpec::Delimited { path } => {
                Box::new(DelimitedSource::open(path, &config.delimited)?)
            }
            SourceSpec::Listen { port } => Box::new(StreamingSource::listen(*port, &config.stream)?),
            SourceSpec::Dial { address } => {
                Box::new(StreamingSource::dial(address, &config.stream)?)
            }
        };
        Ok(Self::from_source(source))
    }

    /// Wrap an already-opened backend
    pub fn from_source(source: Box<dyn RecordSource + Send>) -> Self {
        Self {
            source,
            closed: false,
        }
    }

    /// Which backend this cursor wraps
    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    /// Column metadata of the source
    pub fn describe(&self) -> &SourceDescription {
        self.source.description()
    }

    /// Number of values in every record
    pub fn arity(&self) -> usize {
        self.describe().arity()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next complete record
    ///
    /// Returns [`CursorError::EndOfSource`] when no more data is available and
    /// [`CursorError::SourceClosed`] once the cursor (or its stream) is closed.
    pub fn next_record(&mut self) -> CursorResult<Record> {
        if self.closed {
            return Err(CursorError::SourceClosed);
        }
        self.source.next_record()
    }

    /// Restart from the first data row
    pub fn rewind(&mut self) -> CursorResult<()> {
        if self.closed {
            return Err(CursorError::SourceClosed);
        }
        self.source.rewind()
    }

    /// Independent cursor over the same source, positioned at its start
    pub fn copy(&self) -> CursorResult<DataCursor> {
        if self.closed {
            return Err(CursorError::SourceClosed);
        }
        Ok(Self::from_source(self.source.try_copy()?))
    }

    /// Release every resource the cursor owns
    ///
    /// The backend is closed at most once; later calls return `Ok(())`.
    pub fn close(&mut self) -> CursorResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::debug!("Closing {} cursor", self.source.kind());
        self.source.close()
    }

    /// Iterate until [`CursorError::EndOfSource`]
    ///
    /// Other errors are yielded once and end the iteration.
    pub fn records(&mut self) -> Records<'_> {
        Records {
            cursor: self,
            done: false,
        }
    }
}

impl Drop for DataCursor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Error closing cursor on drop: {}", e);
        }
    }
}

/// Iterator returned by [`DataCursor::records`]
pub struct Records<'a> {
    cursor: &'a mut DataCursor,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = CursorResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.next_record() {
            Ok(record) => Some(Ok(record)),
            Err(CursorError::EndOfSource) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Coerce one physical row into a record of exactly `arity` values
///
/// Returns `None` when any token is empty, equals `missing_marker`, or is not a
/// number, or when the token count differs from `arity`.
pub(crate) fn coerce_tokens<'a, I>(tokens: I, arity: usize, missing_marker: &str) -> Option<Record>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut values = Vec::with_capacity(arity);
    for token in tokens {
        let token = token.trim();
        if token.is_empty() || token == missing_marker {
            return None;
        }
        values.push(token.parse::<f64>().ok()?);
    }
    (values.len() == arity).then(|| Record::new(values))
}

/// Build a description from labels and kinds plus the optional descr rows
///
/// `descr_rows[0]` holds the per-column units (ignored at categorical
/// positions). Each later row holds one `code=label` cell per categorical
/// column; a column's legend ends at its first empty cell.
pub(crate) fn build_description(
    labels: &[String],
    kinds: &[VariableKind],
    descr_rows: &[Vec<String>],
) -> CursorResult<SourceDescription> {
    if labels.is_empty() {
        return Err(CursorError::Description("source has no columns".to_string()));
    }
    if labels.len() != kinds.len() {
        return Err(CursorError::Description(format!(
            "{} labels but {} kind flags",
            labels.len(),
            kinds.len()
        )));
    }

    let cell = |row: &[String], column: usize| -> String {
        row.get(column).map(|c| c.trim().to_string()).unwrap_or_default()
    };

    let mut variables: Vec<VariableDescriptor> = labels
        .iter()
        .zip(kinds)
        .map(|(name, kind)| match kind {
            VariableKind::Numeric => VariableDescriptor::numeric(name.trim()),
            VariableKind::Categorical => VariableDescriptor::categorical(name.trim()),
        })
        .collect();

    let Some((units, legend_rows)) = descr_rows.split_first() else {
        return Ok(SourceDescription::new(variables));
    };

    for (column, variable) in variables.iter_mut().enumerate() {
        if variable.kind == VariableKind::Numeric {
            variable.unit = cell(units, column);
        }
    }

    for (column, variable) in variables.iter_mut().enumerate() {
        if variable.kind != VariableKind::Categorical {
            continue;
        }
        for row in legend_rows {
            let text = cell(row, column);
            if text.is_empty() {
                break;
            }
            let entry = LegendEntry::parse(&text).ok_or_else(|| {
                CursorError::Description(format!(
                    "invalid legend entry {:?} for column {:?}",
                    text, variable.name
                ))
            })?;
            variable.legend.push(entry);
        }
    }

    Ok(SourceDescription::new(variables))
}
