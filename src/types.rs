//! Core data types for DataVis-Ingest
//!
//! This module contains the data structures shared by every source backend:
//! the records a cursor yields and the metadata describing their columns.
//!
//! # Main Types
//!
//! - [`Record`] - One fixed-arity row of `f64` values
//! - [`VariableKind`] - Whether a column is numeric or categorical
//! - [`LegendEntry`] - One `code=label` pair for a categorical column
//! - [`VariableDescriptor`] - Per-column metadata (name, kind, unit, legend)
//! - [`SourceDescription`] - The column-major view returned by `describe()`
//!
//! # Arity
//!
//! The arity of a source is fixed when it is opened. Every [`Record`] a cursor
//! yields has exactly that many values; rows that cannot be fully coerced are
//! dropped by the backend before they ever become a `Record`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// A single row of numeric values read from any backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    values: Vec<f64>,
}

impl Record {
    /// Create a record from its values
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Number of values in this record
    pub fn arity(&self) -> usize {
        self.values.len()
    }

    /// Borrow the values in column order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Get a single value by column index
    pub fn get(&self, column: usize) -> Option<f64> {
        self.values.get(column).copied()
    }

    /// Consume the record, returning its values
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Render the record as a comma-joined line, the same form used on the wire
    pub fn to_csv_line(&self) -> String {
        self.values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl From<Vec<f64>> for Record {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl Index<usize> for Record {
    type Output = f64;

    fn index(&self, column: usize) -> &f64 {
        &self.values[column]
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_csv_line())
    }
}

/// Kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VariableKind {
    /// Continuous numeric values
    #[default]
    Numeric,
    /// Values are codes into a legend
    Categorical,
}

impl VariableKind {
    /// Parse the kind flag used in description files (`0` numeric, `1` categorical)
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag.trim() {
            "0" => Some(VariableKind::Numeric),
            "1" => Some(VariableKind::Categorical),
            _ => None,
        }
    }

    /// The flag written to description files for this kind
    pub fn flag(&self) -> &'static str {
        match self {
            VariableKind::Numeric => "0",
            VariableKind::Categorical => "1",
        }
    }

    /// Returns true for categorical columns
    pub fn is_categorical(&self) -> bool {
        matches!(self, VariableKind::Categorical)
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKind::Numeric => write!(f, "numeric"),
            VariableKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// One legend entry of a categorical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    /// Code as it appears in the data
    pub code: f64,
    /// Human-readable label for the code
    pub label: String,
}

impl LegendEntry {
    /// Create a new legend entry
    pub fn new(code: f64, label: impl Into<String>) -> Self {
        Self {
            code,
            label: label.into(),
        }
    }

    /// Parse a `code=label` cell. Returns `None` for anything else.
    pub fn parse(cell: &str) -> Option<Self> {
        let (code, label) = cell.trim().split_once('=')?;
        let code = code.trim().parse::<f64>().ok()?;
        Some(Self::new(code, label.trim()))
    }
}

impl fmt::Display for LegendEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.code, self.label)
    }
}

/// Metadata for one column of a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    /// Column name
    pub name: String,
    /// Numeric or categorical
    pub kind: VariableKind,
    /// Unit string (empty when unknown, always empty for categorical columns)
    pub unit: String,
    /// Ordered legend entries (only populated for categorical columns)
    pub legend: Vec<LegendEntry>,
}

impl VariableDescriptor {
    /// Create a numeric descriptor with no unit
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Numeric,
            unit: String::new(),
            legend: Vec::new(),
        }
    }

    /// Create a categorical descriptor with an empty legend
    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Categorical,
            unit: String::new(),
            legend: Vec::new(),
        }
    }

    /// Builder-style unit setter
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Builder-style legend setter
    pub fn with_legend(mut self, legend: Vec<LegendEntry>) -> Self {
        self.legend = legend;
        self
    }
}

/// Description of an opened source
///
/// Produced once when the source is opened and immutable afterwards. The
/// accessors return the column-major tuples plot widgets consume.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceDescription {
    variables: Vec<VariableDescriptor>,
}

impl SourceDescription {
    /// Create a description from per-column descriptors
    pub fn new(variables: Vec<VariableDescriptor>) -> Self {
        Self { variables }
    }

    /// Description of a stream: all names, all numeric, no units
    pub fn all_numeric<S: AsRef<str>>(names: &[S]) -> Self {
        Self::new(
            names
                .iter()
                .map(|n| VariableDescriptor::numeric(n.as_ref()))
                .collect(),
        )
    }

    /// Number of columns
    pub fn arity(&self) -> usize {
        self.variables.len()
    }

    /// Per-column descriptors
    pub fn variables(&self) -> &[VariableDescriptor] {
        &self.variables
    }

    /// Column names
    pub fn labels(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    /// Column kinds
    pub fn kinds(&self) -> Vec<VariableKind> {
        self.variables.iter().map(|v| v.kind).collect()
    }

    /// Column units
    pub fn units(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.unit.as_str()).collect()
    }

    /// Column legends (empty for numeric columns)
    pub fn legends(&self) -> Vec<&[LegendEntry]> {
        self.variables.iter().map(|v| v.legend.as_slice()).collect()
    }

    /// Look up the label of a categorical code
    pub fn legend_label(&self, column: usize, code: f64) -> Option<&str> {
        self.variables
            .get(column)?
            .legend
            .iter()
            .find(|e| e.code == code)
            .map(|e| e.label.as_str())
    }

    /// Index of a column by name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_flags() {
        assert_eq!(VariableKind::from_flag("0"), Some(VariableKind::Numeric));
        assert_eq!(VariableKind::from_flag(" 1 "), Some(VariableKind::Categorical));
        assert_eq!(VariableKind::from_flag("2"), None);
        assert_eq!(VariableKind::Categorical.flag(), "1");
        assert!(VariableKind::Categorical.is_categorical());
    }

    #[test]
    fn test_legend_entry_parse() {
        let entry = LegendEntry::parse("3=forest").unwrap();
        assert_eq!(entry.code, 3.0);
        assert_eq!(entry.label, "forest");

        assert!(LegendEntry::parse("").is_none());
        assert!(LegendEntry::parse("forest").is_none());
        assert!(LegendEntry::parse("x=forest").is_none());
    }

    #[test]
    fn test_description_columns() {
        let descr = SourceDescription::new(vec![
            VariableDescriptor::numeric("temp").with_unit("C"),
            VariableDescriptor::categorical("zone").with_legend(vec![
                LegendEntry::new(0.0, "north"),
                LegendEntry::new(1.0, "south"),
            ]),
        ]);

        assert_eq!(descr.arity(), 2);
        assert_eq!(descr.labels(), vec!["temp", "zone"]);
        assert_eq!(
            descr.kinds(),
            vec![VariableKind::Numeric, VariableKind::Categorical]
        );
        assert_eq!(descr.units(), vec!["C", ""]);
        assert_eq!(descr.legends()[1].len(), 2);
        assert_eq!(descr.legend_label(1, 1.0), Some("south"));
        assert_eq!(descr.legend_label(0, 1.0), None);
        assert_eq!(descr.position("zone"), Some(1));
    }

    #[test]
    fn test_all_numeric() {
        let descr = SourceDescription::all_numeric(&["temp", "pressure", "humidity"]);
        assert_eq!(descr.arity(), 3);
        assert!(descr.kinds().iter().all(|k| *k == VariableKind::Numeric));
        assert!(descr.units().iter().all(|u| u.is_empty()));
    }

    #[test]
    fn test_record_accessors() {
        let record = Record::new(vec![1.0, 2.5]);
        assert_eq!(record.arity(), 2);
        assert_eq!(record[1], 2.5);
        assert_eq!(record.get(2), None);
        assert_eq!(record.to_csv_line(), "1,2.5");
        assert_eq!(record.to_string(), "[1,2.5]");
    }
}
