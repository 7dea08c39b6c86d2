//! Fixture builders for delimited files and SQLite databases

use datavis_ingest::VariableKind;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// One column of a fixture
struct Column {
    name: String,
    kind: VariableKind,
    unit: String,
    legend: Vec<String>,
}

/// Builder for a delimited data file and its description file
pub struct DelimitedFixture {
    stem: String,
    columns: Vec<Column>,
    rows: Vec<String>,
    with_descr: bool,
}

impl DelimitedFixture {
    pub fn new(stem: &str) -> Self {
        Self {
            stem: stem.to_string(),
            columns: Vec::new(),
            rows: Vec::new(),
            with_descr: false,
        }
    }

    pub fn numeric(mut self, name: &str, unit: &str) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            kind: VariableKind::Numeric,
            unit: unit.to_string(),
            legend: Vec::new(),
        });
        self
    }

    pub fn categorical(mut self, name: &str, legend: &[&str]) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            kind: VariableKind::Categorical,
            unit: String::new(),
            legend: legend.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Raw data line, written as-is
    pub fn row(mut self, line: &str) -> Self {
        self.rows.push(line.to_string());
        self
    }

    pub fn with_descr(mut self) -> Self {
        self.with_descr = true;
        self
    }

    /// Write the files into `dir` and return the data file path
    pub fn write(self, dir: &TempDir) -> PathBuf {
        let labels = self.join(|c| c.name.clone());
        let kinds = self.join(|c| c.kind.flag().to_string());

        let mut data = format!("{}\n{}\n", labels, kinds);
        for row in &self.rows {
            data.push_str(row);
            data.push('\n');
        }
        let path = dir.path().join(format!("{}.csv", self.stem));
        fs::write(&path, data).unwrap();

        if self.with_descr {
            let mut descr = format!("{}\n{}\n{}\n", labels, kinds, self.join(|c| c.unit.clone()));
            let depth = self.columns.iter().map(|c| c.legend.len()).max().unwrap_or(0);
            for i in 0..depth {
                descr.push_str(&self.join(|c| c.legend.get(i).cloned().unwrap_or_default()));
                descr.push('\n');
            }
            fs::write(dir.path().join(format!("{}_descr.csv", self.stem)), descr).unwrap();
        }

        path
    }

    fn join(&self, f: impl Fn(&Column) -> String) -> String {
        self.columns.iter().map(f).collect::<Vec<_>>().join(",")
    }
}

/// Build an SQLite database from a SQL script
pub fn sqlite_fixture(dir: &TempDir, name: &str, script: &str) -> PathBuf {
    let path = dir.path().join(name);
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(script).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimited_fixture_layout() {
        let dir = TempDir::new().unwrap();
        let path = DelimitedFixture::new("sample")
            .numeric("a", "m")
            .categorical("b", &["0=no", "1=yes"])
            .row("1,0")
            .with_descr()
            .write(&dir);

        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n0,1\n1,0\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("sample_descr.csv")).unwrap(),
            "a,b\n0,1\nm,\n,0=no\n,1=yes\n"
        );
    }
}
