use crate::domain::model::RawRow;
use crate::domain::ports::RecordSource;
use crate::utils::error::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Rows of a CSV file with a header line. Headers are trimmed; a leading
/// byte-order mark is ignored.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn parse_rows(data: &[u8]) -> Result<Vec<RawRow>> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let data: HashMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, value)| (header.to_string(), value.to_string()))
            .collect();
        rows.push(RawRow { data });
    }
    Ok(rows)
}

impl RecordSource for CsvSource {
    async fn load_rows(&self) -> Result<Vec<RawRow>> {
        let data = tokio::fs::read(&self.path).await?;
        let rows = parse_rows(&data)?;
        tracing::info!("Loaded {} rows from {}", rows.len(), self.path.display());
        Ok(rows)
    }
}
