//! Product id source
//!
//! Reads product ids from a comma-separated file with a header row. The column
//! named `id` (case-insensitive, surrounding whitespace ignored) is used when
//! present, otherwise the first column. Opening fails when that column holds
//! no ids at all.
//!
//! The source is lazy and restartable: [`IdSource::iter`] reopens the file and
//! streams it from the top, so nothing beyond the set of ids already yielded is
//! held in memory.

use crate::error::{IngestError, Result};
use prodsync_common::ProductId;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Header name preferred for the id column
pub const ID_COLUMN: &str = "id";

/// A validated CSV file of product ids
#[derive(Debug, Clone)]
pub struct IdSource {
    path: PathBuf,
    column: usize,
    column_name: String,
}

impl IdSource {
    /// Open `path` and validate its header row
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = open_reader(&path)?;

        let headers = reader.headers().map_err(|e| csv_error(&path, e))?;
        if headers.is_empty() {
            return Err(IngestError::config(format!(
                "input file '{}' has no header row",
                path.display()
            )));
        }

        let names: Vec<String> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
            .collect();

        let column = names.iter().position(|name| name == ID_COLUMN).unwrap_or(0);
        let column_name = names[column].clone();

        if column_name.is_empty() {
            return Err(IngestError::config(format!(
                "input file '{}' has an empty header for its id column",
                path.display()
            )));
        }

        let source = Self {
            path,
            column,
            column_name,
        };

        // an id column without a single value means the file is wrong, not done
        match source.iter()?.next() {
            Some(Ok(_)) => {},
            Some(Err(e)) => return Err(e),
            None => {
                return Err(IngestError::config(format!(
                    "input file '{}' has no product ids in column '{}'",
                    source.path.display(),
                    source.column_name
                )))
            },
        }

        debug!(
            path = %source.path.display(),
            column = %source.column_name,
            "Opened product id source"
        );

        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header of the column ids are read from
    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    /// Stream the ids from the start of the file, in file order, without duplicates
    pub fn iter(&self) -> Result<IdIter> {
        let reader = open_reader(&self.path)?;

        Ok(IdIter {
            records: reader.into_records(),
            column: self.column,
            path: self.path.clone(),
            seen: HashSet::new(),
            finished: false,
        })
    }

    /// Number of distinct ids in the file
    pub fn count(&self) -> Result<usize> {
        let mut total = 0;
        for id in self.iter()? {
            id?;
            total += 1;
        }
        Ok(total)
    }
}

/// Iterator over the ids of an [`IdSource`]
///
/// Yields an error for a row that cannot be decoded or whose id is not an
/// integer, then stops.
pub struct IdIter {
    records: csv::StringRecordsIntoIter<File>,
    column: usize,
    path: PathBuf,
    seen: HashSet<ProductId>,
    finished: bool,
}

impl Iterator for IdIter {
    type Item = Result<ProductId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(csv_error(&self.path, e)));
                },
            };

            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let cell = record.get(self.column).unwrap_or_default().trim();

            if cell.is_empty() {
                debug!(line, "Skipping row without a product id");
                continue;
            }

            let id = match cell.parse::<ProductId>() {
                Ok(id) => id,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(IngestError::config(format!(
                        "{}:{}: {}",
                        self.path.display(),
                        line,
                        e
                    ))));
                },
            };

            if self.seen.insert(id) {
                return Some(Ok(id));
            }

            debug!(product_id = %id, line, "Skipping duplicate product id");
        }
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| {
        IngestError::config(format!("cannot open input file '{}': {}", path.display(), e))
    })?;

    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file))
}

fn csv_error(path: &Path, err: csv::Error) -> IngestError {
    match err.position() {
        Some(pos) => IngestError::config(format!(
            "{}:{}: malformed input: {}",
            path.display(),
            pos.line(),
            err
        )),
        None => IngestError::config(format!("{}: malformed input: {}", path.display(), err)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    fn ids(source: &IdSource) -> Vec<i64> {
        source.iter().unwrap().map(|id| id.unwrap().get()).collect()
    }

    #[test]
    fn test_reads_id_column_in_order() {
        let file = csv_file(b"name,id\nkettle,30\nlamp,10\nfan,20\n");
        let source = IdSource::open(file.path()).unwrap();

        assert_eq!(source.column_name(), "id");
        assert_eq!(ids(&source), vec![30, 10, 20]);
    }

    #[test]
    fn test_header_match_ignores_case_and_whitespace() {
        let file = csv_file(b"sku, ID \nA-1,5\nA-2,6\n");
        let source = IdSource::open(file.path()).unwrap();

        assert_eq!(ids(&source), vec![5, 6]);
    }

    #[test]
    fn test_falls_back_to_first_column() {
        let file = csv_file(b"product_id,seller\n11,x\n12,y\n");
        let source = IdSource::open(file.path()).unwrap();

        assert_eq!(source.column_name(), "product_id");
        assert_eq!(ids(&source), vec![11, 12]);
    }

    #[test]
    fn test_skips_blank_cells_and_duplicates() {
        let file = csv_file(b"id\n1\n\n2\n1\n \n3.0\n2\n");
        let source = IdSource::open(file.path()).unwrap();

        assert_eq!(ids(&source), vec![1, 2, 3]);
        assert_eq!(source.count().unwrap(), 3);
    }

    #[test]
    fn test_iteration_is_restartable() {
        let file = csv_file(b"id\n7\n8\n");
        let source = IdSource::open(file.path()).unwrap();

        let mut first = source.iter().unwrap();
        assert_eq!(first.next().unwrap().unwrap().get(), 7);

        assert_eq!(ids(&source), vec![7, 8]);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = IdSource::open("/nonexistent/product_id.csv").unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_empty_file_is_config_error() {
        let file = csv_file(b"");
        assert!(matches!(IdSource::open(file.path()), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_empty_id_header_is_config_error() {
        let file = csv_file(b",name\n1,a\n");
        assert!(matches!(IdSource::open(file.path()), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_empty_id_column_is_config_error() {
        let file = csv_file(b"id,name\n,a\n,b\n");

        let err = IdSource::open(file.path()).unwrap_err();
        assert!(matches!(err, IngestError::Config(ref msg) if msg.contains("no product ids")));
    }

    #[test]
    fn test_header_only_file_is_config_error() {
        let file = csv_file(b"id\n");

        let err = IdSource::open(file.path()).unwrap_err();
        assert!(matches!(err, IngestError::Config(ref msg) if msg.contains("column 'id'")));
    }

    #[test]
    fn test_non_numeric_first_id_fails_open() {
        let file = csv_file(b"id\nabc\n1\n");

        let err = IdSource::open(file.path()).unwrap_err();
        assert!(err.to_string().contains(":2:"), "unexpected message: {err}");
    }

    #[test]
    fn test_non_numeric_id_reports_line() {
        let file = csv_file(b"id\n1\nabc\n2\n");
        let source = IdSource::open(file.path()).unwrap();

        let results: Vec<_> = source.iter().unwrap().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().get(), 1);

        let err = results[1].as_ref().unwrap_err();
        assert!(err.to_string().contains(":3:"), "unexpected message: {err}");
    }

    #[test]
    fn test_invalid_utf8_is_config_error() {
        let file = csv_file(b"id\n1\n\xff\xfe\n");
        let source = IdSource::open(file.path()).unwrap();

        let results: Vec<_> = source.iter().unwrap().collect();
        assert!(matches!(results.last(), Some(Err(IngestError::Config(_)))));
    }
}
