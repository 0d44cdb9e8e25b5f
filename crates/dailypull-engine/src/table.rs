use dailypull_common::config::ColumnFilterConfig;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read table: {0}")]
    Csv(#[from] csv::Error),
    #[error("Table has no header row")]
    MissingHeader,
}

/// How a filter locates its column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMatcher {
    /// Lowercase fragments; the first header containing any of them wins.
    pub name_contains: Vec<String>,
    pub fallback_index: Option<usize>,
}

impl ColumnMatcher {
    pub fn new(name_contains: &[&str], fallback_index: Option<usize>) -> Self {
        Self {
            name_contains: name_contains.iter().map(|s| s.to_lowercase()).collect(),
            fallback_index,
        }
    }
}

impl From<&ColumnFilterConfig> for ColumnMatcher {
    fn from(config: &ColumnFilterConfig) -> Self {
        Self {
            name_contains: config
                .name_contains
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            fallback_index: config.fallback_index,
        }
    }
}

/// Header plus string rows of a downloaded report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, TableError> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(TableError::MissingHeader);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, matcher: &ColumnMatcher) -> Option<usize> {
        let by_name = self.headers.iter().position(|header| {
            let header = header.to_lowercase();
            matcher
                .name_contains
                .iter()
                .any(|fragment| header.contains(fragment.as_str()))
        });
        by_name.or(matcher
            .fallback_index
            .filter(|index| *index < self.headers.len()))
    }

    /// Keeps rows whose matched cell, trimmed, equals one of `allowed`
    /// ignoring case. A missing column leaves the table untouched.
    pub fn filter_by_column(self, matcher: &ColumnMatcher, allowed: &[String]) -> Self {
        let Some(index) = self.column_index(matcher) else {
            warn!(
                "No column matches {:?} (fallback {:?}); rows left unfiltered",
                matcher.name_contains, matcher.fallback_index
            );
            return self;
        };

        let allowed: Vec<String> = allowed.iter().map(|v| v.trim().to_lowercase()).collect();
        let before = self.rows.len();
        let rows: Vec<Vec<String>> = self
            .rows
            .into_iter()
            .filter(|row| {
                row.get(index)
                    .map(|cell| allowed.contains(&cell.trim().to_lowercase()))
                    .unwrap_or(false)
            })
            .collect();
        info!(
            "Filtered on column '{}': {} -> {} rows",
            self.headers[index],
            before,
            rows.len()
        );
        Self {
            headers: self.headers,
            rows,
        }
    }

    /// Applies every configured filter in order.
    pub fn apply_filters(self, filters: &[ColumnFilterConfig]) -> Self {
        filters.iter().fold(self, |table, filter| {
            table.filter_by_column(&ColumnMatcher::from(filter), &filter.allowed_values)
        })
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}
