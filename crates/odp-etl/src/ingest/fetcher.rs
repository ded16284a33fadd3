//! Snapshot fetching
//!
//! A fetcher turns a dataset's `source` into a stream of rows aligned to the
//! declared column order. The stream is lazy and single-use: a failure part way
//! through means the whole run is retried later.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use odp_common::naming::slugify;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use super::dataset::DatasetSpec;
use crate::error::{IngestError, Result};

/// One source record, one cell per declared column, `None` for empty cells
pub type Row = Vec<Option<String>>;

pub type RowStream = BoxStream<'static, Result<Row>>;

#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Open the current snapshot of `dataset`
    async fn fetch(&self, dataset: &DatasetSpec) -> Result<RowStream>;
}

/// Position of each declared column within the source header
pub fn resolve_header(dataset: &DatasetSpec, header: &[String]) -> Result<Vec<usize>> {
    let slugs: Vec<String> = header.iter().map(|h| slugify(h)).collect();
    let mut positions = Vec::with_capacity(dataset.columns.len());
    let mut missing = Vec::new();

    for column in &dataset.columns {
        let wanted = column.source_header();
        match slugs.iter().position(|s| *s == wanted) {
            Some(idx) => positions.push(idx),
            None => missing.push(column.source.clone().unwrap_or_else(|| column.name.clone())),
        }
    }

    if !missing.is_empty() {
        return Err(IngestError::SourceFormat(format!(
            "{}: source header is missing column(s) {}",
            dataset.name,
            missing.join(", ")
        )));
    }

    Ok(positions)
}

fn project<'a>(positions: &[usize], cells: impl Fn(usize) -> Option<&'a str>) -> Row {
    positions
        .iter()
        .map(|&idx| cells(idx).filter(|v| !v.is_empty()).map(str::to_string))
        .collect()
}

fn map_csv_error(dataset: &str, err: csv_async::Error) -> IngestError {
    match err.kind() {
        csv_async::ErrorKind::Io(_) => {
            IngestError::SourceUnavailable(format!("{}: read failed: {}", dataset, err))
        },
        _ => IngestError::SourceFormat(format!("{}: {}", dataset, err)),
    }
}

enum SourceLocation<'a> {
    Http(&'a str),
    File(&'a str),
}

fn locate(source: &str) -> SourceLocation<'_> {
    if source.starts_with("http://") || source.starts_with("https://") {
        SourceLocation::Http(source)
    } else if let Some(path) = source.strip_prefix("file://") {
        SourceLocation::File(path)
    } else {
        SourceLocation::File(source)
    }
}

/// Reads CSV snapshots over HTTP(S) or from the local filesystem
#[derive(Clone)]
pub struct CsvFetcher {
    client: reqwest::Client,
}

impl CsvFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("odp-etl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::Configuration(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { client })
    }

    async fn open_http(&self, dataset: &DatasetSpec, url: &str) -> Result<RowStream> {
        let response = self.client.get(url).send().await.map_err(|e| {
            IngestError::SourceUnavailable(format!("{}: request to {} failed: {}", dataset.name, url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::SourceUnavailable(format!(
                "{}: {} returned HTTP {}",
                dataset.name, url, status
            )));
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        parse_csv(dataset, StreamReader::new(Box::pin(body))).await
    }

    async fn open_file(&self, dataset: &DatasetSpec, path: &str) -> Result<RowStream> {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            IngestError::SourceUnavailable(format!("{}: cannot open {}: {}", dataset.name, path, e))
        })?;
        parse_csv(dataset, file).await
    }
}

#[async_trait]
impl SnapshotFetcher for CsvFetcher {
    async fn fetch(&self, dataset: &DatasetSpec) -> Result<RowStream> {
        info!(dataset = %dataset.name, source = %dataset.source, "Fetching snapshot");
        match locate(&dataset.source) {
            SourceLocation::Http(url) => self.open_http(dataset, url).await,
            SourceLocation::File(path) => self.open_file(dataset, path).await,
        }
    }
}

async fn parse_csv<R>(dataset: &DatasetSpec, reader: R) -> Result<RowStream>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut csv = csv_async::AsyncReaderBuilder::new()
        .has_headers(true)
        .create_reader(reader);

    let header: Vec<String> = csv
        .headers()
        .await
        .map_err(|e| map_csv_error(&dataset.name, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let positions = resolve_header(dataset, &header)?;
    debug!(dataset = %dataset.name, ?positions, "Resolved source header");

    let name = dataset.name.clone();
    let rows = csv.into_records().map(move |record| -> Result<Row> {
        let record = record.map_err(|e| map_csv_error(&name, e))?;
        Ok(project(&positions, |idx| record.get(idx)))
    });

    Ok(rows.boxed())
}

/// A snapshot held in memory
#[derive(Debug, Clone)]
enum StaticSnapshot {
    Rows {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Unavailable(String),
}

/// In-memory fetcher; snapshots are keyed by dataset name and can be swapped between runs
#[derive(Debug, Default)]
pub struct StaticFetcher {
    snapshots: Mutex<HashMap<String, StaticSnapshot>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot served for `dataset`; empty strings are empty cells
    pub fn set_snapshot(&self, dataset: &str, header: &[&str], rows: &[&[&str]]) {
        let snapshot = StaticSnapshot::Rows {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        };
        self.insert(dataset, snapshot);
    }

    /// Make the next fetches of `dataset` fail with `SourceUnavailable`
    pub fn set_unavailable(&self, dataset: &str, message: impl Into<String>) {
        self.insert(dataset, StaticSnapshot::Unavailable(message.into()));
    }

    fn insert(&self, dataset: &str, snapshot: StaticSnapshot) {
        let mut snapshots = match self.snapshots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        snapshots.insert(dataset.to_string(), snapshot);
    }

    fn get(&self, dataset: &str) -> Option<StaticSnapshot> {
        let snapshots = match self.snapshots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        snapshots.get(dataset).cloned()
    }
}

#[async_trait]
impl SnapshotFetcher for StaticFetcher {
    async fn fetch(&self, dataset: &DatasetSpec) -> Result<RowStream> {
        let (header, rows) = match self.get(&dataset.name) {
            Some(StaticSnapshot::Rows { header, rows }) => (header, rows),
            Some(StaticSnapshot::Unavailable(message)) => {
                return Err(IngestError::SourceUnavailable(message))
            },
            None => {
                return Err(IngestError::SourceUnavailable(format!(
                    "no snapshot registered for {}",
                    dataset.name
                )))
            },
        };

        let positions = resolve_header(dataset, &header)?;
        let width = header.len();
        let name = dataset.name.clone();

        let rows = rows.into_iter().enumerate().map(move |(line, cells)| {
            if cells.len() != width {
                return Err(IngestError::SourceFormat(format!(
                    "{}: record {} has {} fields, header has {}",
                    name,
                    line + 1,
                    cells.len(),
                    width
                )));
            }
            Ok(project(&positions, |idx| cells.get(idx).map(String::as_str)))
        });

        Ok(stream::iter(rows).boxed())
    }
}
