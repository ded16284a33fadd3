//! Master index projection
//!
//! Every history version inserted by a run gets one `master_index` entry with a
//! normalized observation date, point location and up to three tags. Values
//! that cannot be located or parsed become NULL; they never fail the run.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use odp_common::naming::quote_ident;
use serde::Serialize;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use super::dataset::{DatasetSpec, GeometryMapping};
use crate::error::Result;

/// Bind parameters per inserted entry
const ENTRY_BINDS: usize = 11;
const MAX_ENTRIES_PER_INSERT: usize = 65_535 / ENTRY_BINDS;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Mapped column values of one history row, as text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSource {
    pub row_id: i64,
    pub observation: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub geotags: [Option<String>; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterIndexEntry {
    pub dataset_row_id: i64,
    pub obs_date: Option<NaiveDateTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
    pub location_wkt: Option<String>,
    pub geotags: [Option<String>; 3],
}

/// Parse an observation date in any of the accepted source forms
pub fn parse_observation_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    None
}

fn valid_coordinates(latitude: f64, longitude: f64) -> Option<(f64, f64)> {
    let in_range = latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude);
    in_range.then_some((latitude, longitude))
}

/// Read `(lat, lon)` from `POINT(lon lat)` WKT or the `(lat, lon)` pair form
pub fn parse_point(value: &str) -> Option<(f64, f64)> {
    let value = value.trim();

    if value.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("point")) {
        let inner = value.get(5..)?.trim().strip_prefix('(')?.strip_suffix(')')?;
        let mut parts = inner.split_whitespace();
        let longitude: f64 = parts.next()?.parse().ok()?;
        let latitude: f64 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        return valid_coordinates(latitude, longitude);
    }

    let inner = value.strip_prefix('(')?.strip_suffix(')')?;
    let (latitude, longitude) = inner.split_once(',')?;
    valid_coordinates(latitude.trim().parse().ok()?, longitude.trim().parse().ok()?)
}

/// Build the index entry for one history row
pub fn derive_entry(source: IndexSource) -> MasterIndexEntry {
    let obs_date = source.observation.as_deref().and_then(parse_observation_date);

    let (point, location) = match (&source.location, &source.latitude, &source.longitude) {
        (Some(location), _, _) => (parse_point(location), Some(location.clone())),
        (None, Some(lat), Some(lon)) => {
            let point = match (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
                (Ok(lat), Ok(lon)) => valid_coordinates(lat, lon),
                _ => None,
            };
            let location = point.map(|(lat, lon)| format!("({}, {})", lat, lon));
            (point, location)
        },
        _ => (None, None),
    };

    MasterIndexEntry {
        dataset_row_id: source.row_id,
        obs_date,
        latitude: point.map(|(lat, _)| lat),
        longitude: point.map(|(_, lon)| lon),
        location,
        location_wkt: point.map(|(lat, lon)| format!("POINT({} {})", lon, lat)),
        geotags: source.geotags,
    }
}

/// `"col"::text`, or `NULL::text` when the mapping is absent or undeclared
fn text_column(dataset: &DatasetSpec, name: Option<&str>) -> String {
    match dataset.mapped_column(name) {
        Some(column) => format!("h.{}::text", quote_ident(&column.name)),
        None => "NULL::text".to_string(),
    }
}

fn select_list(dataset: &DatasetSpec) -> String {
    let (location, latitude, longitude) = match &dataset.geometry {
        Some(GeometryMapping::Column { column }) => (Some(column.as_str()), None, None),
        Some(GeometryMapping::Coordinates {
            latitude,
            longitude,
        }) => (None, Some(latitude.as_str()), Some(longitude.as_str())),
        None => (None, None, None),
    };

    let mut columns = vec![
        "h.row_id".to_string(),
        text_column(dataset, dataset.observation_date.as_deref()),
        text_column(dataset, location),
        text_column(dataset, latitude),
        text_column(dataset, longitude),
    ];
    for i in 0..3 {
        columns.push(text_column(dataset, dataset.geotags.get(i).map(String::as_str)));
    }
    columns.join(", ")
}

type SourceRow = (
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// Index every history row stamped with `run_timestamp`
#[instrument(skip(tx, dataset, run_timestamp), fields(dataset = %dataset.name))]
pub async fn index_run(
    tx: &mut PgConnection,
    dataset: &DatasetSpec,
    run_timestamp: DateTime<Utc>,
    page_size: i64,
) -> Result<i64> {
    let query = format!(
        "SELECT {} FROM {} h WHERE h.start_date = $1 AND h.row_id > $2 ORDER BY h.row_id LIMIT $3",
        select_list(dataset),
        quote_ident(&dataset.tables().history)
    );

    let mut last_row_id = 0_i64;
    let mut indexed = 0_i64;

    loop {
        let page: Vec<SourceRow> = sqlx::query_as(&query)
            .bind(run_timestamp)
            .bind(last_row_id)
            .bind(page_size)
            .fetch_all(&mut *tx)
            .await?;

        let Some(last) = page.last() else {
            break;
        };
        last_row_id = last.0;

        let entries: Vec<MasterIndexEntry> = page
            .into_iter()
            .map(|(row_id, observation, location, latitude, longitude, t1, t2, t3)| {
                derive_entry(IndexSource {
                    row_id,
                    observation,
                    location,
                    latitude,
                    longitude,
                    geotags: [t1, t2, t3],
                })
            })
            .collect();

        for chunk in entries.chunks(MAX_ENTRIES_PER_INSERT) {
            insert_entries(tx, &dataset.name, run_timestamp, chunk).await?;
        }
        indexed += entries.len() as i64;
        debug!(indexed, last_row_id, "Indexed page");
    }

    info!(index_entries = indexed, "Master index updated");
    Ok(indexed)
}

async fn insert_entries(
    tx: &mut PgConnection,
    dataset: &str,
    run_timestamp: DateTime<Utc>,
    entries: &[MasterIndexEntry],
) -> Result<()> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO master_index (dataset_name, dataset_row_id, start_date, obs_date, \
         latitude, longitude, location, location_wkt, geotag1, geotag2, geotag3) ",
    );

    builder.push_values(entries, |mut b, entry| {
        b.push_bind(dataset)
            .push_bind(entry.dataset_row_id)
            .push_bind(run_timestamp)
            .push_bind(entry.obs_date)
            .push_bind(entry.latitude)
            .push_bind(entry.longitude)
            .push_bind(entry.location.clone())
            .push_bind(entry.location_wkt.clone())
            .push_bind(entry.geotags[0].clone())
            .push_bind(entry.geotags[1].clone())
            .push_bind(entry.geotags[2].clone());
    });

    builder.build().execute(&mut *tx).await?;
    Ok(())
}
