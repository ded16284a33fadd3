//! End-to-end pipeline tests against a real PostgreSQL
//!
//! Snapshots come from the in-memory fetcher; every test owns its container.

mod common;

use common::{
    all_versions, count, init_tracing, item_versions, items_dataset, PostgresOptions,
    TestPipeline, ITEM_HEADER,
};
use odp_etl::catalog;
use odp_etl::config::IngestConfig;
use odp_etl::ingest::lock::LOCK_NAMESPACE;
use odp_etl::ingest::runs::{self, STALE_RUN_MESSAGE};
use odp_etl::ingest::{
    history, loader, ColumnType, DatasetLock, RunStatus, SnapshotFetcher, Stage,
};
use odp_etl::ErrorKind;
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn test_new_entity_creates_current_version_and_index_entry() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher.set_snapshot(
        "items",
        ITEM_HEADER,
        &[&["X", "1", "foo", "2015-03-01 12:00:00", "41.8", "-87.6"]],
    );
    let report = t.pipeline.run(&dataset).await;

    assert_eq!(report.status, RunStatus::Ok, "{}", report.message);
    assert_eq!(report.counts.rows_loaded, 1);
    assert_eq!(report.counts.new_keys, 1);
    assert_eq!(report.counts.changed_keys, 0);
    assert_eq!(report.counts.index_entries, 1);

    let versions = item_versions(t.pool(), "X").await;
    assert_eq!(versions.len(), 1);
    let x = &versions[0];
    assert_eq!(x.a, Some(1));
    assert_eq!(x.b.as_deref(), Some("foo"));
    assert!(x.current_flag);
    assert_eq!(x.end_date, None);
    assert_eq!(Some(x.start_date), report.run_timestamp);

    let (row_id, lat, lon, wkt, tag): (i64, Option<f64>, Option<f64>, Option<String>, Option<String>) =
        sqlx::query_as(
            "SELECT dataset_row_id, latitude, longitude, location_wkt, geotag1 \
             FROM master_index WHERE dataset_name = 'items'",
        )
        .fetch_one(t.pool())
        .await
        .unwrap();
    assert_eq!(row_id, x.row_id);
    assert_eq!(lat, Some(41.8));
    assert_eq!(lon, Some(-87.6));
    assert_eq!(wkt.as_deref(), Some("POINT(-87.6 41.8)"));
    assert_eq!(tag.as_deref(), Some("foo"));
}

#[tokio::test]
#[serial]
async fn test_changed_entity_closes_old_version() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["Y", "1", "", "", "", ""]]);
    assert!(t.pipeline.run(&dataset).await.is_ok());

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["Y", "2", "", "", "", ""]]);
    let report = t.pipeline.run(&dataset).await;
    assert!(report.is_ok(), "{}", report.message);
    assert_eq!(report.counts.new_keys, 0);
    assert_eq!(report.counts.changed_keys, 1);

    let versions = item_versions(t.pool(), "Y").await;
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].a, Some(1));
    assert!(!versions[0].current_flag);
    assert_eq!(versions[0].end_date, Some(versions[1].start_date));
    assert_eq!(versions[1].a, Some(2));
    assert!(versions[1].current_flag);
    assert_eq!(versions[1].end_date, None);

    // one entry per inserted version
    assert_eq!(count(t.pool(), "SELECT COUNT(*) FROM master_index").await, 2);
}

#[tokio::test]
#[serial]
async fn test_identical_snapshot_is_a_no_op() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher.set_snapshot(
        "items",
        ITEM_HEADER,
        &[&["Z", "5", "", "", "", ""], &["W", "", "bar", "", "", ""]],
    );
    assert!(t.pipeline.run(&dataset).await.is_ok());
    let before = all_versions(t.pool()).await;

    let report = t.pipeline.run(&dataset).await;
    assert!(report.is_ok(), "{}", report.message);
    assert_eq!(report.counts.new_keys, 0);
    assert_eq!(report.counts.changed_keys, 0);
    assert_eq!(report.counts.unchanged_keys, 2);
    assert_eq!(report.counts.index_entries, 0);

    assert_eq!(all_versions(t.pool()).await, before);
    assert_eq!(count(t.pool(), "SELECT COUNT(*) FROM master_index").await, 2);
}

#[tokio::test]
#[serial]
async fn test_null_transitions_are_changes_but_null_to_null_is_not() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher.set_snapshot(
        "items",
        ITEM_HEADER,
        &[
            &["N", "1", "x", "", "", ""],
            &["M", "", "", "", "", ""],
            &["O", "", "", "", "", ""],
        ],
    );
    assert!(t.pipeline.run(&dataset).await.is_ok());

    t.fetcher.set_snapshot(
        "items",
        ITEM_HEADER,
        &[
            &["N", "1", "", "", "", ""],
            &["M", "", "", "", "", ""],
            &["O", "3", "", "", "", ""],
        ],
    );
    let report = t.pipeline.run(&dataset).await;
    assert!(report.is_ok(), "{}", report.message);
    assert_eq!(report.counts.changed_keys, 2);
    assert_eq!(report.counts.unchanged_keys, 1);

    assert_eq!(item_versions(t.pool(), "N").await.len(), 2);
    assert_eq!(item_versions(t.pool(), "O").await.len(), 2);
    assert_eq!(item_versions(t.pool(), "M").await.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_last_duplicate_in_snapshot_wins() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher.set_snapshot(
        "items",
        ITEM_HEADER,
        &[&["A", "10", "", "", "", ""], &["A", "20", "", "", "", ""]],
    );
    let report = t.pipeline.run(&dataset).await;
    assert!(report.is_ok(), "{}", report.message);
    assert_eq!(report.counts.rows_loaded, 2);
    assert_eq!(report.counts.duplicates_discarded, 1);
    assert_eq!(report.counts.staged_keys, 1);

    let winner: i64 = sqlx::query_scalar("SELECT ingestion_id FROM dedup_items WHERE id = 'A'")
        .fetch_one(t.pool())
        .await
        .unwrap();
    assert_eq!(winner, 2);

    let versions = item_versions(t.pool(), "A").await;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].a, Some(20));
}

#[tokio::test]
#[serial]
async fn test_rows_without_key_and_unparseable_cells() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher.set_snapshot(
        "items",
        ITEM_HEADER,
        &[
            &["", "1", "", "", "", ""],
            &["K", "not-a-number", "kept", "someday", "", ""],
        ],
    );
    let report = t.pipeline.run(&dataset).await;
    assert!(report.is_ok(), "{}", report.message);
    assert_eq!(report.counts.rows_missing_key, 1);
    assert_eq!(report.counts.new_keys, 1);

    let versions = item_versions(t.pool(), "K").await;
    assert_eq!(versions[0].a, None);
    assert_eq!(versions[0].b.as_deref(), Some("kept"));

    // verbatim text survives in the raw table
    let raw: Option<String> = sqlx::query_scalar("SELECT a FROM raw_items WHERE id = 'K'")
        .fetch_one(t.pool())
        .await
        .unwrap();
    assert_eq!(raw.as_deref(), Some("not-a-number"));

    let obs: Option<chrono::NaiveDateTime> =
        sqlx::query_scalar("SELECT obs_date FROM master_index")
            .fetch_one(t.pool())
            .await
            .unwrap();
    assert_eq!(obs, None);
}

#[tokio::test]
#[serial]
async fn test_exactly_one_current_row_and_closed_rows_frozen() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    let snapshots: [&[&[&str]]; 3] = [
        &[&["P", "1", "", "", "", ""], &["Q", "1", "", "", "", ""]],
        &[&["P", "2", "", "", "", ""], &["R", "1", "", "", "", ""]],
        &[&["P", "3", "", "", "", ""], &["Q", "9", "", "", "", ""]],
    ];

    let mut closed_so_far = Vec::new();
    for snapshot in snapshots {
        t.fetcher.set_snapshot("items", ITEM_HEADER, snapshot);
        let report = t.pipeline.run(&dataset).await;
        assert!(report.is_ok(), "{}", report.message);

        let versions = all_versions(t.pool()).await;
        let closed: Vec<_> = versions.iter().filter(|v| !v.current_flag).cloned().collect();
        for earlier in &closed_so_far {
            assert!(closed.contains(earlier), "closed row changed: {:?}", earlier);
        }
        closed_so_far = closed;

        let keys_without_one_current = count(
            t.pool(),
            "SELECT COUNT(*) FROM (SELECT id FROM history_items GROUP BY id \
             HAVING COUNT(*) FILTER (WHERE current_flag) <> 1) k",
        )
        .await;
        assert_eq!(keys_without_one_current, 0);
    }

    assert_eq!(item_versions(t.pool(), "P").await.len(), 3);
    assert_eq!(item_versions(t.pool(), "Q").await.len(), 2);
    assert_eq!(item_versions(t.pool(), "R").await.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_history_rejects_edits_to_closed_rows_and_deletes() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["Y", "1", "", "", "", ""]]);
    assert!(t.pipeline.run(&dataset).await.is_ok());
    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["Y", "2", "", "", "", ""]]);
    assert!(t.pipeline.run(&dataset).await.is_ok());

    let update = sqlx::query("UPDATE history_items SET a = 99 WHERE NOT current_flag")
        .execute(t.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM history_items")
        .execute(t.pool())
        .await;
    assert!(delete.is_err());

    let second_current = sqlx::query(
        "INSERT INTO history_items (id, a, start_date, current_flag) VALUES ('Y', 3, NOW(), TRUE)",
    )
    .execute(t.pool())
    .await;
    assert!(second_current.is_err());
}

#[tokio::test]
#[serial]
async fn test_concurrent_run_of_same_dataset_is_rejected() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["X", "1", "", "", "", ""]]);

    let held = DatasetLock::acquire(t.pool(), "items").await.unwrap();
    let report = t.pipeline.run(&dataset).await;
    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(report.error_kind, Some(ErrorKind::AlreadyRunning));
    assert_eq!(
        count(t.pool(), "SELECT COUNT(*) FROM ingest_runs").await,
        0,
        "a rejected run must not be logged"
    );
    held.release().await.unwrap();

    let report = t.pipeline.run(&dataset).await;
    assert!(report.is_ok(), "{}", report.message);
    assert_eq!(item_versions(t.pool(), "X").await.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_dropped_lock_guard_frees_the_dataset() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();

    let held = DatasetLock::acquire(t.pool(), "items").await.unwrap();
    drop(held);

    // the dropped guard's session is closed in the background
    let mut again = None;
    for _ in 0..50 {
        match DatasetLock::acquire(t.pool(), "items").await {
            Ok(lock) => {
                again = Some(lock);
                break;
            },
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::AlreadyRunning);
                tokio::time::sleep(Duration::from_millis(100)).await;
            },
        }
    }
    again.expect("lock was never freed").release().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_empty_snapshot_handling() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher.set_snapshot("items", ITEM_HEADER, &[]);
    let report = t.pipeline.run(&dataset).await;
    assert_eq!(report.error_kind, Some(ErrorKind::StageError));

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["X", "1", "", "", "", ""]]);
    assert!(t.pipeline.run(&dataset).await.is_ok());

    t.fetcher.set_snapshot("items", ITEM_HEADER, &[]);
    let report = t.pipeline.run(&dataset).await;
    assert!(report.is_ok(), "{}", report.message);
    assert_eq!(report.counts.staged_keys, 0);
    assert_eq!(report.counts.new_keys + report.counts.changed_keys, 0);

    // absent from a snapshot is not a deletion
    let versions = item_versions(t.pool(), "X").await;
    assert_eq!(versions.len(), 1);
    assert!(versions[0].current_flag);
}

#[tokio::test]
#[serial]
async fn test_fetch_failure_leaves_history_untouched() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["X", "1", "", "", "", ""]]);
    assert!(t.pipeline.run(&dataset).await.is_ok());
    let before = all_versions(t.pool()).await;

    t.fetcher.set_unavailable("items", "connection reset");
    let report = t.pipeline.run(&dataset).await;
    assert_eq!(report.error_kind, Some(ErrorKind::SourceUnavailable));
    assert!(report.message.contains("connection reset"));

    assert_eq!(all_versions(t.pool()).await, before);
    assert_eq!(count(t.pool(), "SELECT COUNT(*) FROM master_index").await, 1);

    let (status, kind): (String, Option<String>) =
        sqlx::query_as("SELECT status, error_kind FROM ingest_runs WHERE id = $1")
            .bind(report.run_id)
            .fetch_one(t.pool())
            .await
            .unwrap();
    assert_eq!(status, "error");
    assert_eq!(kind.as_deref(), Some("source_unavailable"));
}

#[tokio::test]
#[serial]
async fn test_missing_source_column_is_format_error() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();

    t.fetcher
        .set_snapshot("items", &["ID", "A"], &[&["X", "1"]]);
    let report = t.pipeline.run(&items_dataset()).await;
    assert_eq!(report.error_kind, Some(ErrorKind::SourceFormatError));
}

#[tokio::test]
#[serial]
async fn test_history_schema_mismatch_is_configuration_error() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();

    t.pipeline.provision(&items_dataset()).await.unwrap();

    let mut changed = items_dataset();
    changed.columns[1].ty = ColumnType::Float;
    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["X", "1", "", "", "", ""]]);

    let report = t.pipeline.run(&changed).await;
    assert_eq!(report.error_kind, Some(ErrorKind::ConfigurationError));
    assert!(report.message.contains("column a"));
}

#[tokio::test]
#[serial]
async fn test_future_version_blocks_merge() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.pipeline.provision(&dataset).await.unwrap();
    sqlx::query(
        "INSERT INTO history_items (id, a, start_date, current_flag) \
         VALUES ('F', 1, NOW() + INTERVAL '1 day', TRUE)",
    )
    .execute(t.pool())
    .await
    .unwrap();

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["G", "1", "", "", "", ""]]);
    let report = t.pipeline.run(&dataset).await;
    assert_eq!(report.error_kind, Some(ErrorKind::MergeConflict));

    assert!(item_versions(t.pool(), "G").await.is_empty());
    assert_eq!(count(t.pool(), "SELECT COUNT(*) FROM master_index").await, 0);
}

#[tokio::test]
#[serial]
async fn test_rederive_from_retained_raw_table() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["X", "1", "", "", "", ""]]);
    assert!(t.pipeline.run(&dataset).await.is_ok());

    // a later snapshot is loaded but the run stops before dedupe
    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["X", "2", "", "", "", ""]]);
    {
        let mut conn = t.pool().acquire().await.unwrap();
        let rows = t.fetcher.fetch(&dataset).await.unwrap();
        loader::load_raw(&mut conn, &dataset, rows, 100).await.unwrap();
    }

    let report = t.pipeline.rederive(&dataset, Stage::Dedupe).await;
    assert!(report.is_ok(), "{}", report.message);
    assert_eq!(report.counts.rows_loaded, 1);
    assert_eq!(report.counts.changed_keys, 1);
    assert_eq!(item_versions(t.pool(), "X").await.len(), 2);
}

#[tokio::test]
#[serial]
async fn test_reset_then_rederive_reports_missing_input() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["X", "1", "", "", "", ""]]);
    assert!(t.pipeline.run(&dataset).await.is_ok());

    let dropped = t.pipeline.reset(&dataset).await.unwrap();
    assert_eq!(dropped.len(), 5);
    assert!(dropped.contains(&"stg_items".to_string()));

    let report = t.pipeline.rederive(&dataset, Stage::Detect).await;
    assert_eq!(report.error_kind, Some(ErrorKind::MissingInput));
    assert!(report.message.contains("stg_items"));

    // history is permanent and survives a reset
    assert_eq!(item_versions(t.pool(), "X").await.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_provision_is_idempotent() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.pipeline.provision(&dataset).await.unwrap();
    t.pipeline.provision(&dataset).await.unwrap();

    let mut conn = t.pool().acquire().await.unwrap();
    history::verify(&mut conn, &dataset).await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_run_many_and_catalog() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();

    let items = items_dataset();
    let mut parcels = items_dataset();
    parcels.name = "city_parcels".into();

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["X", "1", "", "2015-01-02", "", ""]]);
    t.fetcher.set_snapshot(
        "city_parcels",
        ITEM_HEADER,
        &[
            &["P1", "1", "", "2016-05-01 00:00:00", "", ""],
            &["P2", "1", "", "2016-06-01 00:00:00", "", ""],
        ],
    );

    let reports = t.pipeline.run_many(&[items.clone(), parcels.clone()]).await;
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_ok()));

    let indexed = catalog::indexed_datasets(t.pool()).await.unwrap();
    let names: Vec<_> = indexed.iter().map(|d| d.machine_name.as_str()).collect();
    assert_eq!(names, vec!["city_parcels", "items"]);
    assert_eq!(indexed[0].human_name, "City Parcels");
    assert_eq!(indexed[0].entries, 2);
    assert_eq!(
        indexed[0].obs_from.map(|d| d.to_string()).as_deref(),
        Some("2016-05-01 00:00:00")
    );

    let stats = catalog::history_stats(t.pool(), &parcels)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.current_rows, 2);
    assert_eq!(stats.total_versions, 2);

    let runs = runs::latest_runs(t.pool()).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == "ok"));
}

#[tokio::test]
#[serial]
async fn test_runs_fit_in_a_single_connection_pool() {
    init_tracing();
    let options = PostgresOptions {
        max_connections: 1,
        acquire_timeout_secs: 5,
        ..PostgresOptions::default()
    };
    let config = IngestConfig {
        max_concurrent_runs: 4,
        ..IngestConfig::default()
    };
    let t = TestPipeline::start_with_options(options, config).await.unwrap();

    let items = items_dataset();
    let mut parcels = items_dataset();
    parcels.name = "city_parcels".into();
    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["X", "1", "", "", "", ""]]);
    t.fetcher
        .set_snapshot("city_parcels", ITEM_HEADER, &[&["P1", "1", "", "", "", ""]]);

    let report = t.pipeline.run(&items).await;
    assert!(report.is_ok(), "{}", report.message);

    let reports = t.pipeline.run_many(&[items, parcels]).await;
    for report in &reports {
        assert!(report.is_ok(), "{}: {}", report.dataset, report.message);
    }
    assert_eq!(
        count(t.pool(), "SELECT COUNT(*) FROM ingest_runs WHERE status = 'ok'").await,
        3
    );
}

#[tokio::test]
#[serial]
async fn test_empty_snapshot_after_unrecorded_success_is_accepted() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["X", "1", "", "", "", ""]]);
    assert!(t.pipeline.run(&dataset).await.is_ok());

    // merge committed but the outcome never reached the run log
    sqlx::query("DELETE FROM ingest_runs")
        .execute(t.pool())
        .await
        .unwrap();

    t.fetcher.set_snapshot("items", ITEM_HEADER, &[]);
    let report = t.pipeline.run(&dataset).await;
    assert!(report.is_ok(), "{}", report.message);
    assert_eq!(report.counts.staged_keys, 0);
    assert_eq!(item_versions(t.pool(), "X").await.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_interrupted_run_is_closed_out_by_next_run() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();
    let dataset = items_dataset();

    let orphan = uuid::Uuid::new_v4();
    let other = uuid::Uuid::new_v4();
    for (id, name) in [(orphan, "items"), (other, "city_parcels")] {
        sqlx::query(
            "INSERT INTO ingest_runs (id, dataset_name, status, started_at) \
             VALUES ($1, $2, 'running', NOW() - INTERVAL '1 hour')",
        )
        .bind(id)
        .bind(name)
        .execute(t.pool())
        .await
        .unwrap();
    }

    t.fetcher
        .set_snapshot("items", ITEM_HEADER, &[&["X", "1", "", "", "", ""]]);
    let report = t.pipeline.run(&dataset).await;
    assert!(report.is_ok(), "{}", report.message);

    let (status, message, finished): (String, Option<String>, Option<chrono::DateTime<chrono::Utc>>) =
        sqlx::query_as("SELECT status, error_message, finished_at FROM ingest_runs WHERE id = $1")
            .bind(orphan)
            .fetch_one(t.pool())
            .await
            .unwrap();
    assert_eq!(status, "error");
    assert_eq!(message.as_deref(), Some(STALE_RUN_MESSAGE));
    assert!(finished.is_some());

    let status: String = sqlx::query_scalar("SELECT status FROM ingest_runs WHERE id = $1")
        .bind(other)
        .fetch_one(t.pool())
        .await
        .unwrap();
    assert_eq!(status, "running", "other datasets' runs are left alone");

    let latest = runs::latest_runs(t.pool()).await.unwrap();
    let items = latest.iter().find(|r| r.dataset_name == "items").unwrap();
    assert_eq!(items.id, report.run_id);
    assert_eq!(items.status, "ok");
}

#[tokio::test]
#[serial]
async fn test_dataset_locks_share_one_namespace_and_are_independent() {
    init_tracing();
    let t = TestPipeline::start().await.unwrap();

    let items = DatasetLock::acquire(t.pool(), "items").await.unwrap();
    let parcels = DatasetLock::acquire(t.pool(), "city_parcels").await.unwrap();

    let held: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pg_locks \
         WHERE locktype = 'advisory' AND objsubid = 2 AND classid::bigint = $1",
    )
    .bind(i64::from(LOCK_NAMESPACE))
    .fetch_one(t.pool())
    .await
    .unwrap();
    assert_eq!(held, 2);

    items.release().await.unwrap();
    parcels.release().await.unwrap();
}
