//! Run report output

use anyhow::Result;
use colored::Colorize;
use odp_etl::ingest::RunReport;

/// Print one report, as a JSON line or as a short human summary
pub fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    println!("{}", render(report));
    Ok(())
}

fn render(report: &RunReport) -> String {
    let status = if report.is_ok() {
        "ok".green().bold()
    } else {
        "error".red().bold()
    };
    let elapsed = report.finished_at - report.started_at;
    let c = &report.counts;

    let mut out = format!(
        "{} {} ({:.1}s)\n  run:     {}\n",
        report.dataset.bold(),
        status,
        elapsed.num_milliseconds() as f64 / 1000.0,
        report.run_id
    );

    match report.error_kind {
        None => {
            out.push_str(&format!(
                "  loaded:  {} rows ({} duplicates, {} without key)\n",
                c.rows_loaded, c.duplicates_discarded, c.rows_missing_key
            ));
            out.push_str(&format!(
                "  keys:    {} staged, {} new, {} changed, {} unchanged\n",
                c.staged_keys, c.new_keys, c.changed_keys, c.unchanged_keys
            ));
            out.push_str(&format!("  indexed: {} entries", c.index_entries));
        },
        Some(kind) => {
            out.push_str(&format!("  {}: {}", kind.to_string().yellow(), report.message));
        },
    }

    out
}
