//! Runs the selected jobs in a fixed order and assembles the run summary.
//!
//! A failed job is logged and recorded; the remaining jobs still run.

use crate::config::EtlConfig;
use crate::jobs::{self, JobKind, JobReport};
use crate::output;
use crate::types::{JobSummaryRow, RunSummary};
use crate::util::{format_int, format_number};
use chrono::Local;
use std::path::PathBuf;
use tracing::{error, info, warn};

pub const SUMMARY_FILE: &str = "run_summary.json";

/// Jobs to run, in driver order. An explicit request runs even jobs that
/// are disabled in the config; otherwise every enabled job runs.
pub fn selected_jobs(config: &EtlConfig, requested: &[JobKind]) -> Vec<JobKind> {
    JobKind::ALL
        .into_iter()
        .filter(|kind| {
            if requested.is_empty() {
                config.job(*kind).enabled
            } else {
                requested.contains(kind)
            }
        })
        .collect()
}

fn success_row(report: &JobReport) -> JobSummaryRow {
    let tables = report
        .tables
        .iter()
        .map(|t| format!("{}={}", t.table, format_int(t.rows_in_table)))
        .collect::<Vec<_>>()
        .join(", ");
    JobSummaryRow {
        job: report.job.to_string(),
        status: "ok".to_string(),
        rows_extracted: report.rows_extracted,
        rows_loaded: report.rows_loaded(),
        tables,
        elapsed_secs: format_number(report.elapsed.as_secs_f64(), 2),
        error: String::new(),
    }
}

fn failure_row(kind: JobKind, stage: &str, message: String, secs: f64) -> JobSummaryRow {
    JobSummaryRow {
        job: kind.to_string(),
        status: format!("failed ({})", stage),
        rows_extracted: 0,
        rows_loaded: 0,
        tables: String::new(),
        elapsed_secs: format_number(secs, 2),
        error: message,
    }
}

pub fn run_jobs(config: &EtlConfig, kinds: &[JobKind]) -> RunSummary {
    let started_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let mut rows = Vec::with_capacity(kinds.len());
    let mut failed = 0;

    for &kind in kinds {
        info!(job = %kind, "starting job");
        let started = std::time::Instant::now();
        let job = jobs::job_for(kind);
        match jobs::run_job(job.as_ref(), config) {
            Ok(report) => {
                info!(
                    job = %kind,
                    rows_loaded = %format_int(report.rows_loaded()),
                    secs = %format_number(report.elapsed.as_secs_f64(), 2),
                    "job completed"
                );
                rows.push(success_row(&report));
            }
            Err(e) => {
                failed += 1;
                error!(job = %kind, stage = e.stage(), error = %e, "job failed");
                rows.push(failure_row(
                    kind,
                    e.stage(),
                    e.to_string(),
                    started.elapsed().as_secs_f64(),
                ));
            }
        }
    }

    RunSummary {
        started_at,
        jobs_total: kinds.len(),
        jobs_failed: failed,
        jobs: rows,
    }
}

/// Print the summary table and, when a staging directory is configured,
/// write it as JSON next to the staging files.
pub fn report_summary(config: &EtlConfig, summary: &RunSummary) -> Option<PathBuf> {
    println!("\nETL Run Summary ({})\n", summary.started_at);
    println!("{}\n", output::preview_table_rows(&summary.jobs));

    let dir = config.staging_dir.as_ref()?;
    let path = dir.join(SUMMARY_FILE);
    match output::write_json(&path, summary) {
        Ok(()) => {
            info!(path = %path.display(), "wrote run summary");
            Some(path)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not write run summary");
            None
        }
    }
}
