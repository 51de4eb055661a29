//! ETL job definitions and the shared extract → transform → load runner.

pub mod customer;
pub mod event;
pub mod reviews;
pub mod transaction;

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::extract;
use crate::load::{self, LoadOptions, TableLoad};
use crate::normalize::MappingPolicy;
use crate::output;
use crate::types::{Frame, TableSchema};
use crate::util::format_int;
use crate::warehouse::Warehouse;
use clap::ValueEnum;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum JobKind {
    Customer,
    Transaction,
    Event,
    Reviews,
}

impl JobKind {
    /// Every job, in driver order.
    pub const ALL: [JobKind; 4] = [
        JobKind::Customer,
        JobKind::Transaction,
        JobKind::Event,
        JobKind::Reviews,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Customer => "customer",
            JobKind::Transaction => "transaction",
            JobKind::Event => "event",
            JobKind::Reviews => "reviews",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job's transform gets to see besides its source rows.
pub struct TransformContext<'a> {
    schemas: &'a HashMap<String, TableSchema>,
    pub mapping_policy: MappingPolicy,
}

impl<'a> TransformContext<'a> {
    pub fn new(schemas: &'a HashMap<String, TableSchema>, mapping_policy: MappingPolicy) -> Self {
        Self {
            schemas,
            mapping_policy,
        }
    }

    /// Reflected schema of a destination table.
    pub fn schema(&self, table: &str) -> Result<&TableSchema> {
        self.schemas
            .get(table)
            .ok_or_else(|| EtlError::Transform(format!("no schema known for table '{}'", table)))
    }
}

pub trait Job {
    fn kind(&self) -> JobKind;

    fn default_input(&self) -> &'static str;

    fn default_encoding(&self) -> &'static str {
        "utf-8"
    }

    /// Destination tables, in load order (referenced tables first).
    fn tables(&self) -> Vec<TableSchema>;

    /// Turn the extracted record set into table loads, in load order.
    fn transform(&self, source: Frame, ctx: &TransformContext) -> Result<Vec<TableLoad>>;
}

pub fn job_for(kind: JobKind) -> Box<dyn Job> {
    match kind {
        JobKind::Customer => Box::new(customer::CustomerJob),
        JobKind::Transaction => Box::new(transaction::TransactionJob),
        JobKind::Event => Box::new(event::EventJob),
        JobKind::Reviews => Box::new(reviews::ReviewsJob),
    }
}

#[derive(Debug, Clone)]
pub struct TableReport {
    pub table: String,
    pub rows_inserted: usize,
    /// `COUNT(*)` read back after commit
    pub rows_in_table: i64,
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: JobKind,
    pub rows_extracted: usize,
    pub tables: Vec<TableReport>,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn rows_loaded(&self) -> usize {
        self.tables.iter().map(|t| t.rows_inserted).sum()
    }
}

fn input_path(job: &dyn Job, config: &EtlConfig) -> PathBuf {
    config
        .job(job.kind())
        .input
        .clone()
        .unwrap_or_else(|| PathBuf::from(job.default_input()))
}

/// Run one job end to end on its own warehouse connection.
pub fn run_job(job: &dyn Job, config: &EtlConfig) -> Result<JobReport> {
    let kind = job.kind();
    let _span = info_span!("job", name = %kind).entered();
    let started = Instant::now();
    let job_config = config.job(kind);

    let input = input_path(job, config);
    let encoding = job_config
        .encoding
        .as_deref()
        .unwrap_or_else(|| job.default_encoding());
    let source = extract::read_csv(&input, encoding)?;
    let rows_extracted = source.len();
    info!(
        input = %input.display(),
        rows = %format_int(rows_extracted),
        columns = source.width(),
        "[EXTRACT] loaded source"
    );
    debug!("source sample:\n{}", output::preview_frame(&source, config.preview_rows));

    let mut warehouse = Warehouse::connect(&config.warehouse)?;
    let mut schemas = HashMap::new();
    for table in job.tables() {
        let reflected = warehouse.ensure_table(&table, config.warehouse.create_tables)?;
        schemas.insert(table.name.clone(), reflected);
    }

    let ctx = TransformContext::new(&schemas, config.mapping_policy);
    let plans = job.transform(source, &ctx)?;
    for plan in &plans {
        info!(table = %plan.table, rows = %format_int(plan.frame.len()), "[TRANSFORM] prepared");
        debug!(
            "{} sample:\n{}",
            plan.table,
            output::preview_frame(&plan.frame, config.preview_rows)
        );
    }

    if let Some(dir) = &config.staging_dir {
        for plan in &plans {
            let path = dir.join(format!("{}_staging.csv", plan.table));
            output::write_csv(&path, &plan.frame)?;
            info!(path = %path.display(), "exported staging file");
        }
    }

    let options = LoadOptions {
        batch_size: config.batch_size_for(kind),
        on_conflict: job_config.on_conflict,
    };
    let loads = load::load_tables(&mut warehouse, &plans, options)?;

    let mut tables = Vec::with_capacity(loads.len());
    for report in loads {
        let rows_in_table = warehouse.count_rows(&report.table)?;
        info!(
            table = %report.table,
            mode = %report.mode,
            submitted = %format_int(report.rows_submitted),
            inserted = %format_int(report.rows_inserted),
            rows = %format_int(rows_in_table),
            "[VERIFY] rows in table"
        );
        tables.push(TableReport {
            table: report.table,
            rows_inserted: report.rows_inserted,
            rows_in_table,
        });
    }

    Ok(JobReport {
        job: kind,
        rows_extracted,
        tables,
        elapsed: started.elapsed(),
    })
}
