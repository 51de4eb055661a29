// Entry point and high-level CLI flow.
//
// Loads configuration (file, environment, then flags), runs the selected
// ETL jobs one after another against the SQLite warehouse and prints a
// summary table. The process exits non-zero when any job failed.
mod coerce;
mod config;
mod dimension;
mod driver;
mod error;
mod extract;
mod fact;
mod jobs;
mod load;
mod normalize;
mod output;
mod sentiment;
mod types;
mod util;
mod warehouse;

use anyhow::{Context, Result};
use clap::Parser;
use config::EtlConfig;
use jobs::JobKind;
use normalize::MappingPolicy;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "warehouse_etl")]
#[command(about = "Load survey, order, clickstream and review CSVs into a star-schema warehouse")]
struct Args {
    /// Configuration file (defaults to etl.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Job to run; repeat for several. All enabled jobs run when omitted.
    #[arg(short, long = "job", value_enum)]
    jobs: Vec<JobKind>,

    /// Rows per insert statement
    #[arg(long)]
    batch_size: Option<usize>,

    /// Directory for staging CSVs and the run summary
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Fail a job when a mapped source column is missing
    #[arg(long)]
    strict_mapping: bool,

    /// Print the warehouse DDL for the selected jobs and exit
    #[arg(long)]
    print_ddl: bool,

    /// Debug logging, including frame previews
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .init();
}

/// CLI flags win over file and environment settings.
fn resolve_config(args: &Args) -> Result<EtlConfig> {
    let config = EtlConfig::load(args.config.as_deref()).context("loading configuration")?;
    apply_args(config, args)
}

/// Layer flags on top of a loaded config and validate the merged result.
fn apply_args(mut config: EtlConfig, args: &Args) -> Result<EtlConfig> {
    if let Some(size) = args.batch_size {
        config.batch_size = size;
    }
    if let Some(dir) = &args.staging_dir {
        config.staging_dir = Some(dir.clone());
    }
    if args.strict_mapping {
        config.mapping_policy = MappingPolicy::Strict;
    }
    config.validate().context("validating configuration")?;
    Ok(config)
}

fn print_ddl(config: &EtlConfig, kinds: &[JobKind]) {
    for &kind in kinds {
        println!("-- {}", kind);
        for table in jobs::job_for(kind).tables() {
            println!(
                "{}\n",
                warehouse::create_table_sql(&config.warehouse.schema, &table)
            );
        }
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = resolve_config(&args)?;
    let kinds = driver::selected_jobs(&config, &args.jobs);

    if args.print_ddl {
        print_ddl(&config, &kinds);
        return Ok(());
    }

    if kinds.is_empty() {
        tracing::warn!("no jobs selected, nothing to do");
        return Ok(());
    }
    tracing::info!(
        jobs = ?kinds.iter().map(JobKind::as_str).collect::<Vec<_>>(),
        warehouse = %config.warehouse.path.display(),
        schema = %config.warehouse.schema,
        "starting ETL run"
    );

    let summary = driver::run_jobs(&config, &kinds);
    driver::report_summary(&config, &summary);

    if !summary.all_succeeded() {
        tracing::error!(
            failed = summary.jobs_failed,
            total = summary.jobs_total,
            "ETL run finished with failures"
        );
        std::process::exit(1);
    }
    tracing::info!(total = summary.jobs_total, "ETL run finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_config(vars: &[(&str, &str)]) -> EtlConfig {
        let mut config = EtlConfig::default();
        config
            .apply_overrides(|k| {
                vars.iter()
                    .find(|(key, _)| *key == k)
                    .map(|(_, v)| v.to_string())
            })
            .unwrap();
        config
    }

    #[test]
    fn test_flags_override_environment() {
        let args = Args::parse_from(["warehouse_etl", "--batch-size", "10", "--strict-mapping"]);
        let config = apply_args(env_config(&[("ETL_BATCH_SIZE", "0")]), &args).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.mapping_policy, MappingPolicy::Strict);
    }

    #[test]
    fn test_merged_config_is_validated() {
        let args = Args::parse_from(["warehouse_etl"]);
        assert!(apply_args(env_config(&[("ETL_BATCH_SIZE", "0")]), &args).is_err());

        let args = Args::parse_from(["warehouse_etl", "--batch-size", "0"]);
        assert!(apply_args(env_config(&[("ETL_BATCH_SIZE", "500")]), &args).is_err());
    }

    #[test]
    fn test_environment_wins_over_defaults_without_flags() {
        let args = Args::parse_from(["warehouse_etl", "--job", "reviews", "-j", "event"]);
        let config = apply_args(
            env_config(&[("ETL_BATCH_SIZE", "250"), ("ETL_STAGING_DIR", "stage")]),
            &args,
        )
        .unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.staging_dir, Some(PathBuf::from("stage")));
        assert_eq!(args.jobs, vec![JobKind::Reviews, JobKind::Event]);
    }
}
