use clap::Parser;
use sqlx::PgPool;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adoption::DisabledChecker;
use crate::cli::{Args, Command};
use crate::config::Config;
use crate::config::org::OrgConfig;
use crate::error::Result;

mod adoption;
mod batch;
mod cli;
mod config;
mod db;
mod error;
mod filtering;
mod logging;
mod orchestrator;
mod progress;
mod quality;
mod scraper;
mod session;
mod standardize;
mod telemetry;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let app_config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    logging::setup_logging(&app_config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = app_config.environment.as_str(),
        "starting rehome"
    );

    // Must outlive the run so buffered events flush on exit
    let _sentry_guard = telemetry::init(&app_config);

    let command = args.command.unwrap_or_else(Command::default_run);
    let exit_code = match dispatch(command, &app_config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = format!("{e:#}"), "fatal error");
            1
        }
    };

    info!(exit_code, "rehome shutdown complete");
    std::process::exit(exit_code);
}

async fn dispatch(command: Command, app_config: &Config) -> Result<i32> {
    let org_configs = OrgConfig::load_dir(Path::new(&app_config.config_dir))?;
    info!(
        config_dir = app_config.config_dir,
        organizations = org_configs.len(),
        "organization configs loaded"
    );

    match command {
        Command::RunCron {
            org,
            dry_run,
            list,
            json,
        } => run_cron(app_config, &org_configs, org, dry_run, list, json).await,
        Command::CheckAdoptions { org, all } => {
            check_adoptions(app_config, &org_configs, org, all).await
        }
        Command::Quality { org, json } => quality_report(app_config, &org_configs, org, json).await,
    }
}

async fn run_cron(
    app_config: &Config,
    org_configs: &[OrgConfig],
    only_org: Option<String>,
    dry_run: bool,
    list: bool,
    json: bool,
) -> Result<i32> {
    if list {
        print_scraper_list(org_configs);
        return Ok(0);
    }

    if dry_run {
        return Ok(print_dry_run(org_configs, only_org.as_deref()));
    }

    let pool = connect_and_prepare(app_config, org_configs).await?;

    if let Some(config_id) = only_org {
        let Some(org_config) = org_configs.iter().find(|c| c.config_id == config_id) else {
            error!(config_id, "organization not found");
            return Ok(1);
        };
        let cancel = CancellationToken::new();
        orchestrator::spawn_signal_listener(cancel.clone());
        let result =
            orchestrator::run_one(org_config, &pool, app_config.scraper_timeout, &cancel).await;

        if json {
            println!(
                "{}",
                serde_json::json!({
                    "config_id": result.config_id,
                    "success": result.success,
                    "organization": result.organization,
                    "animals_found": result.animals_found,
                    "error": result.error,
                })
            );
        } else if result.success {
            info!(
                organization = result.organization,
                animals_found = result.animals_found,
                "scraper completed"
            );
        } else {
            error!(
                organization = result.organization,
                error = result.error.as_deref().unwrap_or("unknown"),
                "scraper failed"
            );
        }
        return Ok(if result.success { 0 } else { 1 });
    }

    let cancel = CancellationToken::new();
    orchestrator::spawn_signal_listener(cancel.clone());
    let report = orchestrator::run_all(org_configs, &pool, app_config, &cancel).await;
    let summary = orchestrator::format_summary(&report, chrono::Utc::now());

    if !json {
        orchestrator::log_summary(&summary);
    }
    // The JSON summary always lands on stdout for the cron host
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(orchestrator::exit_code(&summary))
}

async fn check_adoptions(
    app_config: &Config,
    org_configs: &[OrgConfig],
    only_org: Option<String>,
    all: bool,
) -> Result<i32> {
    let targets: Vec<&OrgConfig> = match (&only_org, all) {
        (Some(config_id), _) => {
            let Some(org_config) = org_configs.iter().find(|c| &c.config_id == config_id) else {
                error!(config_id, "organization not found");
                return Ok(1);
            };
            vec![org_config]
        }
        (None, true) => org_configs
            .iter()
            .filter(|c| c.scraper.check_adoption_status)
            .collect(),
        (None, false) => {
            error!("specify --org <config_id> or --all");
            return Ok(1);
        }
    };
    if targets.is_empty() {
        warn!("no organizations have adoption checking enabled");
        return Ok(0);
    }

    let pool = connect_and_prepare(app_config, org_configs).await?;
    let cancel = CancellationToken::new();
    orchestrator::spawn_signal_listener(cancel.clone());

    // The page-analysis service is an external collaborator; without one
    // configured, eligible animals are reported but left untouched.
    let checker = DisabledChecker;
    for org_config in targets {
        adoption::run_checks(org_config, &checker, &cancel, &pool).await?;
        if cancel.is_cancelled() {
            break;
        }
    }
    Ok(0)
}

async fn quality_report(
    app_config: &Config,
    org_configs: &[OrgConfig],
    only_org: Option<String>,
    json: bool,
) -> Result<i32> {
    let pool = connect_and_prepare(app_config, org_configs).await?;

    let org_id = match only_org {
        Some(config_id) => {
            match db::organizations::find_by_config_id(&config_id, &pool).await? {
                Some(org) => Some(org.id),
                None => {
                    error!(config_id, "organization not found");
                    return Ok(1);
                }
            }
        }
        None => None,
    };

    let report = quality::scan(org_id, &pool).await?;
    if json {
        let value: Vec<serde_json::Value> = report
            .iter()
            .map(|org| {
                serde_json::json!({
                    "organization_id": org.organization_id,
                    "total_animals": org.total_animals,
                    "overall_score": org.overall_score,
                    "animals_at_100": org.animals_at_100,
                    "animals_below_70": org.animals_below_70,
                    "completeness_avg": org.completeness_avg,
                    "standardization_avg": org.standardization_avg,
                    "rich_content_avg": org.rich_content_avg,
                    "visual_appeal_avg": org.visual_appeal_avg,
                    "common_issues": org.common_issues,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        for org in &report {
            println!(
                "org {:>4}  animals {:>5}  score {:>5.1}  at-100 {:>4}  below-70 {:>4}",
                org.organization_id,
                org.total_animals,
                org.overall_score,
                org.animals_at_100,
                org.animals_below_70,
            );
            for (issue, count) in &org.common_issues {
                println!("           {count:>5}x {issue}");
            }
        }
    }
    Ok(0)
}

/// Connect, migrate, and push org configs into the database.
async fn connect_and_prepare(app_config: &Config, org_configs: &[OrgConfig]) -> Result<PgPool> {
    let pool = db::connect(app_config).await?;
    db::migrate(&pool).await?;
    db::organizations::sync_all(org_configs, &pool).await?;
    Ok(pool)
}

fn print_scraper_list(org_configs: &[OrgConfig]) {
    println!("\nAvailable scrapers:");
    println!("{}", "-".repeat(60));
    for org_config in org_configs {
        let status = if org_config.active { "enabled" } else { "disabled" };
        println!(
            "  {:25} {:25} [{status}]",
            org_config.config_id, org_config.name
        );
    }
    let enabled = org_configs.iter().filter(|c| c.active).count();
    println!("\nTotal: {} scrapers ({enabled} enabled)", org_configs.len());
}

fn print_dry_run(org_configs: &[OrgConfig], only_org: Option<&str>) -> i32 {
    if let Some(config_id) = only_org {
        let Some(org_config) = org_configs.iter().find(|c| c.config_id == config_id) else {
            eprintln!("organization '{config_id}' not found");
            return 1;
        };
        println!("\nWould run scraper: {config_id}");
        println!("  Display name: {}", org_config.name);
        println!("  Enabled: {}", org_config.active);
        println!("  Adapter: {}", org_config.scraper.adapter.as_str());
        return 0;
    }

    let enabled: Vec<&OrgConfig> = org_configs.iter().filter(|c| c.active).collect();
    println!("\nWould run {} enabled scrapers:", enabled.len());
    for org_config in enabled {
        println!("  - {} ({})", org_config.config_id, org_config.name);
    }
    0
}
