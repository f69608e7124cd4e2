//! Plant Missions operator CLI
//!
//! ## Usage
//!
//! ```bash
//! # Load the mission catalog
//! plant-missions seed catalog.toml
//!
//! # Give user 42 a plant and today's missions
//! plant-missions adopt 42 --name Fern
//! plant-missions recommend 42
//!
//! # Complete an assignment with a confirmed AR gesture
//! plant-missions complete 42 17 --ar-action wave
//!
//! # Nightly sweep
//! plant-missions expire
//! ```
//!
//! Recommendation tuning is read from `MISSION_CONFIG_FILE`,
//! `MISSION_CONFIG_JSON` and the `MISSION_*` scalar overrides.
//! Output is JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plant_missions::db::{emotions, CreateMissionInput};
use plant_missions::services::events::spawn_logging_listener;
use plant_missions::{CompletionEvidence, Config, ConfigSources, MissionDb, RecommendConfigCache, Services};

#[derive(Parser, Debug)]
#[command(name = "plant-missions")]
#[command(about = "Daily self-care missions for a plant companion")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "PLANT_MISSIONS_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assign today's missions if the user has none, then print them
    Recommend {
        user_id: i64,
        /// Missions to hand out (at most 3)
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Print today's missions
    Today { user_id: i64 },
    /// Complete an assignment
    Complete {
        user_id: i64,
        assignment_id: i64,
        /// AR gesture performed (implies AR was used)
        #[arg(long)]
        ar_action: Option<String>,
        /// Free-form evidence JSON
        #[arg(long)]
        evidence: Option<String>,
    },
    /// Force-assign missions by code for today
    Assign {
        user_id: i64,
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Delete today's assignments for a user
    Clear { user_id: i64 },
    /// Mark overdue assignments as expired
    Expire,
    /// Load a mission catalog TOML file
    Seed { catalog: PathBuf },
    /// Create a plant for a user
    Adopt {
        user_id: i64,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show a user's plant
    Plant { user_id: i64 },
    /// Record an emotion log entry (normally written by the chat pipeline)
    Emotion {
        user_id: i64,
        emotion: String,
        /// Factor JSON, e.g. '{"arousal": 0.2, "tags": ["tired"]}'
        #[arg(long)]
        factor: Option<String>,
    },
    /// Print database statistics
    Stats,
}

/// Catalog file layout: a list of `[[missions]]` tables
#[derive(Debug, Deserialize)]
struct Catalog {
    missions: Vec<CreateMissionInput>,
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("plant_missions=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else {
        Config::default()
    };
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }

    std::fs::create_dir_all(&config.storage_dir)
        .with_context(|| format!("Failed to create {}", config.storage_dir.display()))?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let mut sources = ConfigSources::from_env()?;
    if sources.file.is_none() {
        sources.file = config.recommend_config_path.clone();
    }

    let db = Arc::new(MissionDb::open(&config.storage_dir)?);
    let services = Services::new(db.clone(), Arc::new(RecommendConfigCache::new(sources)), config.business_day()?);
    let listener = spawn_logging_listener(services.events.clone());

    info!(database = %config.database_path().display(), "Opened mission store");

    match args.command {
        Command::Recommend { user_id, count } => {
            let count = count.unwrap_or(config.default_mission_count);
            print_json(&services.missions.recommend_if_empty(user_id, count)?)?;
        }
        Command::Today { user_id } => {
            print_json(&services.missions.get_today(user_id)?)?;
        }
        Command::Complete { user_id, assignment_id, ar_action, evidence } => {
            let evidence = CompletionEvidence {
                ar_used: Some(ar_action.is_some()),
                ar_action,
                evidence: evidence
                    .map(|raw| serde_json::from_str(&raw))
                    .transpose()
                    .context("--evidence is not valid JSON")?,
            };
            print_json(&services.completion.complete(user_id, assignment_id, evidence)?)?;
        }
        Command::Assign { user_id, codes } => {
            print_json(&services.admin.assign_today_by_codes(user_id, &codes)?)?;
        }
        Command::Clear { user_id } => {
            print_json(&services.admin.clear_today(user_id)?)?;
        }
        Command::Expire => {
            let expired = services.admin.expire_overdue()?;
            print_json(&serde_json::json!({ "expired": expired }))?;
        }
        Command::Seed { catalog } => {
            let raw = std::fs::read_to_string(&catalog)
                .with_context(|| format!("Failed to read {}", catalog.display()))?;
            let parsed: Catalog = toml::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", catalog.display()))?;
            let count = services.admin.seed_catalog(parsed.missions)?;
            print_json(&serde_json::json!({ "seeded": count }))?;
        }
        Command::Adopt { user_id, name } => {
            print_json(&services.admin.adopt_plant(user_id, name.as_deref())?)?;
        }
        Command::Plant { user_id } => {
            print_json(&services.admin.plant(user_id)?)?;
        }
        Command::Emotion { user_id, emotion, factor } => {
            let factor: Option<serde_json::Value> = factor
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("--factor is not valid JSON")?;
            let id = db.with_conn(|conn| {
                emotions::record_emotion(conn, user_id, Some(&emotion), factor.as_ref(), Utc::now())
            })?;
            print_json(&serde_json::json!({ "id": id }))?;
        }
        Command::Stats => {
            print_json(&db.stats()?)?;
        }
    }

    drop(services);
    if let Err(e) = listener.await {
        warn!(error = %e, "Event logging task failed");
    }

    Ok(())
}
