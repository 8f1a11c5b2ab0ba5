//! Command-line administration for double-elimination brackets.
//!
//! Generates stages, records results and inspects brackets stored in
//! PostgreSQL, or runs the same commands against an in-memory store.

mod commands;
mod config;
mod logging;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Error;
use bracket_engine::BracketManager;
use bracket_engine::db::{Database, MemoryBracketStore, SharedStore};
use log::{info, warn};
use pico_args::Arguments;

use commands::{Command, parse_competitors, parse_score, parse_status};
use config::AdminConfig;

const HELP: &str = "\
Administer double-elimination brackets

USAGE:
  bracket_admin [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
  generate  --stage N --competitors 1,2,3 [--size S]   Replace the brackets of a stage
  report    --match M --score A-B --winner C           Record a result and progress it
  forfeit   --match M --winner C                       Award a match by forfeit
  progress  --match M                                  Re-run progression for a decided match
  status    --match M --status in_progress|cancelled   Change the status of a match
  show      --stage N                                  Print every bracket of a stage
  playable  --stage N                                  Print matches ready to be played
  reset     --stage N                                  Delete every bracket of a stage
  simulate  --stage N [--competitors 1,2,3] [--size S] Play a stage out with random results

OPTIONS:
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --memory                 Use a throwaway in-memory store

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL                   PostgreSQL connection string
  ADMIN_STORE                    memory or postgres
  ADMIN_APPLY_SCHEMA             Create missing tables on start [default: true]
  DEFAULT_BRACKET_SIZE           Size used when --size is omitted [default: 8]
  ENGINE_MAX_PROGRESS_ATTEMPTS   Progression attempts on version conflicts [default: 3]
  ENGINE_RETRY_BACKOFF_MS        Pause between attempts [default: 25]
";

struct Args {
    database_url: Option<String>,
    in_memory: bool,
    command: Command,
}

fn parse_args() -> Result<Args, Error> {
    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let database_url = pargs.opt_value_from_str("--db-url")?;
    let in_memory = pargs.contains("--memory");

    let Some(subcommand) = pargs.subcommand()? else {
        anyhow::bail!("Missing command, see --help");
    };

    let command = match subcommand.as_str() {
        "generate" => Command::Generate {
            stage: pargs.value_from_str("--stage")?,
            size: pargs.opt_value_from_str("--size")?,
            competitors: pargs.value_from_fn("--competitors", parse_competitors)?,
        },
        "report" => {
            let (score_a, score_b) = pargs.value_from_fn("--score", parse_score)?;
            Command::Report {
                match_id: pargs.value_from_str("--match")?,
                score_a,
                score_b,
                winner: pargs.value_from_str("--winner")?,
            }
        }
        "forfeit" => Command::Forfeit {
            match_id: pargs.value_from_str("--match")?,
            winner: pargs.value_from_str("--winner")?,
        },
        "progress" => Command::Progress {
            match_id: pargs.value_from_str("--match")?,
        },
        "status" => Command::Status {
            match_id: pargs.value_from_str("--match")?,
            status: pargs.value_from_fn("--status", parse_status)?,
        },
        "show" => Command::Show {
            stage: pargs.value_from_str("--stage")?,
        },
        "playable" => Command::Playable {
            stage: pargs.value_from_str("--stage")?,
        },
        "reset" => Command::Reset {
            stage: pargs.value_from_str("--stage")?,
        },
        "simulate" => Command::Simulate {
            stage: pargs.value_from_str("--stage")?,
            size: pargs.opt_value_from_str("--size")?,
            competitors: pargs
                .opt_value_from_fn("--competitors", parse_competitors)?
                .unwrap_or_default(),
        },
        other => anyhow::bail!("Unknown command '{other}', see --help"),
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        warn!("Ignoring unused arguments: {:?}", remaining);
    }

    Ok(Args {
        database_url,
        in_memory,
        command,
    })
}

async fn open_store(config: &AdminConfig) -> Result<SharedStore, Error> {
    if config.in_memory {
        info!("Using in-memory store");
        return Ok(Arc::new(MemoryBracketStore::new()));
    }

    let started = Instant::now();
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    logging::log_database_operation("connect", "postgres", started.elapsed().as_millis() as u64);

    if config.apply_schema {
        let started = Instant::now();
        db.apply_schema()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to apply schema: {}", e))?;
        logging::log_database_operation("schema", "brackets", started.elapsed().as_millis() as u64);
    }

    Ok(Arc::new(db.store()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    logging::init();

    let args = parse_args()?;
    let config = AdminConfig::from_env(args.database_url, args.in_memory)?;
    config.validate()?;

    let store = open_store(&config).await?;
    let manager = BracketManager::new(store, config.engine.clone());

    info!("Running {}", args.command.name());
    let output = commands::run(&manager, args.command, config.default_bracket_size).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
