//! Prospector CLI: print recent CRM engagements for a contact or company.
//!
//! Usage:
//!   prospector contact <id>
//!   prospector company <id>
//!   prospector context <contact|company> <id>
//!
//! Credentials come from ~/.prospector/config.json or the environment
//! (`HUBSPOT_ACCESS_TOKEN`, `ANTHROPIC_API_KEY`). Output is JSON on stdout;
//! lookup failures print an error payload and exit non-zero.

use std::process::ExitCode;

use prospector_lib::error::{EngagementError, ErrorPayload};
use prospector_lib::state::{load_config, AppState};
use prospector_lib::types::{EntityKind, EntityRef};

const USAGE: &str = "usage: prospector <contact|company> <id>\n       prospector context <contact|company> <id>";

enum Command {
    Engagements(EntityRef),
    Context(EntityRef),
}

fn entity(kind: &str, id: Option<&String>) -> Option<EntityRef> {
    let kind = EntityKind::parse(kind)?;
    Some(EntityRef {
        kind,
        id: id?.trim().to_string(),
    })
}

fn parse_args(args: &[String]) -> Option<Command> {
    match args.first().map(String::as_str)? {
        "context" => entity(args.get(1)?, args.get(2)).map(Command::Context),
        kind => entity(kind, args.get(1)).map(Command::Engagements),
    }
}

async fn run(state: &AppState, command: Command) -> Result<String, EngagementError> {
    let pipeline = state.pipeline()?;
    match command {
        Command::Engagements(entity) => {
            let payload = pipeline.engagements_for(&entity).await?;
            serde_json::to_string_pretty(&payload).map_err(|e| EngagementError::Upstream {
                status: None,
                message: e.to_string(),
            })
        }
        Command::Context(entity) => pipeline.context_for(&entity).await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = parse_args(&args) else {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    };

    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;
    let state = AppState::new(config);

    match run(&state, command).await {
        Ok(output) => {
            println!("{}", output);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            log::error!("Engagements: {} ({})", e, e.recovery_suggestion());
            println!("{}", serde_json::to_string_pretty(&ErrorPayload::from(&e))?);
            Ok(ExitCode::FAILURE)
        }
    }
}
