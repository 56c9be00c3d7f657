//! Facility Intents - command line front end
//!
//! Translates a single utterance given on the command line, or runs an
//! interactive session reading one utterance per line.

use clap::Parser;
use facility_intents::context::{ContextStore, InMemoryContextStore, JsonFileContextStore};
use facility_intents::core::config::PipelineConfig;
use facility_intents::core::error::{PipelineError, Result};
use facility_intents::pipeline::{Clarification, Diagnostic, Pipeline, PipelineOutcome, TurnResult};
use facility_intents::{SessionId, Utterance};

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Translate natural-language building requests into commands
#[derive(Parser, Debug)]
#[command(name = "facility-intents")]
#[command(about = "Translate natural-language building requests into executable commands")]
struct Args {
    /// Directory of intent catalog TOML files (overrides the config file)
    #[arg(long)]
    intents: Option<PathBuf>,

    /// Pipeline configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session id; a fresh one is generated when omitted
    #[arg(long)]
    session: Option<String>,

    /// Persist sessions as JSON files in this directory instead of memory
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Print outcomes as JSON
    #[arg(long)]
    json: bool,

    /// Utterance to translate; starts an interactive loop when omitted
    utterance: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("facility_intents=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &args.intents {
        config.registry.intents_dir = dir.clone();
    }

    let session_id = args
        .session
        .clone()
        .map(SessionId::new)
        .unwrap_or_else(SessionId::generate);

    let store: Arc<dyn ContextStore> = match &args.state_dir {
        Some(dir) => Arc::new(JsonFileContextStore::open(dir).map_err(|source| {
            PipelineError::Store {
                session: session_id.clone(),
                source,
            }
        })?),
        None => Arc::new(InMemoryContextStore::new()),
    };

    let pipeline = Pipeline::from_config(config, store)?;
    tracing::info!(
        intents = pipeline.registry().len(),
        session = %session_id,
        "Pipeline ready"
    );

    if !args.utterance.is_empty() {
        let text = args.utterance.join(" ");
        let outcome = pipeline.process(&Utterance::now(text, session_id))?;
        print_outcome(&outcome, args.json);
        return Ok(());
    }

    run_interactive(&pipeline, session_id, args.json)
}

fn run_interactive(pipeline: &Pipeline, session_id: SessionId, json: bool) -> Result<()> {
    println!("\n=== FACILITY INTENTS ===");
    println!("Session {}", session_id);
    println!();
    println!("Commands:");
    println!("  reset      - Forget everything said in this session");
    println!("  intents    - List the known intents");
    println!("  quit / q   - Exit");
    println!("  <any text> - Request to translate");
    println!();

    let mut turns = 0u32;
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input == "quit" || input == "q" {
            break;
        }

        if input == "reset" {
            pipeline.reset(&session_id)?;
            println!("Session cleared.");
            continue;
        }

        if input == "intents" {
            for intent in pipeline.registry().iter() {
                println!("  {:<24} {}", intent.name(), intent.schema.description);
            }
            continue;
        }

        let outcome = pipeline.process(&Utterance::now(input, session_id.clone()))?;
        print_outcome(&outcome, json);
        turns += 1;
    }

    println!("\nGoodbye! {} turn(s) processed.", turns);
    Ok(())
}

fn print_outcome(outcome: &PipelineOutcome, json: bool) {
    if json {
        match serde_json::to_string_pretty(outcome) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Could not serialize outcome: {}", e),
        }
        return;
    }

    for diagnostic in &outcome.diagnostics {
        if let Diagnostic::SessionExpired { .. } = diagnostic {
            println!("(previous session expired, starting fresh)");
        }
    }

    match &outcome.result {
        TurnResult::Ready {
            confirmation,
            command_line,
            ..
        } => {
            println!("READY  {}", command_line);
            println!("       {}", confirmation);
        }
        TurnResult::ClarificationNeeded {
            clarification,
            prompt,
        } => {
            println!("?      {}", prompt);
            if let Clarification::AmbiguousIntent { candidates } = clarification {
                for candidate in candidates {
                    println!(
                        "         {:<24} {:.0}%",
                        candidate.intent,
                        candidate.confidence * 100.0
                    );
                }
            }
        }
        TurnResult::Rejected { reason } => println!("REJECT {}", reason),
    }
}
