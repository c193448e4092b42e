//! CV-015: CLI subcommands (highstate, sls, low, validate, show, states).

use crate::core::config::{self, Opts};
use crate::core::highstate::HighState;
use crate::core::state::State;
use crate::core::types::{CallOutcome, LowInput};
use crate::matcher::NodeMatcher;
use crate::transport::LocalFileClient;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "converge",
    version,
    about = "Declarative state convergence: compile, validate and run state documents"
)]
pub struct Cli {
    /// Minion configuration file
    #[arg(short, long, global = true, default_value = "/etc/converge/minion.yaml")]
    pub config: PathBuf,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the highstate for this node
    Highstate {
        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Run a single state document
    Sls {
        /// Path to the document (.json is rendered as JSON)
        file: PathBuf,

        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Run low data: one chunk or a list of chunks, YAML or JSON
    Low {
        file: PathBuf,

        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Compile and validate a state document without running it
    Validate { file: PathBuf },

    /// Print the merged high data the highstate would run
    ShowHighstate {
        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Print the sorted chunks the highstate would run
    ShowLowstate {
        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// List registered actions and their parameters
    States,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands, config_path: &Path) -> Result<(), String> {
    match cmd {
        Commands::Highstate { output } => cmd_highstate(&load_config(config_path)?, output),
        Commands::Sls { file, output } => cmd_sls(&load_config(config_path)?, &file, output),
        Commands::Low { file, output } => cmd_low(&load_config(config_path)?, &file, output),
        Commands::Validate { file } => cmd_validate(&load_config(config_path)?, &file),
        Commands::ShowHighstate { output } => {
            let hs = highstate(&load_config(config_path)?)?;
            let high = hs.compile_highstate().map_err(|e| e.to_string())?;
            emit(&high, output)
        }
        Commands::ShowLowstate { output } => {
            let hs = highstate(&load_config(config_path)?)?;
            let high = hs.compile_highstate().map_err(|e| e.to_string())?;
            emit(&hs.state().compile_high_data(&high), output)
        }
        Commands::States => cmd_states(&load_config(config_path)?),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "converge", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Options from `path`, or defaults when the file does not exist.
fn load_config(path: &Path) -> Result<Opts, String> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Opts::default());
    }
    config::load_opts(path).map_err(|e| e.to_string())
}

fn file_client(opts: &Opts) -> Result<LocalFileClient, String> {
    let client = LocalFileClient::from_opts(opts);
    match &opts.master_config {
        Some(path) => {
            let master = config::load_master_opts(path).map_err(|e| e.to_string())?;
            Ok(client.with_master(master))
        }
        None => Ok(client),
    }
}

fn highstate(opts: &Opts) -> Result<HighState, String> {
    let client = file_client(opts)?;
    let matcher = NodeMatcher::from_opts(opts);
    HighState::new(opts.clone(), Box::new(client), Box::new(matcher)).map_err(|e| e.to_string())
}

/// A `State` whose renderer follows the document's extension.
fn state_for(opts: &Opts, file: &Path) -> State {
    let mut opts = opts.clone();
    if file.extension().is_some_and(|ext| ext == "json") {
        opts.renderer = "json".to_string();
    }
    State::from_opts(opts)
}

fn emit<T: Serialize>(value: &T, format: OutputFormat) -> Result<(), String> {
    let text = match format {
        OutputFormat::Yaml => serde_yaml_ng::to_string(value).map_err(|e| e.to_string())?,
        OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string())?,
    };
    println!("{}", text.trim_end());
    Ok(())
}

/// Print the outcome, then fail if anything did not succeed.
fn report(outcome: &CallOutcome, format: OutputFormat) -> Result<(), String> {
    emit(outcome, format)?;
    match outcome {
        CallOutcome::Errors(errors) => Err(format!("{} validation error(s)", errors.len())),
        CallOutcome::Ledger(ledger) => {
            eprintln!("Succeeded: {}, failed: {}", ledger.succeeded(), ledger.failed());
            if ledger.failed() > 0 {
                Err(format!("{} state(s) failed", ledger.failed()))
            } else {
                Ok(())
            }
        }
    }
}

fn cmd_highstate(opts: &Opts, output: OutputFormat) -> Result<(), String> {
    let outcome = highstate(opts)?.call_highstate().map_err(|e| e.to_string())?;
    report(&outcome, output)
}

fn cmd_sls(opts: &Opts, file: &Path, output: OutputFormat) -> Result<(), String> {
    if !file.is_file() {
        return Err(format!("{} does not exist", file.display()));
    }
    let outcome = state_for(opts, file).call_template(file).map_err(|e| e.to_string())?;
    report(&outcome, output)
}

fn cmd_low(opts: &Opts, file: &Path, output: OutputFormat) -> Result<(), String> {
    let text = std::fs::read_to_string(file).map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
    let low: LowInput =
        serde_yaml_ng::from_str(&text).map_err(|e| format!("invalid low data in {}: {}", file.display(), e))?;
    let outcome = State::from_opts(opts.clone()).call_low(low).map_err(|e| e.to_string())?;
    report(&outcome, output)
}

fn cmd_validate(opts: &Opts, file: &Path) -> Result<(), String> {
    if !file.is_file() {
        return Err(format!("{} does not exist", file.display()));
    }
    let state = state_for(opts, file);
    let high = state.compile_template(file).map_err(|e| e.to_string())?;
    let chunks = state.compile_high_data(&high);
    let errors = state.verify_chunks(&chunks);

    if errors.is_empty() {
        println!("OK: {} ({} names, {} chunks)", file.display(), high.len(), chunks.len());
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

fn cmd_states(opts: &Opts) -> Result<(), String> {
    let state = State::from_opts(opts.clone());
    for (full, action) in state.registry().iter() {
        let params: Vec<String> = action.params.iter().map(ToString::to_string).collect();
        println!("{}({})", full, params.join(", "));
    }
    Ok(())
}
