//! Administration shell for storage appliance middleware.
//!
//! Without a subcommand this starts an interactive session; the other modes
//! run a script, a single line, or print completions for a partial line.
//!
//! # Usage
//!
//! ```bash
//! # Interactive shell over the built-in demo appliance
//! nascli
//!
//! # Interactive shell over a fixture file
//! nascli --fixture lab.json
//!
//! # Run a script; the exit code comes from the first error
//! nascli run provision.nas
//!
//! # One line, results as JSON
//! nascli --json exec 'storage volume show | sort(-size) | limit(2)'
//!
//! # Completion candidates, one per line
//! nascli complete 'storage vo'
//! ```

mod console;
mod format;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use nascli_core::config::{nascli_dir, OutputFormat, ShellConfig};
use nascli_core::error::ShellError;
use nascli_core::memory::MemoryCollaborator;
use nascli_core::output::Output;
use nascli_core::parser;
use nascli_core::session::Session;

use crate::console::StdConsole;

const DEMO_FIXTURE: &str = include_str!("../fixtures/demo.json");
const CONTINUATION_PROMPT: &str = "... ";

/// Administration shell for storage appliance middleware.
#[derive(Parser)]
#[command(name = "nascli")]
#[command(about = "Administration shell for storage appliance middleware")]
#[command(version)]
struct Cli {
    /// JSON fixture describing the appliance (defaults to a built-in demo)
    #[arg(short, long, env = "NASCLI_FIXTURE")]
    fixture: Option<PathBuf>,

    /// Print results and errors as JSON
    #[arg(short, long)]
    json: bool,

    /// Mirror logs to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Deadline for each remote call in milliseconds
    #[arg(short, long, env = "NASCLI_TIMEOUT")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script file
    Run {
        /// Path to the script
        file: PathBuf,
    },

    /// Run a single line, then exit
    Exec {
        /// Source text, e.g. "storage volume show"
        line: String,
    },

    /// Print completion candidates for a partial line
    Complete {
        /// The line as typed so far
        line: String,
    },
}

/// Logs go to a daily file so they never interleave with the prompt.
fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = verbose.then(|| fmt::layer().with_writer(std::io::stderr));

    let log_dir = nascli_dir().join("logs");
    let (file, guard) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "nascli.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file)
        .with(stderr)
        .init();
    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", format::render_error(&e, false));
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<u8, ShellError> {
    let mut config = ShellConfig::load();
    if let Some(timeout) = cli.timeout {
        config.remote_timeout_ms = timeout;
    }
    if cli.json {
        config.output = OutputFormat::Json;
    }
    let json = config.output == OutputFormat::Json;

    let backend = match &cli.fixture {
        Some(path) => MemoryCollaborator::load(path)?,
        None => MemoryCollaborator::from_json(DEMO_FIXTURE)
            .map_err(|e| ShellError::Io(format!("built-in fixture: {}", e)))?,
    };
    let mut session = Session::new(Arc::new(backend), Box::new(StdConsole::new()), config).await;
    info!(session = %session.id(), fixture = ?cli.fixture, "nascli started");

    match cli.command {
        None => interactive(&mut session, json).await,
        Some(Command::Run { file }) => {
            let source = std::fs::read_to_string(&file)
                .map_err(|e| ShellError::Io(format!("{}: {}", file.display(), e)))?;
            Ok(run_source(&mut session, &source, json).await.0)
        }
        Some(Command::Exec { line }) => Ok(run_source(&mut session, &line, json).await.0),
        Some(Command::Complete { line }) => {
            let candidates = session.complete(&line).await;
            if !candidates.is_empty() {
                println!("{}", format::render_candidates(&candidates, json));
            }
            Ok(0)
        }
    }
}

/// Execute `source` and print its results.
///
/// Returns the exit code of the first error (0 if none) and whether the
/// input asked to leave the shell.
async fn run_source(session: &mut Session, source: &str, json: bool) -> (u8, bool) {
    let mut code = 0;
    let mut exit = false;
    for result in session.execute(source).await {
        match result {
            Ok(Output::Exit) => exit = true,
            Ok(output) => {
                if let Some(text) = format::render(&output, json) {
                    println!("{}", text);
                }
            }
            Err(e) => {
                eprintln!("{}", format::render_error(&e, json));
                if code == 0 {
                    code = e.exit_code();
                }
            }
        }
    }
    (code, exit)
}

async fn interactive(session: &mut Session, json: bool) -> Result<u8, ShellError> {
    let interrupter = session.interrupter();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            interrupter.interrupt();
        }
    });
    let watcher = session.watch();

    let mut pending = String::new();
    let mut code = 0;
    loop {
        let prompt = if pending.is_empty() {
            session.prompt()
        } else {
            CONTINUATION_PROMPT.to_string()
        };
        let Some(line) = session.console_mut().read_line(&prompt).await? else {
            break;
        };
        pending.push_str(&line);
        pending.push('\n');

        // Keep reading while a block, list or call is still open
        if matches!(parser::parse(&pending), Err(ref e) if e.is_incomplete()) {
            continue;
        }
        let source = std::mem::take(&mut pending);
        if source.trim().is_empty() {
            continue;
        }
        let (last, exit) = run_source(session, &source, json).await;
        code = last;
        if exit {
            break;
        }
    }

    // Report a block left open at end of input
    if !pending.trim().is_empty() {
        code = run_source(session, &pending, json).await.0;
    }
    if let Some(watcher) = watcher {
        watcher.stop().await;
    }
    debug!(session = %session.id(), "interactive session ended");
    Ok(code)
}
