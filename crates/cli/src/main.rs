// luapad CLI - run and highlight Lua scripts headlessly

mod exit_codes;

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use luapad_core::{classify, BoundStrategy, RunStatus, ScriptExecutor, Settings, TokenCategory};

use exit_codes::{EXIT_FAULT, EXIT_IO, EXIT_SUCCESS, EXIT_TIMEOUT};

#[derive(Parser)]
#[command(name = "luapad")]
#[command(about = "Lua script pad (CLI mode, headless)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script in the sandbox and print its report
    #[command(after_help = "\
Examples:
  luapad run script.lua
  echo 'print(\"hi\")' | luapad run -
  luapad run script.lua --timeout-secs 1 --strategy wait --json")]
    Run {
        /// Script file (use - for stdin)
        script: PathBuf,

        /// Wall-clock timeout in seconds (overrides settings)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Bounding strategy (overrides settings)
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Emit a JSON envelope instead of the raw report
        #[arg(long)]
        json: bool,
    },

    /// Classify a script into style runs
    #[command(after_help = "\
Examples:
  luapad highlight script.lua
  luapad highlight script.lua --json")]
    Highlight {
        /// Script file (use - for stdin)
        script: PathBuf,

        /// Emit runs as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Strategy names accepted on the command line; mirrors the settings file.
#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Hook,
    Wait,
}

impl From<StrategyArg> for BoundStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Hook => BoundStrategy::CooperativeHook,
            StrategyArg::Wait => BoundStrategy::BoundedWait,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Run { script, timeout_secs, strategy, json } => {
            cmd_run(&script, timeout_secs, strategy, json)
        }
        Commands::Highlight { script, json } => cmd_highlight(&script, json),
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {}", e.message);
            ExitCode::from(e.code)
        }
    }
}

struct CliError {
    code: u8,
    message: String,
}

impl CliError {
    fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into() }
    }
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(
    script: &Path,
    timeout_secs: Option<u64>,
    strategy: Option<StrategyArg>,
    json: bool,
) -> Result<u8, CliError> {
    let source = read_source(script)?;

    let mut settings = Settings::load();
    if let Some(secs) = timeout_secs {
        settings.timeout_secs = secs;
    }
    if let Some(strategy) = strategy {
        settings.strategy = strategy.into();
    }

    let executor = ScriptExecutor::new(settings.executor_config());
    let result = executor.run(&source);

    if json {
        let envelope = serde_json::json!({
            "status": status_name(result.status),
            "report": result.report,
        });
        println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
    } else {
        // The report is the user-facing surface; print it verbatim
        print!("{}", result.report);
    }

    Ok(status_exit_code(result.status))
}

fn status_name(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "success",
        RunStatus::RuntimeFault => "fault",
        RunStatus::Timeout => "timeout",
    }
}

fn status_exit_code(status: RunStatus) -> u8 {
    match status {
        RunStatus::Success => EXIT_SUCCESS,
        RunStatus::RuntimeFault => EXIT_FAULT,
        RunStatus::Timeout => EXIT_TIMEOUT,
    }
}

// ============================================================================
// highlight
// ============================================================================

fn cmd_highlight(script: &Path, json: bool) -> Result<u8, CliError> {
    let source = read_source(script)?;
    let runs = classify(&source);

    if json {
        let items: Vec<serde_json::Value> = runs
            .iter()
            .map(|run| {
                serde_json::json!({
                    "start": run.range.start,
                    "len": run.len(),
                    "category": category_name(run.category),
                    "text": &source[run.range.clone()],
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items).unwrap_or_default());
    } else {
        print_runs_table(&source, &runs);
    }

    Ok(EXIT_SUCCESS)
}

fn print_runs_table(source: &str, runs: &[luapad_core::StyleRun]) {
    if runs.is_empty() {
        println!("No style runs.");
        return;
    }

    println!("{:<8} {:<6} {:<16} TEXT", "START", "LEN", "CATEGORY");
    println!("{}", "-".repeat(56));
    for run in runs {
        // One-line preview; comments and long strings can span lines
        let text = source[run.range.clone()].replace('\n', "\\n");
        println!(
            "{:<8} {:<6} {:<16} {}",
            run.range.start,
            run.len(),
            category_name(run.category),
            text,
        );
    }
}

fn category_name(category: TokenCategory) -> &'static str {
    match category {
        TokenCategory::Identifier => "identifier",
        TokenCategory::Number => "number",
        TokenCategory::Keyword => "keyword",
        TokenCategory::ControlKeyword => "control-keyword",
        TokenCategory::Builtin => "builtin",
        TokenCategory::BuiltinModule => "builtin-module",
        TokenCategory::String => "string",
        TokenCategory::Comment => "comment",
    }
}

// ============================================================================
// shared helpers
// ============================================================================

fn read_source(path: &Path) -> Result<String, CliError> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| CliError::io(format!("failed to read stdin: {}", e)))?;
        return Ok(buf);
    }

    std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("failed to read {}: {}", path.display(), e)))
}
