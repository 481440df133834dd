use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use watrun_compiler::CompilerError;
use watrun_runtime::ExecutionResult;

mod report;

#[derive(Parser)]
#[command(
    name = "watrun",
    about = "Compile a WebAssembly text module with wat2wasm and run its main entry point",
    version
)]
struct Cli {
    /// WAT source file to compile and execute
    #[arg(value_name = "WAT-FILE")]
    wat: PathBuf,

    /// File whose bytes the module reads through getchar
    #[arg(long, value_name = "FILE")]
    stdin: Option<PathBuf>,

    /// Path or name of the wat2wasm executable (falls back to $WAT2WASM, then PATH)
    #[arg(long, value_name = "PATH")]
    wat2wasm: Option<PathBuf>,

    /// Log level filter for stderr diagnostics (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    // Exit code 2 is reserved for the missing-converter condition, so
    // usage errors are reported with exit code 1 instead of clap's default.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = setup_logging(cli.log_level.as_deref()) {
        eprintln!("watrun: {e:#}");
        return ExitCode::from(1);
    }

    match run(&cli) {
        Ok(result) => {
            let mut stdout = std::io::stdout().lock();
            match report::write_success(&mut stdout, &result) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("watrun: failed to write result: {e}");
                    ExitCode::from(1)
                }
            }
        }
        Err(e) => {
            // Full success output or an error report, never a mixture.
            eprintln!("watrun: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn run(cli: &Cli) -> Result<ExecutionResult> {
    let input: Arc<[u8]> = match &cli.stdin {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("failed to read input file {}", path.display()))?
            .into(),
        None => Vec::new().into(),
    };

    let artifact = watrun_compiler::compile(&cli.wat, cli.wat2wasm.as_deref())?;
    let wasm = std::fs::read(&artifact)
        .with_context(|| format!("failed to read compiled artifact {}", artifact.display()))?;

    tracing::debug!(bytes = wasm.len(), "artifact compiled");

    Ok(watrun_runtime::execute(&wasm, input)?)
}

/// 0 success, 2 converter tool unresolvable, 1 everything else.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<CompilerError>() {
        Some(CompilerError::ToolMissing { .. }) => 2,
        _ => 1,
    }
}

fn setup_logging(log_level: Option<&str>) -> Result<()> {
    let filter = if let Some(level) = log_level {
        EnvFilter::try_new(level)?
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // stdout carries only the module's output and the result value, so all
    // diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    Ok(())
}
