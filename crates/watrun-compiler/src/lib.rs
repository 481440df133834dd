//! External WAT-to-WASM conversion.
//!
//! The harness does not translate WebAssembly text itself; it shells out to
//! `wat2wasm` (from WABT) as a blocking subprocess and reads back the binary
//! artifact the tool writes next to the source file. A hung tool blocks the
//! harness indefinitely; there is deliberately no timeout.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Environment variable consulted when no explicit tool override is given.
pub const TOOL_ENV_VAR: &str = "WAT2WASM";

/// Tool name looked up on PATH when neither an override nor the environment
/// variable is set.
pub const DEFAULT_TOOL: &str = "wat2wasm";

/// Compiler error types
#[derive(Error, Debug)]
pub enum CompilerError {
    /// The converter could not be located or executed at all. This is a
    /// missing-dependency condition, distinct from every other failure.
    #[error("cannot execute '{tool}':: {reason}\ninstall WABT (WebAssembly Binary Toolkit) and ensure 'wat2wasm' is in PATH, or pass --wat2wasm, or set WAT2WASM")]
    ToolMissing { tool: String, reason: String },

    /// The converter ran and rejected the source; its combined
    /// stdout/stderr text is attached for diagnosis.
    #[error("{tool} failed ({status})::\n{output}")]
    ToolFailed {
        tool: String,
        status: String,
        output: String,
    },

    /// Reading or locating the artifact failed.
    #[error("file system error:: {0}")]
    FileSystem(#[from] std::io::Error),
}

/// Resolve the converter executable: explicit override, then the `WAT2WASM`
/// environment variable, then `wat2wasm` on the search path.
pub fn resolve_tool(override_path: Option<&Path>) -> OsString {
    if let Some(path) = override_path {
        return path.as_os_str().to_os_string();
    }
    if let Some(from_env) = std::env::var_os(TOOL_ENV_VAR) {
        if !from_env.is_empty() {
            return from_env;
        }
    }
    OsString::from(DEFAULT_TOOL)
}

/// Convert `source` to a sibling binary artifact (same directory, same base
/// name, `wasm` extension) and return the artifact path.
///
/// The subprocess runs synchronously with captured stdout/stderr. The
/// caller reads the artifact's bytes afterwards.
pub fn compile(source: &Path, tool_override: Option<&Path>) -> Result<PathBuf, CompilerError> {
    let tool = resolve_tool(tool_override);
    let artifact = source.with_extension("wasm");

    debug!(
        tool = %tool.to_string_lossy(),
        source = %source.display(),
        artifact = %artifact.display(),
        "invoking converter"
    );

    let output = Command::new(&tool)
        .arg(source)
        .arg("-o")
        .arg(&artifact)
        .output()
        .map_err(|e| CompilerError::ToolMissing {
            tool: tool.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(CompilerError::ToolFailed {
            tool: tool.to_string_lossy().into_owned(),
            status: output.status.to_string(),
            output: text,
        });
    }

    // The tool exiting zero without producing the artifact is still a
    // failure; surface it as a file system error here rather than as an
    // invalid-module error later.
    std::fs::metadata(&artifact)?;

    debug!(artifact = %artifact.display(), "converter succeeded");
    Ok(artifact)
}
