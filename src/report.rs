//! Success-path encoding of an execution outcome.

use std::io::Write;

use watrun_runtime::ExecutionResult;

/// Write the captured output bytes verbatim, then the decimal result value
/// and a trailing newline. No delimiter separates the two, and nothing
/// else is interleaved.
pub fn write_success<W: Write>(writer: &mut W, result: &ExecutionResult) -> std::io::Result<()> {
    writer.write_all(&result.output)?;
    writeln!(writer, "{}", result.value)?;
    writer.flush()
}
