//! Trial instantiation and entry-point execution.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use wasmtime::{Caller, Engine, Instance, Linker, Module, Store, Val, ValType};

use crate::host::HostState;

/// Executor error types
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// Module bytes failed to decode or validate
    #[error("invalid wasm module:: {0}")]
    InvalidModule(String),

    /// Neither host import set matched the module's imports
    #[error("instantiation failed under both ABI widths\n  64-bit attempt:: {word64}\n  32-bit attempt:: {word32}")]
    Instantiation { word64: String, word32: String },

    /// The module does not export a function named `main`
    #[error("exported function 'main' not found")]
    MissingEntryPoint,

    /// `main` exists but takes arguments or does not return one integer
    #[error("exported 'main' has an unsupported signature:: {0}")]
    BadEntryPoint(String),

    /// The entry point trapped
    #[error("trap while executing 'main':: {0}")]
    Trap(String),
}

/// Word width a module uses for memory addresses, memory values, and its
/// entry-point result. Discovered by trial instantiation; `Word64` is
/// always attempted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiVariant {
    /// 64-bit words: `mem_get: (i64) -> i64`, `mem_set: (i64, i64)`
    Word64,
    /// 32-bit words: `mem_get: (i32) -> i32`, `mem_set: (i32, i32)`
    Word32,
}

impl fmt::Display for AbiVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiVariant::Word64 => write!(f, "64-bit"),
            AbiVariant::Word32 => write!(f, "32-bit"),
        }
    }
}

/// The word `main` returned, tagged with its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnValue {
    Word32(i32),
    Word64(i64),
}

impl fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnValue::Word32(v) => write!(f, "{v}"),
            ReturnValue::Word64(v) => write!(f, "{v}"),
        }
    }
}

/// Outcome of one successful run: captured output plus the returned word.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Bytes the module emitted through `putchar`, in order.
    pub output: Vec<u8>,
    /// Value returned by `main`.
    pub value: ReturnValue,
    /// ABI variant the module instantiated under.
    pub variant: AbiVariant,
}

/// Register the four host imports under module `"env"`.
///
/// `getchar` and `putchar` are byte-oriented and keep the same i32
/// signature under both variants; only the memory accessors change width.
fn add_host_imports(linker: &mut Linker<HostState>, variant: AbiVariant) -> anyhow::Result<()> {
    linker.func_wrap("env", "getchar", |mut caller: Caller<'_, HostState>| -> i32 {
        caller.data_mut().read_byte()
    })?;
    linker.func_wrap(
        "env",
        "putchar",
        |mut caller: Caller<'_, HostState>, value: i32| {
            caller.data_mut().write_byte(value);
        },
    )?;

    match variant {
        AbiVariant::Word64 => {
            linker.func_wrap(
                "env",
                "mem_get",
                |caller: Caller<'_, HostState>, addr: i64| -> i64 { caller.data().mem64.get(addr) },
            )?;
            linker.func_wrap(
                "env",
                "mem_set",
                |mut caller: Caller<'_, HostState>, addr: i64, value: i64| {
                    caller.data_mut().mem64.set(addr, value);
                },
            )?;
        }
        AbiVariant::Word32 => {
            linker.func_wrap(
                "env",
                "mem_get",
                |caller: Caller<'_, HostState>, addr: i32| -> i32 { caller.data().mem32.get(addr) },
            )?;
            linker.func_wrap(
                "env",
                "mem_set",
                |mut caller: Caller<'_, HostState>, addr: i32, value: i32| {
                    caller.data_mut().mem32.set(addr, value);
                },
            )?;
        }
    }

    Ok(())
}

/// One instantiation attempt with fresh host state. Any failure is the
/// attempt's rejection cause.
fn try_instantiate(
    engine: &Engine,
    module: &Module,
    variant: AbiVariant,
    input: Arc<[u8]>,
) -> anyhow::Result<(Store<HostState>, Instance)> {
    let mut linker = Linker::new(engine);
    add_host_imports(&mut linker, variant)?;

    let mut store = Store::new(engine, HostState::new(input));
    let instance = linker.instantiate(&mut store, module)?;
    Ok((store, instance))
}

/// Instantiate `wasm` against the host imports and run its exported `main`
/// once to completion.
///
/// The 64-bit import set is tried first. On rejection the store (and with
/// it the input cursor, output accumulator, and sparse memory) is discarded
/// and the 32-bit set is tried against a fresh one; the input buffer itself
/// is immutable and shared between attempts. Execution is synchronous and
/// unbounded: no fuel, no epoch interruption, no timeout.
pub fn execute(wasm: &[u8], input: Arc<[u8]>) -> Result<ExecutionResult, ExecutorError> {
    let engine = Engine::default();
    let module = Module::from_binary(&engine, wasm)
        .map_err(|e| ExecutorError::InvalidModule(format!("{e:#}")))?;

    let (mut store, instance, variant) =
        match try_instantiate(&engine, &module, AbiVariant::Word64, Arc::clone(&input)) {
            Ok((store, instance)) => (store, instance, AbiVariant::Word64),
            Err(e64) => {
                debug!("64-bit instantiation rejected: {e64:#}");
                match try_instantiate(&engine, &module, AbiVariant::Word32, input) {
                    Ok((store, instance)) => (store, instance, AbiVariant::Word32),
                    Err(e32) => {
                        return Err(ExecutorError::Instantiation {
                            word64: format!("{e64:#}"),
                            word32: format!("{e32:#}"),
                        });
                    }
                }
            }
        };
    debug!(%variant, "module instantiated");

    let main = instance
        .get_func(&mut store, "main")
        .ok_or(ExecutorError::MissingEntryPoint)?;

    let ty = main.ty(&store);
    if ty.params().len() != 0 || ty.results().len() != 1 {
        return Err(ExecutorError::BadEntryPoint(format!("{ty:?}")));
    }
    match ty.results().next() {
        Some(ValType::I32 | ValType::I64) => {}
        _ => return Err(ExecutorError::BadEntryPoint(format!("{ty:?}"))),
    }

    let mut results = [Val::I32(0)];
    main.call(&mut store, &[], &mut results)
        .map_err(|e| ExecutorError::Trap(format!("{e:#}")))?;

    // The signature was checked above, so the result is one of these two.
    let value = match &results[0] {
        Val::I32(v) => ReturnValue::Word32(*v),
        Val::I64(v) => ReturnValue::Word64(*v),
        _ => return Err(ExecutorError::BadEntryPoint(format!("{ty:?}"))),
    };

    Ok(ExecutionResult {
        output: store.into_data().into_output(),
        value,
        variant,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(wat: &str, input: &[u8]) -> Result<ExecutionResult, ExecutorError> {
        let wasm = wat::parse_str(wat).unwrap();
        execute(&wasm, Arc::from(input))
    }

    #[test]
    fn test_echo_module_word64() {
        // Reads two bytes, echoes each immediately, returns 3.
        let result = run(
            r#"
            (module
                (import "env" "getchar" (func $getchar (result i32)))
                (import "env" "putchar" (func $putchar (param i32)))
                (import "env" "mem_get" (func $mem_get (param i64) (result i64)))
                (import "env" "mem_set" (func $mem_set (param i64 i64)))
                (func (export "main") (result i64)
                    (call $putchar (call $getchar))
                    (call $putchar (call $getchar))
                    (i64.const 3)))
            "#,
            &[0x41, 0x42],
        )
        .unwrap();

        assert_eq!(result.output, vec![0x41, 0x42]);
        assert_eq!(result.value, ReturnValue::Word64(3));
        assert_eq!(result.variant, AbiVariant::Word64);
    }

    #[test]
    fn test_word32_module_runs_after_word64_rejection() {
        let result = run(
            r#"
            (module
                (import "env" "mem_get" (func $mem_get (param i32) (result i32)))
                (import "env" "mem_set" (func $mem_set (param i32 i32)))
                (func (export "main") (result i32)
                    (call $mem_set (i32.const 5) (i32.const 7))
                    (call $mem_get (i32.const 5))))
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(result.value, ReturnValue::Word32(7));
        assert_eq!(result.variant, AbiVariant::Word32);
        assert!(result.output.is_empty());
    }

    #[test]
    fn test_input_cursor_is_fresh_after_fallback() {
        // A 32-bit module must still see the input from the beginning even
        // though the 64-bit attempt came first.
        let result = run(
            r#"
            (module
                (import "env" "getchar" (func $getchar (result i32)))
                (import "env" "mem_get" (func $mem_get (param i32) (result i32)))
                (import "env" "mem_set" (func $mem_set (param i32 i32)))
                (func (export "main") (result i32)
                    (call $getchar)))
            "#,
            &[0x61],
        )
        .unwrap();

        assert_eq!(result.value, ReturnValue::Word32(0x61));
        assert_eq!(result.variant, AbiVariant::Word32);
    }

    #[test]
    fn test_exhausted_input_yields_minus_one() {
        let result = run(
            r#"
            (module
                (import "env" "getchar" (func $getchar (result i32)))
                (func (export "main") (result i32)
                    (drop (call $getchar))
                    (call $getchar)))
            "#,
            &[7],
        )
        .unwrap();

        assert_eq!(result.value, ReturnValue::Word32(-1));
    }

    #[test]
    fn test_putchar_keeps_low_byte() {
        let result = run(
            r#"
            (module
                (import "env" "putchar" (func $putchar (param i32)))
                (func (export "main") (result i32)
                    (call $putchar (i32.const -1))
                    (call $putchar (i32.const 321))
                    (i32.const 0)))
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(result.output, vec![0xff, 0x41]);
    }

    #[test]
    fn test_sparse_memory_erase_through_imports() {
        let result = run(
            r#"
            (module
                (import "env" "mem_get" (func $mem_get (param i64) (result i64)))
                (import "env" "mem_set" (func $mem_set (param i64 i64)))
                (func (export "main") (result i64)
                    (call $mem_set (i64.const 9) (i64.const 1))
                    (call $mem_set (i64.const 9) (i64.const 0))
                    (call $mem_get (i64.const 9))))
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(result.value, ReturnValue::Word64(0));
    }

    #[test]
    fn test_module_without_memory_imports_takes_first_variant() {
        // Nothing constrains the word width here, so the 64-bit attempt
        // succeeds; the result width follows main's actual type.
        let result = run(
            r#"
            (module
                (func (export "main") (result i32) (i32.const 42)))
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(result.variant, AbiVariant::Word64);
        assert_eq!(result.value, ReturnValue::Word32(42));
    }

    #[test]
    fn test_missing_entry_point() {
        let err = run("(module)", &[]).unwrap_err();
        assert!(matches!(err, ExecutorError::MissingEntryPoint));
    }

    #[test]
    fn test_non_function_main_export() {
        let err = run(
            r#"(module (global (export "main") i32 (i32.const 0)))"#,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, ExecutorError::MissingEntryPoint));
    }

    #[test]
    fn test_main_with_parameters_is_rejected() {
        let err = run(
            r#"
            (module
                (func (export "main") (param i32) (result i32)
                    (local.get 0)))
            "#,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, ExecutorError::BadEntryPoint(_)));
    }

    #[test]
    fn test_trap_is_reported() {
        let err = run(
            r#"
            (module
                (func (export "main") (result i32) (unreachable)))
            "#,
            &[],
        )
        .unwrap_err();

        match err {
            ExecutorError::Trap(msg) => assert!(msg.contains("unreachable"), "{msg}"),
            other => panic!("expected trap, got {other:?}"),
        }
    }

    #[test]
    fn test_both_variants_rejected_carries_both_causes() {
        let err = run(
            r#"
            (module
                (import "env" "mem_get" (func $mem_get (param f32) (result f32)))
                (func (export "main") (result i32) (i32.const 0)))
            "#,
            &[],
        )
        .unwrap_err();

        match err {
            ExecutorError::Instantiation { word64, word32 } => {
                assert!(!word64.is_empty());
                assert!(!word32.is_empty());
            }
            other => panic!("expected instantiation failure, got {other:?}"),
        }
        // Both causes appear in the rendered message
        let msg = run(
            r#"
            (module
                (import "env" "mem_get" (func $mem_get (param f32) (result f32)))
                (func (export "main") (result i32) (i32.const 0)))
            "#,
            &[],
        )
        .unwrap_err()
        .to_string();
        assert!(msg.contains("64-bit attempt"));
        assert!(msg.contains("32-bit attempt"));
    }

    #[test]
    fn test_invalid_module_bytes() {
        let err = execute(&[0, 1, 2, 3], Arc::from(&[][..])).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidModule(_)));
    }

    #[test]
    fn test_negative_return_value_word64() {
        let result = run(
            r#"
            (module
                (func (export "main") (result i64) (i64.const -123)))
            "#,
            &[],
        )
        .unwrap();
        assert_eq!(result.value.to_string(), "-123");
    }
}
