//! Script engine: compilation, validation and the epoch ticker

use super::errors::ScriptError;
use super::host::{self, HostState};
use crate::config::SandboxConfig;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};
use wasmtime::{Config, Engine, ExternType, FuncType, Linker, Module};

/// Shared WebAssembly engine with the host interface pre-linked.
///
/// One engine serves every query. Scripts compiled against it are cheap to
/// instantiate, and each invocation gets its own store.
pub struct ScriptEngine {
    engine: Engine,
    linker: Linker<HostState>,
    config: SandboxConfig,
    _ticker: EpochTicker,
}

impl ScriptEngine {
    pub fn new(config: SandboxConfig) -> Result<Self, ScriptError> {
        let mut wasm_config = Config::new();
        wasm_config.epoch_interruption(true);

        let engine = Engine::new(&wasm_config).map_err(|e| ScriptError::Engine {
            message: e.to_string(),
        })?;

        let mut linker = Linker::new(&engine);
        host::register(&mut linker).map_err(|e| ScriptError::Engine {
            message: e.to_string(),
        })?;

        let ticker = EpochTicker::start(engine.clone(), config.epoch_tick)?;
        debug!(
            "Script engine ready (epoch tick {:?}, memory cap {} bytes)",
            config.epoch_tick, config.max_memory_bytes
        );

        Ok(Self {
            engine,
            linker,
            config,
            _ticker: ticker,
        })
    }

    /// Compile a script from WebAssembly text or binary.
    ///
    /// Rejects modules that import anything outside the host interface.
    pub fn compile(&self, source: impl AsRef<[u8]>) -> Result<CompiledScript, ScriptError> {
        let module = Module::new(&self.engine, source.as_ref()).map_err(|e| {
            ScriptError::Compile {
                message: format!("{e:#}"),
            }
        })?;

        for import in module.imports() {
            if !host::is_host_import(import.module(), import.name()) {
                warn!(
                    "Script imports unknown host item {}.{}",
                    import.module(),
                    import.name()
                );
                return Err(ScriptError::Compile {
                    message: format!(
                        "unknown import {}.{}",
                        import.module(),
                        import.name()
                    ),
                });
            }
        }

        Ok(CompiledScript {
            module: Arc::new(module),
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub(crate) fn wasm(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn linker(&self) -> &Linker<HostState> {
        &self.linker
    }
}

impl fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A validated, compiled script module
#[derive(Clone)]
pub struct CompiledScript {
    module: Arc<Module>,
}

impl CompiledScript {
    /// Whether the module exports a function called `name`
    pub fn exports_function(&self, name: &str) -> bool {
        self.function_type(name).is_some()
    }

    /// Fail with [`ScriptError::MissingFunction`] unless `name` is exported
    pub fn require_function(&self, name: &str) -> Result<(), ScriptError> {
        if self.exports_function(name) {
            Ok(())
        } else {
            Err(ScriptError::MissingFunction {
                name: name.to_string(),
            })
        }
    }

    pub(crate) fn function_type(&self, name: &str) -> Option<FuncType> {
        match self.module.get_export(name)? {
            ExternType::Func(ty) => Some(ty),
            _ => None,
        }
    }

    pub(crate) fn module(&self) -> &Module {
        &self.module
    }
}

impl fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exports: Vec<&str> = self.module.exports().map(|e| e.name()).collect();
        f.debug_struct("CompiledScript")
            .field("exports", &exports)
            .finish()
    }
}

/// Advances the engine epoch on a fixed tick until dropped
struct EpochTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EpochTicker {
    fn start(engine: Engine, tick: Duration) -> Result<Self, ScriptError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("shardscript-epoch".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    thread::sleep(tick);
                    engine.increment_epoch();
                }
            })
            .map_err(|e| ScriptError::Engine {
                message: format!("failed to start epoch ticker: {e}"),
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ScriptEngine {
        ScriptEngine::new(SandboxConfig::default()).unwrap()
    }

    #[test]
    fn test_compiles_text_modules() {
        let script = engine()
            .compile(r#"(module (func (export "onNode") (param i32) (result i64) i64.const 1))"#)
            .unwrap();
        assert!(script.exports_function("onNode"));
        assert!(!script.exports_function("onReducer"));
    }

    #[test]
    fn test_missing_function_is_reported() {
        let script = engine().compile("(module)").unwrap();
        let err = script.require_function("onNode").unwrap_err();
        assert!(matches!(err, ScriptError::MissingFunction { ref name } if name == "onNode"));
        assert_eq!(err.to_string(), "required function onNode not found");
    }

    #[test]
    fn test_malformed_source_is_a_compile_error() {
        let err = engine().compile("(module (func").unwrap_err();
        assert!(matches!(err, ScriptError::Compile { .. }));
    }

    #[test]
    fn test_rejects_imports_outside_host_interface() {
        let err = engine()
            .compile(
                r#"(module (import "wasi_snapshot_preview1" "proc_exit" (func (param i32))))"#,
            )
            .unwrap_err();
        match err {
            ScriptError::Compile { message } => {
                assert!(message.contains("wasi_snapshot_preview1.proc_exit"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
