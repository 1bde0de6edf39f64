//! Sandboxed invocation of a single script function

use super::engine::{CompiledScript, ScriptEngine};
use super::errors::{HostFault, Interrupt, ScriptError};
use super::host::{HostState, ENV_MODULE};
use crate::storage::PartitionSnapshot;
use crate::value::{ScalarValue, ScriptValue};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{trace, warn};
use wasmtime::{
    FuncType, Global, GlobalType, Mutability, Store, Trap, UpdateDeadline, Val, ValType,
};

/// Cooperative cancellation signal shared between a caller and running scripts.
///
/// Raising the flag aborts every sandbox watching it at the next epoch tick
/// and wakes every task parked in [`cancelled`](Self::cancelled).
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    raised: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.raised.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.raised.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is raised
    pub async fn cancelled(&self) {
        // Register before checking so a concurrent `cancel` cannot be missed
        let notified = self.0.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// An argument handed to a script function
#[derive(Clone)]
pub enum ScriptArg {
    /// The null handle
    Null,
    /// A partition's data-access handle
    DataAccess(Arc<dyn PartitionSnapshot>),
    /// The ordered result collection
    Results(Arc<[ScalarValue]>),
}

impl fmt::Debug for ScriptArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::DataAccess(snapshot) => {
                f.debug_tuple("DataAccess").field(&snapshot.partition()).finish()
            }
            Self::Results(values) => f.debug_tuple("Results").field(&values.len()).finish(),
        }
    }
}

/// Outcome of one successful invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub value: ScriptValue,
    pub logs: Vec<String>,
    pub elapsed: Duration,
}

/// Runs functions of one compiled script, one fresh instance per call
#[derive(Debug, Clone)]
pub struct SandboxInvoker {
    engine: Arc<ScriptEngine>,
    script: CompiledScript,
}

impl SandboxInvoker {
    pub fn new(engine: Arc<ScriptEngine>, script: CompiledScript) -> Self {
        Self { engine, script }
    }

    pub fn script(&self) -> &CompiledScript {
        &self.script
    }

    /// Invoke `function` with `args`, blocking the current thread.
    ///
    /// The script is aborted once `deadline` passes or `cancel` is raised.
    pub fn invoke(
        &self,
        function: &str,
        args: &[ScriptArg],
        deadline: Instant,
        cancel: &CancelFlag,
    ) -> Result<Invocation, ScriptError> {
        let started = Instant::now();
        let budget = deadline.saturating_duration_since(started);

        if cancel.is_cancelled() {
            return Err(ScriptError::Cancelled {
                function: function.to_string(),
            });
        }
        if budget.is_zero() {
            return Err(ScriptError::Timeout {
                function: function.to_string(),
                budget,
            });
        }

        let ty = self
            .script
            .function_type(function)
            .ok_or_else(|| ScriptError::MissingFunction {
                name: function.to_string(),
            })?;

        let config = self.engine.config();
        let mut store = Store::new(
            self.engine.wasm(),
            HostState::new(scope_of(function, args), config),
        );
        store.limiter(|state| &mut state.limits);
        store.set_epoch_deadline(1);

        let watcher = cancel.clone();
        store.epoch_deadline_callback(move |_| {
            if watcher.is_cancelled() {
                return Err(wasmtime::Error::new(Interrupt::Cancelled));
            }
            if Instant::now() >= deadline {
                return Err(wasmtime::Error::new(Interrupt::Deadline));
            }
            Ok(UpdateDeadline::Continue(1))
        });

        let mut handles = Vec::with_capacity(args.len());
        let mut dao = 0;
        let mut results = 0;
        for arg in args {
            let handle = store
                .data_mut()
                .bind(arg)
                .map_err(|fault| runtime_fault(function, fault))?;
            match arg {
                ScriptArg::DataAccess(_) if dao == 0 => dao = handle,
                ScriptArg::Results(_) if results == 0 => results = handle,
                _ => {}
            }
            handles.push(handle);
        }

        let params = adapt_arguments(function, &ty, &handles)?;

        let mut linker = self.engine.linker().clone();
        for (name, handle) in [("dao", dao), ("results", results)] {
            let global = Global::new(
                &mut store,
                GlobalType::new(ValType::I32, Mutability::Const),
                Val::I32(handle),
            )
            .map_err(|e| classify(function, e, budget))?;
            linker
                .define(&store, ENV_MODULE, name, global)
                .map_err(|e| classify(function, e, budget))?;
        }

        let instance = linker
            .instantiate(&mut store, self.script.module())
            .map_err(|e| classify(function, e, budget))?;
        let func = instance
            .get_func(&mut store, function)
            .ok_or_else(|| ScriptError::MissingFunction {
                name: function.to_string(),
            })?;

        let mut returned = vec![Val::I32(0); ty.results().len()];
        func.call(&mut store, &params, &mut returned)
            .map_err(|e| classify(function, e, budget))?;

        let elapsed = started.elapsed();
        trace!("{} returned after {:?}", function, elapsed);

        Ok(Invocation {
            value: script_value(&returned),
            logs: store.into_data().into_logs(),
            elapsed,
        })
    }

    /// Run [`invoke`](Self::invoke) on the blocking pool
    pub async fn invoke_async(
        &self,
        function: &str,
        args: Vec<ScriptArg>,
        deadline: Instant,
        cancel: CancelFlag,
    ) -> Result<Invocation, ScriptError> {
        let invoker = self.clone();
        let name = function.to_string();

        tokio::task::spawn_blocking(move || invoker.invoke(&name, &args, deadline, &cancel))
            .await
            .map_err(|e| ScriptError::Runtime {
                function: function.to_string(),
                message: format!("sandbox worker failed: {e}"),
                fault: None,
            })?
    }
}

fn scope_of(function: &str, args: &[ScriptArg]) -> String {
    args.iter()
        .find_map(|arg| match arg {
            ScriptArg::DataAccess(snapshot) => Some(format!("{function}@{}", snapshot.partition())),
            _ => None,
        })
        .unwrap_or_else(|| function.to_string())
}

fn type_name(ty: &ValType) -> &'static str {
    match ty {
        ValType::I32 => "i32",
        ValType::I64 => "i64",
        ValType::F32 => "f32",
        ValType::F64 => "f64",
        ValType::V128 => "v128",
        _ => "ref",
    }
}

fn describe_signature(ty: &FuncType) -> String {
    let params: Vec<&str> = ty.params().map(|p| type_name(&p)).collect();
    let results: Vec<&str> = ty.results().map(|r| type_name(&r)).collect();
    format!("({}) -> ({})", params.join(", "), results.join(", "))
}

/// Map supplied handles onto the parameters `ty` declares.
///
/// Extra declared parameters are filled with null handles in the leading
/// slots. A function taking no parameters reads the ambient `env` globals.
fn adapt_arguments(
    function: &str,
    ty: &FuncType,
    handles: &[i32],
) -> Result<Vec<Val>, ScriptError> {
    let signature_error = || ScriptError::Signature {
        name: function.to_string(),
        found: describe_signature(ty),
    };

    if ty.params().any(|p| !matches!(p, ValType::I32)) {
        return Err(signature_error());
    }

    let declared = ty.params().len();
    let supplied = handles.len();

    if declared == supplied {
        return Ok(handles.iter().copied().map(Val::I32).collect());
    }
    if declared == 0 {
        warn!(
            "{} takes no parameters; relying on ambient handles is deprecated",
            function
        );
        return Ok(Vec::new());
    }
    if declared > supplied {
        warn!(
            "{} declares {} parameters, {} supplied; padding leading slots with null",
            function, declared, supplied
        );
        let mut params = vec![Val::I32(0); declared - supplied];
        params.extend(handles.iter().copied().map(Val::I32));
        return Ok(params);
    }

    Err(signature_error())
}

fn script_value(returned: &[Val]) -> ScriptValue {
    match returned {
        [] => ScriptValue::Unit,
        [Val::I32(v)] => ScriptValue::I32(*v),
        [Val::I64(v)] => ScriptValue::I64(*v),
        [Val::F32(bits)] => ScriptValue::F32(f32::from_bits(*bits)),
        [Val::F64(bits)] => ScriptValue::F64(f64::from_bits(*bits)),
        [_] => ScriptValue::Other("a non-numeric value".to_string()),
        many => ScriptValue::Other(format!("{} values", many.len())),
    }
}

fn runtime_fault(function: &str, fault: HostFault) -> ScriptError {
    ScriptError::Runtime {
        function: function.to_string(),
        message: fault.to_string(),
        fault: Some(fault),
    }
}

fn classify(function: &str, err: wasmtime::Error, budget: Duration) -> ScriptError {
    if let Some(interrupt) = err.downcast_ref::<Interrupt>() {
        return match interrupt {
            Interrupt::Deadline => ScriptError::Timeout {
                function: function.to_string(),
                budget,
            },
            Interrupt::Cancelled => ScriptError::Cancelled {
                function: function.to_string(),
            },
        };
    }

    if let Some(fault) = err.downcast_ref::<HostFault>() {
        return runtime_fault(function, fault.clone());
    }

    let message = match err.downcast_ref::<Trap>() {
        Some(trap) => trap.to_string(),
        None => format!("{err:#}"),
    };
    ScriptError::Runtime {
        function: function.to_string(),
        message,
        fault: None,
    }
}
