//! Host side of the script interface
//!
//! Scripts only see `i32` handles. Each invocation owns a [`HostState`] whose
//! handle table maps those handles to partition snapshots, cursors, records,
//! byte sequences and result collections. Handle `0` is null. A record handle
//! and the key/value handles derived from it are slots owned by their
//! iterator and are overwritten when the iterator advances.

use super::errors::HostFault;
use super::invoker::ScriptArg;
use crate::config::SandboxConfig;
use crate::storage::{ByteSeq, PartitionSnapshot, Record, RecordIterator};
use crate::value::ScalarValue;
use std::sync::Arc;
use tracing::debug;
use wasmtime::{Caller, Extern, Linker, StoreLimits, StoreLimitsBuilder};

/// Module name of the data-access imports
pub const DAO_MODULE: &str = "dao";
/// Module name of the result-collection imports
pub const RESULTS_MODULE: &str = "results";
/// Module name of the ambient imports (logging, legacy globals)
pub const ENV_MODULE: &str = "env";

/// Every import a script may declare
pub const HOST_IMPORTS: &[(&str, &str)] = &[
    (DAO_MODULE, "iterator_from_beginning"),
    (DAO_MODULE, "has_next"),
    (DAO_MODULE, "next"),
    (DAO_MODULE, "get_key"),
    (DAO_MODULE, "get_value"),
    (DAO_MODULE, "remaining"),
    (DAO_MODULE, "byte_at"),
    (RESULTS_MODULE, "len"),
    (RESULTS_MODULE, "get_i64"),
    (RESULTS_MODULE, "get_f64"),
    (RESULTS_MODULE, "iterator"),
    (RESULTS_MODULE, "has_next"),
    (RESULTS_MODULE, "next_i64"),
    (RESULTS_MODULE, "next_f64"),
    (ENV_MODULE, "log"),
    (ENV_MODULE, "dao"),
    (ENV_MODULE, "results"),
];

pub(crate) fn is_host_import(module: &str, name: &str) -> bool {
    HOST_IMPORTS
        .iter()
        .any(|(m, n)| *m == module && *n == name)
}

enum HostObject {
    DataAccess(Arc<dyn PartitionSnapshot>),
    Iterator {
        cursor: Box<dyn RecordIterator>,
        record_slot: i32,
    },
    Record {
        record: Option<Record>,
        key_slot: i32,
        value_slot: i32,
    },
    Bytes(Option<ByteSeq>),
    Results(Arc<[ScalarValue]>),
    ResultsCursor {
        values: Arc<[ScalarValue]>,
        position: usize,
    },
}

impl HostObject {
    fn kind(&self) -> &'static str {
        match self {
            Self::DataAccess(_) => "data-access handle",
            Self::Iterator { .. } => "iterator",
            Self::Record { .. } => "record",
            Self::Bytes(_) => "byte sequence",
            Self::Results(_) => "result collection",
            Self::ResultsCursor { .. } => "result cursor",
        }
    }
}

fn wrong_kind(handle: i32, expected: &'static str, found: &HostObject) -> HostFault {
    HostFault::WrongHandleKind {
        handle,
        expected,
        found: found.kind(),
    }
}

struct HandleTable {
    objects: Vec<HostObject>,
    limit: usize,
}

impl HandleTable {
    fn new(limit: usize) -> Self {
        Self {
            objects: Vec::new(),
            limit,
        }
    }

    fn insert(&mut self, object: HostObject) -> Result<i32, HostFault> {
        if self.objects.len() >= self.limit {
            return Err(HostFault::HandleLimit { limit: self.limit });
        }
        self.objects.push(object);
        i32::try_from(self.objects.len()).map_err(|_| HostFault::HandleLimit { limit: self.limit })
    }

    fn index(&self, handle: i32, operation: &'static str) -> Result<usize, HostFault> {
        if handle == 0 {
            return Err(HostFault::NullHandle { operation });
        }
        handle
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .filter(|i| *i < self.objects.len())
            .ok_or(HostFault::InvalidHandle { handle })
    }

    fn get(&self, handle: i32, operation: &'static str) -> Result<&HostObject, HostFault> {
        let index = self.index(handle, operation)?;
        Ok(&self.objects[index])
    }

    fn get_mut(
        &mut self,
        handle: i32,
        operation: &'static str,
    ) -> Result<&mut HostObject, HostFault> {
        let index = self.index(handle, operation)?;
        Ok(&mut self.objects[index])
    }
}

/// Per-invocation state stored in the wasmtime `Store`
pub(crate) struct HostState {
    pub(crate) limits: StoreLimits,
    handles: HandleTable,
    logs: Vec<String>,
    max_log_lines: usize,
    scope: String,
}

impl HostState {
    pub(crate) fn new(scope: impl Into<String>, config: &SandboxConfig) -> Self {
        let limits = StoreLimitsBuilder::new()
            .memory_size(config.max_memory_bytes)
            .instances(1)
            .build();

        Self {
            limits,
            handles: HandleTable::new(config.max_handles),
            logs: Vec::new(),
            max_log_lines: config.max_log_lines,
            scope: scope.into(),
        }
    }

    /// Materialize an argument as a handle
    pub(crate) fn bind(&mut self, arg: &ScriptArg) -> Result<i32, HostFault> {
        match arg {
            ScriptArg::Null => Ok(0),
            ScriptArg::DataAccess(snapshot) => self
                .handles
                .insert(HostObject::DataAccess(Arc::clone(snapshot))),
            ScriptArg::Results(values) => {
                self.handles.insert(HostObject::Results(Arc::clone(values)))
            }
        }
    }

    pub(crate) fn into_logs(self) -> Vec<String> {
        self.logs
    }

    fn log(&mut self, line: String) {
        debug!(target: "shardscript::script", scope = %self.scope, "{}", line);
        if self.logs.len() < self.max_log_lines {
            self.logs.push(line);
        }
    }

    fn iterator_from_beginning(&mut self, dao: i32) -> Result<i32, HostFault> {
        let snapshot = match self.handles.get(dao, "iterator_from_beginning")? {
            HostObject::DataAccess(snapshot) => Arc::clone(snapshot),
            other => return Err(wrong_kind(dao, "data-access handle", other)),
        };

        let value_slot = self.handles.insert(HostObject::Bytes(None))?;
        let key_slot = self.handles.insert(HostObject::Bytes(None))?;
        let record_slot = self.handles.insert(HostObject::Record {
            record: None,
            key_slot,
            value_slot,
        })?;
        self.handles.insert(HostObject::Iterator {
            cursor: snapshot.iterator_from_beginning(),
            record_slot,
        })
    }

    fn has_next(&self, iter: i32) -> Result<i32, HostFault> {
        match self.handles.get(iter, "has_next")? {
            HostObject::Iterator { cursor, .. } => Ok(i32::from(cursor.has_next())),
            other => Err(wrong_kind(iter, "iterator", other)),
        }
    }

    fn next(&mut self, iter: i32) -> Result<i32, HostFault> {
        let (record, slot) = match self.handles.get_mut(iter, "next")? {
            HostObject::Iterator {
                cursor,
                record_slot,
            } => (
                cursor.next().map_err(|_| HostFault::IteratorExhausted)?,
                *record_slot,
            ),
            other => return Err(wrong_kind(iter, "iterator", other)),
        };

        if let HostObject::Record { record: current, .. } = self.handles.get_mut(slot, "next")? {
            *current = Some(record);
        }
        Ok(slot)
    }

    fn record_part(
        &mut self,
        handle: i32,
        operation: &'static str,
        want_key: bool,
    ) -> Result<i32, HostFault> {
        let (bytes, slot) = match self.handles.get(handle, operation)? {
            HostObject::Record {
                record: Some(record),
                key_slot,
                value_slot,
            } => {
                if want_key {
                    (record.key().clone(), *key_slot)
                } else {
                    (record.value().clone(), *value_slot)
                }
            }
            HostObject::Record { record: None, .. } => {
                return Err(HostFault::InvalidHandle { handle })
            }
            other => return Err(wrong_kind(handle, "record", other)),
        };

        if let HostObject::Bytes(current) = self.handles.get_mut(slot, operation)? {
            *current = Some(bytes);
        }
        Ok(slot)
    }

    fn bytes(&self, handle: i32, operation: &'static str) -> Result<&ByteSeq, HostFault> {
        match self.handles.get(handle, operation)? {
            HostObject::Bytes(Some(bytes)) => Ok(bytes),
            HostObject::Bytes(None) => Err(HostFault::InvalidHandle { handle }),
            other => Err(wrong_kind(handle, "byte sequence", other)),
        }
    }

    fn remaining(&self, handle: i32) -> Result<i64, HostFault> {
        let bytes = self.bytes(handle, "remaining")?;
        Ok(i64::try_from(bytes.remaining()).unwrap_or(i64::MAX))
    }

    fn byte_at(&self, handle: i32, index: i32) -> Result<i32, HostFault> {
        let bytes = self.bytes(handle, "byte_at")?;
        usize::try_from(index)
            .ok()
            .and_then(|i| bytes.byte_at(i))
            .map(i32::from)
            .ok_or(HostFault::IndexOutOfBounds {
                index: i64::from(index),
                len: bytes.remaining(),
            })
    }

    fn results(
        &self,
        handle: i32,
        operation: &'static str,
    ) -> Result<&Arc<[ScalarValue]>, HostFault> {
        match self.handles.get(handle, operation)? {
            HostObject::Results(values) => Ok(values),
            other => Err(wrong_kind(handle, "result collection", other)),
        }
    }

    fn results_len(&self, handle: i32) -> Result<i32, HostFault> {
        let values = self.results(handle, "len")?;
        Ok(i32::try_from(values.len()).unwrap_or(i32::MAX))
    }

    fn results_get(&self, handle: i32, index: i32) -> Result<ScalarValue, HostFault> {
        let values = self.results(handle, "get")?;
        usize::try_from(index)
            .ok()
            .and_then(|i| values.get(i).copied())
            .ok_or(HostFault::IndexOutOfBounds {
                index: i64::from(index),
                len: values.len(),
            })
    }

    fn results_iterator(&mut self, handle: i32) -> Result<i32, HostFault> {
        let values = Arc::clone(self.results(handle, "iterator")?);
        self.handles.insert(HostObject::ResultsCursor {
            values,
            position: 0,
        })
    }

    fn cursor_has_next(&self, handle: i32) -> Result<i32, HostFault> {
        match self.handles.get(handle, "has_next")? {
            HostObject::ResultsCursor { values, position } => {
                Ok(i32::from(*position < values.len()))
            }
            other => Err(wrong_kind(handle, "result cursor", other)),
        }
    }

    fn cursor_next(&mut self, handle: i32) -> Result<ScalarValue, HostFault> {
        match self.handles.get_mut(handle, "next")? {
            HostObject::ResultsCursor { values, position } => {
                let value = values
                    .get(*position)
                    .copied()
                    .ok_or(HostFault::IteratorExhausted)?;
                *position += 1;
                Ok(value)
            }
            other => Err(wrong_kind(handle, "result cursor", other)),
        }
    }
}

fn trap(fault: HostFault) -> wasmtime::Error {
    wasmtime::Error::new(fault)
}

fn read_log_line(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> Result<String, HostFault> {
    let memory = caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or(HostFault::MemoryAccess)?;

    let start = ptr as u32 as usize;
    let len = usize::try_from(len).map_err(|_| HostFault::MemoryAccess)?;
    let end = start.checked_add(len).ok_or(HostFault::MemoryAccess)?;

    let bytes = memory
        .data(&*caller)
        .get(start..end)
        .ok_or(HostFault::MemoryAccess)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Install every host function on `linker`
pub(crate) fn register(linker: &mut Linker<HostState>) -> wasmtime::Result<()> {
    linker.func_wrap(
        DAO_MODULE,
        "iterator_from_beginning",
        |mut caller: Caller<'_, HostState>, dao: i32| -> wasmtime::Result<i32> {
            caller.data_mut().iterator_from_beginning(dao).map_err(trap)
        },
    )?;
    linker.func_wrap(
        DAO_MODULE,
        "has_next",
        |caller: Caller<'_, HostState>, iter: i32| -> wasmtime::Result<i32> {
            caller.data().has_next(iter).map_err(trap)
        },
    )?;
    linker.func_wrap(
        DAO_MODULE,
        "next",
        |mut caller: Caller<'_, HostState>, iter: i32| -> wasmtime::Result<i32> {
            caller.data_mut().next(iter).map_err(trap)
        },
    )?;
    linker.func_wrap(
        DAO_MODULE,
        "get_key",
        |mut caller: Caller<'_, HostState>, record: i32| -> wasmtime::Result<i32> {
            caller
                .data_mut()
                .record_part(record, "get_key", true)
                .map_err(trap)
        },
    )?;
    linker.func_wrap(
        DAO_MODULE,
        "get_value",
        |mut caller: Caller<'_, HostState>, record: i32| -> wasmtime::Result<i32> {
            caller
                .data_mut()
                .record_part(record, "get_value", false)
                .map_err(trap)
        },
    )?;
    linker.func_wrap(
        DAO_MODULE,
        "remaining",
        |caller: Caller<'_, HostState>, bytes: i32| -> wasmtime::Result<i64> {
            caller.data().remaining(bytes).map_err(trap)
        },
    )?;
    linker.func_wrap(
        DAO_MODULE,
        "byte_at",
        |caller: Caller<'_, HostState>, bytes: i32, index: i32| -> wasmtime::Result<i32> {
            caller.data().byte_at(bytes, index).map_err(trap)
        },
    )?;

    linker.func_wrap(
        RESULTS_MODULE,
        "len",
        |caller: Caller<'_, HostState>, results: i32| -> wasmtime::Result<i32> {
            caller.data().results_len(results).map_err(trap)
        },
    )?;
    linker.func_wrap(
        RESULTS_MODULE,
        "get_i64",
        |caller: Caller<'_, HostState>, results: i32, index: i32| -> wasmtime::Result<i64> {
            caller
                .data()
                .results_get(results, index)
                .map(ScalarValue::as_i64)
                .map_err(trap)
        },
    )?;
    linker.func_wrap(
        RESULTS_MODULE,
        "get_f64",
        |caller: Caller<'_, HostState>, results: i32, index: i32| -> wasmtime::Result<f64> {
            caller
                .data()
                .results_get(results, index)
                .map(ScalarValue::as_f64)
                .map_err(trap)
        },
    )?;
    linker.func_wrap(
        RESULTS_MODULE,
        "iterator",
        |mut caller: Caller<'_, HostState>, results: i32| -> wasmtime::Result<i32> {
            caller.data_mut().results_iterator(results).map_err(trap)
        },
    )?;
    linker.func_wrap(
        RESULTS_MODULE,
        "has_next",
        |caller: Caller<'_, HostState>, cursor: i32| -> wasmtime::Result<i32> {
            caller.data().cursor_has_next(cursor).map_err(trap)
        },
    )?;
    linker.func_wrap(
        RESULTS_MODULE,
        "next_i64",
        |mut caller: Caller<'_, HostState>, cursor: i32| -> wasmtime::Result<i64> {
            caller
                .data_mut()
                .cursor_next(cursor)
                .map(ScalarValue::as_i64)
                .map_err(trap)
        },
    )?;
    linker.func_wrap(
        RESULTS_MODULE,
        "next_f64",
        |mut caller: Caller<'_, HostState>, cursor: i32| -> wasmtime::Result<f64> {
            caller
                .data_mut()
                .cursor_next(cursor)
                .map(ScalarValue::as_f64)
                .map_err(trap)
        },
    )?;

    linker.func_wrap(
        ENV_MODULE,
        "log",
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
            let line = read_log_line(&mut caller, ptr, len).map_err(trap)?;
            caller.data_mut().log(line);
            Ok(())
        },
    )?;

    Ok(())
}
