//! Callbacks - native code calling managed objects
//!
//! A managed object implementing a callback interface crosses the boundary as
//! a `u64` handle. The native side calls back through a [`CallbackVTable`]:
//! one `extern "C"` dispatch function per method plus a `free` function that
//! drops the handle.
//!
//! Each interface owns one [`CallbackRegistry`]: a handle table (ids start at
//! 1 and are never reused) plus the method decoders. Handle spaces of
//! different interfaces are independent.
//!
//! ```
//! use isthmus_runtime::ffi::callbacks::{dispatch_method, free_handle, CallbackInterface, CallbackMethod, CallbackRegistry};
//! use isthmus_runtime::ffi::CallbackMethodFn;
//! use std::sync::OnceLock;
//!
//! pub trait EventListener: Send + Sync {
//!     fn on_event(&self, key: String, payload: Vec<u8>);
//! }
//!
//! struct EventListenerCallbacks;
//!
//! impl CallbackInterface for EventListenerCallbacks {
//!     type Object = dyn EventListener;
//!     const DISPATCH: &'static [CallbackMethodFn] = &[dispatch_method::<Self, 0>];
//!
//!     fn registry() -> &'static CallbackRegistry<dyn EventListener> {
//!         static REGISTRY: OnceLock<CallbackRegistry<dyn EventListener>> = OnceLock::new();
//!         REGISTRY.get_or_init(|| {
//!             CallbackRegistry::new(
//!                 "EventListener",
//!                 vec![CallbackMethod::<dyn EventListener>::new(
//!                     "on_event",
//!                     |obj, (key, payload): (String, Vec<u8>)| obj.on_event(key, payload),
//!                 )],
//!             )
//!         })
//!     }
//! }
//! ```

use crate::error::{Fault, MarshalError, ProtocolError};
use crate::ffi::buffer::{self, OwnedBuffer};
use crate::ffi::marshal::{self, Marshal};
use crate::ffi::native::NativeRuntime;
use crate::ffi::safety::catch_panic;
use crate::ffi::types::{CallStatus, CallbackFreeFn, CallbackMethodFn, CallbackVTable, TransferBuffer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use thiserror::Error;

/// Id-keyed table of live callback objects.
///
/// Ids are handed out monotonically from 1 and never reused.
pub struct HandleTable<T: ?Sized> {
    state: RwLock<TableState<T>>,
}

struct TableState<T: ?Sized> {
    next_id: u64,
    entries: HashMap<u64, Arc<T>>,
}

impl<T: ?Sized> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(TableState {
                next_id: 0,
                entries: HashMap::new(),
            }),
        }
    }

    /// Store `object` under a fresh id.
    pub fn insert(&self, object: Arc<T>) -> u64 {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.next_id += 1;
        let handle = state.next_id;
        state.entries.insert(handle, object);
        handle
    }

    pub fn get(&self, handle: u64) -> Option<Arc<T>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.get(&handle).cloned()
    }

    pub fn remove(&self, handle: u64) -> Option<Arc<T>> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.remove(&handle)
    }

    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a dispatch did not produce a return value.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Declared error, already encoded; reported as `Error`
    #[error("callback returned a declared error")]
    Declared(Vec<u8>),

    /// Reported as `Panic`
    #[error(transparent)]
    Fault(#[from] Fault),

    /// The callback panicked; reported as `Panic`
    #[error("callback panicked: {0}")]
    Panicked(String),
}

impl From<MarshalError> for DispatchError {
    fn from(err: MarshalError) -> Self {
        DispatchError::Fault(err.into())
    }
}

impl From<ProtocolError> for DispatchError {
    fn from(err: ProtocolError) -> Self {
        DispatchError::Fault(err.into())
    }
}

type Invoker<T> = Box<dyn Fn(&T, &[u8]) -> Result<Vec<u8>, DispatchError> + Send + Sync>;

/// One method of a callback interface: decodes arguments, calls the object,
/// encodes the result.
pub struct CallbackMethod<T: ?Sized> {
    name: &'static str,
    invoke: Invoker<T>,
}

impl<T: ?Sized + 'static> CallbackMethod<T> {
    /// Method without a declared error. Arguments arrive as a tuple.
    pub fn new<A, R, F>(name: &'static str, method: F) -> Self
    where
        A: Marshal + 'static,
        R: Marshal + 'static,
        F: Fn(&T, A) -> R + Send + Sync + 'static,
    {
        Self {
            name,
            invoke: Box::new(move |object: &T, args: &[u8]| {
                let args = marshal::decode::<A>(args)?;
                Ok(marshal::encode(&method(object, args))?)
            }),
        }
    }

    /// Method declaring error type `E`, reported to the native side as an
    /// `Error` status.
    pub fn fallible<A, R, E, F>(name: &'static str, method: F) -> Self
    where
        A: Marshal + 'static,
        R: Marshal + 'static,
        E: Marshal + 'static,
        F: Fn(&T, A) -> Result<R, E> + Send + Sync + 'static,
    {
        Self {
            name,
            invoke: Box::new(move |object: &T, args: &[u8]| {
                let args = marshal::decode::<A>(args)?;
                match method(object, args) {
                    Ok(value) => Ok(marshal::encode(&value)?),
                    Err(err) => Err(DispatchError::Declared(marshal::encode(&err)?)),
                }
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Registry for one callback interface.
pub struct CallbackRegistry<T: ?Sized> {
    interface: &'static str,
    table: HandleTable<T>,
    methods: Vec<CallbackMethod<T>>,
    native: OnceLock<Arc<dyn NativeRuntime>>,
    vtable: OnceLock<CallbackVTable>,
    installing: Mutex<()>,
}

impl<T: ?Sized + Send + Sync + 'static> CallbackRegistry<T> {
    pub fn new(interface: &'static str, methods: Vec<CallbackMethod<T>>) -> Self {
        Self {
            interface,
            table: HandleTable::new(),
            methods,
            native: OnceLock::new(),
            vtable: OnceLock::new(),
            installing: Mutex::new(()),
        }
    }

    pub fn interface(&self) -> &'static str {
        self.interface
    }

    pub fn method_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.iter().map(|m| m.name)
    }

    /// Register a managed object; the handle is what crosses the boundary.
    pub fn register(&self, object: Arc<T>) -> u64 {
        let handle = self.table.insert(object);
        tracing::debug!(interface = self.interface, handle, "registered callback");
        handle
    }

    /// Drop the registration. Returns whether the handle was live.
    pub fn release(&self, handle: u64) -> bool {
        let removed = self.table.remove(handle).is_some();
        tracing::debug!(interface = self.interface, handle, removed, "released callback");
        removed
    }

    pub fn lookup(&self, handle: u64) -> Result<Arc<T>, Fault> {
        self.table.get(handle).ok_or_else(|| {
            ProtocolError::UnknownCallbackHandle {
                interface: self.interface,
                handle,
            }
            .into()
        })
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Invoke method `index` on the object behind `handle` with encoded
    /// arguments, returning the encoded result.
    ///
    /// The table lock is not held while the method runs.
    pub fn dispatch(&self, handle: u64, index: usize, args: &[u8]) -> Result<Vec<u8>, DispatchError> {
        let method = self.methods.get(index).ok_or(ProtocolError::UnknownMethod {
            interface: self.interface,
            index,
        })?;
        let object = self.lookup(handle)?;
        tracing::trace!(interface = self.interface, method = method.name, handle, "dispatching callback");
        (method.invoke)(&*object, args)
    }

    /// Hand the dispatch table to the native side.
    ///
    /// The registry binds to the first runtime that accepts the table.
    /// Installing again on that runtime is a no-op; any other runtime is
    /// rejected. A failed native init leaves the registry unbound.
    pub fn install(
        &'static self,
        native: &Arc<dyn NativeRuntime>,
        dispatch: &'static [CallbackMethodFn],
        free: CallbackFreeFn,
    ) -> Result<(), Fault> {
        if dispatch.len() != self.methods.len() {
            return Err(ProtocolError::VTableMismatch {
                interface: self.interface,
                provided: dispatch.len(),
                declared: self.methods.len(),
            }
            .into());
        }
        let _installing = self.installing.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bound) = self.native.get() {
            if Arc::ptr_eq(bound, native) {
                return Ok(());
            }
            return Err(ProtocolError::CallbackRuntimeMismatch {
                interface: self.interface,
            }
            .into());
        }

        let vtable = self.vtable.get_or_init(|| CallbackVTable::from_methods(dispatch, free));
        tracing::debug!(interface = self.interface, methods = dispatch.len(), "installing callback vtable");
        native.init_callback_vtable(self.interface, vtable)?;
        if self.native.set(Arc::clone(native)).is_err() {
            // Unreachable while `installing` is held
            return Err(ProtocolError::CallbackRuntimeMismatch {
                interface: self.interface,
            }
            .into());
        }
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.native.get().is_some()
    }

    /// Body of the `extern "C"` dispatch functions. Never unwinds.
    fn dispatch_raw(
        &self,
        handle: u64,
        index: usize,
        args: TransferBuffer,
        out_return: *mut TransferBuffer,
        status: &mut CallStatus,
    ) {
        let Some(native) = self.native.get() else {
            tracing::error!(interface = self.interface, handle, "callback dispatched before install");
            status.set_panic(TransferBuffer::empty());
            return;
        };
        let native: &dyn NativeRuntime = native.as_ref();

        let outcome = {
            // Safety: the argument buffer is handed over by the native caller
            let args = unsafe { OwnedBuffer::from_raw(native, args) };
            catch_panic(|| self.dispatch(handle, index, args.as_slice()))
                .unwrap_or_else(|message| Err(DispatchError::Panicked(message)))
        };

        match outcome {
            Ok(bytes) => match buffer::buffer_from_bytes(native, &bytes) {
                Ok(result) if !out_return.is_null() => {
                    // Safety: non-null out-parameter supplied by the native caller
                    unsafe { *out_return = result };
                    *status = CallStatus::new();
                }
                Ok(result) => {
                    // Nowhere to put the result; release it
                    drop(unsafe { OwnedBuffer::from_raw(native, result) });
                    *status = CallStatus::new();
                }
                Err(fault) => self.report_panic(native, status, &fault.to_string()),
            },
            Err(DispatchError::Declared(bytes)) => match buffer::buffer_from_bytes(native, &bytes) {
                Ok(payload) => status.set_error(payload),
                Err(fault) => self.report_panic(native, status, &fault.to_string()),
            },
            Err(DispatchError::Fault(fault)) => {
                tracing::error!(interface = self.interface, handle, %fault, "callback dispatch failed");
                self.report_panic(native, status, &fault.to_string());
            }
            Err(DispatchError::Panicked(message)) => {
                tracing::error!(interface = self.interface, handle, %message, "callback panicked");
                self.report_panic(native, status, &message);
            }
        }
    }

    fn report_panic(&self, native: &dyn NativeRuntime, status: &mut CallStatus, message: &str) {
        let payload = buffer::buffer_from_bytes(native, message.as_bytes()).unwrap_or_else(|fault| {
            tracing::error!(interface = self.interface, %fault, "could not allocate panic message");
            TransferBuffer::empty()
        });
        status.set_panic(payload);
    }
}

/// A callback interface: its registry and its static dispatch table.
///
/// `DISPATCH` lists `dispatch_method::<Self, M>` for every method index `M`
/// in registry order.
pub trait CallbackInterface: Sized + 'static {
    type Object: ?Sized + Send + Sync + 'static;

    const DISPATCH: &'static [CallbackMethodFn];

    fn registry() -> &'static CallbackRegistry<Self::Object>;

    /// Install this interface's vtable with the native side.
    fn install(native: &Arc<dyn NativeRuntime>) -> Result<(), Fault> {
        Self::registry().install(native, Self::DISPATCH, free_handle::<Self>)
    }

    /// Register an object and return the handle to pass as an argument.
    fn lower(object: Arc<Self::Object>) -> u64 {
        Self::registry().register(object)
    }

    /// Resolve a handle received from the native side.
    fn lift(handle: u64) -> Result<Arc<Self::Object>, Fault> {
        Self::registry().lookup(handle)
    }
}

/// Dispatch entry point for method `M` of interface `I`.
pub extern "C" fn dispatch_method<I: CallbackInterface, const M: usize>(
    handle: u64,
    args: TransferBuffer,
    out_return: *mut TransferBuffer,
    status: *mut CallStatus,
) {
    // Safety: the native caller passes a valid status out-parameter or null
    let Some(status) = (unsafe { status.as_mut() }) else {
        tracing::error!(handle, method = M, "callback dispatched without a status pointer");
        return;
    };
    let outcome = catch_panic(|| I::registry().dispatch_raw(handle, M, args, out_return, status));
    if let Err(message) = outcome {
        // No registry means no allocator to carry the message
        tracing::error!(handle, method = M, %message, "callback registry unavailable");
        status.set_panic(TransferBuffer::empty());
    }
}

/// Free entry point for interface `I`.
pub extern "C" fn free_handle<I: CallbackInterface>(handle: u64) {
    let outcome = catch_panic(|| {
        let registry = I::registry();
        if !registry.release(handle) {
            tracing::warn!(interface = registry.interface(), handle, "free for unknown callback handle");
        }
    });
    if let Err(message) = outcome {
        tracing::error!(handle, %message, "callback free panicked");
    }
}
