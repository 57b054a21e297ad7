//! Shared test utilities
//!
//! `StubRuntime` stands in for a native library: it allocates transfer
//! buffers on the Rust heap, counts live allocations, serves a fixed contract,
//! and records installed callback vtables. `FakeObject` plays a native-owned
//! object with counted clone/free entry points.

#![allow(dead_code)]

use isthmus_runtime::ffi::{CallStatus, CallbackVTable, ForeignBytes, NativeRuntime, TransferBuffer};
use isthmus_runtime::{Fault, ProtocolError};
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

pub use pretty_assertions::{assert_eq, assert_ne};

pub const NAMESPACE: &str = "torii";
pub const CONTRACT_VERSION: u32 = 26;

/// In-process native library
pub struct StubRuntime {
    version: u32,
    checksums: HashMap<String, u16>,
    live: AtomicIsize,
    freed: AtomicUsize,
    vtables: Mutex<HashMap<String, &'static CallbackVTable>>,
    failing_inits: AtomicUsize,
    init_calls: AtomicUsize,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self {
            version: CONTRACT_VERSION,
            checksums: HashMap::new(),
            live: AtomicIsize::new(0),
            freed: AtomicUsize::new(0),
            vtables: Mutex::new(HashMap::new()),
            failing_inits: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
        }
    }

    /// Reject the next `count` vtable registrations
    pub fn failing_inits(self, count: usize) -> Self {
        self.failing_inits.store(count, Ordering::SeqCst);
        self
    }

    /// Vtable registrations attempted, including rejected ones
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_checksum(mut self, symbol: &str, value: u16) -> Self {
        self.checksums.insert(symbol.to_string(), value);
        self
    }

    pub fn shared(self) -> Arc<dyn NativeRuntime> {
        Arc::new(self)
    }

    /// Buffers allocated and not yet released
    pub fn live_buffers(&self) -> isize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn freed_buffers(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }

    /// A buffer as a native entry point would return it
    pub fn alloc(&self, bytes: &[u8]) -> TransferBuffer {
        if bytes.is_empty() {
            return TransferBuffer::empty();
        }
        let boxed: Box<[u8]> = bytes.into();
        let len = boxed.len() as u64;
        self.live.fetch_add(1, Ordering::SeqCst);
        TransferBuffer {
            capacity: len,
            len,
            data: Box::into_raw(boxed) as *mut u8,
        }
    }

    /// Consume an argument buffer as a native entry point would
    pub unsafe fn take(&self, buffer: TransferBuffer) -> Vec<u8> {
        let bytes = buffer.as_slice().to_vec();
        let mut status = CallStatus::new();
        self.buffer_free(buffer, &mut status);
        bytes
    }

    pub fn vtable(&self, interface: &str) -> Option<&'static CallbackVTable> {
        self.vtables.lock().unwrap().get(interface).copied()
    }
}

impl NativeRuntime for StubRuntime {
    fn namespace(&self) -> &str {
        NAMESPACE
    }

    unsafe fn buffer_from_bytes(&self, bytes: ForeignBytes, _status: &mut CallStatus) -> TransferBuffer {
        self.alloc(bytes.as_slice())
    }

    unsafe fn buffer_free(&self, buffer: TransferBuffer, _status: &mut CallStatus) {
        if buffer.data.is_null() {
            return;
        }
        let slice = std::ptr::slice_from_raw_parts_mut(buffer.data, buffer.capacity as usize);
        drop(Box::from_raw(slice));
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.freed.fetch_add(1, Ordering::SeqCst);
    }

    fn contract_version(&self) -> u32 {
        self.version
    }

    fn checksum(&self, symbol: &str) -> Option<u16> {
        self.checksums.get(symbol).copied()
    }

    fn init_callback_vtable(&self, interface: &str, vtable: &'static CallbackVTable) -> Result<(), Fault> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let rejected = self
            .failing_inits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if rejected {
            let symbol = format!("uniffi_torii_fn_init_callback_vtable_{}", interface.to_lowercase());
            return Err(ProtocolError::MissingEntryPoint(symbol).into());
        }
        self.vtables.lock().unwrap().insert(interface.to_string(), vtable);
        Ok(())
    }
}

/// Process-wide stub for tests touching global callback registries, which
/// bind to the first runtime they are installed with.
pub fn shared_stub() -> &'static Arc<StubRuntime> {
    static STUB: OnceLock<Arc<StubRuntime>> = OnceLock::new();
    STUB.get_or_init(|| Arc::new(StubRuntime::new()))
}

pub fn as_native(stub: &Arc<StubRuntime>) -> Arc<dyn NativeRuntime> {
    Arc::clone(stub) as Arc<dyn NativeRuntime>
}

/// A native-owned object with counted refcount traffic
#[derive(Default)]
pub struct FakeObject {
    pub clones: AtomicUsize,
    pub frees: AtomicUsize,
    pub fail_clone: AtomicBool,
}

impl FakeObject {
    pub fn as_ptr(&self) -> *const c_void {
        self as *const FakeObject as *const c_void
    }

    pub fn clones(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }
}

pub unsafe extern "C" fn fake_clone(ptr: *const c_void, status: *mut CallStatus) -> *const c_void {
    let object = &*(ptr as *const FakeObject);
    if object.fail_clone.load(Ordering::SeqCst) {
        (*status).set_panic(TransferBuffer::empty());
        return std::ptr::null();
    }
    object.clones.fetch_add(1, Ordering::SeqCst);
    ptr
}

pub unsafe extern "C" fn fake_free(ptr: *const c_void, _status: *mut CallStatus) {
    let object = &*(ptr as *const FakeObject);
    object.frees.fetch_add(1, Ordering::SeqCst);
}
