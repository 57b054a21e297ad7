//! The native library's fixed entry points
//!
//! Every generated binding reaches the native library through two kinds of
//! symbols: per-operation entry points (called directly by the binding with a
//! [`CallStatus`] out-parameter) and a handful of fixed, library-wide entry
//! points. The fixed ones are abstracted here so the runtime can run against a
//! dynamically loaded library ([`DynamicRuntime`](crate::ffi::loader::DynamicRuntime))
//! or an in-process stub.

use crate::error::Fault;
use crate::ffi::types::{CallStatus, CallbackVTable, ForeignBytes, TransferBuffer};

/// Library-wide entry points of a native library.
pub trait NativeRuntime: Send + Sync {
    /// Symbol prefix of the library, used in diagnostics
    fn namespace(&self) -> &str;

    /// Copy `bytes` into a buffer allocated by the native allocator.
    ///
    /// # Safety
    ///
    /// `bytes` must describe memory valid for reads for the duration of the
    /// call.
    unsafe fn buffer_from_bytes(&self, bytes: ForeignBytes, status: &mut CallStatus) -> TransferBuffer;

    /// Release a buffer previously handed out by the native allocator.
    ///
    /// # Safety
    ///
    /// `buffer` must come from this library and must not have been released
    /// already.
    unsafe fn buffer_free(&self, buffer: TransferBuffer, status: &mut CallStatus);

    /// Contract version the library was generated against
    fn contract_version(&self) -> u32;

    /// Checksum exported under `symbol`, or `None` if the symbol is missing
    fn checksum(&self, symbol: &str) -> Option<u16>;

    /// Hand the dispatch table for `interface` to the native side.
    ///
    /// Called once per interface during bridge startup.
    fn init_callback_vtable(&self, interface: &str, vtable: &'static CallbackVTable) -> Result<(), Fault>;
}
