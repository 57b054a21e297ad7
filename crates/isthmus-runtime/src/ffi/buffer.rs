//! Transfer buffer ownership
//!
//! Buffers returned by the native side are owned by the receiver and released
//! through [`OwnedBuffer`], which frees on drop. Buffers built from managed
//! bytes go through [`buffer_from_bytes`] and are handed to the native side,
//! which takes ownership.

use crate::error::Fault;
use crate::ffi::caller;
use crate::ffi::native::NativeRuntime;
use crate::ffi::types::{CallStatus, ForeignBytes, TransferBuffer};

/// A native-allocated buffer released exactly once, when dropped.
pub struct OwnedBuffer<'a> {
    inner: TransferBuffer,
    native: &'a dyn NativeRuntime,
}

impl<'a> OwnedBuffer<'a> {
    /// Take ownership of a buffer returned by `native`.
    ///
    /// # Safety
    ///
    /// `buffer` must have been allocated by `native` and not released yet, and
    /// no other owner may release it.
    pub unsafe fn from_raw(native: &'a dyn NativeRuntime, buffer: TransferBuffer) -> Self {
        Self {
            inner: buffer,
            native,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        // Safety: validity was promised in `from_raw` and we hold the only owner
        unsafe { self.inner.as_slice() }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Give up ownership without releasing the buffer
    pub fn into_raw(self) -> TransferBuffer {
        let buffer = self.inner;
        std::mem::forget(self);
        buffer
    }
}

impl Drop for OwnedBuffer<'_> {
    fn drop(&mut self) {
        if self.inner.data.is_null() {
            return;
        }
        let mut status = CallStatus::new();
        // Safety: sole owner, see `from_raw`
        unsafe { self.native.buffer_free(self.inner, &mut status) };
        if !status.is_success() {
            tracing::error!(
                namespace = self.native.namespace(),
                code = status.code,
                "native buffer release failed"
            );
            if !status.error_buf.data.is_null() {
                // Release the failure payload once; a second failure is not reported.
                let mut ignored = CallStatus::new();
                unsafe { self.native.buffer_free(status.error_buf, &mut ignored) };
            }
        }
    }
}

impl std::fmt::Debug for OwnedBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedBuffer")
            .field("len", &self.inner.len)
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

/// Copy managed bytes into a native-allocated buffer.
///
/// Empty input yields [`TransferBuffer::empty`] without calling the native
/// allocator.
pub fn buffer_from_bytes(native: &dyn NativeRuntime, bytes: &[u8]) -> Result<TransferBuffer, Fault> {
    if bytes.is_empty() {
        return Ok(TransferBuffer::empty());
    }
    let foreign = ForeignBytes::from_slice(bytes)?;
    // Safety: `bytes` outlives the call
    caller::invoke(native, |status| unsafe { native.buffer_from_bytes(foreign, status) })
}
