//! C-compatible types shared with the native library
//!
//! Defines the structs that cross the boundary by value:
//! - `TransferBuffer`: native-allocated byte region carrying one encoded payload
//! - `ForeignBytes`: managed bytes lent to the native side for one call
//! - `CallStatus`: out-parameter every native entry point writes its outcome to
//! - `CallbackVTable`: dispatch table handed to the native side once per
//!   callback interface
//!
//! Layouts are `#[repr(C)]` and must stay in sync with the native headers.

use crate::error::MarshalError;
use std::ffi::c_void;

/// Byte region allocated by the native side.
///
/// ```c
/// typedef struct {
///     uint64_t capacity;
///     uint64_t len;
///     uint8_t *data;
/// } RustBuffer;
/// ```
///
/// A buffer returned by the native side is owned by the receiver and must be
/// released exactly once, normally by wrapping it in an
/// [`OwnedBuffer`](crate::ffi::buffer::OwnedBuffer). Zero-length buffers carry
/// a null data pointer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TransferBuffer {
    pub capacity: u64,
    pub len: u64,
    pub data: *mut u8,
}

impl TransferBuffer {
    /// The empty buffer: no allocation, null data pointer
    pub const fn empty() -> Self {
        Self {
            capacity: 0,
            len: 0,
            data: std::ptr::null_mut(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// View the buffer contents.
    ///
    /// # Safety
    ///
    /// `data` must be valid for reads of `len` bytes for the lifetime of the
    /// returned slice, and nothing may free the buffer in the meantime.
    pub unsafe fn as_slice(&self) -> &[u8] {
        if self.data.is_null() || self.len == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(self.data, self.len as usize)
        }
    }
}

impl Default for TransferBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

/// Managed bytes lent to the native side for the duration of one call.
///
/// ```c
/// typedef struct {
///     int32_t len;
///     const uint8_t *data;
/// } ForeignBytes;
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForeignBytes {
    pub len: i32,
    pub data: *const u8,
}

impl ForeignBytes {
    /// Borrow a slice. Fails if the slice length does not fit an `i32`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MarshalError> {
        let len = i32::try_from(bytes.len()).map_err(|_| MarshalError::LengthOverflow {
            what: "foreign bytes",
            len: bytes.len(),
        })?;
        Ok(Self {
            len,
            data: if bytes.is_empty() {
                std::ptr::null()
            } else {
                bytes.as_ptr()
            },
        })
    }

    /// # Safety
    ///
    /// `data` must be valid for reads of `len` bytes for the lifetime of the
    /// returned slice.
    pub unsafe fn as_slice(&self) -> &[u8] {
        if self.data.is_null() || self.len <= 0 {
            &[]
        } else {
            std::slice::from_raw_parts(self.data, self.len as usize)
        }
    }
}

/// Outcome code written by a native entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum CallCode {
    Success = 0,
    Error = 1,
    Panic = 2,
}

impl CallCode {
    /// Map a raw status code; `None` for codes outside the protocol.
    pub fn from_raw(code: i8) -> Option<Self> {
        match code {
            0 => Some(CallCode::Success),
            1 => Some(CallCode::Error),
            2 => Some(CallCode::Panic),
            _ => None,
        }
    }
}

/// ```c
/// typedef struct {
///     int8_t code;
///     RustBuffer errorBuf;
/// } RustCallStatus;
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CallStatus {
    pub code: i8,
    pub error_buf: TransferBuffer,
}

impl CallStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.code == CallCode::Success as i8
    }

    /// Record a declared error carrying an encoded payload.
    pub fn set_error(&mut self, payload: TransferBuffer) {
        self.code = CallCode::Error as i8;
        self.error_buf = payload;
    }

    /// Record an unexpected failure. An empty payload means the message itself
    /// could not be produced.
    pub fn set_panic(&mut self, message: TransferBuffer) {
        self.code = CallCode::Panic as i8;
        self.error_buf = message;
    }
}

/// Native "clone" entry point for an object type: bumps the native refcount.
pub type CloneFn = unsafe extern "C" fn(*const c_void, *mut CallStatus) -> *const c_void;

/// Native "free" entry point for an object type: drops one native reference.
pub type FreeFn = unsafe extern "C" fn(*const c_void, *mut CallStatus);

/// Dispatch function for one callback method.
///
/// Receives the callback handle, the encoded argument list (ownership passes
/// to the callee), a slot for the encoded return value, and the status
/// out-parameter.
pub type CallbackMethodFn =
    extern "C" fn(handle: u64, args: TransferBuffer, out_return: *mut TransferBuffer, status: *mut CallStatus);

/// Called by the native side once it will no longer invoke a handle.
pub type CallbackFreeFn = extern "C" fn(handle: u64);

/// Dispatch table for one callback interface.
///
/// ```c
/// typedef struct {
///     const CallbackMethodFn *methods;
///     uint64_t method_count;
///     CallbackFreeFn free;
/// } CallbackVTable;
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CallbackVTable {
    pub methods: *const CallbackMethodFn,
    pub method_count: u64,
    pub free: CallbackFreeFn,
}

// Safety: `methods` always points into a `'static` slice of function pointers.
unsafe impl Send for CallbackVTable {}
unsafe impl Sync for CallbackVTable {}

impl CallbackVTable {
    pub fn from_methods(methods: &'static [CallbackMethodFn], free: CallbackFreeFn) -> Self {
        Self {
            methods: methods.as_ptr(),
            method_count: methods.len() as u64,
            free,
        }
    }

    /// Method table as a slice
    pub fn methods(&self) -> &[CallbackMethodFn] {
        if self.methods.is_null() {
            return &[];
        }
        // Safety: constructed from a `'static` slice in `from_methods`
        unsafe { std::slice::from_raw_parts(self.methods, self.method_count as usize) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_buffer_has_null_data() {
        let buf = TransferBuffer::empty();
        assert!(buf.data.is_null());
        assert!(buf.is_empty());
        assert_eq!(unsafe { buf.as_slice() }, &[] as &[u8]);
    }

    #[test]
    fn test_foreign_bytes_borrows_slice() {
        let data = vec![1u8, 2, 3];
        let foreign = ForeignBytes::from_slice(&data).unwrap();
        assert_eq!(foreign.len, 3);
        assert_eq!(unsafe { foreign.as_slice() }, &[1, 2, 3]);
    }

    #[test]
    fn test_foreign_bytes_empty_is_null() {
        let foreign = ForeignBytes::from_slice(&[]).unwrap();
        assert_eq!(foreign.len, 0);
        assert!(foreign.data.is_null());
    }

    #[test]
    fn test_call_code_from_raw() {
        assert_eq!(CallCode::from_raw(0), Some(CallCode::Success));
        assert_eq!(CallCode::from_raw(1), Some(CallCode::Error));
        assert_eq!(CallCode::from_raw(2), Some(CallCode::Panic));
        assert_eq!(CallCode::from_raw(3), None);
        assert_eq!(CallCode::from_raw(-1), None);
    }

    #[test]
    fn test_call_status_defaults_to_success() {
        let status = CallStatus::new();
        assert!(status.is_success());
        assert!(status.error_buf.is_empty());
    }

    #[test]
    fn test_call_status_setters() {
        let mut status = CallStatus::new();
        status.set_error(TransferBuffer::empty());
        assert_eq!(status.code, 1);
        status.set_panic(TransferBuffer::empty());
        assert_eq!(status.code, 2);
    }

    extern "C" fn noop_method(_: u64, _: TransferBuffer, _: *mut TransferBuffer, _: *mut CallStatus) {}
    extern "C" fn noop_free(_: u64) {}

    static METHODS: [CallbackMethodFn; 2] = [noop_method, noop_method];

    #[test]
    fn test_vtable_from_static_methods() {
        let vtable = CallbackVTable::from_methods(&METHODS, noop_free);
        assert_eq!(vtable.method_count, 2);
        assert_eq!(vtable.methods().len(), 2);
    }
}
