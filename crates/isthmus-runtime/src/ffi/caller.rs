//! Call channel - one native call, three outcomes
//!
//! Every native entry point takes a `*mut CallStatus` as its last parameter
//! and reports success, a declared error, or a panic through it. The
//! functions here own that status, run the call, and turn the outcome into a
//! `Result`:
//! - `Success`: the direct return value is the result
//! - `Error`: the payload is decoded as the operation's declared error type
//! - `Panic`: the payload is a raw UTF-8 message; an empty payload means the
//!   native side could not even produce the message (double fault)
//!
//! Any other code is a protocol violation. Error payload buffers are released
//! exactly once on every path.

use crate::error::{CallError, Fault, ProtocolError};
use crate::ffi::buffer::OwnedBuffer;
use crate::ffi::marshal::{self, Marshal};
use crate::ffi::native::NativeRuntime;
use crate::ffi::types::{CallCode, CallStatus, TransferBuffer};

/// Run a native call for an operation without a declared error type.
///
/// An `Error` status is treated as [`ProtocolError::UnexpectedError`].
///
/// ```
/// use isthmus_runtime::ffi::{caller, CallStatus, NativeRuntime};
/// use isthmus_runtime::Fault;
/// use std::ffi::c_void;
///
/// // void publish(const void *self, RustCallStatus *status);
/// unsafe extern "C" fn publish(_this: *const c_void, _status: *mut CallStatus) {}
///
/// fn publish_event(native: &dyn NativeRuntime, this: *const c_void) -> Result<(), Fault> {
///     caller::invoke(native, |status| unsafe { publish(this, status) })
/// }
/// ```
pub fn invoke<T, F>(native: &dyn NativeRuntime, call: F) -> Result<T, Fault>
where
    F: FnOnce(&mut CallStatus) -> T,
{
    let mut status = CallStatus::new();
    let value = call(&mut status);
    if let Some(payload) = classify(native, status)? {
        // Safety: the error payload is owned by the caller once returned
        drop(unsafe { OwnedBuffer::from_raw(native, payload) });
        return Err(ProtocolError::UnexpectedError.into());
    }
    Ok(value)
}

/// Run a native call for an operation that declares error type `E`.
pub fn invoke_with_error<T, E, F>(native: &dyn NativeRuntime, call: F) -> Result<T, CallError<E>>
where
    E: Marshal,
    F: FnOnce(&mut CallStatus) -> T,
{
    let mut status = CallStatus::new();
    let value = call(&mut status);
    if let Some(payload) = classify(native, status)? {
        // Safety: the error payload is owned by the caller once returned
        let err: E = unsafe { marshal::lift(native, payload) }?;
        tracing::trace!("native call returned a declared error");
        return Err(CallError::Domain(err));
    }
    Ok(value)
}

/// Run a native call that returns a buffer and decode the result.
///
/// The result buffer is only touched on success; it is released after
/// decoding.
pub fn invoke_lift<T, E, F>(native: &dyn NativeRuntime, call: F) -> Result<T, CallError<E>>
where
    T: Marshal,
    E: Marshal,
    F: FnOnce(&mut CallStatus) -> TransferBuffer,
{
    let buffer = invoke_with_error::<_, E, _>(native, call)?;
    // Safety: a successful call hands us ownership of the returned buffer
    Ok(unsafe { marshal::lift(native, buffer) }?)
}

/// Interpret a call status written by a native entry point.
///
/// Returns the declared-error payload for `Error`, `None` for `Success`.
fn classify(native: &dyn NativeRuntime, status: CallStatus) -> Result<Option<TransferBuffer>, Fault> {
    match CallCode::from_raw(status.code) {
        Some(CallCode::Success) => Ok(None),
        Some(CallCode::Error) => Ok(Some(status.error_buf)),
        Some(CallCode::Panic) => Err(panic_fault(native, status.error_buf)),
        None => {
            // The payload layout is unknown for codes outside the protocol; leave it alone.
            tracing::error!(code = status.code, "native call returned unknown status code");
            Err(ProtocolError::UnknownStatus(status.code).into())
        }
    }
}

fn panic_fault(native: &dyn NativeRuntime, payload: TransferBuffer) -> Fault {
    // Safety: the panic payload is owned by the caller once returned
    let owned = unsafe { OwnedBuffer::from_raw(native, payload) };
    if owned.is_empty() {
        tracing::warn!("native call reported a double fault");
        return Fault::DoubleFault;
    }
    let message = String::from_utf8_lossy(owned.as_slice()).into_owned();
    tracing::warn!(%message, "native call panicked");
    Fault::NativePanic(message)
}
