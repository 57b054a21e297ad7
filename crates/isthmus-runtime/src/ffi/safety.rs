//! Unwind containment for `extern "C"` entry points
//!
//! A panic must never unwind across the C ABI. Entry points the native side
//! calls into run their body through [`catch_panic`] and turn the payload into
//! a message that can be reported back through a [`CallStatus`].
//!
//! [`CallStatus`]: crate::ffi::types::CallStatus

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `f`, converting a panic into its message.
pub fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

/// Extract the message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
