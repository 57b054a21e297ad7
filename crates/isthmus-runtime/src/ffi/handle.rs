//! Native handles - refcounted proxies for native-owned objects
//!
//! A [`NativeHandle`] wraps an opaque pointer to an object owned by the native
//! library. Two counters guard it:
//! - `call_counter` starts at 0, is bumped around every call, and drops by one
//!   extra step on destroy. Whoever moves it to -1 runs the release path.
//! - `destroyed` makes `destroy` idempotent.
//!
//! Each call clones the native reference first (the native callee consumes
//! the clone), so a concurrent destroy never frees the object under an
//! in-flight call. Once destroyed, no new call may start. All counter updates
//! are lock-free.

use crate::error::{Fault, ProtocolError};
use crate::ffi::caller;
use crate::ffi::native::NativeRuntime;
use crate::ffi::types::{CloneFn, FreeFn};
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// Proxy for one native object.
pub struct NativeHandle {
    pointer: *const c_void,
    call_counter: AtomicI64,
    destroyed: AtomicBool,
    clone_fn: CloneFn,
    free_fn: FreeFn,
    label: &'static str,
    native: Arc<dyn NativeRuntime>,
}

// Safety: the pointer is only dereferenced by native code, which is required
// to accept calls from any thread; the counters are atomics.
unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

impl NativeHandle {
    /// Wrap a pointer freshly returned by the native side.
    ///
    /// # Safety
    ///
    /// `pointer` must be a live object reference owned by the caller, and
    /// `clone_fn`/`free_fn` must be the entry points for its type.
    pub unsafe fn new(
        native: Arc<dyn NativeRuntime>,
        pointer: *const c_void,
        label: &'static str,
        clone_fn: CloneFn,
        free_fn: FreeFn,
    ) -> Self {
        Self {
            pointer,
            call_counter: AtomicI64::new(0),
            destroyed: AtomicBool::new(false),
            clone_fn,
            free_fn,
            label,
            native,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Current call counter, for diagnostics
    pub fn call_count(&self) -> i64 {
        self.call_counter.load(Ordering::Acquire)
    }

    /// Reserve the object for one call and clone the native reference.
    ///
    /// The returned guard releases the reservation when dropped, including on
    /// error returns and unwinding.
    pub fn acquire_for_call(&self) -> Result<CallGuard<'_>, Fault> {
        let mut counter = self.call_counter.load(Ordering::Acquire);
        loop {
            if counter <= -1 || self.destroyed.load(Ordering::Acquire) {
                return Err(ProtocolError::UseAfterDestroy { label: self.label }.into());
            }
            if counter == i64::MAX {
                return Err(ProtocolError::CounterOverflow { label: self.label }.into());
            }
            match self.call_counter.compare_exchange_weak(
                counter,
                counter + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => counter = actual,
            }
        }

        let cloned = caller::invoke(&*self.native, |status| unsafe { (self.clone_fn)(self.pointer, status) });
        match cloned {
            Ok(pointer) => Ok(CallGuard { handle: self, pointer }),
            Err(fault) => {
                // Safety: rolls back the reservation taken above
                unsafe { self.release_after_call() };
                Err(fault)
            }
        }
    }

    /// Run `f` with a cloned pointer, releasing the reservation afterwards.
    pub fn with_pointer<R>(&self, f: impl FnOnce(*const c_void) -> R) -> Result<R, Fault> {
        let guard = self.acquire_for_call()?;
        Ok(f(guard.pointer()))
    }

    /// Undo one reservation.
    ///
    /// # Safety
    ///
    /// Must pair with exactly one successful [`acquire_for_call`](Self::acquire_for_call)
    /// whose guard was consumed with [`CallGuard::into_raw`]. An unpaired
    /// release can free the object under another in-flight call.
    pub unsafe fn release_after_call(&self) {
        if self.call_counter.fetch_sub(1, Ordering::AcqRel) - 1 == -1 {
            self.free_native();
        }
    }

    /// Mark the proxy destroyed. Idempotent.
    ///
    /// The native object is freed now if no call is in flight, otherwise when
    /// the last in-flight call finishes.
    pub fn destroy(&self) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        tracing::debug!(label = self.label, "destroying native handle");
        if self.call_counter.fetch_sub(1, Ordering::AcqRel) - 1 == -1 {
            self.free_native();
        }
    }

    fn free_native(&self) {
        let freed = caller::invoke(&*self.native, |status| unsafe { (self.free_fn)(self.pointer, status) });
        if let Err(fault) = freed {
            tracing::error!(label = self.label, %fault, "native free failed");
        }
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeHandle")
            .field("label", &self.label)
            .field("pointer", &self.pointer)
            .field("call_counter", &self.call_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// One reserved call on a [`NativeHandle`].
#[must_use = "dropping the guard ends the call reservation"]
pub struct CallGuard<'a> {
    handle: &'a NativeHandle,
    pointer: *const c_void,
}

impl CallGuard<'_> {
    /// Cloned pointer to pass to exactly one native call
    pub fn pointer(&self) -> *const c_void {
        self.pointer
    }

    /// Keep the reservation past the guard's lifetime.
    ///
    /// The caller becomes responsible for a matching
    /// [`NativeHandle::release_after_call`].
    pub fn into_raw(self) -> *const c_void {
        let pointer = self.pointer;
        std::mem::forget(self);
        pointer
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        // Safety: pairs with the reservation this guard was created for
        unsafe { self.handle.release_after_call() };
    }
}

/// Typed proxy over a [`NativeHandle`].
///
/// Generated object wrappers implement this to get lifting from a returned
/// pointer and lowering into an argument.
pub trait NativeObject: Sized {
    /// Type name used in diagnostics
    const LABEL: &'static str;
    const CLONE: CloneFn;
    const FREE: FreeFn;

    fn from_handle(handle: NativeHandle) -> Self;

    fn handle(&self) -> &NativeHandle;

    /// Wrap a pointer returned by a native call.
    ///
    /// # Safety
    ///
    /// `pointer` must be an owned reference to an object of this type.
    unsafe fn lift(native: Arc<dyn NativeRuntime>, pointer: *const c_void) -> Result<Self, Fault> {
        if pointer.is_null() {
            return Err(ProtocolError::NullPointer { label: Self::LABEL }.into());
        }
        Ok(Self::from_handle(NativeHandle::new(
            native,
            pointer,
            Self::LABEL,
            Self::CLONE,
            Self::FREE,
        )))
    }

    /// Clone a reference for passing as an argument. The native callee takes
    /// ownership of the returned pointer.
    fn lower(&self) -> Result<*const c_void, Fault> {
        let guard = self.handle().acquire_for_call()?;
        Ok(guard.pointer())
    }

    fn destroy(&self) {
        self.handle().destroy();
    }
}
