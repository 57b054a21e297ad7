//! Foreign Function Interface (FFI) infrastructure
//!
//! The managed half of a C-ABI call bridge:
//! - Wire codec for payloads (`marshal`, `shape`)
//! - Native-allocated transfer buffers (`buffer`)
//! - The call/error/panic protocol (`caller`)
//! - Refcounted proxies for native objects (`handle`)
//! - Callbacks from native code (`callbacks`)
//! - Startup contract checks (`contract`)
//! - Access to the native library (`native`, `loader`)
//!
//! # Safety
//!
//! Raw pointers from native code are wrapped at the first opportunity
//! (`OwnedBuffer`, `NativeHandle`); the unsafe surface is limited to taking
//! ownership of them and to calling native entry points.

pub mod buffer;
pub mod callbacks;
pub mod caller;
pub mod contract;
pub mod handle;
pub mod loader;
pub mod marshal;
pub mod native;
pub mod safety;
pub mod shape;
pub mod types;

pub use buffer::OwnedBuffer;
pub use callbacks::{CallbackInterface, CallbackMethod, CallbackRegistry, DispatchError, HandleTable};
pub use contract::{ChecksumEntry, ContractReport, InterfaceContract};
pub use handle::{CallGuard, NativeHandle, NativeObject};
pub use loader::{DynamicRuntime, LibraryLoader, LoadError};
pub use marshal::Marshal;
pub use native::NativeRuntime;
pub use shape::{OperationSignature, ShapeParseError, WireShape, WireValue};
pub use types::{
    CallCode, CallStatus, CallbackFreeFn, CallbackMethodFn, CallbackVTable, CloneFn, ForeignBytes, FreeFn,
    TransferBuffer,
};
