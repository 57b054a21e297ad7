//! Isthmus Runtime - managed side of a C-ABI call bridge
//!
//! This library lets Rust code drive a separately compiled native library:
//! - Encoding arguments and results in the bridge's wire format
//! - Calling native entry points with the success/error/panic protocol
//! - Holding refcounted proxies to native-owned objects
//! - Dispatching callbacks from native code into Rust objects
//! - Verifying the interface contract at startup

/// Isthmus runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod bridge;
pub mod error;
pub mod ffi;

pub use bridge::{Bridge, BridgeBuilder, StartupError};
pub use error::{AsError, CallError, ContractError, Fault, MarshalError, ProtocolError};
pub use ffi::{InterfaceContract, Marshal, NativeRuntime};
