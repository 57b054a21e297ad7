//! Error taxonomy for the call bridge
//!
//! Three categories, separated by how callers treat them:
//! - typed domain errors ([`CallError::Domain`]) are the only values
//!   applications branch on
//! - [`Fault`]s (protocol violations, corrupt payloads, native panics) are
//!   propagated with `?` to the top of the program and never retried
//! - [`ContractError`]s abort startup before any call is made

use thiserror::Error;

/// Wire codec failure. Fatal for the call in progress.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    #[error("unexpected end of payload: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("corrupt payload: {0} unread bytes after top-level value")]
    TrailingBytes(usize),

    #[error("invalid discriminant {value} for {type_name}")]
    UnknownDiscriminant { type_name: &'static str, value: i64 },

    #[error("{what} of length {len} does not fit a 32-bit length prefix")]
    LengthOverflow { what: &'static str, len: usize },

    #[error("negative length {0} in payload")]
    NegativeLength(i32),

    #[error("invalid UTF-8 in string payload: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("invalid presence flag {0} for optional value")]
    InvalidPresenceFlag(i8),

    #[error("timestamp outside the representable range")]
    TimestampOutOfRange,

    #[error("duplicate key in map payload at entry {index}")]
    DuplicateMapKey { index: usize },
}

/// Violation of the call protocol by either side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown call status code {0}")]
    UnknownStatus(i8),

    #[error("native call returned ERROR for an operation without a declared error type")]
    UnexpectedError,

    #[error("{label} object has already been destroyed")]
    UseAfterDestroy { label: &'static str },

    #[error("{label} object call counter overflow")]
    CounterOverflow { label: &'static str },

    #[error("null {label} pointer returned by native code")]
    NullPointer { label: &'static str },

    #[error("no callback in {interface} handle map: {handle}")]
    UnknownCallbackHandle { interface: &'static str, handle: u64 },

    #[error("{interface} has no callback method at index {index}")]
    UnknownMethod { interface: &'static str, index: usize },

    #[error("{interface} dispatch table has {provided} entries, {declared} methods declared")]
    VTableMismatch {
        interface: &'static str,
        provided: usize,
        declared: usize,
    },

    #[error("{interface} callbacks are already installed with another native library")]
    CallbackRuntimeMismatch { interface: &'static str },

    #[error("native entry point {0} is not exported")]
    MissingEntryPoint(String),
}

/// Unrecoverable failure of a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("native panic: {0}")]
    NativePanic(String),

    #[error("native code panicked while reporting a panic (double fault)")]
    DoubleFault,

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("marshalling failed: {0}")]
    Marshal(#[from] MarshalError),
}

/// Result of an operation that declares a typed error.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// Declared error decoded from the native side
    #[error("{0}")]
    Domain(E),

    #[error(transparent)]
    Fault(#[from] Fault),
}

impl<E> CallError<E> {
    /// The domain error, if this is one
    pub fn domain(self) -> Option<E> {
        match self {
            CallError::Domain(err) => Some(err),
            CallError::Fault(_) => None,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, CallError::Fault(_))
    }

    pub fn map_domain<F, T>(self, f: F) -> CallError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            CallError::Domain(err) => CallError::Domain(f(err)),
            CallError::Fault(fault) => CallError::Fault(fault),
        }
    }
}

impl<E> From<MarshalError> for CallError<E> {
    fn from(err: MarshalError) -> Self {
        CallError::Fault(Fault::Marshal(err))
    }
}

impl<E> From<ProtocolError> for CallError<E> {
    fn from(err: ProtocolError) -> Self {
        CallError::Fault(Fault::Protocol(err))
    }
}

/// Contract guard mismatch. Aborts startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("{namespace}: contract version mismatch: bindings expect {expected}, library reports {found}")]
    VersionMismatch {
        namespace: String,
        expected: u32,
        found: u32,
    },

    #[error("{namespace}: API checksum mismatch for {symbol}: expected {expected}, found {found}")]
    ChecksumMismatch {
        namespace: String,
        symbol: String,
        expected: u16,
        found: u16,
    },

    #[error("{namespace}: checksum symbol {symbol} is not exported by the library")]
    MissingChecksum { namespace: String, symbol: String },
}

/// Treats a "no error" sentinel as success.
pub trait AsError {
    type Error;

    fn as_error(self) -> Result<(), Self::Error>;
}

impl<E> AsError for Option<E> {
    type Error = E;

    fn as_error(self) -> Result<(), E> {
        match self {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_error_none_is_success() {
        let sentinel: Option<String> = None;
        assert_eq!(sentinel.as_error(), Ok(()));
    }

    #[test]
    fn test_as_error_some_is_failure() {
        let sentinel = Some("boom".to_string());
        assert_eq!(sentinel.as_error(), Err("boom".to_string()));
    }

    #[test]
    fn test_call_error_domain_accessors() {
        let err: CallError<&str> = CallError::Domain("not found");
        assert!(!err.is_fault());
        assert_eq!(err.domain(), Some("not found"));

        let fault: CallError<&str> = Fault::DoubleFault.into();
        assert!(fault.is_fault());
        assert_eq!(fault.domain(), None);
    }

    #[test]
    fn test_marshal_error_lifts_into_call_error() {
        let err: CallError<()> = MarshalError::TrailingBytes(3).into();
        assert!(matches!(
            err,
            CallError::Fault(Fault::Marshal(MarshalError::TrailingBytes(3)))
        ));
    }

    #[test]
    fn test_fault_messages() {
        assert_eq!(
            Fault::NativePanic("index out of bounds".into()).to_string(),
            "native panic: index out of bounds"
        );
        assert_eq!(
            Fault::from(ProtocolError::UnknownCallbackHandle {
                interface: "EventListener",
                handle: 7
            })
            .to_string(),
            "protocol violation: no callback in EventListener handle map: 7"
        );
    }
}
