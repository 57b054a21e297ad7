//! Call channel tests: status interpretation and payload ownership

mod common;

use common::{assert_eq, StubRuntime};
use isthmus_runtime::ffi::caller::{invoke, invoke_lift, invoke_with_error};
use isthmus_runtime::ffi::marshal::{encode, lower};
use isthmus_runtime::ffi::{CallStatus, TransferBuffer};
use isthmus_runtime::{marshal_flat_error, CallError, Fault, MarshalError, ProtocolError};
use rstest::rstest;

#[derive(Debug, PartialEq)]
enum ClientError {
    Connection(String),
    Query(String),
}
marshal_flat_error!(ClientError {
    1 => Connection,
    2 => Query,
});

fn error_payload(stub: &StubRuntime, err: &ClientError) -> TransferBuffer {
    stub.alloc(&encode(err).unwrap())
}

#[test]
fn test_success_returns_direct_value() {
    let stub = StubRuntime::new();
    let value = invoke(&stub, |_status: &mut CallStatus| 42u64).unwrap();
    assert_eq!(value, 42);
}

#[test]
fn test_declared_error_is_typed() {
    let stub = StubRuntime::new();
    let result = invoke_with_error::<u32, ClientError, _>(&stub, |status| {
        status.set_error(error_payload(&stub, &ClientError::Query("no such model".into())));
        0
    });
    match result {
        Err(CallError::Domain(err)) => assert_eq!(err, ClientError::Query("no such model".into())),
        other => panic!("expected domain error, got {:?}", other),
    }
    assert_eq!(stub.live_buffers(), 0);
}

#[test]
fn test_unexpected_error_without_declared_type() {
    let stub = StubRuntime::new();
    let result = invoke(&stub, |status| {
        status.set_error(error_payload(&stub, &ClientError::Connection("down".into())));
    });
    assert_eq!(result, Err(Fault::Protocol(ProtocolError::UnexpectedError)));
    assert_eq!(stub.live_buffers(), 0);
}

#[test]
fn test_panic_with_message() {
    let stub = StubRuntime::new();
    let result = invoke(&stub, |status| {
        status.set_panic(stub.alloc(b"index out of bounds"));
    });
    assert_eq!(result, Err(Fault::NativePanic("index out of bounds".into())));
    assert_eq!(stub.live_buffers(), 0);
}

#[test]
fn test_panic_without_message_is_double_fault() {
    let stub = StubRuntime::new();
    let result = invoke(&stub, |status| status.set_panic(TransferBuffer::empty()));
    assert_eq!(result, Err(Fault::DoubleFault));
}

#[test]
fn test_panic_is_never_a_domain_error() {
    let stub = StubRuntime::new();
    let payload = encode(&ClientError::Query("looks typed".into())).unwrap();
    let result = invoke_with_error::<(), ClientError, _>(&stub, |status| {
        status.set_panic(stub.alloc(&payload));
    });
    assert!(matches!(result, Err(CallError::Fault(Fault::NativePanic(_)))));
    assert_eq!(stub.live_buffers(), 0);
}

#[rstest]
#[case(3)]
#[case(-1)]
#[case(i8::MAX)]
fn test_unknown_status_code(#[case] code: i8) {
    let stub = StubRuntime::new();
    let result = invoke(&stub, |status| status.code = code);
    assert_eq!(result, Err(Fault::Protocol(ProtocolError::UnknownStatus(code))));
}

#[test]
fn test_corrupt_error_payload_is_fault() {
    let stub = StubRuntime::new();
    let result = invoke_with_error::<(), ClientError, _>(&stub, |status| {
        status.set_error(stub.alloc(&[0, 0, 0, 7, 0, 0, 0, 0]));
    });
    assert!(matches!(
        result,
        Err(CallError::Fault(Fault::Marshal(MarshalError::UnknownDiscriminant { value: 7, .. })))
    ));
    assert_eq!(stub.live_buffers(), 0);
}

#[test]
fn test_invoke_lift_round_trip() {
    let stub = StubRuntime::new();
    // Native echo: consumes the argument buffer, returns a fresh one
    let arg = lower(&stub, &vec!["a".to_string(), "b".to_string()]).unwrap();
    let result: Vec<String> = invoke_lift::<_, ClientError, _>(&stub, |_status| {
        let bytes = unsafe { stub.take(arg) };
        stub.alloc(&bytes)
    })
    .unwrap();
    assert_eq!(result, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(stub.live_buffers(), 0);
}

#[test]
fn test_invoke_lift_ignores_result_buffer_on_error() {
    let stub = StubRuntime::new();
    let result = invoke_lift::<String, ClientError, _>(&stub, |status| {
        status.set_error(error_payload(&stub, &ClientError::Connection("refused".into())));
        TransferBuffer::empty()
    });
    assert_eq!(
        result.map_err(CallError::domain).unwrap_err(),
        Some(ClientError::Connection("refused".into()))
    );
    assert_eq!(stub.live_buffers(), 0);
}
