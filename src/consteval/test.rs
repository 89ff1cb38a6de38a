use super::evaluate;
use crate::error::{ErrorKind, TrapCode};
use crate::value::Value;

#[test]
fn test_single_constant() {
    assert_eq!(evaluate(&[0x41, 42, 0x0b]).unwrap(), Value::I32(42));
}

#[test]
fn test_arithmetic() {
    assert_eq!(
        evaluate(&[0x41, 0x02, 0x41, 0x03, 0x6a, 0x0b]).unwrap(),
        Value::I32(5)
    );
    assert_eq!(
        evaluate(&[0x42, 0x7f, 0x42, 0x05, 0x7e, 0x0b]).unwrap(),
        Value::I64(-5)
    );
}

#[test]
fn test_float_constant() {
    let mut expr = vec![0x44];
    expr.extend(1.25f64.to_le_bytes());
    expr.push(0x0b);
    assert_eq!(evaluate(&expr).unwrap(), Value::F64(1.25));
}

#[test]
fn test_first_value_is_returned() {
    assert_eq!(
        evaluate(&[0x41, 0x01, 0x41, 0x02, 0x0b]).unwrap(),
        Value::I32(1)
    );
}

#[test]
fn test_empty_expression_fails() {
    let error = evaluate(&[0x0b]).unwrap_err();
    assert_eq!(error.kind, ErrorKind::Trap(TrapCode::StackUnderflow));
}

#[test]
fn test_globals_are_unavailable() {
    let error = evaluate(&[0x23, 0x00, 0x0b]).unwrap_err();
    assert_eq!(error.kind, ErrorKind::Trap(TrapCode::UninitializedGlobal));
}

#[test]
fn test_missing_end_fails() {
    let error = evaluate(&[0x41, 0x01]).unwrap_err();
    assert_eq!(error.kind, ErrorKind::Structure);
}
