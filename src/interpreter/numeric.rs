
use crate::error::{trap, VmResult};
use crate::opcode::{self as op, Opcode};
use crate::value::Value;

fn pop(stack: &mut Vec<Value>) -> VmResult<Value> {
    stack
        .pop()
        .ok_or_else(|| trap!(StackUnderflow, "value stack is empty"))
}

fn unary<T>(
    stack: &mut Vec<Value>,
    get: fn(Value) -> VmResult<T>,
    f: impl FnOnce(T) -> Value,
) -> VmResult<()> {
    let a = get(pop(stack)?)?;
    stack.push(f(a));
    Ok(())
}

fn try_unary<T>(
    stack: &mut Vec<Value>,
    get: fn(Value) -> VmResult<T>,
    f: impl FnOnce(T) -> VmResult<Value>,
) -> VmResult<()> {
    let a = get(pop(stack)?)?;
    stack.push(f(a)?);
    Ok(())
}

fn binary<T>(
    stack: &mut Vec<Value>,
    get: fn(Value) -> VmResult<T>,
    f: impl FnOnce(T, T) -> Value,
) -> VmResult<()> {
    let b = get(pop(stack)?)?;
    let a = get(pop(stack)?)?;
    stack.push(f(a, b));
    Ok(())
}

fn try_binary<T>(
    stack: &mut Vec<Value>,
    get: fn(Value) -> VmResult<T>,
    f: impl FnOnce(T, T) -> VmResult<Value>,
) -> VmResult<()> {
    let b = get(pop(stack)?)?;
    let a = get(pop(stack)?)?;
    stack.push(f(a, b)?);
    Ok(())
}

/// Executes a numeric, comparison or conversion opcode against `stack`.
/// Returns `false` if `op` is not one of those.
pub(super) fn execute(op: Opcode, stack: &mut Vec<Value>) -> VmResult<bool> {
    use Value::{F32, F64, I32, I64};

    let i32_ = Value::as_i32;
    let i64_ = Value::as_i64;
    let f32_ = Value::as_f32;
    let f64_ = Value::as_f64;

    match op {
        op::I32_EQZ => unary(stack, i32_, |a| Value::from(a == 0))?,
        op::I32_EQ => binary(stack, i32_, |a, b| Value::from(a == b))?,
        op::I32_NE => binary(stack, i32_, |a, b| Value::from(a != b))?,
        op::I32_LT_S => binary(stack, i32_, |a, b| Value::from(a < b))?,
        op::I32_LT_U => binary(stack, i32_, |a, b| Value::from((a as u32) < (b as u32)))?,
        op::I32_GT_S => binary(stack, i32_, |a, b| Value::from(a > b))?,
        op::I32_GT_U => binary(stack, i32_, |a, b| Value::from((a as u32) > (b as u32)))?,
        op::I32_LE_S => binary(stack, i32_, |a, b| Value::from(a <= b))?,
        op::I32_LE_U => binary(stack, i32_, |a, b| Value::from((a as u32) <= (b as u32)))?,
        op::I32_GE_S => binary(stack, i32_, |a, b| Value::from(a >= b))?,
        op::I32_GE_U => binary(stack, i32_, |a, b| Value::from((a as u32) >= (b as u32)))?,

        op::I64_EQZ => unary(stack, i64_, |a| Value::from(a == 0))?,
        op::I64_EQ => binary(stack, i64_, |a, b| Value::from(a == b))?,
        op::I64_NE => binary(stack, i64_, |a, b| Value::from(a != b))?,
        op::I64_LT_S => binary(stack, i64_, |a, b| Value::from(a < b))?,
        op::I64_LT_U => binary(stack, i64_, |a, b| Value::from((a as u64) < (b as u64)))?,
        op::I64_GT_S => binary(stack, i64_, |a, b| Value::from(a > b))?,
        op::I64_GT_U => binary(stack, i64_, |a, b| Value::from((a as u64) > (b as u64)))?,
        op::I64_LE_S => binary(stack, i64_, |a, b| Value::from(a <= b))?,
        op::I64_LE_U => binary(stack, i64_, |a, b| Value::from((a as u64) <= (b as u64)))?,
        op::I64_GE_S => binary(stack, i64_, |a, b| Value::from(a >= b))?,
        op::I64_GE_U => binary(stack, i64_, |a, b| Value::from((a as u64) >= (b as u64)))?,

        op::F32_EQ => binary(stack, f32_, |a, b| Value::from(a == b))?,
        op::F32_NE => binary(stack, f32_, |a, b| Value::from(a != b))?,
        op::F32_LT => binary(stack, f32_, |a, b| Value::from(a < b))?,
        op::F32_GT => binary(stack, f32_, |a, b| Value::from(a > b))?,
        op::F32_LE => binary(stack, f32_, |a, b| Value::from(a <= b))?,
        op::F32_GE => binary(stack, f32_, |a, b| Value::from(a >= b))?,

        op::F64_EQ => binary(stack, f64_, |a, b| Value::from(a == b))?,
        op::F64_NE => binary(stack, f64_, |a, b| Value::from(a != b))?,
        op::F64_LT => binary(stack, f64_, |a, b| Value::from(a < b))?,
        op::F64_GT => binary(stack, f64_, |a, b| Value::from(a > b))?,
        op::F64_LE => binary(stack, f64_, |a, b| Value::from(a <= b))?,
        op::F64_GE => binary(stack, f64_, |a, b| Value::from(a >= b))?,

        op::I32_CLZ => unary(stack, i32_, |a| I32(a.leading_zeros() as i32))?,
        op::I32_CTZ => unary(stack, i32_, |a| I32(a.trailing_zeros() as i32))?,
        op::I32_POPCNT => unary(stack, i32_, |a| I32(a.count_ones() as i32))?,
        op::I32_ADD => binary(stack, i32_, |a, b| I32(a.wrapping_add(b)))?,
        op::I32_SUB => binary(stack, i32_, |a, b| I32(a.wrapping_sub(b)))?,
        op::I32_MUL => binary(stack, i32_, |a, b| I32(a.wrapping_mul(b)))?,
        op::I32_DIV_S => try_binary(stack, i32_, |a, b| {
            if b == 0 {
                return Err(trap!(DivisionByZero, "i32.div_s by zero"));
            }
            if a == i32::MIN && b == -1 {
                return Err(trap!(IntegerOverflow, "i32.div_s overflow"));
            }
            Ok(I32(a / b))
        })?,
        op::I32_DIV_U => try_binary(stack, i32_, |a, b| {
            if b == 0 {
                return Err(trap!(DivisionByZero, "i32.div_u by zero"));
            }
            Ok(I32(((a as u32) / (b as u32)) as i32))
        })?,
        op::I32_REM_S => try_binary(stack, i32_, |a, b| {
            if b == 0 {
                return Err(trap!(DivisionByZero, "i32.rem_s by zero"));
            }
            Ok(I32(a.wrapping_rem(b)))
        })?,
        op::I32_REM_U => try_binary(stack, i32_, |a, b| {
            if b == 0 {
                return Err(trap!(DivisionByZero, "i32.rem_u by zero"));
            }
            Ok(I32(((a as u32) % (b as u32)) as i32))
        })?,
        op::I32_AND => binary(stack, i32_, |a, b| I32(a & b))?,
        op::I32_OR => binary(stack, i32_, |a, b| I32(a | b))?,
        op::I32_XOR => binary(stack, i32_, |a, b| I32(a ^ b))?,
        op::I32_SHL => binary(stack, i32_, |a, b| I32(a.wrapping_shl(b as u32)))?,
        op::I32_SHR_S => binary(stack, i32_, |a, b| I32(a.wrapping_shr(b as u32)))?,
        op::I32_SHR_U => {
            binary(stack, i32_, |a, b| I32((a as u32).wrapping_shr(b as u32) as i32))?
        }
        op::I32_ROTL => binary(stack, i32_, |a, b| I32(a.rotate_left(b as u32 % 32)))?,
        op::I32_ROTR => binary(stack, i32_, |a, b| I32(a.rotate_right(b as u32 % 32)))?,

        op::I64_CLZ => unary(stack, i64_, |a| I64(i64::from(a.leading_zeros())))?,
        op::I64_CTZ => unary(stack, i64_, |a| I64(i64::from(a.trailing_zeros())))?,
        op::I64_POPCNT => unary(stack, i64_, |a| I64(i64::from(a.count_ones())))?,
        op::I64_ADD => binary(stack, i64_, |a, b| I64(a.wrapping_add(b)))?,
        op::I64_SUB => binary(stack, i64_, |a, b| I64(a.wrapping_sub(b)))?,
        op::I64_MUL => binary(stack, i64_, |a, b| I64(a.wrapping_mul(b)))?,
        op::I64_DIV_S => try_binary(stack, i64_, |a, b| {
            if b == 0 {
                return Err(trap!(DivisionByZero, "i64.div_s by zero"));
            }
            if a == i64::MIN && b == -1 {
                return Err(trap!(IntegerOverflow, "i64.div_s overflow"));
            }
            Ok(I64(a / b))
        })?,
        op::I64_DIV_U => try_binary(stack, i64_, |a, b| {
            if b == 0 {
                return Err(trap!(DivisionByZero, "i64.div_u by zero"));
            }
            Ok(I64(((a as u64) / (b as u64)) as i64))
        })?,
        op::I64_REM_S => try_binary(stack, i64_, |a, b| {
            if b == 0 {
                return Err(trap!(DivisionByZero, "i64.rem_s by zero"));
            }
            Ok(I64(a.wrapping_rem(b)))
        })?,
        op::I64_REM_U => try_binary(stack, i64_, |a, b| {
            if b == 0 {
                return Err(trap!(DivisionByZero, "i64.rem_u by zero"));
            }
            Ok(I64(((a as u64) % (b as u64)) as i64))
        })?,
        op::I64_AND => binary(stack, i64_, |a, b| I64(a & b))?,
        op::I64_OR => binary(stack, i64_, |a, b| I64(a | b))?,
        op::I64_XOR => binary(stack, i64_, |a, b| I64(a ^ b))?,
        op::I64_SHL => binary(stack, i64_, |a, b| I64(a.wrapping_shl(b as u32)))?,
        op::I64_SHR_S => binary(stack, i64_, |a, b| I64(a.wrapping_shr(b as u32)))?,
        op::I64_SHR_U => {
            binary(stack, i64_, |a, b| I64((a as u64).wrapping_shr(b as u32) as i64))?
        }
        op::I64_ROTL => binary(stack, i64_, |a, b| I64(a.rotate_left(b as u32 % 64)))?,
        op::I64_ROTR => binary(stack, i64_, |a, b| I64(a.rotate_right(b as u32 % 64)))?,

        op::F32_ABS => unary(stack, f32_, |a| F32(a.abs()))?,
        op::F32_NEG => unary(stack, f32_, |a| F32(-a))?,
        op::F32_CEIL => unary(stack, f32_, |a| F32(a.ceil()))?,
        op::F32_FLOOR => unary(stack, f32_, |a| F32(a.floor()))?,
        op::F32_TRUNC => unary(stack, f32_, |a| F32(a.trunc()))?,
        op::F32_NEAREST => unary(stack, f32_, |a| F32(a.round_ties_even()))?,
        op::F32_SQRT => unary(stack, f32_, |a| F32(a.sqrt()))?,
        op::F32_ADD => binary(stack, f32_, |a, b| F32(a + b))?,
        op::F32_SUB => binary(stack, f32_, |a, b| F32(a - b))?,
        op::F32_MUL => binary(stack, f32_, |a, b| F32(a * b))?,
        op::F32_DIV => binary(stack, f32_, |a, b| F32(a / b))?,
        op::F32_MIN => binary(stack, f32_, |a, b| F32(min_f32(a, b)))?,
        op::F32_MAX => binary(stack, f32_, |a, b| F32(max_f32(a, b)))?,
        op::F32_COPYSIGN => binary(stack, f32_, |a, b| F32(a.copysign(b)))?,

        op::F64_ABS => unary(stack, f64_, |a| F64(a.abs()))?,
        op::F64_NEG => unary(stack, f64_, |a| F64(-a))?,
        op::F64_CEIL => unary(stack, f64_, |a| F64(a.ceil()))?,
        op::F64_FLOOR => unary(stack, f64_, |a| F64(a.floor()))?,
        op::F64_TRUNC => unary(stack, f64_, |a| F64(a.trunc()))?,
        op::F64_NEAREST => unary(stack, f64_, |a| F64(a.round_ties_even()))?,
        op::F64_SQRT => unary(stack, f64_, |a| F64(a.sqrt()))?,
        op::F64_ADD => binary(stack, f64_, |a, b| F64(a + b))?,
        op::F64_SUB => binary(stack, f64_, |a, b| F64(a - b))?,
        op::F64_MUL => binary(stack, f64_, |a, b| F64(a * b))?,
        op::F64_DIV => binary(stack, f64_, |a, b| F64(a / b))?,
        op::F64_MIN => binary(stack, f64_, |a, b| F64(min_f64(a, b)))?,
        op::F64_MAX => binary(stack, f64_, |a, b| F64(max_f64(a, b)))?,
        op::F64_COPYSIGN => binary(stack, f64_, |a, b| F64(a.copysign(b)))?,

        op::I32_WRAP_I64 => unary(stack, i64_, |a| I32(a as i32))?,
        op::I32_TRUNC_F32_S => try_unary(stack, f32_, |a| trunc_i32_s(f64::from(a)).map(I32))?,
        op::I32_TRUNC_F32_U => try_unary(stack, f32_, |a| trunc_i32_u(f64::from(a)).map(I32))?,
        op::I32_TRUNC_F64_S => try_unary(stack, f64_, |a| trunc_i32_s(a).map(I32))?,
        op::I32_TRUNC_F64_U => try_unary(stack, f64_, |a| trunc_i32_u(a).map(I32))?,
        op::I64_EXTEND_I32_S => unary(stack, i32_, |a| I64(i64::from(a)))?,
        op::I64_EXTEND_I32_U => unary(stack, i32_, |a| I64(i64::from(a as u32)))?,
        op::I64_TRUNC_F32_S => try_unary(stack, f32_, |a| trunc_i64_s(f64::from(a)).map(I64))?,
        op::I64_TRUNC_F32_U => try_unary(stack, f32_, |a| trunc_i64_u(f64::from(a)).map(I64))?,
        op::I64_TRUNC_F64_S => try_unary(stack, f64_, |a| trunc_i64_s(a).map(I64))?,
        op::I64_TRUNC_F64_U => try_unary(stack, f64_, |a| trunc_i64_u(a).map(I64))?,
        op::F32_CONVERT_I32_S => unary(stack, i32_, |a| F32(a as f32))?,
        op::F32_CONVERT_I32_U => unary(stack, i32_, |a| F32(a as u32 as f32))?,
        op::F32_CONVERT_I64_S => unary(stack, i64_, |a| F32(a as f32))?,
        op::F32_CONVERT_I64_U => unary(stack, i64_, |a| F32(a as u64 as f32))?,
        op::F32_DEMOTE_F64 => unary(stack, f64_, |a| F32(a as f32))?,
        op::F64_CONVERT_I32_S => unary(stack, i32_, |a| F64(f64::from(a)))?,
        op::F64_CONVERT_I32_U => unary(stack, i32_, |a| F64(f64::from(a as u32)))?,
        op::F64_CONVERT_I64_S => unary(stack, i64_, |a| F64(a as f64))?,
        op::F64_CONVERT_I64_U => unary(stack, i64_, |a| F64(a as u64 as f64))?,
        op::F64_PROMOTE_F32 => unary(stack, f32_, |a| F64(f64::from(a)))?,
        op::I32_REINTERPRET_F32 => unary(stack, f32_, |a| I32(a.to_bits() as i32))?,
        op::I64_REINTERPRET_F64 => unary(stack, f64_, |a| I64(a.to_bits() as i64))?,
        op::F32_REINTERPRET_I32 => unary(stack, i32_, |a| F32(f32::from_bits(a as u32)))?,
        op::F64_REINTERPRET_I64 => unary(stack, i64_, |a| F64(f64::from_bits(a as u64)))?,
        op::I32_EXTEND8_S => unary(stack, i32_, |a| I32(i32::from(a as i8)))?,
        op::I32_EXTEND16_S => unary(stack, i32_, |a| I32(i32::from(a as i16)))?,
        op::I64_EXTEND8_S => unary(stack, i64_, |a| I64(i64::from(a as i8)))?,
        op::I64_EXTEND16_S => unary(stack, i64_, |a| I64(i64::from(a as i16)))?,
        op::I64_EXTEND32_S => unary(stack, i64_, |a| I64(i64::from(a as i32)))?,

        // `as` casts from float to int saturate and map NaN to 0.
        op::I32_TRUNC_SAT_F32_S => unary(stack, f32_, |a| I32(a as i32))?,
        op::I32_TRUNC_SAT_F32_U => unary(stack, f32_, |a| I32(a as u32 as i32))?,
        op::I32_TRUNC_SAT_F64_S => unary(stack, f64_, |a| I32(a as i32))?,
        op::I32_TRUNC_SAT_F64_U => unary(stack, f64_, |a| I32(a as u32 as i32))?,
        op::I64_TRUNC_SAT_F32_S => unary(stack, f32_, |a| I64(a as i64))?,
        op::I64_TRUNC_SAT_F32_U => unary(stack, f32_, |a| I64(a as u64 as i64))?,
        op::I64_TRUNC_SAT_F64_S => unary(stack, f64_, |a| I64(a as i64))?,
        op::I64_TRUNC_SAT_F64_U => unary(stack, f64_, |a| I64(a as u64 as i64))?,

        _ => return Ok(false),
    }
    Ok(true)
}

fn check_convertible(x: f64) -> VmResult<()> {
    if x.is_nan() {
        return Err(trap!(InvalidConversion, "cannot convert NaN to an integer"));
    }
    Ok(())
}

fn out_of_range(x: f64, ty: &str) -> crate::error::VmError {
    trap!(IntegerOverflow, "{x} is out of range for {ty}")
}

fn trunc_i32_s(x: f64) -> VmResult<i32> {
    check_convertible(x)?;
    if !(x > -2_147_483_649.0 && x < 2_147_483_648.0) {
        return Err(out_of_range(x, "i32"));
    }
    Ok(x as i32)
}

fn trunc_i32_u(x: f64) -> VmResult<i32> {
    check_convertible(x)?;
    if !(x > -1.0 && x < 4_294_967_296.0) {
        return Err(out_of_range(x, "u32"));
    }
    Ok(x as u32 as i32)
}

fn trunc_i64_s(x: f64) -> VmResult<i64> {
    check_convertible(x)?;
    if !(x >= -9_223_372_036_854_775_808.0 && x < 9_223_372_036_854_775_808.0) {
        return Err(out_of_range(x, "i64"));
    }
    Ok(x as i64)
}

fn trunc_i64_u(x: f64) -> VmResult<i64> {
    check_convertible(x)?;
    if !(x > -1.0 && x < 18_446_744_073_709_551_616.0) {
        return Err(out_of_range(x, "u64"));
    }
    Ok(x as u64 as i64)
}

// min/max propagate NaN and order -0 below +0, unlike `f64::min`.

fn min_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        if a.is_sign_negative() {
            a
        } else {
            b
        }
    } else {
        a.min(b)
    }
}

fn max_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        if a.is_sign_positive() {
            a
        } else {
            b
        }
    } else {
        a.max(b)
    }
}

fn min_f64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_negative() {
            a
        } else {
            b
        }
    } else {
        a.min(b)
    }
}

fn max_f64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_positive() {
            a
        } else {
            b
        }
    } else {
        a.max(b)
    }
}
