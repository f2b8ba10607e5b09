//! Structural equality used to decide whether an observer must be notified.
//!
//! Rules, in order:
//!
//! 1. The same reference is always equal.
//! 2. `null` equals only `null`.
//! 3. Values of different JSON kinds are never equal.
//! 4. Booleans and strings compare by value. Numbers compare numerically:
//!    integers exactly, anything involving a float with `f64 ==`, so `1`
//!    equals `1.0` and NaN would never equal itself.
//! 5. Arrays compare element-wise and are order-sensitive.
//! 6. Objects compare by key count and per-key value, ignoring key order.
//!
//! `serde_json::Value` trees cannot contain cycles, so no cycle detection is
//! performed.

use serde_json::{Number, Value};

/// Deep structural comparison of two JSON values.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }

    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| deep_equal(x, y)))
        }
        _ => false,
    }
}

/// Deep comparison where `None` stands for an absent (undefined) value.
///
/// `None` equals only `None`; in particular it is not equal to `Value::Null`.
pub fn deep_equal_opt(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => deep_equal(x, y),
        _ => false,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    if x.is_f64() || y.is_f64() {
        return match (x.as_f64(), y.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
    }
    // One side is a negative i64 and the other a u64 above i64::MAX.
    false
}
