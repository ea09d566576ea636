//! Positional argument binding and type coercion.

use serde_json::{Number, Value};

use crate::error::GatewayError;
use crate::handler::Arguments;
use crate::registry::{MethodDescriptor, ParamType};
use crate::Result;

/// Bind raw call arguments to `method`'s parameters.
///
/// Missing and `null` arguments bind to `Value::Null`. Extra arguments are
/// ignored. A value that cannot be coerced to its declared type fails the call.
pub fn bind(method: &MethodDescriptor, raw: &[Value]) -> Result<Arguments> {
    let values = method
        .params
        .iter()
        .enumerate()
        .map(|(i, spec)| match raw.get(i) {
            None | Some(Value::Null) => Ok(Value::Null),
            Some(value) => coerce(value, &spec.ty).map_err(|msg| {
                GatewayError::Conversion(format!("Parameter '{}': {}", spec.name, msg))
            }),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Arguments::new(values))
}

/// Fail with `InvalidParameters` if a required parameter is absent.
pub fn check_required(method: &MethodDescriptor, args: &Arguments) -> Result<()> {
    match method
        .params
        .iter()
        .enumerate()
        .find(|(i, spec)| spec.required && args.get(*i).is_none())
    {
        Some((_, spec)) => Err(GatewayError::InvalidParameters(spec.name.clone())),
        None => Ok(()),
    }
}

/// Convert `value` to `ty`, building collections element by element.
pub fn coerce(value: &Value, ty: &ParamType) -> std::result::Result<Value, String> {
    match ty {
        ParamType::Any => Ok(value.clone()),
        ParamType::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(mismatch(other, ty)),
        },
        ParamType::Integer => match value {
            Value::Number(n) => integer_from_number(n).ok_or_else(|| mismatch(value, ty)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("cannot convert \"{}\" to integer", s)),
            other => Err(mismatch(other, ty)),
        },
        ParamType::Float => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("cannot convert \"{}\" to float", s)),
            other => Err(mismatch(other, ty)),
        },
        ParamType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => Err(mismatch(other, ty)),
        },
        ParamType::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            other => Err(mismatch(other, ty)),
        },
        ParamType::List(element) => match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Null => Ok(Value::Null),
                    item => coerce(item, element).map_err(|msg| format!("element {}: {}", i, msg)),
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(mismatch(other, ty)),
        },
    }
}

fn integer_from_number(n: &Number) -> Option<Value> {
    if let Some(i) = n.as_i64() {
        return Some(Value::from(i));
    }
    if let Some(u) = n.as_u64() {
        return i64::try_from(u).ok().map(Value::from);
    }
    // Whole floats such as 3.0 are accepted
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| Value::from(f as i64))
}

fn mismatch(value: &Value, ty: &ParamType) -> String {
    let found = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    format!("expected {}, found {}", ty, found)
}
