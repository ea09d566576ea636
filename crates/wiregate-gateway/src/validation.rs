//! Parameter validation.

use serde_json::Value;

use crate::handler::Arguments;
use crate::registry::{Constraint, MethodDescriptor};

/// Inspects bound arguments and reports violation messages.
pub trait ParamValidator: Send + Sync {
    /// Return one message per violation; empty when the arguments are valid.
    fn validate(&self, method: &MethodDescriptor, args: &Arguments) -> Vec<String>;
}

/// Evaluates the [`Constraint`]s declared on each parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintValidator;

impl ParamValidator for ConstraintValidator {
    fn validate(&self, method: &MethodDescriptor, args: &Arguments) -> Vec<String> {
        let mut violations = Vec::new();
        for (i, spec) in method.params.iter().enumerate() {
            let value = args.get(i);
            for constraint in &spec.constraints {
                if let Some(msg) = check(constraint, value) {
                    violations.push(format!("{} {}", spec.name, msg));
                }
            }
        }
        violations
    }
}

/// Check one constraint. Absent values only fail `NotBlank`.
fn check(constraint: &Constraint, value: Option<&Value>) -> Option<String> {
    if let Constraint::NotBlank = constraint {
        let blank = match value {
            None => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        return blank.then(|| "must not be blank".to_string());
    }

    let value = value?;
    match constraint {
        Constraint::NotBlank => None,
        Constraint::Length { min, max } => {
            let len = match value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                _ => return None,
            };
            let too_short = min.map_or(false, |m| len < m);
            let too_long = max.map_or(false, |m| len > m);
            (too_short || too_long).then(|| bounds_message("length must be", *min, *max))
        }
        Constraint::Range { min, max } => {
            let n = value.as_f64()?;
            let below = min.map_or(false, |m| n < m);
            let above = max.map_or(false, |m| n > m);
            (below || above).then(|| bounds_message("must be", *min, *max))
        }
        Constraint::Pattern(re) => {
            let s = value.as_str()?;
            (!re.is_match(s)).then(|| format!("must match \"{}\"", re.as_str()))
        }
        Constraint::Email => {
            let s = value.as_str()?;
            (!is_email(s)).then(|| "must be a well-formed email address".to_string())
        }
    }
}

fn bounds_message<T: std::fmt::Display>(prefix: &str, min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("{} between {} and {}", prefix, lo, hi),
        (Some(lo), None) => format!("{} at least {}", prefix, lo),
        (None, Some(hi)) => format!("{} at most {}", prefix, hi),
        (None, None) => format!("{} within bounds", prefix),
    }
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !s.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}
