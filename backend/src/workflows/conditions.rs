// Workflow Conditions - flat checks a definition applies to the trigger data

use automation_shared::{Condition, ConditionOperator};
use serde_json::Value;

use super::variables::get_path;

/// All conditions must hold; an empty list always passes
pub fn evaluate_all(conditions: &[Condition], data: &Value) -> bool {
    conditions.iter().all(|c| evaluate(c, data))
}

pub fn evaluate(condition: &Condition, data: &Value) -> bool {
    let field_value = get_path(data, &condition.field).filter(|v| !v.is_null());

    match condition.operator {
        ConditionOperator::Equals => field_value
            .map(|v| loosely_equal(v, &condition.value))
            .unwrap_or(false),
        ConditionOperator::NotEquals => field_value
            .map(|v| !loosely_equal(v, &condition.value))
            .unwrap_or(true),
        ConditionOperator::GreaterThan => compare(field_value, &condition.value, |a, b| a > b),
        ConditionOperator::GreaterThanOrEquals => compare(field_value, &condition.value, |a, b| a >= b),
        ConditionOperator::LessThan => compare(field_value, &condition.value, |a, b| a < b),
        ConditionOperator::LessThanOrEquals => compare(field_value, &condition.value, |a, b| a <= b),
        ConditionOperator::Contains => match (field_value, &condition.value) {
            (Some(Value::String(s)), Value::String(pattern)) => {
                s.to_lowercase().contains(&pattern.to_lowercase())
            }
            (Some(Value::Array(items)), needle) => items.contains(needle),
            _ => false,
        },
        ConditionOperator::IsEmpty => field_value.map(is_empty).unwrap_or(true),
        ConditionOperator::IsNotEmpty => field_value.map(|v| !is_empty(v)).unwrap_or(false),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(field: Option<&Value>, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (field.and_then(as_number), as_number(expected)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

// "5000" from a form and 5000 from config compare equal
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => false,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
