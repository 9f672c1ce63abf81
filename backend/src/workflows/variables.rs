// Variable Resolver - substitutes {{path.to.field}} placeholders in action configuration

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use uuid::Uuid;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder pattern is valid")
});

/// Workflow metadata exposed to placeholders as `workflow.*`
#[derive(Debug, Clone, Copy)]
pub struct WorkflowMeta<'a> {
    pub id: Uuid,
    pub name: &'a str,
}

/// Resolve every placeholder in `config`, keeping its shape.
///
/// Lookups try the trigger data first (nested path, then a literal dotted
/// key), then workflow metadata. Unmatched tokens are left verbatim.
pub fn resolve(config: &Value, trigger_data: &Value, workflow: WorkflowMeta<'_>) -> Value {
    match config {
        Value::String(s) => Value::String(resolve_str(s, trigger_data, workflow)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, trigger_data, workflow)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve(v, trigger_data, workflow))
                .collect(),
        ),
        _ => config.clone(),
    }
}

pub fn resolve_str(template: &str, trigger_data: &Value, workflow: WorkflowMeta<'_>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            lookup(key, trigger_data, workflow)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// True when the value contains at least one placeholder token
pub fn has_placeholder(value: &Value) -> bool {
    match value {
        Value::String(s) => PLACEHOLDER.is_match(s),
        Value::Object(map) => map.values().any(has_placeholder),
        Value::Array(items) => items.iter().any(has_placeholder),
        _ => false,
    }
}

fn lookup(key: &str, trigger_data: &Value, workflow: WorkflowMeta<'_>) -> Option<String> {
    get_path(trigger_data, key)
        .or_else(|| trigger_data.get(key))
        .and_then(render)
        .or_else(|| match key {
            "workflow.name" | "workflow_name" => Some(workflow.name.to_string()),
            "workflow.id" | "workflow_id" => Some(workflow.id.to_string()),
            _ => None,
        })
}

/// Walk a dotted path through nested objects (and array indices)
pub fn get_path<'v>(data: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(data, |current, part| match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
