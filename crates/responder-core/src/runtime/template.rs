// crates/responder-core/src/runtime/template.rs
// ============================================================================
// Module: Responder Template Resolver
// Description: `{{ namespace.path }}` resolution over a layered run context.
// Purpose: Let steps consume alert fields, prior outputs, and environment values.
// Dependencies: serde_json, crate::core::context
// ============================================================================

//! ## Overview
//! Template expressions are dotted paths rooted in one of four namespaces:
//! `alert.*`, `steps.{id}.output.*`, `context.*`, and `env.*`. Resolution is
//! pure with respect to a context snapshot and never mutates it. Missing
//! paths do not raise: inside a larger string they substitute as the empty
//! string; when the whole value is a single expression the typed value (or
//! `null`) is returned unchanged, so a numeric path stays numeric.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Map;
use serde_json::Value;

use crate::core::context::ExecutionContext;

// ============================================================================
// SECTION: Template Context
// ============================================================================

/// Immutable resolution context assembled from one execution snapshot.
///
/// # Invariants
/// - Resolution reads this context only; nothing here is mutated.
/// - When `env_overrides` is set, the live process environment is not read.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Serialized triggering alert (`alert.*`).
    pub alert: Value,
    /// Step output namespace (`steps.{id}.output.*`).
    pub steps: Value,
    /// Execution context fields (`context.*`).
    pub context: Value,
    /// Optional deterministic environment map; live process env otherwise.
    pub env_overrides: Option<BTreeMap<String, String>>,
}

impl TemplateContext {
    /// Builds a resolution context from an execution context snapshot.
    ///
    /// The alert namespace exposes the alert's header fields plus the
    /// vendor payload's top-level entries (headers win on collision), so
    /// authored paths like `alert.host.hostname` reach into the payload
    /// without naming the envelope.
    #[must_use]
    pub fn from_execution(execution: &ExecutionContext) -> Self {
        let alert = execution
            .alert
            .as_ref()
            .and_then(|alert| serde_json::to_value(alert).ok())
            .map_or(Value::Null, flatten_alert);
        let steps = execution.variables.get("steps").cloned().unwrap_or(Value::Null);
        let mut context_map = Map::new();
        context_map
            .insert("execution_id".to_string(), Value::from(execution.execution_id.to_string()));
        context_map.insert("runbook_id".to_string(), Value::from(execution.runbook_id.as_str()));
        context_map
            .insert("runbook_version".to_string(), Value::from(execution.runbook_version.clone()));
        context_map.insert("mode".to_string(), Value::from(execution.mode.as_str()));
        context_map
            .insert("started_at".to_string(), Value::from(execution.started_at.to_rfc3339()));
        context_map.insert("state".to_string(), Value::from(execution.state.as_str()));
        Self {
            alert,
            steps,
            context: Value::Object(context_map),
            env_overrides: None,
        }
    }

    /// Replaces live environment reads with a deterministic map.
    #[must_use]
    pub fn with_env_overrides(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.env_overrides = Some(overrides);
        self
    }

    /// Resolves a dotted expression path against the namespaces.
    ///
    /// Returns `None` when any segment is missing.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let namespace = segments.next()?;
        match namespace {
            "alert" => walk(&self.alert, segments),
            "steps" => walk(&self.steps, segments),
            "context" => walk(&self.context, segments),
            "env" => {
                let key = segments.collect::<Vec<_>>().join(".");
                if key.is_empty() {
                    return None;
                }
                self.env_overrides.as_ref().map_or_else(
                    || std::env::var(&key).ok().map(Value::from),
                    |overrides| overrides.get(&key).cloned().map(Value::from),
                )
            }
            _ => None,
        }
    }
}

/// Merges the alert payload's top-level entries into the alert namespace.
fn flatten_alert(serialized: Value) -> Value {
    let Value::Object(mut root) = serialized else {
        return serialized;
    };
    if let Some(Value::Object(data)) = root.remove("data") {
        for (key, value) in data {
            root.entry(key).or_insert(value);
        }
    }
    Value::Object(root)
}

/// Walks the remaining path segments through nested JSON objects.
fn walk<'a>(root: &Value, segments: impl Iterator<Item = &'a str>) -> Option<Value> {
    let mut cursor = root;
    for segment in segments {
        cursor = cursor.as_object()?.get(segment)?;
    }
    Some(cursor.clone())
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Opening delimiter for template expressions.
const OPEN: &str = "{{";
/// Closing delimiter for template expressions.
const CLOSE: &str = "}}";

/// Resolves template expressions in a value tree.
///
/// Strings are scanned for `{{ expression }}` occurrences; objects and
/// arrays recurse; all other values pass through unchanged.
#[must_use]
pub fn resolve_value(value: &Value, context: &TemplateContext) -> Value {
    match value {
        Value::String(text) => resolve_string(text, context),
        Value::Object(map) => Value::Object(
            map.iter().map(|(key, entry)| (key.clone(), resolve_value(entry, context))).collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| resolve_value(item, context)).collect())
        }
        other => other.clone(),
    }
}

/// Resolves every entry of a parameter map.
#[must_use]
pub fn resolve_parameters(
    parameters: &BTreeMap<String, Value>,
    context: &TemplateContext,
) -> Map<String, Value> {
    parameters
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, context)))
        .collect()
}

/// Resolves one string, preserving the typed value for whole-value expressions.
fn resolve_string(text: &str, context: &TemplateContext) -> Value {
    if let Some(expression) = whole_expression(text) {
        return context.lookup(expression).unwrap_or(Value::Null);
    }
    Value::from(interpolate(text, context))
}

/// Returns the inner expression when the entire string is one `{{ ... }}`.
fn whole_expression(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    if inner.contains(OPEN) || inner.contains(CLOSE) {
        return None;
    }
    Some(inner.trim())
}

/// Substitutes every expression occurrence inside a larger string.
fn interpolate(text: &str, context: &TemplateContext) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[.. start]);
        let after_open = &rest[start + OPEN.len() ..];
        let Some(end) = after_open.find(CLOSE) else {
            out.push_str(&rest[start ..]);
            return out;
        };
        let expression = after_open[.. end].trim();
        if let Some(value) = context.lookup(expression) {
            out.push_str(&stringify(&value));
        }
        rest = &after_open[end + CLOSE.len() ..];
    }
    out.push_str(rest);
    out
}

/// Renders a resolved value for in-string substitution.
///
/// Missing and null values render empty; strings render raw; everything
/// else renders as compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
