//! Template binding: substituting resolved field values into a workflow
//! template document.
//!
//! The template is an opaque structured JSON document whose scalar leaves
//! may be placeholder tokens (default pattern `{{##name##}}`, overridable
//! per field). Substitution is type-preserving: a placeholder bound to a
//! numeric field becomes a numeric leaf, not a stringified number.
//!
//! Seed-named numeric inputs (`seed`, `noise_seed`) are rebound to the
//! allocated seed even when no placeholder token is present, so
//! hand-authored templates with a hardcoded seed still produce fresh,
//! reproducible runs.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::fields::ResolvedField;
use crate::workboard::FieldDefinition;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Regex matching default-pattern placeholder tokens, capturing the name.
pub const PLACEHOLDER_PATTERN: &str = r"\{\{##([a-zA-Z0-9_-]+)##\}\}";

/// Compiled placeholder regex. Compiled once, reused forever.
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLACEHOLDER_PATTERN).expect("valid regex"));

/// Input names whose numeric leaves are rebound to the allocated seed.
const SEED_INPUT_NAMES: &[&str] = &["seed", "noise_seed"];

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Warning raised while binding. Never fatal on its own: unresolved
/// placeholders are left in place and reported so template authors can
/// detect dead bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BindWarning {
    /// The template references a placeholder with no resolved field.
    UnresolvedPlaceholder { name: String },
}

/// The bound document plus everything the binder wants the caller to know.
#[derive(Debug, Clone, Serialize)]
pub struct BoundDocument {
    pub document: serde_json::Value,
    pub warnings: Vec<BindWarning>,
}

impl BoundDocument {
    /// Names of placeholders that remained unresolved after binding.
    pub fn unresolved_names(&self) -> Vec<&str> {
        self.warnings
            .iter()
            .map(|w| match w {
                BindWarning::UnresolvedPlaceholder { name } => name.as_str(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Substitute resolved field values into a template document.
///
/// `fields` supplies per-field placeholder tokens (`format_string`
/// overrides); `resolved` supplies the values. Leaves are replaced when
/// they exactly equal a token (type-preserving) or contain one embedded in
/// a longer string (textual). Numeric leaves under seed-named input keys
/// are replaced with `seed`.
pub fn bind(
    template: &serde_json::Value,
    fields: &[FieldDefinition],
    resolved: &[ResolvedField],
    seed: u64,
) -> BoundDocument {
    let by_name: HashMap<&str, &ResolvedField> =
        resolved.iter().map(|r| (r.name.as_str(), r)).collect();

    // token -> resolved field, for exact and embedded replacement;
    // token -> field name for every declared field, so unresolved custom
    // tokens are still detected.
    let mut bindings: HashMap<String, &ResolvedField> = HashMap::new();
    let mut declared: HashMap<String, &str> = HashMap::new();
    for def in fields {
        declared.insert(def.placeholder_token(), def.name.as_str());
        if let Some(r) = by_name.get(def.name.as_str()) {
            bindings.insert(def.placeholder_token(), r);
        }
    }

    let mut warnings = Vec::new();
    let mut seen_unresolved = std::collections::HashSet::new();
    let document = bind_value(
        template,
        &bindings,
        seed,
        &by_name,
        &declared,
        &mut |name: &str| {
            if seen_unresolved.insert(name.to_string()) {
                warnings.push(BindWarning::UnresolvedPlaceholder {
                    name: name.to_string(),
                });
            }
        },
    );

    BoundDocument { document, warnings }
}

/// Recursively bind one JSON value.
fn bind_value(
    value: &serde_json::Value,
    bindings: &HashMap<String, &ResolvedField>,
    seed: u64,
    resolved_names: &HashMap<&str, &ResolvedField>,
    declared: &HashMap<String, &str>,
    on_unresolved: &mut dyn FnMut(&str),
) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => {
            bind_string(s, bindings, resolved_names, declared, on_unresolved)
        }
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                let bound = if val.is_number() && SEED_INPUT_NAMES.contains(&key.as_str()) {
                    serde_json::json!(seed)
                } else {
                    bind_value(val, bindings, seed, resolved_names, declared, on_unresolved)
                };
                out.insert(key.clone(), bound);
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|v| bind_value(v, bindings, seed, resolved_names, declared, on_unresolved))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Bind a string leaf.
///
/// An exact token match replaces the whole leaf with the field's typed
/// JSON value. Otherwise tokens embedded in a longer string are replaced
/// textually, and any remaining default-pattern placeholders with no
/// resolved field are reported as unresolved and left untouched.
fn bind_string(
    s: &str,
    bindings: &HashMap<String, &ResolvedField>,
    resolved_names: &HashMap<&str, &ResolvedField>,
    declared: &HashMap<String, &str>,
    on_unresolved: &mut dyn FnMut(&str),
) -> serde_json::Value {
    if let Some(resolved) = bindings.get(s) {
        return resolved.value.to_json();
    }

    let mut out = s.to_string();
    for (token, resolved) in bindings {
        if out.contains(token.as_str()) {
            out = out.replace(token.as_str(), &resolved.value.to_text());
        }
    }

    // Declared tokens still present are unresolved bindings, including
    // custom format-string tokens the default pattern would miss.
    for (token, name) in declared {
        if !resolved_names.contains_key(name) && out.contains(token.as_str()) {
            on_unresolved(name);
        }
    }
    for caps in PLACEHOLDER_RE.captures_iter(&out) {
        let name = &caps[1];
        if !resolved_names.contains_key(name) {
            on_unresolved(name);
        }
    }

    serde_json::Value::String(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
