//! Field resolution: turning raw submitted values into canonical values.
//!
//! Pure functions with no I/O. A submission is an arbitrary JSON value per
//! field; the resolver matches it against the field's declared shape and
//! produces a canonical value ready for template binding. Select inputs
//! resolve through a value -> key -> default fallback chain, surfacing a
//! non-fatal warning when the fallback fires.

use serde::{Deserialize, Serialize};

use crate::workboard::{FieldDefinition, FieldKind, SelectOption};

// ---------------------------------------------------------------------------
// Canonical values
// ---------------------------------------------------------------------------

/// A resolved field value in its declared type.
///
/// Substitution is type-preserving: a `Number` binds as a JSON number leaf,
/// never as a stringified number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// References to already-uploaded assets.
    Assets(Vec<String>),
}

impl CanonicalValue {
    /// The JSON leaf this value binds into a template.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CanonicalValue::Text(s) => serde_json::Value::String(s.clone()),
            CanonicalValue::Number(n) => serde_json::json!(n),
            CanonicalValue::Bool(b) => serde_json::Value::Bool(*b),
            CanonicalValue::Assets(refs) => serde_json::json!(refs),
        }
    }

    /// Textual form used when a placeholder is embedded inside a longer
    /// string leaf.
    pub fn to_text(&self) -> String {
        match self {
            CanonicalValue::Text(s) => s.clone(),
            CanonicalValue::Number(n) => format_number(*n),
            CanonicalValue::Bool(b) => b.to_string(),
            CanonicalValue::Assets(refs) => refs.join(","),
        }
    }
}

/// Format a number without a trailing `.0` for integral values.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A field after resolution, carrying the canonical value and, for select
/// fields, the `{key, value}` option that matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    pub name: String,
    pub value: CanonicalValue,
    /// The matched option when resolution went through an option set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_option: Option<SelectOption>,
    /// Non-fatal resolution warning (e.g. fallback to the default option).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A per-field resolution failure. Collected, not fail-fast: the assembler
/// gathers one of these per invalid field so a submitter sees everything
/// wrong with a submission at once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("Field '{field}': {reason}")]
pub struct FieldResolutionError {
    pub field: String,
    pub reason: String,
}

impl FieldResolutionError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve a raw submitted value against a field definition.
///
/// Returns `Ok(None)` when an optional field was omitted. A missing or
/// null submission for a required field is an error.
pub fn resolve_field(
    def: &FieldDefinition,
    raw: Option<&serde_json::Value>,
) -> Result<Option<ResolvedField>, FieldResolutionError> {
    let raw = match raw {
        Some(serde_json::Value::Null) | None => {
            return match (&def.kind, def.required) {
                // A required select still resolves through its default option.
                (FieldKind::Select { options, default_value }, _) => {
                    let opt = default_option(options, default_value.as_deref())
                        .ok_or_else(|| FieldResolutionError::new(&def.name, "required field missing"))?;
                    Ok(Some(resolved_from_option(
                        def,
                        opt,
                        Some("no value submitted; used default option".to_string()),
                    )))
                }
                (_, true) => Err(FieldResolutionError::new(&def.name, "required field missing")),
                (_, false) => Ok(None),
            };
        }
        Some(v) => v,
    };

    match &def.kind {
        FieldKind::Select {
            options,
            default_value,
        } => resolve_select(def, options, default_value.as_deref(), raw).map(Some),
        FieldKind::String => resolve_string(def, raw).map(Some),
        FieldKind::Number => resolve_number(def, raw).map(Some),
        FieldKind::Boolean => resolve_boolean(def, raw).map(Some),
        FieldKind::Image { max_count } => resolve_image(def, *max_count, raw).map(Some),
    }
}

// -- select -----------------------------------------------------------------

/// Resolve a select submission through the value -> key -> default chain.
fn resolve_select(
    def: &FieldDefinition,
    options: &[SelectOption],
    default_value: Option<&str>,
    raw: &serde_json::Value,
) -> Result<ResolvedField, FieldResolutionError> {
    // Candidate tokens in tie-break order: an explicit `value` first, then
    // the `key`, then a bare string submission.
    let mut candidates: Vec<String> = Vec::new();
    match raw {
        serde_json::Value::Object(obj) => {
            if let Some(v) = obj.get("value").and_then(|v| v.as_str()) {
                candidates.push(v.to_string());
            }
            if let Some(k) = obj.get("key").and_then(|v| v.as_str()) {
                candidates.push(k.to_string());
            }
            if candidates.is_empty() {
                return Err(FieldResolutionError::new(
                    &def.name,
                    "option object must carry a 'key' or 'value' string",
                ));
            }
        }
        serde_json::Value::String(s) => candidates.push(s.clone()),
        other => {
            return Err(FieldResolutionError::new(
                &def.name,
                format!("expected an option token or {{key, value}} object, got {other}"),
            ))
        }
    }

    // Match each candidate against option values first, then option keys.
    for candidate in &candidates {
        if let Some(opt) = options.iter().find(|o| &o.value == candidate) {
            return Ok(resolved_from_option(def, opt, None));
        }
    }
    for candidate in &candidates {
        if let Some(opt) = options.iter().find(|o| &o.key == candidate) {
            return Ok(resolved_from_option(def, opt, None));
        }
    }

    // Total miss: fall back to the default option with a warning.
    let opt = default_option(options, default_value).ok_or_else(|| {
        FieldResolutionError::new(
            &def.name,
            format!("\"{}\" matches no option and no default is declared", candidates[0]),
        )
    })?;
    Ok(resolved_from_option(
        def,
        opt,
        Some(format!(
            "\"{}\" matched no option; fell back to \"{}\"",
            candidates[0], opt.value
        )),
    ))
}

/// The field's declared default option: `default_value` when set, otherwise
/// the first declared option.
fn default_option<'a>(
    options: &'a [SelectOption],
    default_value: Option<&str>,
) -> Option<&'a SelectOption> {
    match default_value {
        Some(v) => options.iter().find(|o| o.value == v),
        None => options.first(),
    }
}

fn resolved_from_option(
    def: &FieldDefinition,
    opt: &SelectOption,
    warning: Option<String>,
) -> ResolvedField {
    ResolvedField {
        name: def.name.clone(),
        value: CanonicalValue::Text(opt.value.clone()),
        matched_option: Some(opt.clone()),
        warning,
    }
}

// -- scalar kinds -----------------------------------------------------------

fn resolve_string(
    def: &FieldDefinition,
    raw: &serde_json::Value,
) -> Result<ResolvedField, FieldResolutionError> {
    let text = match raw {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => {
            return Err(FieldResolutionError::new(
                &def.name,
                format!("expected a string, got {other}"),
            ))
        }
    };
    Ok(plain(def, CanonicalValue::Text(text)))
}

fn resolve_number(
    def: &FieldDefinition,
    raw: &serde_json::Value,
) -> Result<ResolvedField, FieldResolutionError> {
    let n = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(n) if n.is_finite() => Ok(plain(def, CanonicalValue::Number(n))),
        _ => Err(FieldResolutionError::new(
            &def.name,
            format!("\"{raw}\" is not a valid number"),
        )),
    }
}

fn resolve_boolean(
    def: &FieldDefinition,
    raw: &serde_json::Value,
) -> Result<ResolvedField, FieldResolutionError> {
    let b = match raw {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    };
    match b {
        Some(b) => Ok(plain(def, CanonicalValue::Bool(b))),
        None => Err(FieldResolutionError::new(
            &def.name,
            format!("\"{raw}\" is not a valid boolean"),
        )),
    }
}

fn resolve_image(
    def: &FieldDefinition,
    max_count: usize,
    raw: &serde_json::Value,
) -> Result<ResolvedField, FieldResolutionError> {
    let refs: Vec<String> = match raw {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => {
            let mut refs = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(s) => refs.push(s.to_string()),
                    None => {
                        return Err(FieldResolutionError::new(
                            &def.name,
                            "asset references must be strings",
                        ))
                    }
                }
            }
            refs
        }
        other => {
            return Err(FieldResolutionError::new(
                &def.name,
                format!("expected asset reference(s), got {other}"),
            ))
        }
    };

    if refs.is_empty() && def.required {
        return Err(FieldResolutionError::new(&def.name, "required field missing"));
    }
    // Over capacity is an error, not a silent truncation.
    if refs.len() > max_count {
        return Err(FieldResolutionError::new(
            &def.name,
            format!("{} asset references exceed the cap of {max_count}", refs.len()),
        ));
    }

    Ok(plain(def, CanonicalValue::Assets(refs)))
}

fn plain(def: &FieldDefinition, value: CanonicalValue) -> ResolvedField {
    ResolvedField {
        name: def.name.clone(),
        value,
        matched_option: None,
        warning: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
