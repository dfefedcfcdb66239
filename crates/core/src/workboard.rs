//! Workboard definitions: the published binding between a set of input
//! fields and a generation-backend workflow template.
//!
//! A workboard is immutable once published; edits produce a new version
//! with a bumped `version` counter. [`validate_workboard`] enforces the
//! publish-time invariants so that option matching at submission time can
//! never be ambiguous.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum length of a workboard name.
pub const MAX_WORKBOARD_NAME_LENGTH: usize = 200;

/// Maximum number of declared fields per workboard.
pub const MAX_FIELDS_PER_WORKBOARD: usize = 100;

/// Default cap on asset references for an `image` field when the author
/// does not configure one.
pub const DEFAULT_IMAGE_MAX_COUNT: usize = 1;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// One selectable option of a `select` field.
///
/// `key` is the human-readable label shown to the submitter; `value` is the
/// canonical token substituted into the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub key: String,
    pub value: String,
}

/// The typed shape of a field, as a tagged union over kind-specific data.
///
/// Matching on this enum at the resolver boundary is exhaustive, so an
/// unsupported kind is a compile error rather than a runtime surprise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Free-form text.
    String,
    /// Numeric input. Parsed strictly; non-numeric submissions are rejected.
    Number,
    /// Boolean toggle. Truthy strings ("true", "1", "yes", "on") coerce.
    Boolean,
    /// Pick-one from an ordered option list.
    Select {
        options: Vec<SelectOption>,
        /// Canonical token to fall back to when a submission matches no
        /// option. Defaults to the first option when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_value: Option<String>,
    },
    /// A list of already-uploaded asset references, capped at `max_count`.
    Image { max_count: usize },
}

/// A single declared input field of a workboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Placeholder key referenced by the workflow template.
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Literal placeholder token overriding the default `{{##name##}}`
    /// pattern for this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_string: Option<String>,
}

impl FieldDefinition {
    /// The exact placeholder token this field occupies in the template.
    pub fn placeholder_token(&self) -> String {
        match &self.format_string {
            Some(fmt) => fmt.clone(),
            None => default_placeholder(&self.name),
        }
    }
}

/// Build the default placeholder token for a field name.
pub fn default_placeholder(name: &str) -> String {
    format!("{{{{##{name}##}}}}")
}

/// A published workboard: ordered field declarations plus the workflow
/// template document they bind into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkboardDefinition {
    pub id: uuid::Uuid,
    pub name: String,
    /// Monotonic version counter; bumped on every published edit.
    pub version: u32,
    /// Ordered field declarations.
    pub fields: Vec<FieldDefinition>,
    /// Opaque structured workflow document containing placeholder tokens.
    pub workflow_template: serde_json::Value,
}

impl WorkboardDefinition {
    /// Look up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// ---------------------------------------------------------------------------
// Publish-time validation
// ---------------------------------------------------------------------------

/// Validate a workboard before publishing.
///
/// Rules:
/// - Name must be non-empty and within length limits.
/// - Field names must be non-empty, unique, and contain only alphanumeric,
///   hyphen, or underscore characters.
/// - `select` fields must declare at least one option, with option keys and
///   values each unique within the field; a `default_value` must match a
///   declared option value.
/// - `image` fields must allow at least one asset.
/// - A `format_string`, when present, must be a non-empty token.
pub fn validate_workboard(board: &WorkboardDefinition) -> Result<(), CoreError> {
    let name = board.name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Workboard name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_WORKBOARD_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Workboard name must not exceed {MAX_WORKBOARD_NAME_LENGTH} characters"
        )));
    }
    if board.fields.len() > MAX_FIELDS_PER_WORKBOARD {
        return Err(CoreError::Validation(format!(
            "A workboard may declare at most {MAX_FIELDS_PER_WORKBOARD} fields"
        )));
    }

    let mut seen_names = std::collections::HashSet::with_capacity(board.fields.len());
    for field in &board.fields {
        validate_field(field)?;
        if !seen_names.insert(field.name.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate field name: \"{}\"",
                field.name
            )));
        }
    }

    Ok(())
}

/// Validate a single field declaration.
fn validate_field(field: &FieldDefinition) -> Result<(), CoreError> {
    if field.name.is_empty() {
        return Err(CoreError::Validation(
            "Field name must not be empty".to_string(),
        ));
    }
    if !field
        .name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(format!(
            "Field name \"{}\" may only contain alphanumeric, hyphen, or underscore characters",
            field.name
        )));
    }
    if let Some(fmt) = &field.format_string {
        if fmt.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Field \"{}\" has an empty format string",
                field.name
            )));
        }
    }

    match &field.kind {
        FieldKind::Select {
            options,
            default_value,
        } => validate_select(&field.name, options, default_value.as_deref()),
        FieldKind::Image { max_count } => {
            if *max_count == 0 {
                return Err(CoreError::Validation(format!(
                    "Image field \"{}\" must allow at least one asset",
                    field.name
                )));
            }
            Ok(())
        }
        FieldKind::String | FieldKind::Number | FieldKind::Boolean => Ok(()),
    }
}

/// Validate the option set of a `select` field.
///
/// Duplicate keys or values are rejected here so the submission-time
/// value -> key fallback chain can never bind to the wrong option.
fn validate_select(
    field_name: &str,
    options: &[SelectOption],
    default_value: Option<&str>,
) -> Result<(), CoreError> {
    if options.is_empty() {
        return Err(CoreError::Validation(format!(
            "Select field \"{field_name}\" must declare at least one option"
        )));
    }

    let mut keys = std::collections::HashSet::with_capacity(options.len());
    let mut values = std::collections::HashSet::with_capacity(options.len());
    for opt in options {
        if opt.key.is_empty() || opt.value.is_empty() {
            return Err(CoreError::Validation(format!(
                "Select field \"{field_name}\" has an option with an empty key or value"
            )));
        }
        if !keys.insert(opt.key.as_str()) {
            return Err(CoreError::Validation(format!(
                "Select field \"{field_name}\" has duplicate option key \"{}\"",
                opt.key
            )));
        }
        if !values.insert(opt.value.as_str()) {
            return Err(CoreError::Validation(format!(
                "Select field \"{field_name}\" has duplicate option value \"{}\"",
                opt.value
            )));
        }
    }

    if let Some(default) = default_value {
        if !values.contains(default) {
            return Err(CoreError::Validation(format!(
                "Select field \"{field_name}\" default \"{default}\" matches no declared option value"
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
