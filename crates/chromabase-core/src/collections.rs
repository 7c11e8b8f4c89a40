//! Per-collection validation rules.
//!
//! Every write goes through the same [`CollectionRules::validate`] call; the
//! differences between collections live entirely in the rule table, which is
//! configuration. The default table covers the five CRM collections.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ChromaError, ChromaResult, ErrorCode};
use crate::record::Document;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// Returns true if `value` looks like an email address.
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}

/// Validation rules for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRules {
    /// Collection name as used in URLs and in the document store.
    pub name: String,
    /// Singular display label used in error messages ("Lead").
    pub label: String,
    /// Fields that must be present as non-blank strings.
    #[serde(default)]
    pub required: Vec<String>,
    /// Fields that must hold a valid email address when present.
    #[serde(default)]
    pub email_fields: Vec<String>,
    /// Enumerated fields and their allowed values. Enforced whenever the field
    /// is present; combine with `required` to make it mandatory.
    #[serde(default)]
    pub allowed_values: BTreeMap<String, Vec<String>>,
    /// Numeric fields that must be zero or positive when present.
    #[serde(default)]
    pub non_negative: Vec<String>,
}

impl CollectionRules {
    /// Create an empty rule set for a collection.
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            required: Vec::new(),
            email_fields: Vec::new(),
            allowed_values: BTreeMap::new(),
            non_negative: Vec::new(),
        }
    }

    /// Builder: mark fields as required.
    pub fn require(mut self, fields: &[&str]) -> Self {
        self.required.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Builder: mark a field as an email address.
    pub fn email(mut self, field: &str) -> Self {
        self.email_fields.push(field.to_string());
        self
    }

    /// Builder: restrict a field to a set of values.
    pub fn one_of(mut self, field: &str, values: &[&str]) -> Self {
        self.allowed_values.insert(
            field.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// Builder: require a numeric field to be non-negative.
    pub fn non_negative(mut self, field: &str) -> Self {
        self.non_negative.push(field.to_string());
        self
    }

    /// Check a complete record against the rules.
    ///
    /// Rules are checked field by field in declaration order and the first
    /// failure is reported.
    pub fn validate(&self, record: &Document) -> ChromaResult<()> {
        for field in &self.required {
            let present = record
                .get(field)
                .and_then(Value::as_str)
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);
            if !present {
                return Err(ChromaError::invalid_field(
                    field,
                    ErrorCode::ValMissingField,
                    format!("{} {} is required", self.label, humanize(field)),
                ));
            }
            self.check_format(field, record)?;
        }

        // Optional fields that still carry a format or value rule.
        let optional = self
            .email_fields
            .iter()
            .chain(self.allowed_values.keys())
            .filter(|f| !self.required.contains(*f));
        for field in optional {
            if is_present(record.get(field)) {
                self.check_format(field, record)?;
            }
        }

        for field in &self.non_negative {
            match record.get(field) {
                None | Some(Value::Null) => {}
                Some(Value::Number(n)) if n.as_f64().map(|v| v >= 0.0).unwrap_or(false) => {}
                Some(_) => {
                    return Err(ChromaError::invalid_field(
                        field,
                        ErrorCode::ValInvalidFormat,
                        format!("{} must be a positive number", capitalize(&humanize(field))),
                    ))
                }
            }
        }

        Ok(())
    }

    fn check_format(&self, field: &str, record: &Document) -> ChromaResult<()> {
        let value = record.get(field).and_then(Value::as_str);

        if self.email_fields.iter().any(|f| f == field) {
            match value {
                Some(v) if is_valid_email(v) => {}
                _ => {
                    return Err(ChromaError::invalid_field(
                        field,
                        ErrorCode::ValInvalidFormat,
                        "Invalid email format",
                    ))
                }
            }
        }

        if let Some(allowed) = self.allowed_values.get(field) {
            let ok = value.map(|v| allowed.iter().any(|a| a == v)).unwrap_or(false);
            if !ok {
                return Err(ChromaError::invalid_field(
                    field,
                    ErrorCode::ValNotAllowed,
                    format!(
                        "Invalid {}. Must be one of: {}",
                        humanize(field),
                        allowed.join(", ")
                    ),
                ));
            }
        }

        Ok(())
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn humanize(field: &str) -> String {
    field.replace('_', " ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lead pipeline stages.
pub const LEAD_STAGES: &[&str] = &["New", "Contacted", "Qualified", "Proposal", "Won", "Lost"];
/// Lead acquisition sources.
pub const LEAD_SOURCES: &[&str] = &[
    "Website",
    "Referral",
    "Social",
    "Cold Outreach",
    "Ad",
    "Event",
    "Other",
];
/// Campaign lifecycle states.
pub const CAMPAIGN_STATUSES: &[&str] = &["planning", "active", "paused", "completed"];
/// Content formats.
pub const CONTENT_TYPES: &[&str] = &[
    "Blog Post",
    "Social Media",
    "Email",
    "Landing Page",
    "Ad Copy",
    "Video Script",
    "Other",
];
/// Content editorial states.
pub const CONTENT_STATUSES: &[&str] = &["Draft", "Review", "Approved", "Published", "Archived"];
/// Deliverable progress states.
pub const DELIVERABLE_STATUSES: &[&str] =
    &["Pending", "In Progress", "Review", "Completed", "Cancelled"];

/// The rule table for the built-in CRM collections.
pub fn default_collections() -> Vec<CollectionRules> {
    vec![
        CollectionRules::new("clients", "Client")
            .require(&["name", "email", "status"])
            .email("email"),
        CollectionRules::new("leads", "Lead")
            .require(&["name", "email", "pipeline_stage"])
            .email("email")
            .one_of("pipeline_stage", LEAD_STAGES)
            .one_of("source", LEAD_SOURCES)
            .non_negative("value"),
        CollectionRules::new("campaigns", "Campaign")
            .require(&["name", "status"])
            .one_of("status", CAMPAIGN_STATUSES)
            .non_negative("budget"),
        CollectionRules::new("content", "Content")
            .require(&["title", "content_type", "status"])
            .one_of("content_type", CONTENT_TYPES)
            .one_of("status", CONTENT_STATUSES),
        CollectionRules::new("deliverables", "Deliverable")
            .require(&["name", "client_id", "status"])
            .one_of("status", DELIVERABLE_STATUSES),
    ]
}

/// Lookup table of configured collections.
#[derive(Debug, Clone)]
pub struct CollectionCatalog {
    collections: Vec<CollectionRules>,
}

impl CollectionCatalog {
    /// Build a catalog from a rule table.
    pub fn new(collections: Vec<CollectionRules>) -> ChromaResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for rules in &collections {
            if rules.name.trim().is_empty() {
                return Err(ChromaError::Configuration(
                    "collection name must not be empty".to_string(),
                ));
            }
            if !seen.insert(rules.name.as_str()) {
                return Err(ChromaError::Configuration(format!(
                    "collection '{}' is configured twice",
                    rules.name
                )));
            }
        }
        Ok(Self { collections })
    }

    /// Rules for a collection, or `UnknownCollection`.
    pub fn get(&self, name: &str) -> ChromaResult<&CollectionRules> {
        self.collections
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ChromaError::unknown_collection(name))
    }

    /// Whether the collection is configured.
    pub fn contains(&self, name: &str) -> bool {
        self.collections.iter().any(|c| c.name == name)
    }

    /// Configured collection names, in table order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(|c| c.name.as_str())
    }
}

impl Default for CollectionCatalog {
    fn default() -> Self {
        Self {
            collections: default_collections(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    fn rules(name: &str) -> CollectionRules {
        CollectionCatalog::default().get(name).unwrap().clone()
    }

    #[test]
    fn test_valid_lead_passes() {
        let lead = doc(json!({"name": "Ann", "email": "ann@x.com", "pipeline_stage": "New"}));
        assert!(rules("leads").validate(&lead).is_ok());
    }

    #[test]
    fn test_bad_email_rejected() {
        let lead = doc(json!({"name": "Ann", "email": "bad-email", "pipeline_stage": "New"}));
        let err = rules("leads").validate(&lead).unwrap_err();
        assert_eq!(err.to_string(), "Invalid email format");
        assert_eq!(err.code(), ErrorCode::ValInvalidFormat);
    }

    #[test]
    fn test_missing_required_field() {
        let client = doc(json!({"name": "Acme", "email": "a@acme.io"}));
        let err = rules("clients").validate(&client).unwrap_err();
        assert_eq!(err.to_string(), "Client status is required");
        assert_eq!(err.code(), ErrorCode::ValMissingField);
    }

    #[test]
    fn test_blank_string_counts_as_missing() {
        let campaign = doc(json!({"name": "   ", "status": "active"}));
        let err = rules("campaigns").validate(&campaign).unwrap_err();
        assert_eq!(err.to_string(), "Campaign name is required");
    }

    #[test]
    fn test_enumerated_field_outside_set() {
        let lead = doc(json!({"name": "Ann", "email": "ann@x.com", "pipeline_stage": "Maybe"}));
        let err = rules("leads").validate(&lead).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Invalid pipeline stage. Must be one of: New, Contacted"));
    }

    #[test]
    fn test_optional_enum_checked_only_when_present() {
        let r = rules("leads");
        let without = doc(json!({"name": "Ann", "email": "ann@x.com", "pipeline_stage": "Won"}));
        assert!(r.validate(&without).is_ok());

        let bad = doc(json!({
            "name": "Ann", "email": "ann@x.com", "pipeline_stage": "Won", "source": "Carrier pigeon"
        }));
        assert!(r.validate(&bad).unwrap_err().to_string().contains("Invalid source"));

        let good = doc(json!({
            "name": "Ann", "email": "ann@x.com", "pipeline_stage": "Won", "source": "Cold Outreach"
        }));
        assert!(r.validate(&good).is_ok());
    }

    #[test]
    fn test_negative_budget_rejected() {
        let campaign = doc(json!({"name": "Spring", "status": "planning", "budget": -5}));
        let err = rules("campaigns").validate(&campaign).unwrap_err();
        assert_eq!(err.to_string(), "Budget must be a positive number");

        let text_budget = doc(json!({"name": "Spring", "status": "planning", "budget": "lots"}));
        assert!(rules("campaigns").validate(&text_budget).is_err());
    }

    #[test]
    fn test_content_and_deliverable_rules() {
        let content = doc(json!({"title": "Launch", "content_type": "Podcast", "status": "Draft"}));
        assert!(rules("content")
            .validate(&content)
            .unwrap_err()
            .to_string()
            .starts_with("Invalid content type"));

        let deliverable = doc(json!({"name": "Deck", "status": "In Progress"}));
        assert_eq!(
            rules("deliverables").validate(&deliverable).unwrap_err().to_string(),
            "Deliverable client id is required"
        );
    }

    #[test]
    fn test_catalog_rejects_duplicates_and_unknown() {
        let dup = vec![
            CollectionRules::new("clients", "Client"),
            CollectionRules::new("clients", "Client"),
        ];
        assert!(CollectionCatalog::new(dup).is_err());

        let catalog = CollectionCatalog::default();
        assert_eq!(catalog.names().count(), 5);
        assert_eq!(
            catalog.get("widgets").unwrap_err().to_string(),
            "Unknown collection: widgets"
        );
    }

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("ann@x.com"));
        assert!(!is_valid_email("ann@x"));
        assert!(!is_valid_email("a nn@x.com"));
    }
}
