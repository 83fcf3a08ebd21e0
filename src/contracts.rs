//! Contracts (validation) port (design §6).
//!
//! A contract is `(mapping) -> (ok, errors)`; here that's
//! `Contract::check(&Payload) -> Violations` with an empty map meaning
//! "valid", mirroring the rest of the core's preference for a plain value
//! over a boolean-plus-payload pair.

use crate::model::{Payload, Violations};

pub trait Contract: Send + Sync {
    fn check(&self, payload: &Payload) -> Violations;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Int,
    StrArray,
    IntArray,
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub allowed_values: Option<&'static [&'static str]>,
    pub positive: bool,
}

impl FieldRule {
    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        FieldRule { name, ty, required: true, allowed_values: None, positive: false }
    }

    pub const fn optional(name: &'static str, ty: FieldType) -> Self {
        FieldRule { name, ty, required: false, allowed_values: None, positive: false }
    }

    pub const fn with_allowed_values(mut self, values: &'static [&'static str]) -> Self {
        self.allowed_values = Some(values);
        self
    }

    pub const fn with_positive(mut self) -> Self {
        self.positive = true;
        self
    }
}

/// A straightforward field-shape contract: required/optional, a coarse
/// type, and optionally an enum of allowed string values or a "must be
/// positive" numeric constraint. Good enough for both contract families in
/// design §6 without a bespoke type per source.
pub struct ShapeContract {
    fields: Vec<FieldRule>,
}

impl ShapeContract {
    pub fn new(fields: Vec<FieldRule>) -> Self {
        ShapeContract { fields }
    }
}

impl Contract for ShapeContract {
    fn check(&self, payload: &Payload) -> Violations {
        let mut violations = Violations::new();
        for field in &self.fields {
            let value = payload.get(field.name);
            match value {
                None => {
                    if field.required {
                        violations.entry(field.name.to_string()).or_default().push("must be filled".to_string());
                    }
                }
                Some(v) => {
                    if let Some(msg) = check_type(v, field) {
                        violations.entry(field.name.to_string()).or_default().push(msg);
                    }
                }
            }
        }
        violations
    }
}

fn check_type(value: &serde_json::Value, field: &FieldRule) -> Option<String> {
    match field.ty {
        FieldType::Str => match value.as_str() {
            None => Some("has the wrong type".to_string()),
            Some(s) => match field.allowed_values {
                Some(allowed) if !allowed.contains(&s) => Some(format!("must be one of {allowed:?}")),
                _ => None,
            },
        },
        FieldType::Int => match value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)) {
            None => Some("has the wrong type".to_string()),
            Some(n) if field.positive && n <= 0 => Some("must be greater than 0".to_string()),
            Some(_) => None,
        },
        FieldType::StrArray => {
            if value.as_array().is_some_and(|arr| arr.iter().all(|v| v.is_string())) {
                None
            } else {
                Some("must be an array of strings".to_string())
            }
        }
        FieldType::IntArray => {
            if value.as_array().is_some_and(|arr| arr.iter().all(|v| v.is_i64())) {
                None
            } else {
                Some("must be an array of integers".to_string())
            }
        }
    }
}

/// `RawPayloadContract<source>` (design §6): per-source shape for the
/// upstream payload, applied in Processor stage 2.
pub fn treez_raw_payload_contract() -> ShapeContract {
    ShapeContract::new(vec![
        FieldRule::required("external_id", FieldType::Str),
        FieldRule::required("name", FieldType::Str),
        FieldRule::optional("brand", FieldType::Str),
        FieldRule::optional("strain", FieldType::Str),
        FieldRule::optional("tags", FieldType::StrArray),
        FieldRule::optional("price_cents", FieldType::Int),
        FieldRule::optional("status", FieldType::Str).with_allowed_values(&["active", "inactive"]),
    ])
}

/// `CanonicalMenuItemContract` (design §6): canonical field shape, applied
/// in Processor stage 6 against the merged projection.
pub fn canonical_menu_item_contract() -> ShapeContract {
    ShapeContract::new(vec![
        FieldRule::required("external_id", FieldType::Str),
        FieldRule::required("name", FieldType::Str),
        FieldRule::optional("brand_id", FieldType::Int),
        FieldRule::optional("strain_id", FieldType::Int),
        FieldRule::optional("tag_ids", FieldType::IntArray),
        FieldRule::optional("price_cents", FieldType::Int).with_positive(),
        FieldRule::required("status", FieldType::Str).with_allowed_values(&["active", "inactive"]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_contract_rejects_missing_name() {
        let contract = treez_raw_payload_contract();
        let payload = Payload::from_iter([("external_id".to_string(), json!("X4"))]);
        let violations = contract.check(&payload);
        assert_eq!(violations.get("name"), Some(&vec!["must be filled".to_string()]));
    }

    #[test]
    fn canonical_contract_rejects_non_positive_price() {
        let contract = canonical_menu_item_contract();
        let payload = Payload::from_iter([
            ("external_id".to_string(), json!("X1")),
            ("name".to_string(), json!("Blue Dream")),
            ("status".to_string(), json!("active")),
            ("price_cents".to_string(), json!(0)),
        ]);
        let violations = contract.check(&payload);
        assert!(violations.contains_key("price_cents"));
    }

    #[test]
    fn canonical_contract_accepts_resolved_tag_ids() {
        let contract = canonical_menu_item_contract();
        let payload = Payload::from_iter([
            ("external_id".to_string(), json!("X1")),
            ("name".to_string(), json!("Blue Dream")),
            ("status".to_string(), json!("active")),
            ("tag_ids".to_string(), json!([1, 2, 3])),
        ]);
        assert!(contract.check(&payload).is_empty());
    }

    #[test]
    fn canonical_contract_accepts_minimal_valid_payload() {
        let contract = canonical_menu_item_contract();
        let payload = Payload::from_iter([
            ("external_id".to_string(), json!("X1")),
            ("name".to_string(), json!("Blue Dream")),
            ("status".to_string(), json!("active")),
        ]);
        assert!(contract.check(&payload).is_empty());
    }
}
