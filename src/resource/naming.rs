//! Naming Transform
//!
//! Maps the names resource authors declare to the names the assertion layer
//! sees. Predicates written as `name?` become `be_name` matchers, `has_x`
//! becomes `have_x`, and everything else is exposed verbatim.

use super::error::ResourceError;
use serde::{Deserialize, Serialize};

/// Prefix that marks a possessive predicate (`has_drives`)
const HAS_PREFIX: &str = "has_";

/// Kind tag attached to every declared method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    /// Value-returning accessor
    Property,
    /// Boolean-returning accessor, exposed as a matcher
    Predicate,
}

/// Derive the exposed name for a declared method name.
///
/// Rules are applied in order and the first match wins:
/// 1. `illuminated?` -> `be_illuminated`
/// 2. `has_drives` -> `have_drives`
/// 3. anything else is returned unchanged
pub fn derive_exposed_name(declared: &str) -> Result<String, ResourceError> {
    validate(declared)?;

    if let Some(stem) = declared.strip_suffix('?') {
        return Ok(format!("be_{}", stem));
    }

    if let Some(rest) = declared.strip_prefix(HAS_PREFIX) {
        return Ok(format!("have_{}", rest));
    }

    Ok(declared.to_string())
}

/// Check whether a declared name will be exposed as a matcher
pub fn is_predicate_shaped(declared: &str) -> bool {
    declared.ends_with('?') || declared.starts_with(HAS_PREFIX)
}

/// Derive the exposed name and check it agrees with the declared kind
pub fn derive_for_kind(declared: &str, kind: MethodKind) -> Result<String, ResourceError> {
    let exposed = derive_exposed_name(declared)?;

    if kind == MethodKind::Property && is_predicate_shaped(declared) {
        return Err(ResourceError::InvalidName {
            name: declared.to_string(),
            reason: format!("property would be exposed as matcher '{}'", exposed),
        });
    }

    Ok(exposed)
}

fn validate(declared: &str) -> Result<(), ResourceError> {
    let invalid = |reason: &str| ResourceError::InvalidName {
        name: declared.to_string(),
        reason: reason.to_string(),
    };

    let stem = declared.strip_suffix('?').unwrap_or(declared);

    if stem.is_empty() {
        return Err(invalid("name is empty"));
    }

    if stem == HAS_PREFIX {
        return Err(invalid("nothing follows the has_ prefix"));
    }

    if !stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid(
            "only ASCII letters, digits, underscores and a trailing '?' are allowed",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_mark_becomes_be_matcher() {
        assert_eq!(derive_exposed_name("illuminated?").unwrap(), "be_illuminated");
        assert_eq!(derive_exposed_name("exist?").unwrap(), "be_exist");
    }

    #[test]
    fn test_has_prefix_becomes_have_matcher() {
        assert_eq!(derive_exposed_name("has_drives").unwrap(), "have_drives");
    }

    #[test]
    fn test_plain_names_are_identity() {
        assert_eq!(derive_exposed_name("size").unwrap(), "size");
        assert_eq!(derive_exposed_name("hash_sum").unwrap(), "hash_sum");
    }

    #[test]
    fn test_question_mark_rule_wins_over_has_prefix() {
        assert_eq!(derive_exposed_name("has_power?").unwrap(), "be_has_power");
    }

    #[test]
    fn test_empty_and_bare_question_mark_are_invalid() {
        for name in ["", "?", "has_", "bad name", "two??"] {
            let err = derive_exposed_name(name).unwrap_err();
            assert!(
                matches!(err, ResourceError::InvalidName { .. }),
                "{:?} should be invalid",
                name
            );
        }
    }

    #[test]
    fn test_property_kind_rejects_predicate_shape() {
        assert!(derive_for_kind("has_content", MethodKind::Property).is_err());
        assert!(derive_for_kind("running?", MethodKind::Property).is_err());
        assert_eq!(
            derive_for_kind("running", MethodKind::Predicate).unwrap(),
            "running"
        );
    }
}
