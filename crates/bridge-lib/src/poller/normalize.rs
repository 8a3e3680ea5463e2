//! Raw alert normalization
//!
//! Turns loosely-shaped upstream entries into [`NormalizedAlert`]s. Field
//! extraction is best-effort: anything that cannot be recovered becomes
//! [`UNKNOWN`]. Only an entry without identity or severity is malformed.

use chrono::Utc;
use serde_json::Value;

use crate::error::{BridgeError, Result};
use crate::models::{AlertState, DedupKeyMode, NormalizedAlert, RawAlert, Severity, UNKNOWN};

/// Parse one JSON entry into a [`RawAlert`]
pub fn parse_raw(value: Value) -> Result<RawAlert> {
    serde_json::from_value(value).map_err(|e| BridgeError::Malformed(e.to_string()))
}

/// Normalize a raw alert, composing its dedup key with `mode`
pub fn normalize(raw: &RawAlert, mode: DedupKeyMode) -> Result<NormalizedAlert> {
    let identity = non_empty(&raw.uri)
        .or_else(|| non_empty(&raw.resource_id))
        .ok_or_else(|| BridgeError::Malformed("alert has neither uri nor resourceId".into()))?
        .to_string();

    let severity = non_empty(&raw.severity)
        .ok_or_else(|| BridgeError::Malformed(format!("alert {} has no severity", identity)))
        .and_then(|label| {
            Severity::parse(label).ok_or_else(|| {
                BridgeError::Malformed(format!("alert {} has unknown severity {}", identity, label))
            })
        })?;

    let resource_uri = resource_uri(raw);

    Ok(NormalizedAlert {
        dedup_key: mode.key_for(&identity, severity),
        severity,
        state: AlertState::parse(raw.alert_state.as_deref()),
        resource_name: resource_name(raw, resource_uri.as_deref()),
        category: category(raw, resource_uri.as_deref()),
        description: non_empty(&raw.description)
            .unwrap_or("No description")
            .to_string(),
        source: resource_uri.unwrap_or_else(|| identity.clone()),
        alert_type: non_empty(&raw.alert_type_id).map(str::to_string),
        health_category: non_empty(&raw.health_category).map(str::to_string),
        urgency: non_empty(&raw.urgency).map(str::to_string),
        created: non_empty(&raw.created).map(str::to_string),
        modified: non_empty(&raw.modified).map(str::to_string),
        identity,
        first_seen_at: Utc::now(),
    })
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn associated_field<'a>(raw: &'a RawAlert, key: &str) -> Option<&'a str> {
    raw.associated_resource
        .as_ref()
        .and_then(|res| res.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn resource_uri(raw: &RawAlert) -> Option<String> {
    associated_field(raw, "resourceUri")
        .or_else(|| non_empty(&raw.resource_uri))
        .map(str::to_string)
}

fn resource_name(raw: &RawAlert, resource_uri: Option<&str>) -> String {
    // Some appliances send the associated resource as a bare name
    let free_text = raw
        .associated_resource
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());

    associated_field(raw, "resourceName")
        .or(free_text)
        .or_else(|| non_empty(&raw.resource_name))
        .or_else(|| non_empty(&raw.physical_resource_type))
        .or_else(|| resource_uri.and_then(last_segment))
        .unwrap_or(UNKNOWN)
        .to_string()
}

fn category(raw: &RawAlert, resource_uri: Option<&str>) -> String {
    associated_field(raw, "resourceCategory")
        .or_else(|| non_empty(&raw.category))
        .or_else(|| resource_uri.and_then(resource_type_segment))
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// `/rest/server-hardware/abc` -> `abc`
fn last_segment(uri: &str) -> Option<&str> {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}

/// `/rest/server-hardware/abc` -> `server-hardware`
fn resource_type_segment(uri: &str) -> Option<&str> {
    let mut segments = uri.trim_matches('/').split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some("rest"), Some(kind), Some(_)) if !kind.is_empty() => Some(kind),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawAlert {
        parse_raw(value).unwrap()
    }

    #[test]
    fn test_structured_resource_fields() {
        let alert = normalize(
            &raw(json!({
                "uri": "/rest/alerts/1",
                "severity": "Critical",
                "description": "Power supply failed",
                "alertTypeID": "Trap.PowerSupplyFailed",
                "associatedResource": {
                    "resourceName": "enclosure-1, bay 3",
                    "resourceCategory": "server-hardware",
                    "resourceUri": "/rest/server-hardware/abc"
                }
            })),
            DedupKeyMode::Identity,
        )
        .unwrap();

        assert_eq!(alert.dedup_key, "/rest/alerts/1");
        assert_eq!(alert.resource_name, "enclosure-1, bay 3");
        assert_eq!(alert.category, "server-hardware");
        assert_eq!(alert.source, "/rest/server-hardware/abc");
        assert_eq!(alert.alert_type.as_deref(), Some("Trap.PowerSupplyFailed"));
        assert!(alert.state.is_active());
    }

    #[test]
    fn test_resource_name_fallback_chain() {
        let direct = normalize(
            &raw(json!({"uri": "/rest/alerts/1", "severity": "Critical", "resourceName": "bay-7"})),
            DedupKeyMode::Identity,
        )
        .unwrap();
        assert_eq!(direct.resource_name, "bay-7");

        let physical = normalize(
            &raw(json!({
                "uri": "/rest/alerts/2",
                "severity": "Critical",
                "physicalResourceType": "server-hardware"
            })),
            DedupKeyMode::Identity,
        )
        .unwrap();
        assert_eq!(physical.resource_name, "server-hardware");

        let from_uri = normalize(
            &raw(json!({
                "uri": "/rest/alerts/3",
                "severity": "Critical",
                "resourceUri": "/rest/enclosures/enc-42"
            })),
            DedupKeyMode::Identity,
        )
        .unwrap();
        assert_eq!(from_uri.resource_name, "enc-42");
        assert_eq!(from_uri.category, "enclosures");

        let free_text = normalize(
            &raw(json!({
                "uri": "/rest/alerts/4",
                "severity": "Critical",
                "associatedResource": "frame-2"
            })),
            DedupKeyMode::Identity,
        )
        .unwrap();
        assert_eq!(free_text.resource_name, "frame-2");
    }

    #[test]
    fn test_missing_fields_default_to_unknown() {
        let alert = normalize(
            &raw(json!({"resourceId": "abc-123", "severity": "critical"})),
            DedupKeyMode::Identity,
        )
        .unwrap();

        assert_eq!(alert.identity, "abc-123");
        assert_eq!(alert.resource_name, UNKNOWN);
        assert_eq!(alert.category, UNKNOWN);
        assert_eq!(alert.source, "abc-123");
    }

    #[test]
    fn test_identity_and_severity_are_required() {
        let no_id = normalize(&raw(json!({"severity": "Critical"})), DedupKeyMode::Identity);
        assert!(matches!(no_id, Err(BridgeError::Malformed(_))));

        let no_severity = normalize(&raw(json!({"uri": "/rest/alerts/1"})), DedupKeyMode::Identity);
        assert!(matches!(no_severity, Err(BridgeError::Malformed(_))));

        let bad_severity = normalize(
            &raw(json!({"uri": "/rest/alerts/1", "severity": "Apocalyptic"})),
            DedupKeyMode::Identity,
        );
        assert!(matches!(bad_severity, Err(BridgeError::Malformed(_))));
    }

    #[test]
    fn test_wrong_field_types_are_malformed() {
        assert!(matches!(
            parse_raw(json!({"uri": 17, "severity": "Critical"})),
            Err(BridgeError::Malformed(_))
        ));
        assert!(parse_raw(json!("not an object")).is_err());
    }

    #[test]
    fn test_identity_severity_key_mode() {
        let alert = normalize(
            &raw(json!({"uri": "/rest/alerts/9", "severity": "Warning"})),
            DedupKeyMode::IdentitySeverity,
        )
        .unwrap();
        assert_eq!(alert.dedup_key, "/rest/alerts/9#Warning");
    }

    #[test]
    fn test_uri_segments() {
        assert_eq!(last_segment("/rest/server-hardware/abc/"), Some("abc"));
        assert_eq!(resource_type_segment("/rest/server-hardware/abc"), Some("server-hardware"));
        assert_eq!(resource_type_segment("abc"), None);
    }
}
