//! Durable representation of a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name and version a client reported when it initialized the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    #[serde(default)]
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: String,
}

/// Serializable session state written to the durable tier.
///
/// Every field except `id` has a default, and unknown fields are ignored, so
/// records written by an older or newer build still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session identifier.
    pub id: String,

    /// Protocol version negotiated at initialization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,

    /// Client identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,

    /// Capabilities the client advertised, kept opaque.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub client_capabilities: Value,

    /// Minimum log level the client asked for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Whether the client sent its `initialized` notification.
    #[serde(default)]
    pub initialized: bool,

    /// When the session was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// When the session was last stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Create a record holding only an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            protocol_version: None,
            client_info: None,
            client_capabilities: Value::Null,
            log_level: None,
            initialized: false,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    /// Set the negotiated protocol version.
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = Some(version.into());
        self
    }

    /// Set the client identity.
    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_info = Some(ClientInfo {
            name: name.into(),
            version: version.into(),
        });
        self
    }

    /// Set the client capabilities.
    pub fn with_client_capabilities(mut self, capabilities: Value) -> Self {
        self.client_capabilities = capabilities;
        self
    }

    /// Encode for the durable tier.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode bytes read from the durable tier.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_only_record_decodes() {
        let record = SessionRecord::from_bytes(br#"{"id":"abc"}"#).unwrap();
        assert_eq!(record.id, "abc");
        assert!(!record.initialized);
        assert!(record.client_info.is_none());
        assert!(record.client_capabilities.is_null());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let bytes = br#"{"id":"abc","initialized":true,"futureField":{"x":1}}"#;
        let record = SessionRecord::from_bytes(bytes).unwrap();
        assert_eq!(record.id, "abc");
        assert!(record.initialized);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        assert!(SessionRecord::from_bytes(br#"{"initialized":true}"#).is_err());
        assert!(SessionRecord::from_bytes(b"not json").is_err());
    }

    #[test]
    fn test_full_record_survives_encoding() {
        let mut record = SessionRecord::new("abc")
            .with_protocol_version("2025-03-26")
            .with_client_info("inspector", "0.9.0")
            .with_client_capabilities(json!({"sampling": {}}));
        record.log_level = Some("debug".to_string());
        record.initialized = true;
        record.updated_at = Some(Utc::now());

        let decoded = SessionRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_wire_format_uses_camel_case() {
        let record = SessionRecord::new("abc").with_protocol_version("2025-03-26");
        let value: Value = serde_json::from_slice(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(value["protocolVersion"], "2025-03-26");
        assert!(value.get("clientCapabilities").is_none());
    }
}
