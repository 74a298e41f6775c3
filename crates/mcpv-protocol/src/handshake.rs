//! The `initialize` handshake.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control-plane identity sent as `clientInfo` in the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Name reported to downstream servers.
    pub name: String,
    /// Version reported to downstream servers.
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "mcpv".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters of the `initialize` request this control plane sends to every
/// downstream server it starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Protocol version this control plane requests.
    pub protocol_version: String,
    /// Control-plane capability advertisement (kept minimal; we are a
    /// client to the downstream server).
    pub capabilities: Value,
    /// Control-plane identity.
    pub client_info: ClientInfo,
}

impl InitializeParams {
    /// Build the params this control plane sends for a given spec's expected
    /// protocol version.
    #[must_use]
    pub fn for_protocol_version(protocol_version: impl Into<String>) -> Self {
        Self {
            protocol_version: protocol_version.into(),
            capabilities: serde_json::json!({}),
            client_info: ClientInfo::default(),
        }
    }
}

/// The downstream server's reported identity, captured at handshake time.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Server-reported name; must be non-empty for the handshake to validate.
    pub name: String,
    /// Server-reported version string, if any.
    #[serde(default)]
    pub version: Option<String>,
}

/// The parsed `result` of an `initialize` response.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    /// Protocol version the server actually speaks.
    pub protocol_version: String,
    /// Server capability object, preserved verbatim.
    pub capabilities: Value,
    /// Server identity.
    pub server_info: ServerInfo,
}

impl InitializeResult {
    /// Validate the structural requirements of a handshake result: a
    /// non-empty server name and a present (non-null) capabilities object.
    ///
    /// This does *not* check protocol-version compatibility — that is a
    /// separate, fatal-classified check the lifecycle manager performs
    /// against the spec's declared version, since an unsupported protocol
    /// must short-circuit before this validation runs.
    #[must_use]
    pub fn is_structurally_valid(&self) -> bool {
        !self.server_info.name.trim().is_empty() && !self.capabilities.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_server_name_is_invalid() {
        let result = InitializeResult {
            protocol_version: "2025-11-25".into(),
            capabilities: serde_json::json!({}),
            server_info: ServerInfo {
                name: String::new(),
                version: None,
            },
        };
        assert!(!result.is_structurally_valid());
    }

    #[test]
    fn null_capabilities_is_invalid() {
        let result = InitializeResult {
            protocol_version: "2025-11-25".into(),
            capabilities: Value::Null,
            server_info: ServerInfo {
                name: "demo".into(),
                version: None,
            },
        };
        assert!(!result.is_structurally_valid());
    }

    #[test]
    fn well_formed_result_is_valid() {
        let result = InitializeResult {
            protocol_version: "2025-11-25".into(),
            capabilities: serde_json::json!({"tools": {}}),
            server_info: ServerInfo {
                name: "demo".into(),
                version: Some("1.0".into()),
            },
        };
        assert!(result.is_structurally_valid());
    }
}
