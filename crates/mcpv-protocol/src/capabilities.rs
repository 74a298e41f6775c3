//! Allowed-method capability checks.

use std::collections::BTreeSet;

use serde_json::Value;

/// The set of JSON-RPC methods a downstream server's captured capabilities
/// permit, derived from its `initialize` response.
///
/// MCP capability objects advertise top-level feature groups (`tools`,
/// `resources`, `prompts`, `logging`, ...); this maps each group to the
/// concrete methods the router is willing to forward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllowedMethods(BTreeSet<String>);

impl AllowedMethods {
    /// Derive the allowed method set from a server's raw `capabilities`
    /// object captured at handshake time.
    #[must_use]
    pub fn from_capabilities(capabilities: &Value) -> Self {
        let mut methods = BTreeSet::new();
        let Some(obj) = capabilities.as_object() else {
            return Self(methods);
        };
        if obj.contains_key("tools") {
            methods.insert("tools/list".to_string());
            methods.insert("tools/call".to_string());
        }
        if obj.contains_key("resources") {
            methods.insert("resources/list".to_string());
            methods.insert("resources/read".to_string());
        }
        if obj.contains_key("prompts") {
            methods.insert("prompts/list".to_string());
            methods.insert("prompts/get".to_string());
        }
        if obj.contains_key("logging") {
            methods.insert("logging/setLevel".to_string());
        }
        methods.insert("ping".to_string());
        Self(methods)
    }

    /// Whether `method` is permitted.
    #[must_use]
    pub fn allows(&self, method: &str) -> bool {
        self.0.contains(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_capability_allows_tools_methods_only() {
        let allowed = AllowedMethods::from_capabilities(&serde_json::json!({"tools": {}}));
        assert!(allowed.allows("tools/call"));
        assert!(allowed.allows("tools/list"));
        assert!(!allowed.allows("resources/read"));
        assert!(allowed.allows("ping"));
    }

    #[test]
    fn empty_capabilities_only_allow_ping() {
        let allowed = AllowedMethods::from_capabilities(&serde_json::json!({}));
        assert!(allowed.allows("ping"));
        assert!(!allowed.allows("tools/call"));
    }
}
