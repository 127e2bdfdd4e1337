//! Capability sets and their negotiation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Options attached to one capability (e.g. `tools: {"listChanged": true}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    /// Free-form metadata.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CapabilityOptions {
    pub fn list_changed() -> Self {
        Self {
            list_changed: Some(true),
            ..Self::default()
        }
    }
}

/// Capability name → options. Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeMap<String, CapabilityOptions>);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, options: CapabilityOptions) -> Self {
        self.0.insert(name.into(), options);
        self
    }

    /// What this runtime advertises on either side of the handshake.
    pub fn standard() -> Self {
        Self::new()
            .with("tools", CapabilityOptions::list_changed())
            .with("prompts", CapabilityOptions::list_changed())
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityOptions> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `name` was granted with `listChanged = true`.
    pub fn list_changed(&self, name: &str) -> bool {
        self.get(name).and_then(|o| o.list_changed).unwrap_or(false)
    }

    /// Intersection of what the server offers and what the client accepts.
    ///
    /// Only capabilities present on both sides survive. Boolean options are
    /// ANDed and dropped when either side leaves them out. Extra metadata is
    /// taken from the server.
    pub fn negotiate(server: &Capabilities, client: &Capabilities) -> Capabilities {
        let both = |a: Option<bool>, b: Option<bool>| match (a, b) {
            (Some(a), Some(b)) => Some(a && b),
            _ => None,
        };

        let negotiated = server
            .0
            .iter()
            .filter_map(|(name, offered)| {
                let accepted = client.0.get(name)?;
                Some((
                    name.clone(),
                    CapabilityOptions {
                        list_changed: both(offered.list_changed, accepted.list_changed),
                        subscribe: both(offered.subscribe, accepted.subscribe),
                        extra: offered.extra.clone(),
                    },
                ))
            })
            .collect();
        Capabilities(negotiated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_negotiate_intersects_names() {
        let server = Capabilities::standard().with("logging", CapabilityOptions::default());
        let client = Capabilities::new()
            .with("tools", CapabilityOptions::list_changed())
            .with("sampling", CapabilityOptions::default());

        let negotiated = Capabilities::negotiate(&server, &client);
        assert_eq!(negotiated.names().collect::<Vec<_>>(), vec!["tools"]);
        assert!(negotiated.list_changed("tools"));
        assert!(!negotiated.list_changed("prompts"));
    }

    #[test]
    fn test_negotiate_ands_flags_and_keeps_server_metadata() {
        let server: Capabilities = serde_json::from_value(json!({
            "prompts": {"listChanged": true, "subscribe": true, "maxArgs": 4}
        }))
        .unwrap();
        let client: Capabilities = serde_json::from_value(json!({
            "prompts": {"listChanged": false, "note": "client side"}
        }))
        .unwrap();

        let negotiated = Capabilities::negotiate(&server, &client);
        let prompts = negotiated.get("prompts").unwrap();
        assert_eq!(prompts.list_changed, Some(false));
        assert_eq!(prompts.subscribe, None);
        assert_eq!(prompts.extra.get("maxArgs"), Some(&json!(4)));
        assert!(prompts.extra.get("note").is_none());
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(Capabilities::standard()).unwrap();
        assert_eq!(
            json,
            json!({"prompts": {"listChanged": true}, "tools": {"listChanged": true}})
        );
        let parsed: Capabilities = serde_json::from_value(json!({"roots": {}})).unwrap();
        assert!(parsed.contains("roots"));
    }
}
