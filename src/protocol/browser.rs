//! `Browser` domain bindings used by the facade.

use serde::{Deserialize, Serialize};

use super::command::Command;

/// `Browser.getVersion`
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetVersion {}

/// Result of [`GetVersion`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetVersionResponse {
    /// Protocol version.
    pub protocol_version: String,
    /// Product name (e.g. `HeadlessChrome/120.0.0.0`).
    pub product: String,
    /// Product revision.
    pub revision: String,
    /// User agent.
    pub user_agent: String,
    /// V8 version.
    pub js_version: String,
}

impl Command for GetVersion {
    const METHOD: &'static str = "Browser.getVersion";
    type Response = GetVersionResponse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_response_parse() {
        let version: GetVersionResponse = serde_json::from_value(json!({
            "protocolVersion": "1.3",
            "product": "HeadlessChrome/120.0.0.0",
            "revision": "@abc",
            "userAgent": "Mozilla/5.0",
            "jsVersion": "12.0"
        }))
        .expect("parse");

        assert_eq!(version.protocol_version, "1.3");
        assert!(version.product.starts_with("HeadlessChrome"));
    }
}
