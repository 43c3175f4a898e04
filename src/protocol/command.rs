//! Command contract shared with domain bindings.
//!
//! A domain binding describes each protocol method as a type that knows its
//! method name, serializes to the method's params, and names the shape of
//! its result. The transport needs nothing else.
//!
//! ```ignore
//! #[derive(Serialize)]
//! #[serde(rename_all = "camelCase")]
//! struct Navigate { url: String }
//!
//! impl Command for Navigate {
//!     const METHOD: &'static str = "Page.navigate";
//!     type Response = NavigateResponse;
//! }
//!
//! let result = connection.call(&Navigate { url }, None).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Command
// ============================================================================

/// A protocol method: name, params and response shape.
pub trait Command: Serialize + Send + Sync {
    /// Method in `Domain.methodName` format.
    const METHOD: &'static str;

    /// Result shape the browser answers with.
    type Response: DeserializeOwned + Send;

    /// Serializes this command into its wire params.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    fn to_params(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// Empty
// ============================================================================

/// Result of methods that answer with an empty object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct SetFlag {
        flag_value: bool,
    }

    impl Command for SetFlag {
        const METHOD: &'static str = "Test.setFlag";
        type Response = Empty;
    }

    #[test]
    fn test_command_params() {
        let params = SetFlag { flag_value: true }.to_params().expect("params");
        assert_eq!(params, json!({"flagValue": true}));
        assert_eq!(SetFlag::METHOD, "Test.setFlag");
    }

    #[test]
    fn test_empty_response_parses_empty_object() {
        let empty: Empty = serde_json::from_value(json!({})).expect("parse");
        assert_eq!(empty, Empty {});
    }
}
