use std::sync::Arc;

use crate::account::models::Account;

/// A statically declared extra claim.
///
/// Replaces the reflection-driven claim mapping of attribute-based setups:
/// the host supplies `(name, accessor)` pairs at configuration time and a
/// bad name fails at issuer construction, not per request.
#[derive(Clone)]
pub struct ClaimMapping {
    name: String,
    read: Arc<dyn Fn(&Account) -> serde_json::Value + Send + Sync>,
}

impl ClaimMapping {
    pub fn new(
        name: impl Into<String>,
        read: impl Fn(&Account) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            read: Arc::new(read),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read(&self, account: &Account) -> serde_json::Value {
        (self.read)(account)
    }
}

/// The token pair handed to the host after sign-up, sign-in, or re-issue.
///
/// Plain values: the host decides cookie vs. body delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}
