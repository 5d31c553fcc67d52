use crate::domain::ports::AuthProvider;
use crate::domain::remote::AuthToken;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;

/// Hands out a fixed credential, e.g. one supplied on the command line.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
    principal_id: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>, principal_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            principal_id: principal_id.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn current_token(&self) -> Result<AuthToken> {
        if self.token.trim().is_empty() {
            return Err(BridgeError::Auth("no session token configured".to_string()));
        }
        Ok(AuthToken {
            token: self.token.clone(),
            principal_id: self.principal_id.clone(),
        })
    }
}
