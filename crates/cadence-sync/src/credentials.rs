//! Provider credential lookup.
//!
//! Token storage and refresh belong to another service. The engine only asks
//! whether a connection currently has a usable token.

use std::collections::HashMap;

use cadence_providers::{AccessToken, BoxFuture, CalendarConnection};

use crate::error::StoreError;

/// Credential state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid(AccessToken),
    /// Expired, revoked or never granted. The run fails without fetching.
    Invalid { reason: String },
}

impl CredentialStatus {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

pub trait CredentialStore: Send + Sync {
    /// Resolves the token behind `connection.credential_ref`.
    fn credential<'a>(
        &'a self,
        connection: &'a CalendarConnection,
    ) -> BoxFuture<'a, Result<CredentialStatus, StoreError>>;
}

/// Fixed tokens keyed by credential reference. Unknown references are invalid.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    tokens: HashMap<String, CredentialStatus>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, credential_ref: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(
            credential_ref.into(),
            CredentialStatus::Valid(AccessToken::new(token)),
        );
        self
    }

    pub fn with_invalid(mut self, credential_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        self.tokens
            .insert(credential_ref.into(), CredentialStatus::invalid(reason));
        self
    }
}

impl CredentialStore for StaticCredentials {
    fn credential<'a>(
        &'a self,
        connection: &'a CalendarConnection,
    ) -> BoxFuture<'a, Result<CredentialStatus, StoreError>> {
        let status = self
            .tokens
            .get(&connection.credential_ref)
            .cloned()
            .unwrap_or_else(|| CredentialStatus::invalid("no credential on file"));
        Box::pin(async move { Ok(status) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_providers::ProviderKind;

    #[tokio::test]
    async fn lookup_by_credential_ref() {
        let store = StaticCredentials::new()
            .with_token("cred-a", "secret")
            .with_invalid("cred-b", "refresh token revoked");

        let a = CalendarConnection::new("a", "ws", ProviderKind::Google, "primary").with_credential_ref("cred-a");
        let b = CalendarConnection::new("b", "ws", ProviderKind::Google, "primary").with_credential_ref("cred-b");
        let c = CalendarConnection::new("c", "ws", ProviderKind::Google, "primary");

        assert_eq!(
            store.credential(&a).await,
            Ok(CredentialStatus::Valid(AccessToken::new("secret")))
        );
        assert_eq!(
            store.credential(&b).await,
            Ok(CredentialStatus::invalid("refresh token revoked"))
        );
        assert!(matches!(
            store.credential(&c).await,
            Ok(CredentialStatus::Invalid { .. })
        ));
    }
}
