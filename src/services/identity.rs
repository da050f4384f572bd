//! Caller identity verification behind a swappable capability.

use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::{config::IdentityMode, error::ServiceError};

/// Identity established from a caller token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Uid assigned by the identity provider.
    pub uid: String,
}

/// Failures of the identity capability.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Missing authentication token")]
    MissingToken,
    #[error("Invalid authentication token")]
    InvalidToken,
    #[error("Token UID does not match hostId")]
    UidMismatch,
    #[error("identity provider unreachable: {message}")]
    ProviderUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl From<IdentityError> for ServiceError {
    fn from(err: IdentityError) -> Self {
        ServiceError::Unauthorized(err.to_string())
    }
}

/// Turns an opaque caller token into a uid.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: String) -> BoxFuture<'static, Result<VerifiedIdentity, IdentityError>>;
}

/// Verify `token` and require the resulting uid to be `expected_uid`.
pub async fn verify_claimed_uid(
    verifier: &dyn IdentityVerifier,
    token: Option<&str>,
    expected_uid: &str,
) -> Result<VerifiedIdentity, IdentityError> {
    let token = token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(IdentityError::MissingToken)?;
    let identity = verifier.verify(token.to_owned()).await?;
    if identity.uid != expected_uid {
        return Err(IdentityError::UidMismatch);
    }
    Ok(identity)
}

/// Accepts any non-empty token and uses it as the uid.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustTokenVerifier;

impl IdentityVerifier for TrustTokenVerifier {
    fn verify(&self, token: String) -> BoxFuture<'static, Result<VerifiedIdentity, IdentityError>> {
        Box::pin(async move {
            if token.is_empty() {
                return Err(IdentityError::MissingToken);
            }
            Ok(VerifiedIdentity { uid: token })
        })
    }
}

/// Build the verifier selected by the configuration.
pub fn from_mode(mode: &IdentityMode) -> Arc<dyn IdentityVerifier> {
    match mode {
        IdentityMode::TrustToken => Arc::new(TrustTokenVerifier),
        #[cfg(feature = "firebase-auth")]
        IdentityMode::Firebase { api_key } => match firebase::FirebaseIdentityVerifier::new(api_key) {
            Ok(verifier) => Arc::new(verifier),
            Err(err) => {
                tracing::error!(error = %err, "failed to build Firebase verifier; rejecting all tokens");
                Arc::new(RejectAllVerifier)
            }
        },
        #[cfg(not(feature = "firebase-auth"))]
        IdentityMode::Firebase { .. } => {
            tracing::error!("Firebase identity requested but the `firebase-auth` feature is disabled");
            Arc::new(RejectAllVerifier)
        }
    }
}

/// Used when the configured provider cannot be built.
struct RejectAllVerifier;

impl IdentityVerifier for RejectAllVerifier {
    fn verify(&self, _token: String) -> BoxFuture<'static, Result<VerifiedIdentity, IdentityError>> {
        Box::pin(async {
            Err(IdentityError::ProviderUnavailable {
                message: "no identity provider configured".into(),
                source: None,
            })
        })
    }
}

#[cfg(feature = "firebase-auth")]
pub mod firebase {
    //! Token lookup against the Firebase identity toolkit REST API.

    use std::sync::Arc;

    use futures::future::BoxFuture;
    use reqwest::{Client, StatusCode};
    use serde::{Deserialize, Serialize};

    use super::{IdentityError, IdentityVerifier, VerifiedIdentity};

    const LOOKUP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:lookup";

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct LookupRequest<'a> {
        id_token: &'a str,
    }

    #[derive(Deserialize)]
    struct LookupResponse {
        #[serde(default)]
        users: Vec<LookupUser>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct LookupUser {
        local_id: String,
    }

    /// Resolves Firebase ID tokens through `accounts:lookup`.
    #[derive(Clone)]
    pub struct FirebaseIdentityVerifier {
        client: Client,
        api_key: Arc<str>,
    }

    impl FirebaseIdentityVerifier {
        pub fn new(api_key: &str) -> Result<Self, reqwest::Error> {
            let client = Client::builder().build()?;
            Ok(Self {
                client,
                api_key: Arc::from(api_key),
            })
        }

        async fn lookup(&self, token: String) -> Result<VerifiedIdentity, IdentityError> {
            let response = self
                .client
                .post(LOOKUP_URL)
                .query(&[("key", self.api_key.as_ref())])
                .json(&LookupRequest { id_token: &token })
                .send()
                .await
                .map_err(|source| IdentityError::ProviderUnavailable {
                    message: "lookup request failed".into(),
                    source: Some(Box::new(source)),
                })?;

            match response.status() {
                status if status.is_success() => {}
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                    return Err(IdentityError::InvalidToken);
                }
                status => {
                    return Err(IdentityError::ProviderUnavailable {
                        message: format!("unexpected status {status}"),
                        source: None,
                    });
                }
            }

            let body: LookupResponse =
                response
                    .json()
                    .await
                    .map_err(|source| IdentityError::ProviderUnavailable {
                        message: "malformed lookup response".into(),
                        source: Some(Box::new(source)),
                    })?;

            body.users
                .into_iter()
                .next()
                .map(|user| VerifiedIdentity { uid: user.local_id })
                .ok_or(IdentityError::InvalidToken)
        }
    }

    impl IdentityVerifier for FirebaseIdentityVerifier {
        fn verify(
            &self,
            token: String,
        ) -> BoxFuture<'static, Result<VerifiedIdentity, IdentityError>> {
            let verifier = self.clone();
            Box::pin(async move { verifier.lookup(token).await })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let err = verify_claimed_uid(&TrustTokenVerifier, None, "host")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::MissingToken));
        assert_eq!(err.to_string(), "Missing authentication token");

        let err = verify_claimed_uid(&TrustTokenVerifier, Some("  "), "host")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::MissingToken));
    }

    #[tokio::test]
    async fn uid_must_match_claim() {
        let err = verify_claimed_uid(&TrustTokenVerifier, Some("someone"), "host")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Token UID does not match hostId");

        let identity = verify_claimed_uid(&TrustTokenVerifier, Some("host"), "host")
            .await
            .unwrap();
        assert_eq!(identity.uid, "host");
    }

    #[test]
    fn identity_errors_surface_as_unauthorized() {
        let err: ServiceError = IdentityError::UidMismatch.into();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
        assert_eq!(err.client_message(), "Token UID does not match hostId");
    }
}
