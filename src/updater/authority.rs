//! Remote collaborators: the signing authority and the CT publisher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::store::OcspStatus;
use crate::rpc::{RpcClient, RpcError, Transport};

/// Input to OCSP response generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcspSigningRequest {
    pub cert_der: Vec<u8>,
    pub status: OcspStatus,
    pub reason: u8,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The authority did not answer. Loops back off on this.
    #[error("authority unavailable: {0}")]
    Unavailable(String),
    #[error("authority rejected request: {0}")]
    Rejected(String),
    #[error("malformed authority message: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error(transparent)]
    Rpc(RpcError),
}

impl AuthorityError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<RpcError> for AuthorityError {
    fn from(e: RpcError) -> Self {
        if e.is_unavailable() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Rpc(e)
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("ct submission failed: {0}")]
    Submission(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Signs OCSP responses.
#[async_trait::async_trait]
pub trait CertificateAuthority: Send + Sync {
    async fn generate_ocsp(&self, request: OcspSigningRequest) -> Result<Vec<u8>, AuthorityError>;
}

/// Submits certificates to Certificate Transparency logs.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn submit_to_ct(&self, der: &[u8]) -> Result<(), PublishError>;
}

/// Reply body sent back by a remote authority.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerateOcspReply {
    Response(Vec<u8>),
    Error(String),
}

/// [`CertificateAuthority`] reached over RPC with JSON bodies.
pub struct RpcAuthority<T> {
    client: RpcClient<T>,
}

impl<T: Transport> RpcAuthority<T> {
    pub fn new(client: RpcClient<T>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RpcClient<T> {
        &self.client
    }
}

#[async_trait::async_trait]
impl<T: Transport> CertificateAuthority for RpcAuthority<T> {
    async fn generate_ocsp(&self, request: OcspSigningRequest) -> Result<Vec<u8>, AuthorityError> {
        let body = serde_json::to_vec(&request)?;
        let reply = self.client.dispatch(body).await?;
        match serde_json::from_slice(&reply)? {
            GenerateOcspReply::Response(der) => Ok(der),
            GenerateOcspReply::Error(msg) => Err(AuthorityError::Rejected(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rpc_timeout_maps_to_unavailable() {
        let err = AuthorityError::from(RpcError::Timeout {
            client: "ca".into(),
            timeout: Duration::from_secs(1),
        });
        assert!(err.is_unavailable());

        let err = AuthorityError::from(RpcError::Transport("broken pipe".into()));
        assert!(!err.is_unavailable());
        assert!(matches!(err, AuthorityError::Rpc(_)));
    }

    #[test]
    fn reply_wire_format() {
        let ok = serde_json::to_string(&GenerateOcspReply::Response(vec![1, 2])).unwrap();
        assert_eq!(ok, r#"{"response":[1,2]}"#);
        let err: GenerateOcspReply = serde_json::from_str(r#"{"error":"bad serial"}"#).unwrap();
        assert!(matches!(err, GenerateOcspReply::Error(m) if m == "bad serial"));
    }
}
