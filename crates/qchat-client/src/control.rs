//! Control-plane seam.
//!
//! Encrypt-and-send and decrypt are request/response calls against an
//! external service. The workflow only depends on [`ControlPlane`]; the HTTP
//! implementation lives behind the `transport` feature.

use std::future::Future;

use qchat_proto::control::{DecryptRequest, DecryptResponse, EncryptSendRequest, EncryptSendResponse};
use thiserror::Error;

/// Control-plane failures.
///
/// Any non-success response is a failure; there are no partial results.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Request never produced a response (connect, timeout, I/O)
    #[error("control plane unreachable: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("{message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, or `HTTP <status>` when the body was empty
        message: String,
    },

    /// Server answered but reported `ok: false`
    #[error("{operation} rejected by server")]
    Rejected {
        /// Operation that was rejected
        operation: &'static str,
    },

    /// Response body could not be parsed
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ControlError {
    /// Error for a non-success HTTP status with the given response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message =
            if body.trim().is_empty() { format!("HTTP {status}") } else { body.to_owned() };
        Self::Http { status, message }
    }
}

/// Encrypt/decrypt service.
pub trait ControlPlane {
    /// Encrypt `request.message` for `request.receiver` and relay it.
    fn encrypt_send(
        &self,
        request: &EncryptSendRequest,
    ) -> impl Future<Output = Result<EncryptSendResponse, ControlError>>;

    /// Decrypt a blob with the owner's key material.
    fn decrypt(
        &self,
        request: &DecryptRequest,
    ) -> impl Future<Output = Result<DecryptResponse, ControlError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_uses_body_or_status_line() {
        assert_eq!(
            ControlError::from_status(500, "key exhausted"),
            ControlError::Http { status: 500, message: "key exhausted".into() }
        );
        assert_eq!(
            ControlError::from_status(502, ""),
            ControlError::Http { status: 502, message: "HTTP 502".into() }
        );
        assert_eq!(ControlError::from_status(404, "").to_string(), "HTTP 404");
    }
}
