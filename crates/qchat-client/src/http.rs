//! HTTP control plane.

use qchat_proto::control::{
    DECRYPT_PATH, DecryptRequest, DecryptResponse, EncryptSendRequest, EncryptSendResponse,
    SEND_PATH,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    config::ClientConfig,
    control::{ControlError, ControlPlane},
};

/// [`ControlPlane`] over JSON `POST` requests to the chat API.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpControlPlane {
    /// Build a client for `config.api_url`.
    pub fn new(config: &ClientConfig) -> Result<Self, ControlError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ControlError::Transport(e.to_string()))?;

        Ok(Self { client, config: config.clone() })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ControlError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.config.api_endpoint(path);
        tracing::debug!(%url, "control plane request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ControlError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ControlError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(%url, status = status.as_u16(), "control plane call failed");
            return Err(ControlError::from_status(status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| ControlError::InvalidResponse(e.to_string()))
    }
}

impl ControlPlane for HttpControlPlane {
    async fn encrypt_send(
        &self,
        request: &EncryptSendRequest,
    ) -> Result<EncryptSendResponse, ControlError> {
        self.post(SEND_PATH, request).await
    }

    async fn decrypt(&self, request: &DecryptRequest) -> Result<DecryptResponse, ControlError> {
        self.post(DECRYPT_PATH, request).await
    }
}
