//! HTTP fallback for the upstream operations (spec.md §6: "a bidirectional
//! connection ... plus an HTTP fallback exposing the same operations"). Used
//! by the Command Executor when the websocket connection is down but a
//! command still needs to go out immediately.

use reqwest::Client;
use serde_json::Value;

use crate::error::MirrorResult;
use crate::protocol::RawState;

pub struct HttpFallback {
    base_url: String,
    access_token: String,
    client: Client,
}

impl HttpFallback {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), access_token: access_token.into(), client: Client::new() }
    }

    pub async fn get_states(&self) -> MirrorResult<Vec<RawState>> {
        let resp = self
            .client
            .get(format!("{}/api/states", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn call_service(&self, domain: &str, service: &str, payload: &Value) -> MirrorResult<()> {
        self.client
            .post(format!("{}/api/services/{domain}/{service}", self.base_url))
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
