//! Client for the Virtualizor-style panel API.
//!
//! Every call is `{base}/index.php?act=..&api=json&apikey=..&apipass=..`
//! with extra query parameters. Responses are loosely structured JSON; the
//! [`normalize`] module turns them into VM records.

pub mod normalize;
mod types;

use std::time::Duration;

use serde_json::{Map, Value};

pub use normalize::{VmRecord, extract_vm_detail, extract_vm_list};
pub use types::*;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("panel request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("panel returned a non-JSON body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to build http client: {0}")]
    Config(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for panel endpoints.
///
/// Holds two connection pools so accounts with self-signed certificates can
/// opt out of verification without affecting the others.
#[derive(Clone)]
pub struct PanelClient {
    verified: reqwest::Client,
    insecure: reqwest::Client,
}

impl PanelClient {
    pub fn new() -> Result<Self> {
        let verified = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(Error::Config)?;
        let insecure = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(Error::Config)?;
        Ok(Self { verified, insecure })
    }

    fn http(&self, creds: &PanelCredentials) -> &reqwest::Client {
        if creds.verify_tls {
            &self.verified
        } else {
            &self.insecure
        }
    }

    /// Build the request for `action` without sending it.
    pub fn request(
        &self,
        creds: &PanelCredentials,
        action: &str,
        params: &[(&str, &str)],
        method: Method,
    ) -> reqwest::RequestBuilder {
        let mut query: Vec<(&str, &str)> = vec![
            ("act", action),
            ("api", "json"),
            ("apikey", creds.api_key.as_str()),
            ("apipass", creds.api_secret.as_str()),
        ];
        query.extend_from_slice(params);

        let http = self.http(creds);
        let endpoint = creds.endpoint();
        let builder = match method {
            Method::Get => http.get(endpoint),
            Method::Post => http.post(endpoint),
        };
        builder.query(&query)
    }

    /// Call `action` and return the decoded body as a JSON object.
    ///
    /// The status code is not checked: panels report errors inside JSON
    /// bodies. Non-object bodies are wrapped as `{"raw": <body>}`.
    pub async fn invoke(
        &self,
        creds: &PanelCredentials,
        action: &str,
        params: &[(&str, &str)],
        method: Method,
    ) -> Result<Map<String, Value>> {
        let resp = self
            .request(creds, action, params, method)
            .send()
            .await
            .map_err(Error::Network)?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(action, %status, "panel returned non-success status");
        }

        let body = resp.bytes().await.map_err(Error::Network)?;
        decode_body(&body)
    }

    // ── VMs ──────────────────────────────────────────────────────────

    pub async fn list_vms(&self, creds: &PanelCredentials) -> Result<Vec<VmRecord>> {
        let root = self.invoke(creds, "vs", &[], Method::Get).await?;
        Ok(extract_vm_list(&root))
    }

    pub async fn vm_detail(&self, creds: &PanelCredentials, vm_id: &str) -> Result<VmRecord> {
        let root = self
            .invoke(creds, "managevs", &[("vpsid", vm_id)], Method::Get)
            .await?;
        Ok(extract_vm_detail(&root).clone())
    }

    pub async fn vm_action(
        &self,
        creds: &PanelCredentials,
        vm_id: &str,
        action: VmAction,
    ) -> Result<Map<String, Value>> {
        self.invoke(
            creds,
            "managevs",
            &[("vpsid", vm_id), ("action", action.as_str())],
            Method::Post,
        )
        .await
    }
}

/// Decode a response body, wrapping anything that is not an object.
pub fn decode_body(body: &[u8]) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_slice(body)?;
    Ok(match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("raw".to_string(), other);
            map
        }
    })
}
