use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Credentials ──────────────────────────────────────────────────────

/// Connection details for one panel account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelCredentials {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// When false, certificate validation is disabled for this panel
    /// (self-signed deployments).
    pub verify_tls: bool,
}

impl PanelCredentials {
    pub fn endpoint(&self) -> String {
        format!("{}/index.php", normalize_panel_url(&self.base_url))
    }
}

/// Trim whitespace and trailing slashes from a user-supplied panel URL.
pub fn normalize_panel_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// A panel URL must be absolute http(s).
pub fn is_valid_panel_url(url: &str) -> bool {
    let url = url.trim().to_ascii_lowercase();
    url.starts_with("http://") || url.starts_with("https://")
}

// ── Request shape ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// Lifecycle commands accepted by `act=managevs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmAction {
    Start,
    Stop,
    Restart,
    PowerOff,
}

impl VmAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::PowerOff => "poweroff",
        }
    }
}

impl fmt::Display for VmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown vm action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for VmAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "poweroff" => Ok(Self::PowerOff),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}
