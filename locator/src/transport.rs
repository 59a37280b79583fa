use crate::config::RemoteSettings;
use crate::errors::Result;
use crate::model::SessionContext;
use crate::tls;
use async_trait::async_trait;
use std::fmt;
use tracing::{debug, info};

/// Headers the remote service expects from its own mobile client.
/// Sent byte-for-byte on every request.
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("Content-Type", "text/plain"),
    ("Accept", "application/json, text/javascript, */*; q=0.01"),
    ("Connection", "keep-alive"),
    ("Accept-Language", "en-US,en;q=0.9,cs;q=0.8"),
    ("Origin", "https://www.icloud.com"),
    ("X-Apple-Realm-Support", "1.0"),
    ("X-Apple-Find-API-Ver", "3.0"),
    ("User-Agent", "FindMyiPhone/500 CFNetwork/758.4.3 Darwin/15.5.0"),
];

pub const AUTH_SCHEME_HEADER: &str = "X-Apple-AuthScheme";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    InitClient,
    RefreshClient,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::InitClient => "initClient",
            Action::RefreshClient => "refreshClient",
        }
    }

    pub fn auth_scheme(&self) -> &'static str {
        match self {
            Action::InitClient => "UserIDGuest",
            Action::RefreshClient => "Forever",
        }
    }
}

/// One request to the location service, independent of how it is sent
#[derive(Clone)]
pub struct LocateRequest {
    pub action: Action,
    /// Account name for `initClient`, decimal session id for `refreshClient`
    pub login: String,
    /// Password for `initClient`, auth token for `refreshClient`
    pub secret: String,
    pub body: Vec<u8>,
}

impl LocateRequest {
    pub fn init_client(username: &str, password: &str) -> Result<Self> {
        let body = serde_json::to_vec(&serde_json::json!({ "accountName": username }))?;
        Ok(Self {
            action: Action::InitClient,
            login: username.to_string(),
            secret: password.to_string(),
            body,
        })
    }

    pub fn refresh_client(context: &SessionContext) -> Self {
        Self {
            action: Action::RefreshClient,
            login: context.person_id().to_string(),
            secret: context.auth_token().to_string(),
            body: b"{}".to_vec(),
        }
    }

    pub fn path(&self) -> String {
        format!("/fmipservice/device/{}/{}", self.login, self.action.as_str())
    }
}

impl fmt::Debug for LocateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocateRequest")
            .field("action", &self.action)
            .field("login", &self.login)
            .field("secret", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends requests to the location service.
///
/// Implementations are shared by every account session.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &LocateRequest) -> Result<RawResponse>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Builds the shared HTTP client.
    ///
    /// For `https` base URLs with pinning enabled, the certificate the server
    /// offers right now is added as an extra trust root next to the system
    /// store. This trusts whatever answers the first handshake and is a known
    /// weak point kept for compatibility with the remote service.
    pub async fn connect(settings: &RemoteSettings) -> Result<Self> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(settings.timeout());

        if settings.pin_certificate && base_url.starts_with("https://") {
            let (host, port) = tls::host_and_port(&base_url)?;
            let certificate = tls::fetch_peer_certificate(&host, port).await?;
            let certificate = reqwest::Certificate::from_der(certificate.as_ref())?;
            builder = builder.add_root_certificate(certificate);
            info!("Pinned certificate offered by {}:{}", host, port);
        }

        let client = builder.build()?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &LocateRequest) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, request.path());
        debug!("POST {}", url);

        let mut builder = self
            .client
            .post(url)
            .basic_auth(&request.login, Some(&request.secret))
            .header(AUTH_SCHEME_HEADER, request.action.auth_scheme());
        for (name, value) in DEFAULT_HEADERS {
            builder = builder.header(*name, *value);
        }

        let response = builder.body(request.body.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse { status, body })
    }
}
