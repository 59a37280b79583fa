use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("access denied: {0}")]
    AccessDenied(u16),

    #[error("remote service answered with status {0}")]
    Status(u16),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("account {account}: {source}")]
    Account {
        account: String,
        #[source]
        source: Box<Error>,
    },

    #[error("all account workers have stopped")]
    WorkersExited,
}

impl Error {
    /// Wraps an error with the account it happened on.
    pub fn for_account(account: impl Into<String>, source: Error) -> Self {
        Error::Account {
            account: account.into(),
            source: Box::new(source),
        }
    }

    /// Whether repeating the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Io(_) => true,
            Error::Status(status) => *status >= 500,

            Error::AccessDenied(_) => false,
            Error::Decode(_) => false,
            Error::InvalidSession(_) => false,
            Error::Tls(_) => false,
            Error::Connection(_) => false,
            Error::Mqtt(_) => false,
            Error::Config(_) => false,
            Error::Account { source, .. } => source.is_retryable(),
            Error::WorkersExited => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
