/// Shared error type used across all repo-agent crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The `<ExceptionKind>` component used in `error` event messages and
    /// the `"工具执行出错：<Kind>: <message>"` tool-error strings.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
            Error::Http(_) => "HttpError",
            Error::RateLimited { .. } => "RateLimitError",
            Error::Provider { .. } => "ProviderError",
            Error::Config(_) => "ConfigError",
            Error::Other(_) => "Error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
