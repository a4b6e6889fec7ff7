//! Error types for plugins and the fan-out runner.
//!
//! Provider failures never escape a plugin task: they are captured as
//! [`PluginError`] values and surface as strings in the report. Only
//! [`RunError`] is returned to the caller of a whole run.

use thiserror::Error;

/// A plugin could not be made usable (for example, missing credentials).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("credentials not found")]
    MissingCredentials,
}

/// A call to one provider's backend failed.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not configured")]
    NotConfigured,

    #[error("must supply files/URLs")]
    NoItems,

    /// The handle was never issued by this provider, or was cleared by a reset.
    #[error("request has not been made to {0}")]
    UnknownRequest(String),

    /// The backend answered with an error of its own.
    #[error("{0}")]
    Api(String),

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One entry in a plugin task's error list.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The task ended without publishing an outcome.
    #[error("plugin task ended without reporting: {0}")]
    Aborted(String),
}

/// Fatal errors raised before any provider is called.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("plugin name {0:?} is reserved")]
    ReservedName(String),

    #[error("plugin {0:?} is already registered")]
    DuplicatePlugin(String),

    /// Plugin tasks need a Tokio runtime to be spawned on.
    #[error("no async runtime available to run plugins: {0}")]
    NoRuntime(String),
}

/// Problems turning command-line or piped input into a request.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to find any valid files or URLs")]
    NoValidItems,

    #[error("failed to read from stdin: {0}")]
    Stdin(#[from] std::io::Error),
}
