use std::path::PathBuf;

use thiserror::Error;

/// Error of a remote gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("SSH session is not connected")]
    NotConnected,
    #[error("unable to connect to {address}")]
    Connect {
        address: String,
        #[source]
        source: russh::Error,
    },
    #[error("connecting to {address} timed out")]
    ConnectTimedOut { address: String },
    #[error("no authentication method configured for user {user}")]
    NoAuthMethod { user: String },
    #[error("unable to authenticate as {user}")]
    Auth { user: String },
    #[error("unable to load private key {path:?}")]
    Key {
        path: PathBuf,
        #[source]
        source: russh::keys::Error,
    },
    #[error("internal SSH error")]
    Ssh(#[from] russh::Error),
    #[error("command timed out")]
    TimedOut,
    #[error("SSH channel closed before the command exited")]
    Disconnected,
    #[error("{0}")]
    Other(String),
}
