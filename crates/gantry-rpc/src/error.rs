//! RPC transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("malformed envelope: {0}")]
    Envelope(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("bad status: {0}")]
    Status(reqwest::StatusCode),

    /// The remote service reported a fault in its reply.
    #[error("remote fault: {0}")]
    Remote(String),
}

pub type RpcResult<T> = std::result::Result<T, RpcError>;
