//! RPC client.

use std::sync::Arc;

use reqwest::header::{CONNECTION, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Codec, JsonCodec, RpcError, RpcResult};

/// A client for one RPC service endpoint.
///
/// Each call closes its connection when done; there is no connection reuse.
pub struct Client {
    url: String,
    http: reqwest::Client,
    codec: Arc<dyn Codec>,
}

impl Client {
    /// A client speaking the JSON codec to the service at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_codec(url, Arc::new(JsonCodec))
    }

    pub fn with_codec(url: impl Into<String>, codec: Arc<dyn Codec>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            codec,
        }
    }

    /// Invoke the named method, wait for the reply, and decode it.
    ///
    /// Transport failures, bad statuses, decode failures, and remote faults
    /// all propagate verbatim; callers own any retry policy.
    pub async fn call<A, R>(&self, method: &str, args: &A) -> RpcResult<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(args).map_err(RpcError::Encode)?;
        let body = self.codec.encode_request(method, &params)?;

        let resp = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, self.codec.content_type())
            .header(CONNECTION, "close")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RpcError::Status(status));
        }

        let bytes = resp.bytes().await?;
        let value = self.codec.decode_response(&bytes)?;
        serde_json::from_value(value).map_err(RpcError::Decode)
    }
}
