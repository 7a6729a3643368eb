//! Server-side method router.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::post;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{Codec, JsonCodec};

type Handler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Dispatches decoded calls to registered async methods. Method names are
/// qualified as `Service.Method`; an unknown name is a remote fault, not a
/// transport error.
pub struct Router {
    codec: Arc<dyn Codec>,
    methods: HashMap<String, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_codec(Arc::new(JsonCodec))
    }

    pub fn with_codec(codec: Arc<dyn Codec>) -> Self {
        Self {
            codec,
            methods: HashMap::new(),
        }
    }

    /// Register a method. The handler's argument is decoded from the call
    /// params; its error string becomes the remote fault text.
    pub fn register<A, R, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.methods.insert(
            name.to_string(),
            Box::new(move |params: Value| {
                let handler = handler.clone();
                Box::pin(async move {
                    let args: A = serde_json::from_value(params)
                        .map_err(|e| format!("bad arguments: {e}"))?;
                    let reply = handler(args).await?;
                    serde_json::to_value(reply).map_err(|e| format!("bad reply: {e}"))
                })
            }),
        );
        self
    }

    /// Handle one encoded call, producing the encoded reply.
    pub async fn handle(&self, body: &[u8]) -> Vec<u8> {
        let (method, args, id) = match self.codec.decode_request(body) {
            Ok(parts) => parts,
            Err(e) => {
                return self
                    .codec
                    .encode_response(Err(e.to_string()), Value::Null);
            }
        };

        debug!(%method, "rpc call");
        let result = match self.methods.get(&method) {
            Some(handler) => handler(args).await,
            None => Err(format!("unknown method: {method}")),
        };
        self.codec.encode_response(result, id)
    }

    /// The registered method names, for diagnostics.
    pub fn methods(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    /// Mount this router as a single-POST axum service.
    pub fn into_service(self) -> axum::Router {
        let content_type = self.codec.content_type();
        let router = Arc::new(self);
        axum::Router::new().route(
            "/",
            post(move |body: Bytes| {
                let router = router.clone();
                async move {
                    let reply = router.handle(&body).await;
                    ([(header::CONTENT_TYPE, content_type)], reply).into_response()
                }
            }),
        )
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    fn test_router() -> Router {
        Router::new().register("Calc.Add", |args: AddArgs| async move { Ok(args.a + args.b) })
    }

    #[tokio::test]
    async fn test_dispatch() {
        let router = test_router();
        let codec = JsonCodec;
        let body = codec
            .encode_request("Calc.Add", &json!({"a": 2, "b": 3}))
            .unwrap();
        let reply = router.handle(&body).await;
        let value = codec.decode_response(&reply).unwrap();
        assert_eq!(value, json!(5));
    }

    #[tokio::test]
    async fn test_unknown_method_is_remote_fault() {
        let router = test_router();
        let codec = JsonCodec;
        let body = codec.encode_request("Calc.Sub", &json!({})).unwrap();
        let reply = router.handle(&body).await;
        let err = codec.decode_response(&reply).unwrap_err();
        assert!(matches!(err, crate::RpcError::Remote(_)));
    }
}
