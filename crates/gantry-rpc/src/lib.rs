//! Minimal RPC transport for Gantry.
//!
//! Synchronous request/reply over stateless HTTP connections with a
//! pluggable codec. One call per connection: the volume is roughly one call
//! per attempt, so connection reuse buys nothing and statelessness keeps
//! recovery simple.
//!
//! Errors propagate verbatim to the caller; retry and backoff policy belong
//! to callers, never to the transport.

pub mod client;
pub mod codec;
pub mod error;
pub mod router;
pub mod wire;

pub use client::Client;
pub use codec::{Codec, JsonCodec};
pub use error::{RpcError, RpcResult};
pub use router::Router;
