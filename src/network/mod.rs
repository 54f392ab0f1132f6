//! Network access for the agent
//!
//! Request/response types shared with the cache, and the `Fetcher`
//! abstraction the installer and interceptor use to reach the origin.

mod fetcher;
mod message;

pub use fetcher::{Fetcher, NetworkFetcher};
pub use message::{resolve_url, Headers, Method, Request, Response};
