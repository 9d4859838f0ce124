//! HTTP transport shared by the chat submission and the script fetch.

mod http;

pub use http::{HttpTransport, TransportError};
