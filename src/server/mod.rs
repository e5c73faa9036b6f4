//! Network transports around the search core.

pub mod http_server;

pub use http_server::serve_http;
