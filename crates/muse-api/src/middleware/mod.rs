//! HTTP middleware
//!
//! Authentication lives in `auth::middleware`.
//!
//! Author: hephaex@gmail.com

pub mod security_headers;

pub use security_headers::security_headers_middleware;
