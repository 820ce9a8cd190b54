//! REST API access for the ASK 2.0 platform.
//!
//! This module provides the `Transport` seam and its reqwest implementation,
//! the `AuthorizedRequestExecutor` that every protected call goes through,
//! and the `ApiClient` built on top of both.
//!
//! Protected endpoints expect the access token in the `access` header and
//! report expiry with `{"error": "Access token expired"}`.

pub mod client;
pub mod error;
pub mod executor;
pub mod transport;

pub use client::ApiClient;
pub use error::{ApiError, ExecutorError};
pub use executor::AuthorizedRequestExecutor;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, RequestBody, Transport};
