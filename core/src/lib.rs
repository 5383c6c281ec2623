//! Blocking client for FHIR REST search.
//!
//! # Overview
//! Builds search requests (GET with a query string, or POST to `_search`),
//! authenticates (basic, static token, or a one-time login exchange) and
//! follows `next` links to collect paginated results into a single `Bundle`.
//!
//! # Design
//! - `FhirQueryClient` owns its `Session` and `Transport`; there is no global
//!   state.
//! - Each step is split into `build_*` (produces an `HttpRequest`) and
//!   `parse_*` (consumes an `HttpResponse`); `Transport` sits in between, so
//!   the query logic is testable without a network.
//! - Mutually exclusive search inputs are variants of `Query`.

pub mod auth;
pub mod bundle;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod query;
pub mod urls;

pub use auth::{LoginState, Session};
pub use bundle::Bundle;
pub use client::FhirQueryClient;
pub use config::{AuthConfig, ClientConfig};
pub use error::QueryError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use query::{Query, QueryOptions};
