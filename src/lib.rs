#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # request-interceptor
//!
//! The `request-interceptor` crate runs test scenarios with their outbound
//! HTTP traffic intercepted.
//!
//! Requests for hosts claimed by a registered [`Application`] are answered
//! in-process by a handler and never touch the network. Everything else
//! goes to the real network unchanged. Every intercepted call, simulated
//! or real, is recorded as a [`Transaction`] for the test to inspect.
//!
//! - Host rules by exact name, [regex](HostPattern::regex) or
//!   [predicate](HostPattern::predicate), first registration wins
//! - Simulated verbs: `GET`, `POST`, `PUT`, `DELETE`
//! - Symmetric activation around each [`Runner::run`]
//! - Concurrent requests inside a run, logged in completion order
//!
//! ## Running a scenario
//!
//! Code under test takes a [`Client`]. The scenario passed to
//! [`Runner::run`] receives one routed through the runner.
//!
//! ```rust
//! use request_interceptor::{Application, HandlerResponse, Runner};
//! # async fn run() -> Result<(), request_interceptor::Error> {
//! let runner = Runner::new(vec![Application::new("test.local", |env| {
//!   match env.path() {
//!     "/widgets" => Ok(
//!       HandlerResponse::ok(r#"{"id":1}"#).header("Content-Type", "application/json"),
//!     ),
//!     _ => Ok(HandlerResponse::new(404)),
//!   }
//! })]);
//! let transactions = runner
//!   .run(|client| async move {
//!     let resp = client.get("http://test.local/widgets").send().await?;
//!     assert_eq!(resp.text()?, r#"{"id":1}"#);
//!     Ok(())
//!   })
//!   .await?;
//! assert_eq!(transactions.len(), 1);
//! assert_eq!(transactions[0].request.path(), "/widgets");
//! # Ok(())
//! # }
//! ```
//!
//! ## Passthrough
//!
//! Unmatched requests go to the runner's real [`Transport`], by default a
//! plain HTTP/1.1 [`HttpTransport`]. Swap it with
//! [`RunnerBuilder::transport`] to stub the outside world too.
//!
//! ## Optional Features
//!
//! - **serde**: Provides serialization of recorded transactions.
//!
mod application;
mod body;
mod client;
mod connector;
mod errors;
/// Recorded transactions
pub mod record;
mod request;
mod response;
mod router;
mod runner;
pub mod simulate;
mod status;
pub mod transport;

pub use application::{
  Application, Environment, Handler, HandlerResponse, HostPattern, SimulatedMethod,
};
pub use body::Body;
pub use client::{Client, ClientBuilder};
pub use connector::{Connector, ConnectorBuilder};
pub use errors::{Error, HandlerError, Result};
pub use http::header;
pub use http::uri;
pub use http::Method;
pub use http::{StatusCode, Version};
pub use record::{Route, Simulated, Transaction, TransactionLog};
pub use request::{Destination, Request, RequestBuilder};
pub use response::{Response, ResponseBuilder, ResponseConfig};
pub use router::Router;
pub use runner::{Continuation, RunState, Runner, RunnerBuilder};
pub use status::Status;
pub use transport::{HttpTransport, Transport};

/// Shortcut method to quickly make a `GET` request on the real network.
///
/// **NOTE**: This function creates a new internal `Client` on each call.
/// Code that should be interceptable must take a [`Client`] instead.
///
/// # Examples
///
/// ```rust
/// # async fn run() -> Result<(), request_interceptor::Error> {
/// let body = request_interceptor::get("http://example.com/")
///   .await?
///   .text()?;
/// # Ok(())
/// # }
/// ```
pub async fn get<U>(url: U) -> Result<Response>
where
  http::Uri: TryFrom<U>,
  <http::Uri as TryFrom<U>>::Error: Into<http::Error>,
{
  Client::new().get(url).send().await
}

pub(crate) const CR_LF: &[u8] = &[13, 10];
pub(crate) const SPACE: &[u8] = &[32];
pub(crate) const COLON_SPACE: &[u8] = &[58, 32];
