//! Simulated applications and the handler calling convention.
//!
//! An [`Application`] pairs a [`HostPattern`] with a [`Handler`]. When a
//! request's destination host matches the pattern, the request is translated
//! into an [`Environment`] and handed to the handler, which answers with a
//! raw [`HandlerResponse`].
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method};
use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::errors::{Error, HandlerError, Result};
use crate::request::Destination;

/// The verbs a simulated application can be asked to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulatedMethod {
  /// GET
  Get,
  /// POST
  Post,
  /// PUT
  Put,
  /// DELETE
  Delete,
}

impl SimulatedMethod {
  /// Whether the request body is handed to the handler as its input.
  pub fn carries_input(&self) -> bool {
    matches!(self, SimulatedMethod::Post | SimulatedMethod::Put)
  }
  /// The verb as it appears on the wire.
  pub fn as_str(&self) -> &'static str {
    match self {
      SimulatedMethod::Get => "GET",
      SimulatedMethod::Post => "POST",
      SimulatedMethod::Put => "PUT",
      SimulatedMethod::Delete => "DELETE",
    }
  }
}

impl TryFrom<&Method> for SimulatedMethod {
  type Error = Error;

  fn try_from(method: &Method) -> Result<Self> {
    match *method {
      Method::GET => Ok(SimulatedMethod::Get),
      Method::POST => Ok(SimulatedMethod::Post),
      Method::PUT => Ok(SimulatedMethod::Put),
      Method::DELETE => Ok(SimulatedMethod::Delete),
      _ => Err(Error::UnsupportedMethod(method.clone())),
    }
  }
}

impl From<SimulatedMethod> for Method {
  fn from(value: SimulatedMethod) -> Self {
    match value {
      SimulatedMethod::Get => Method::GET,
      SimulatedMethod::Post => Method::POST,
      SimulatedMethod::Put => Method::PUT,
      SimulatedMethod::Delete => Method::DELETE,
    }
  }
}

impl fmt::Display for SimulatedMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The normalized request a handler receives.
#[derive(Debug, Clone)]
pub struct Environment {
  method: SimulatedMethod,
  path: String,
  query: Option<String>,
  headers: HeaderMap,
  destination: Destination,
  input: Option<Bytes>,
}

impl Environment {
  pub(crate) fn new(
    method: SimulatedMethod,
    uri: &http::Uri,
    headers: HeaderMap,
    destination: Destination,
    input: Option<Bytes>,
  ) -> Environment {
    Environment {
      method,
      path: uri.path().to_string(),
      query: uri.query().map(ToString::to_string),
      headers,
      destination,
      input,
    }
  }
  /// The request verb.
  pub fn method(&self) -> SimulatedMethod {
    self.method
  }
  /// The request path, without the query string.
  pub fn path(&self) -> &str {
    &self.path
  }
  /// The raw query string, if any.
  pub fn query(&self) -> Option<&str> {
    self.query.as_deref()
  }
  /// Percent-decoded `key=value` pairs of the query string.
  pub fn query_pairs(&self) -> Vec<(String, String)> {
    let decode = |s: &str| -> String {
      let s = s.replace('+', " ");
      percent_decode_str(&s).decode_utf8_lossy().into_owned()
    };
    self
      .query
      .as_deref()
      .unwrap_or_default()
      .split('&')
      .filter(|pair| !pair.is_empty())
      .map(|pair| match pair.split_once('=') {
        Some((k, v)) => (decode(k), decode(v)),
        None => (decode(pair), String::new()),
      })
      .collect()
  }
  /// All request headers.
  pub fn headers(&self) -> &HeaderMap {
    &self.headers
  }
  /// The first value of a header, if present and valid text.
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(name).and_then(|v| v.to_str().ok())
  }
  /// The addressed host name.
  pub fn host(&self) -> &str {
    self.destination.host()
  }
  /// The addressed port.
  pub fn port(&self) -> u16 {
    self.destination.port()
  }
  /// The request body, for POST and PUT only.
  pub fn input(&self) -> Option<&Bytes> {
    self.input.as_ref()
  }
  /// The request body as text, lossily decoded.
  pub fn input_text(&self) -> Cow<'_, str> {
    match &self.input {
      Some(input) => String::from_utf8_lossy(input),
      None => Cow::Borrowed(""),
    }
  }
}

/// What a handler answers: a numeric status, header fields in order, and
/// the body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResponse {
  /// numeric status code
  pub status: u16,
  /// header fields, repeated names allowed
  pub headers: Vec<(String, String)>,
  /// body bytes
  pub body: Bytes,
}

impl HandlerResponse {
  /// A response with the given status, no headers and an empty body.
  pub fn new(status: u16) -> HandlerResponse {
    HandlerResponse {
      status,
      headers: Vec::new(),
      body: Bytes::new(),
    }
  }
  /// A `200` response with the given body.
  pub fn ok<B: Into<Bytes>>(body: B) -> HandlerResponse {
    HandlerResponse::new(200).body(body)
  }
  /// Append a header field.
  pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> HandlerResponse {
    self.headers.push((key.into(), value.into()));
    self
  }
  /// Set the body.
  pub fn body<B: Into<Bytes>>(mut self, body: B) -> HandlerResponse {
    self.body = body.into();
    self
  }
}

/// The calling convention of a simulated application.
///
/// Handlers run synchronously inside the intercepted call.
pub trait Handler: Send + Sync {
  /// Answer one request.
  fn call(&self, env: &Environment) -> std::result::Result<HandlerResponse, HandlerError>;
}

impl<F> Handler for F
where
  F: Fn(&Environment) -> std::result::Result<HandlerResponse, HandlerError> + Send + Sync,
{
  fn call(&self, env: &Environment) -> std::result::Result<HandlerResponse, HandlerError> {
    self(env)
  }
}

/// The hostname rule that selects an application.
#[derive(Clone)]
pub enum HostPattern {
  /// The whole host, compared ASCII case-insensitively.
  Exact(String),
  /// A regular expression searched in the host.
  Regex(Regex),
  /// Any predicate over the host.
  Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl HostPattern {
  /// Compile a regex pattern.
  pub fn regex(pattern: &str) -> Result<HostPattern> {
    Ok(HostPattern::Regex(Regex::new(pattern)?))
  }
  /// Wrap a predicate.
  pub fn predicate<F>(f: F) -> HostPattern
  where
    F: Fn(&str) -> bool + Send + Sync + 'static,
  {
    HostPattern::Predicate(Arc::new(f))
  }
  /// Whether `host` satisfies this rule.
  pub fn matches(&self, host: &str) -> bool {
    match self {
      HostPattern::Exact(exact) => exact.eq_ignore_ascii_case(host),
      HostPattern::Regex(re) => re.is_match(host),
      HostPattern::Predicate(f) => f(host),
    }
  }
}

impl fmt::Debug for HostPattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      HostPattern::Exact(exact) => f.debug_tuple("Exact").field(exact).finish(),
      HostPattern::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
      HostPattern::Predicate(_) => f.write_str("Predicate(..)"),
    }
  }
}

impl From<&str> for HostPattern {
  fn from(value: &str) -> Self {
    HostPattern::Exact(value.to_string())
  }
}

impl From<String> for HostPattern {
  fn from(value: String) -> Self {
    HostPattern::Exact(value)
  }
}

impl From<Regex> for HostPattern {
  fn from(value: Regex) -> Self {
    HostPattern::Regex(value)
  }
}

/// An in-process application standing in for a remote service.
#[derive(Clone)]
pub struct Application {
  name: String,
  pattern: HostPattern,
  handler: Arc<dyn Handler>,
}

impl Application {
  /// Register a handler closure for hosts matching `pattern`.
  ///
  /// The application is named after the pattern until `named` says otherwise.
  ///
  /// ```
  /// use request_interceptor::{Application, HandlerResponse};
  /// let app = Application::new("test.local", |env| {
  ///   Ok(HandlerResponse::ok(format!("hello from {}", env.path())))
  /// });
  /// assert!(app.matches("TEST.local"));
  /// ```
  pub fn new<P, F>(pattern: P, handler: F) -> Application
  where
    P: Into<HostPattern>,
    F: Fn(&Environment) -> std::result::Result<HandlerResponse, HandlerError> + Send + Sync + 'static,
  {
    Application::with_handler(pattern, handler)
  }
  /// Register any `Handler` implementation for hosts matching `pattern`.
  pub fn with_handler<P, H>(pattern: P, handler: H) -> Application
  where
    P: Into<HostPattern>,
    H: Handler + 'static,
  {
    let pattern = pattern.into();
    let name = match &pattern {
      HostPattern::Exact(host) => host.clone(),
      HostPattern::Regex(re) => re.as_str().to_string(),
      HostPattern::Predicate(_) => "predicate".to_string(),
    };
    Application {
      name,
      pattern,
      handler: Arc::new(handler),
    }
  }
  /// Rename the application, for logs and transactions.
  pub fn named<N: Into<String>>(mut self, name: N) -> Application {
    self.name = name.into();
    self
  }
  /// The application name.
  pub fn name(&self) -> &str {
    &self.name
  }
  /// The hostname rule.
  pub fn pattern(&self) -> &HostPattern {
    &self.pattern
  }
  /// Whether this application serves `host`.
  pub fn matches(&self, host: &str) -> bool {
    self.pattern.matches(host)
  }
  /// Invoke the handler.
  pub fn call(&self, env: &Environment) -> Result<HandlerResponse> {
    self.handler.call(env).map_err(Error::Handler)
  }
}

impl fmt::Debug for Application {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Application")
      .field("name", &self.name)
      .field("pattern", &self.pattern)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn env(uri: &'static str) -> Environment {
    let uri = http::Uri::from_static(uri);
    let destination = Destination::from_uri(&uri).unwrap();
    Environment::new(SimulatedMethod::Get, &uri, HeaderMap::new(), destination, None)
  }

  #[test]
  fn only_four_verbs_are_simulated() {
    assert_eq!(SimulatedMethod::try_from(&Method::GET).unwrap(), SimulatedMethod::Get);
    assert_eq!(SimulatedMethod::try_from(&Method::DELETE).unwrap(), SimulatedMethod::Delete);
    for method in [Method::PATCH, Method::HEAD, Method::OPTIONS, Method::TRACE] {
      let err = SimulatedMethod::try_from(&method).unwrap_err();
      assert!(matches!(err, Error::UnsupportedMethod(m) if m == method));
    }
    assert!(SimulatedMethod::Put.carries_input());
    assert!(!SimulatedMethod::Delete.carries_input());
  }

  #[test]
  fn exact_pattern_ignores_case() {
    let pattern = HostPattern::from("Test.Local");
    assert!(pattern.matches("test.local"));
    assert!(!pattern.matches("api.test.local"));
  }

  #[test]
  fn regex_and_predicate_patterns() {
    let pattern = HostPattern::regex(r"^[a-z]+\.test\.local$").unwrap();
    assert!(pattern.matches("api.test.local"));
    assert!(!pattern.matches("test.local"));
    assert!(matches!(HostPattern::regex("("), Err(Error::InvalidPattern(_))));
    let pattern = HostPattern::predicate(|host| host.ends_with(".internal"));
    assert!(pattern.matches("billing.internal"));
  }

  #[test]
  fn environment_splits_query() {
    let env = env("http://test.local/search?q=blue+widgets&tag=a%26b&flag");
    assert_eq!(env.path(), "/search");
    assert_eq!(env.query(), Some("q=blue+widgets&tag=a%26b&flag"));
    assert_eq!(
      env.query_pairs(),
      vec![
        ("q".to_string(), "blue widgets".to_string()),
        ("tag".to_string(), "a&b".to_string()),
        ("flag".to_string(), String::new()),
      ]
    );
    assert_eq!(env.host(), "test.local");
    assert_eq!(env.port(), 80);
    assert_eq!(env.input_text(), "");
  }

  #[test]
  fn handler_errors_are_wrapped() {
    let app = Application::new("test.local", |_env| Err("boom".into()));
    assert_eq!(app.name(), "test.local");
    let err = app.call(&env("http://test.local/")).unwrap_err();
    assert_eq!(err.to_string(), "boom");
  }
}
