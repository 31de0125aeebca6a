use std::fmt::{self, Debug, Display, Formatter};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};

use crate::body::Body;
use crate::errors::{Error, Result};
use crate::record::CommandRecord;
use crate::{Client, Response, COLON_SPACE, CR_LF, SPACE};

/// The host and port a caller addressed, used to pick a simulated application.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Destination {
  host: String,
  port: u16,
}

impl Destination {
  /// Create a destination from a host and port.
  pub fn new<H: Into<String>>(host: H, port: u16) -> Destination {
    Destination {
      host: host.into(),
      port,
    }
  }
  /// Resolve the destination of a uri, defaulting the port from its scheme.
  pub fn from_uri(uri: &http::Uri) -> Result<Destination> {
    let host = uri.host().ok_or_else(|| Error::MissingHost(uri.clone()))?;
    let https = uri.scheme() == Some(&http::uri::Scheme::HTTPS);
    let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
    Ok(Destination::new(host.trim_start_matches('[').trim_end_matches(']'), port))
  }
  /// The addressed host name.
  pub fn host(&self) -> &str {
    &self.host
  }
  /// The addressed port.
  pub fn port(&self) -> u16 {
    self.port
  }
}

impl Display for Destination {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.host, self.port)
  }
}

/// An outbound request, as issued by code under test.
#[derive(Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Request {
  #[cfg_attr(feature = "serde", serde(with = "http_serde::uri"))]
  uri: http::Uri,
  #[cfg_attr(feature = "serde", serde(with = "http_serde::version"))]
  version: Version,
  #[cfg_attr(feature = "serde", serde(with = "http_serde::method"))]
  method: Method,
  #[cfg_attr(feature = "serde", serde(with = "http_serde::header_map"))]
  headers: HeaderMap<HeaderValue>,
  body: Option<Body>,
}

impl Debug for Request {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("Request")
      .field("uri", &self.uri)
      .field("version", &self.version)
      .field("method", &self.method)
      .field("headers", &self.headers)
      .field("body", &self.body)
      .finish()
  }
}

impl<T> From<http::Request<T>> for Request
where
  T: Into<Body>,
{
  fn from(value: http::Request<T>) -> Self {
    let (parts, body) = value.into_parts();
    let body = body.into();
    Self {
      uri: parts.uri,
      version: parts.version,
      method: parts.method,
      headers: parts.headers,
      body: if body.is_empty() { None } else { Some(body) },
    }
  }
}

impl Request {
  /// Creates a new builder-style object to manufacture a `Request`
  ///
  /// # Examples
  ///
  /// ```
  /// let request: request_interceptor::Request = request_interceptor::Request::builder()
  ///   .method("GET")
  ///   .uri("http://test.local/widgets")
  ///   .header("Accept", "application/json")
  ///   .body(request_interceptor::Body::empty())
  ///   .unwrap()
  ///   .into();
  /// assert_eq!(request.path(), "/widgets");
  /// ```
  pub fn builder() -> http::request::Builder {
    http::request::Builder::new()
  }
  /// Render the request the way it goes on the wire.
  pub(crate) fn to_raw(&self) -> Bytes {
    let mut http_requests = Vec::new();
    http_requests.extend(self.method.as_str().as_bytes());
    http_requests.extend(SPACE);
    http_requests.extend(self.path().as_bytes());
    http_requests.extend(SPACE);
    http_requests.extend(format!("{:?}", self.version).as_bytes());
    http_requests.extend(CR_LF);
    if self.headers.get(http::header::HOST).is_none() {
      http_requests.extend(http::header::HOST.as_str().as_bytes());
      http_requests.extend(COLON_SPACE);
      if let Some(s) = self.uri.authority() {
        http_requests.extend(s.as_str().as_bytes());
      }
      http_requests.extend(CR_LF);
    }
    let mut headers = self.headers.clone();
    if let Some(b) = self.body() {
      if !b.is_empty() {
        headers
          .entry(http::header::CONTENT_LENGTH)
          .or_insert(HeaderValue::from(b.len()));
      }
    }
    for (k, v) in headers.iter() {
      http_requests.extend(k.as_str().as_bytes());
      http_requests.extend(COLON_SPACE);
      http_requests.extend(v.as_bytes());
      http_requests.extend(CR_LF);
    }
    http_requests.extend(CR_LF);
    if let Some(b) = self.body() {
      http_requests.extend(b.as_ref());
    }
    Bytes::from(http_requests)
  }
  /// Attach a body handed over separately from the request.
  ///
  /// A request may carry its body already, or receive it here, but not both.
  /// Passing `None` leaves the request untouched.
  pub fn attach_body(&mut self, body: Option<Body>) -> Result<()> {
    match (body, &self.body) {
      (None, _) => Ok(()),
      (Some(_), Some(_)) => Err(Error::BodyAlreadyAttached),
      (Some(body), None) => {
        self.body = Some(body);
        Ok(())
      }
    }
  }
}

impl Request {
  /// Get the HTTP Method for this request.
  #[inline]
  pub fn method(&self) -> &Method {
    &self.method
  }
  /// Get a mutable reference to the HTTP Method for this request.
  #[inline]
  pub fn method_mut(&mut self) -> &mut Method {
    &mut self.method
  }
  /// Get the URI for this request
  #[inline]
  pub fn uri(&self) -> &http::Uri {
    &self.uri
  }
  /// Get a mutable reference to the URI for this request
  #[inline]
  pub fn uri_mut(&mut self) -> &mut http::Uri {
    &mut self.uri
  }
  /// The request target: path plus query, `/` when the uri has none.
  pub fn path(&self) -> &str {
    self
      .uri
      .path_and_query()
      .map(|pq| pq.as_str())
      .filter(|pq| !pq.is_empty())
      .unwrap_or("/")
  }
  /// Where the caller addressed this request.
  pub fn destination(&self) -> Result<Destination> {
    Destination::from_uri(&self.uri)
  }
  /// Get the headers of this request.
  #[inline]
  pub fn headers(&self) -> &HeaderMap {
    &self.headers
  }
  /// Get a mutable reference to the headers of this request.
  #[inline]
  pub fn headers_mut(&mut self) -> &mut HeaderMap {
    &mut self.headers
  }
  /// Get the body of this request, if one was attached.
  #[inline]
  pub fn body(&self) -> Option<&Body> {
    self.body.as_ref()
  }
  /// Returns the associated version.
  #[inline]
  pub fn version(&self) -> Version {
    self.version
  }
  /// Returns a mutable reference to the associated version.
  #[inline]
  pub fn version_mut(&mut self) -> &mut Version {
    &mut self.version
  }
  /// Returns a curl command that replays this request.
  ///
  /// # Examples
  ///
  /// ```
  /// let req: request_interceptor::Request = request_interceptor::Request::builder()
  ///   .uri("http://test.local/widgets")
  ///   .header("X", "X")
  ///   .body(bytes::Bytes::from_static(b"{}"))
  ///   .unwrap()
  ///   .into();
  /// assert!(req.get_command().starts_with("curl -X GET"));
  /// ```
  #[inline]
  pub fn get_command(&self) -> String {
    CommandRecord::from(self).command
  }
}

/// A builder to construct the properties of a `Request`.
///
/// To construct a `RequestBuilder`, refer to the `Client` documentation.
#[must_use = "RequestBuilder does nothing until you 'send' it"]
pub struct RequestBuilder {
  client: Client,
  builder: http::request::Builder,
  body: Body,
}

impl RequestBuilder {
  /// Constructs a new request.
  pub fn new(client: Client, builder: http::request::Builder) -> RequestBuilder {
    RequestBuilder {
      client,
      builder,
      body: Default::default(),
    }
  }
  /// Add a `Header` to this Request.
  pub fn header<K, V>(mut self, key: K, value: V) -> RequestBuilder
  where
    HeaderName: TryFrom<K>,
    HeaderValue: TryFrom<V>,
    <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
    <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
  {
    self.builder = self.builder.header(key, value);
    self
  }
  /// Add a set of Headers to the existing ones on this Request.
  ///
  /// Repeated names are appended, not replaced.
  pub fn headers(mut self, headers: HeaderMap) -> RequestBuilder {
    if let Some(header) = self.builder.headers_mut() {
      for (key, value) in headers.iter() {
        header.append(key, value.clone());
      }
    }
    self
  }
  /// Set the request body.
  pub fn body<T: Into<Body>>(mut self, body: T) -> RequestBuilder {
    self.body = body.into();
    self
  }
  /// Build a `Request`, which can be inspected, modified and executed with
  /// `Client::execute()`.
  pub fn build(self) -> Result<Request> {
    let mut r: Request = self.builder.body(self.body).map_err(Error::from)?.into();
    self.client.apply_default_headers(&mut r);
    Ok(r)
  }
  /// Constructs the Request and sends it through the client's transport.
  ///
  /// # Errors
  ///
  /// Fails when the request cannot be built, when a simulated application
  /// rejects it, or when the real network call fails.
  pub async fn send(self) -> Result<Response> {
    let client = self.client.clone();
    let req = self.build()?;
    client.execute(req).await
  }
  /// Like `send`, but yields the response to `continuation` before
  /// returning it.
  pub async fn send_with<F>(self, continuation: F) -> Result<Response>
  where
    F: FnOnce(&Response) + Send,
  {
    let client = self.client.clone();
    let req = self.build()?;
    client.execute_with(req, continuation).await
  }
}
