use crate::connector::ConnectorBuilder;
use crate::errors::Result;
use crate::transport::{HttpTransport, Transport};
use crate::{Request, RequestBuilder, Response};
use http::{HeaderMap, HeaderValue, Method};
use std::sync::Arc;

/// A `Client` to make Requests with.
///
/// Every request goes through the client's `Transport`. Code under test
/// should receive its `Client` from the outside, so a test can hand it the
/// one from [`Runner::run`](crate::Runner::run) and have its traffic
/// intercepted.
///
/// # Examples
///
/// ```rust
/// use request_interceptor::{Application, HandlerResponse, Runner};
/// # async fn run() -> Result<(), request_interceptor::Error> {
/// let runner = Runner::new(vec![Application::new("test.local", |_env| {
///   Ok(HandlerResponse::ok("hi"))
/// })]);
/// let transactions = runner
///   .run(|client| async move {
///     let resp = client.get("http://test.local/").send().await?;
///     assert_eq!(resp.text()?, "hi");
///     Ok(())
///   })
///   .await?;
/// assert_eq!(transactions.len(), 1);
/// #   Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
  inner: Arc<ClientRef>,
}

impl Default for Client {
  fn default() -> Self {
    Self::new()
  }
}

impl Client {
  /// Constructs a new `Client` talking to the real network.
  pub fn new() -> Client {
    Client::with_transport(Arc::new(HttpTransport::new()))
  }
  /// Constructs a `Client` sending through `transport`.
  pub fn with_transport(transport: Arc<dyn Transport>) -> Client {
    Client {
      inner: Arc::new(ClientRef {
        transport,
        headers: HeaderMap::new(),
      }),
    }
  }
  /// Creates a `ClientBuilder` to configure a `Client`.
  ///
  /// This is the same as `ClientBuilder::new()`.
  pub fn builder() -> ClientBuilder {
    ClientBuilder::new()
  }
  /// The transport requests go through.
  pub fn transport(&self) -> &Arc<dyn Transport> {
    &self.inner.transport
  }
  /// Convenience method to make a `GET` request to a URL.
  pub fn get<U>(&self, url: U) -> RequestBuilder
  where
    http::Uri: TryFrom<U>,
    <http::Uri as TryFrom<U>>::Error: Into<http::Error>,
  {
    self.request(Method::GET, url)
  }
  /// Convenience method to make a `POST` request to a URL.
  pub fn post<U>(&self, url: U) -> RequestBuilder
  where
    http::Uri: TryFrom<U>,
    <http::Uri as TryFrom<U>>::Error: Into<http::Error>,
  {
    self.request(Method::POST, url)
  }
  /// Convenience method to make a `PUT` request to a URL.
  pub fn put<U>(&self, url: U) -> RequestBuilder
  where
    http::Uri: TryFrom<U>,
    <http::Uri as TryFrom<U>>::Error: Into<http::Error>,
  {
    self.request(Method::PUT, url)
  }
  /// Convenience method to make a `PATCH` request to a URL.
  pub fn patch<U>(&self, url: U) -> RequestBuilder
  where
    http::Uri: TryFrom<U>,
    <http::Uri as TryFrom<U>>::Error: Into<http::Error>,
  {
    self.request(Method::PATCH, url)
  }
  /// Convenience method to make a `DELETE` request to a URL.
  pub fn delete<U>(&self, url: U) -> RequestBuilder
  where
    http::Uri: TryFrom<U>,
    <http::Uri as TryFrom<U>>::Error: Into<http::Error>,
  {
    self.request(Method::DELETE, url)
  }
  /// Convenience method to make a `HEAD` request to a URL.
  pub fn head<U>(&self, url: U) -> RequestBuilder
  where
    http::Uri: TryFrom<U>,
    <http::Uri as TryFrom<U>>::Error: Into<http::Error>,
  {
    self.request(Method::HEAD, url)
  }
  /// Start building a `Request` with the `Method` and `Uri`.
  ///
  /// Returns a `RequestBuilder`, which will allow setting headers and
  /// request body before sending. An unparsable `Uri` surfaces when the
  /// request is built or sent.
  pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
  where
    http::Uri: TryFrom<U>,
    <http::Uri as TryFrom<U>>::Error: Into<http::Error>,
  {
    RequestBuilder::new(
      self.clone(),
      http::request::Builder::new().method(method).uri(url),
    )
  }
  /// Executes a `Request`.
  ///
  /// # Errors
  ///
  /// This method fails if the transport fails: a simulated application
  /// error, an unsupported simulated verb, or a real network error.
  pub async fn execute<R: Into<Request>>(&self, request: R) -> Result<Response> {
    self.inner.transport.send(request.into()).await
  }
  /// Executes a `Request`, yielding the response to `continuation` before
  /// returning it.
  pub async fn execute_with<R, F>(&self, request: R, continuation: F) -> Result<Response>
  where
    R: Into<Request>,
    F: FnOnce(&Response) + Send,
  {
    let response = self.execute(request).await?;
    continuation(&response);
    Ok(response)
  }
  pub(crate) fn apply_default_headers(&self, request: &mut Request) {
    for (key, value) in self.inner.headers.iter() {
      if !request.headers().contains_key(key) {
        request.headers_mut().insert(key, value.clone());
      }
    }
  }
}

/// A `ClientBuilder` can be used to create a `Client` with custom configuration.
///
/// # Example
///
/// ```
/// # fn run() -> Result<(), request_interceptor::Error> {
/// use std::time::Duration;
/// use request_interceptor::ConnectorBuilder;
///
/// let client = request_interceptor::Client::builder()
///   .connector(ConnectorBuilder::default().connect_timeout(Some(Duration::from_secs(2))))
///   .build()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
#[derive(Debug, Default)]
pub struct ClientBuilder {
  config: Config,
}

impl ClientBuilder {
  /// Constructs a new `ClientBuilder`.
  ///
  /// This is the same as `Client::builder()`.
  pub fn new() -> ClientBuilder {
    ClientBuilder {
      config: Config::default(),
    }
  }
  /// Returns a `Client` that uses this `ClientBuilder` configuration.
  ///
  /// # Errors
  ///
  /// This method fails if the connector configuration cannot be built.
  pub fn build(self) -> Result<Client> {
    let config = self.config;
    let transport = match config.transport {
      Some(transport) => transport,
      None => Arc::new(HttpTransport::with_connector(&config.connector)?),
    };
    Ok(Client {
      inner: Arc::new(ClientRef {
        transport,
        headers: config.headers,
      }),
    })
  }
  /// Sets the `User-Agent` header to be used by this client.
  pub fn user_agent<V>(mut self, value: V) -> ClientBuilder
  where
    V: Into<HeaderValue>,
  {
    self
      .config
      .headers
      .insert(http::header::USER_AGENT, value.into());
    self
  }
  /// Sets the default headers for every request.
  ///
  /// Headers set on a request win over these.
  pub fn default_headers(mut self, headers: HeaderMap) -> ClientBuilder {
    for (key, value) in headers.iter() {
      self.config.headers.insert(key, value.clone());
    }
    self
  }
  /// Send through `transport` instead of the real network.
  pub fn transport(mut self, transport: Arc<dyn Transport>) -> ClientBuilder {
    self.config.transport = Some(transport);
    self
  }
  /// Configure the connections of the real network transport.
  ///
  /// Ignored when a custom `transport` is set.
  pub fn connector(mut self, connector: ConnectorBuilder) -> ClientBuilder {
    self.config.connector = connector;
    self
  }
}

#[derive(Debug, Default)]
struct Config {
  headers: HeaderMap,
  transport: Option<Arc<dyn Transport>>,
  connector: ConnectorBuilder,
}

#[derive(Debug)]
struct ClientRef {
  transport: Arc<dyn Transport>,
  headers: HeaderMap,
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use std::sync::Mutex;

  #[derive(Debug, Default)]
  struct Echo {
    seen: Mutex<Vec<Request>>,
  }

  #[async_trait]
  impl Transport for Echo {
    async fn send(&self, request: Request) -> Result<Response> {
      let path = request.path().to_string();
      self.seen.lock().unwrap().push(request);
      Ok(Response::builder().status(200).body(path).unwrap().into())
    }
  }

  #[tokio::test]
  async fn default_headers_do_not_override_request_headers() {
    let echo = Arc::new(Echo::default());
    let client = Client::builder()
      .transport(echo.clone())
      .user_agent(HeaderValue::from_static("interceptor-test"))
      .default_headers(HeaderMap::from_iter([(
        http::header::ACCEPT,
        HeaderValue::from_static("*/*"),
      )]))
      .build()
      .unwrap();
    client
      .get("http://test.local/a")
      .header("Accept", "application/json")
      .send()
      .await
      .unwrap();
    let seen = echo.seen.lock().unwrap();
    assert_eq!(seen[0].headers()["accept"], "application/json");
    assert_eq!(seen[0].headers()["user-agent"], "interceptor-test");
  }

  #[tokio::test]
  async fn continuation_sees_the_response() {
    let client = Client::with_transport(Arc::new(Echo::default()));
    let mut yielded = None;
    let response = client
      .post("http://test.local/widgets")
      .body("{}")
      .send_with(|resp| yielded = Some(resp.text().unwrap()))
      .await
      .unwrap();
    assert_eq!(yielded.as_deref(), Some("/widgets"));
    assert_eq!(response.text().unwrap(), "/widgets");
  }

  #[tokio::test]
  async fn bad_uri_fails_on_send() {
    let client = Client::with_transport(Arc::new(Echo::default()));
    let err = client.get("http://exa mple.com/").send().await.unwrap_err();
    assert!(matches!(err, crate::Error::Http(_)));
  }
}
