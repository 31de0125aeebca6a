//! Transports carry a `Request` somewhere and bring back a `Response`.
//!
//! [`HttpTransport`] talks HTTP/1.1 to the real network. The runner's
//! intercepting transport decorates one of these: requests for simulated
//! hosts never reach it, everything else is forwarded to it unchanged.
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderValue;
use tokio::io::BufReader;

use crate::connector::{Connector, ConnectorBuilder};
use crate::errors::{new_io_error, Result};
use crate::response::{ResponseBuilder, ResponseConfig};
use crate::{Request, Response};

/// Sends a request and returns the response.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
  /// Send `request` and wait for the whole response.
  async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
  async fn send(&self, request: Request) -> Result<Response> {
    (**self).send(request).await
  }
}

/// Plain HTTP/1.1 over a fresh TCP connection per request.
///
/// `https` destinations are refused: this transport does not speak TLS.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
  connector: Connector,
}

impl HttpTransport {
  /// A transport with the default connector settings.
  pub fn new() -> HttpTransport {
    HttpTransport::default()
  }
  /// A transport using the given connector configuration.
  pub fn with_connector(builder: &ConnectorBuilder) -> Result<HttpTransport> {
    Ok(HttpTransport {
      connector: builder.build()?,
    })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, mut request: Request) -> Result<Response> {
    if request.uri().scheme() == Some(&http::uri::Scheme::HTTPS) {
      return Err(new_io_error(
        std::io::ErrorKind::Unsupported,
        "https is not supported by HttpTransport",
      ));
    }
    let destination = request.destination()?;
    // one request per connection, the server closes after responding
    request
      .headers_mut()
      .insert(http::header::CONNECTION, HeaderValue::from_static("close"));
    tracing::debug!(%destination, method = %request.method(), path = request.path(), "sending real request");
    let mut stream = self.connector.connect(&destination).await?;
    self.connector.write_all(&mut stream, &request.to_raw()).await?;
    let config = ResponseConfig::new(request.method(), self.connector.read_timeout());
    let mut response = ResponseBuilder::new(BufReader::new(stream), config)
      .build()
      .await?;
    *response.uri_mut() = request.uri().clone();
    Ok(response)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Body;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};

  #[tokio::test]
  async fn round_trip_against_local_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
      let (mut s, _) = listener.accept().await.unwrap();
      let mut seen = Vec::new();
      let mut buf = [0u8; 1024];
      while !seen.ends_with(b"\r\n\r\n") {
        let n = s.read(&mut buf).await.unwrap();
        if n == 0 {
          break;
        }
        seen.extend_from_slice(&buf[..n]);
      }
      s.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
        .await
        .unwrap();
      String::from_utf8(seen).unwrap()
    });
    let request: Request = Request::builder()
      .uri(format!("http://{addr}/greeting"))
      .body(Body::empty())
      .unwrap()
      .into();
    let response = HttpTransport::new().send(request).await.unwrap();
    assert_eq!(response.text().unwrap(), "hello");
    assert_eq!(response.uri().path(), "/greeting");
    let seen = server.await.unwrap();
    assert!(seen.starts_with("GET /greeting HTTP/1.1\r\n"));
    assert!(seen.contains("connection: close\r\n"));
  }

  #[tokio::test]
  async fn https_is_refused() {
    let request: Request = Request::builder()
      .uri("https://example.com/")
      .body(Body::empty())
      .unwrap()
      .into();
    let err = HttpTransport::new().send(request).await.unwrap_err();
    match err {
      crate::Error::IO(e) => assert_eq!(e.kind(), std::io::ErrorKind::Unsupported),
      other => panic!("unexpected {other:?}"),
    }
  }
}
