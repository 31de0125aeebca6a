use std::time::Duration;

use bytes::Bytes;
use http::{Method, Response as HttpResponse};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::body::Body;
use crate::errors::{new_io_error, Error, Result};
use crate::record::Simulated;
use crate::status::Status;
use crate::{COLON_SPACE, CR_LF, SPACE};

/// A Response to a submitted `Request`, simulated or real.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Response {
  #[cfg_attr(feature = "serde", serde(with = "http_serde::version"))]
  version: http::Version,
  #[cfg_attr(feature = "serde", serde(with = "http_serde::uri"))]
  uri: http::Uri,
  #[cfg_attr(feature = "serde", serde(with = "http_serde::status_code"))]
  status_code: http::StatusCode,
  #[cfg_attr(feature = "serde", serde(with = "http_serde::header_map"))]
  headers: http::HeaderMap<http::HeaderValue>,
  #[cfg_attr(feature = "serde", serde(skip))]
  extensions: http::Extensions,
  body: Option<Body>,
}

impl PartialEq for Response {
  fn eq(&self, other: &Self) -> bool {
    self.version == other.version
      && self.status_code == other.status_code
      && self.headers == other.headers
      && self.body == other.body
  }
}

impl<T> From<HttpResponse<T>> for Response
where
  T: Into<Body>,
{
  fn from(value: HttpResponse<T>) -> Self {
    let (parts, body) = value.into_parts();
    let body = body.into();
    Self {
      version: parts.version,
      uri: Default::default(),
      status_code: parts.status,
      headers: parts.headers,
      extensions: parts.extensions,
      body: if body.is_empty() { None } else { Some(body) },
    }
  }
}

impl Response {
  pub(crate) fn to_raw(&self) -> Bytes {
    let mut http_response = Vec::new();
    http_response.extend(format!("{:?}", self.version).as_bytes());
    http_response.extend(SPACE);
    http_response.extend(self.status_code.as_str().as_bytes());
    if let Some(reason) = self.reason() {
      http_response.extend(SPACE);
      http_response.extend(reason.as_bytes());
    }
    http_response.extend(CR_LF);
    for (k, v) in self.headers.iter() {
      http_response.extend(k.as_str().as_bytes());
      http_response.extend(COLON_SPACE);
      http_response.extend(v.as_bytes());
      http_response.extend(CR_LF);
    }
    http_response.extend(CR_LF);
    if let Some(b) = self.body() {
      http_response.extend(b.as_ref());
    }
    Bytes::from(http_response)
  }
  /// An HTTP response builder
  ///
  /// This type can be used to construct an instance of `Response` through a
  /// builder-like pattern.
  pub fn builder() -> http::response::Builder {
    http::response::Builder::new()
  }
}

impl Response {
  /// Get the response text, decoded as UTF-8 with malformed sequences replaced.
  pub fn text(&self) -> Result<String> {
    Ok(
      self
        .body
        .as_ref()
        .map(|b| String::from_utf8_lossy(b).to_string())
        .unwrap_or_default(),
    )
  }
  /// Get the `StatusCode` of this `Response`.
  #[inline]
  pub fn status_code(&self) -> http::StatusCode {
    self.status_code
  }
  /// The canonical reason phrase of the status, if the code is registered.
  pub fn reason(&self) -> Option<&'static str> {
    self.status_code.canonical_reason()
  }
  /// Get the HTTP `Version` of this `Response`.
  #[inline]
  pub fn version(&self) -> http::Version {
    self.version
  }
  /// Get the `Headers` of this `Response`.
  #[inline]
  pub fn headers(&self) -> &http::HeaderMap {
    &self.headers
  }
  /// Get a mutable reference to the `Headers` of this `Response`.
  #[inline]
  pub fn headers_mut(&mut self) -> &mut http::HeaderMap {
    &mut self.headers
  }
  /// Get the content-length of the response, if it is known.
  pub fn content_length(&self) -> Option<u64> {
    self
      .headers
      .get(http::header::CONTENT_LENGTH)
      .and_then(|x| x.to_str().ok()?.parse().ok())
  }
  /// Get the `http::Uri` this `Response` answered.
  #[inline]
  pub fn uri(&self) -> &http::Uri {
    &self.uri
  }
  #[inline]
  pub(crate) fn uri_mut(&mut self) -> &mut http::Uri {
    &mut self.uri
  }
  /// Get the full response body.
  pub fn body(&self) -> &Option<Body> {
    &self.body
  }
  /// Returns a reference to the associated extensions.
  pub fn extensions(&self) -> &http::Extensions {
    &self.extensions
  }
  /// Returns a mutable reference to the associated extensions.
  pub fn extensions_mut(&mut self) -> &mut http::Extensions {
    &mut self.extensions
  }
  /// The simulated application that produced this response, if any.
  pub fn simulated(&self) -> Option<&Simulated> {
    self.extensions.get::<Simulated>()
  }
}

/// A builder to parse a `Response` off a real connection.
#[derive(Debug)]
pub struct ResponseBuilder<T: AsyncRead> {
  builder: http::response::Builder,
  reader: BufReader<T>,
  config: ResponseConfig,
}

/// response config
#[derive(Debug, Default, Clone)]
pub struct ResponseConfig {
  method: Method,
  timeout: Option<Duration>,
}

impl ResponseConfig {
  /// Config for reading the response to a request sent with `method`.
  pub fn new(method: &Method, timeout: Option<Duration>) -> Self {
    ResponseConfig {
      method: method.clone(),
      timeout,
    }
  }
}

impl<T: AsyncRead + Unpin + Send> ResponseBuilder<T> {
  /// Constructs a new response parser.
  pub fn new(reader: BufReader<T>, config: ResponseConfig) -> ResponseBuilder<T> {
    ResponseBuilder {
      builder: Default::default(),
      reader,
      config,
    }
  }
  async fn read_line(&mut self, line: &mut Vec<u8>) -> Result<usize> {
    let read = self.reader.read_until(b'\n', line);
    let n = match self.config.timeout {
      None => read.await?,
      Some(t) => tokio::time::timeout(t, read)
        .await
        .map_err(|_| new_io_error(std::io::ErrorKind::TimedOut, "read response timed out"))??,
    };
    Ok(n)
  }
  async fn parser_version(&mut self) -> Result<(http::Version, http::StatusCode)> {
    let mut line = Vec::new();
    if self.read_line(&mut line).await? == 0 {
      return Err(new_io_error(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed before response",
      ));
    }
    let line = line.strip_suffix(CR_LF).unwrap_or(&line);
    let mut parts = line.splitn(3, |b| b == &b' ');
    let version = match parts.next() {
      Some(b"HTTP/1.0") => http::Version::HTTP_10,
      Some(b"HTTP/1.1") => http::Version::HTTP_11,
      _ => {
        return Err(new_io_error(
          std::io::ErrorKind::InvalidData,
          "invalid http version",
        ));
      }
    };
    let status = parts
      .next()
      .ok_or_else(|| new_io_error(std::io::ErrorKind::InvalidData, "missing status code"))?;
    let status = http::StatusCode::from_bytes(status).map_err(|x| Error::Http(http::Error::from(x)))?;
    Ok((version, status))
  }
  async fn read_headers(&mut self) -> Result<http::HeaderMap> {
    let mut headers = http::HeaderMap::new();
    let mut header_line = Vec::new();
    loop {
      header_line.clear();
      let length = self.read_line(&mut header_line).await?;
      if length == 0 || header_line == CR_LF || header_line == b"\n" {
        break;
      }
      let (k, v) = parser_headers(&header_line)?;
      headers.append(k, v);
    }
    Ok(headers)
  }
  async fn read_body(&mut self, status: http::StatusCode, header: &http::HeaderMap) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    if self.config.method == Method::HEAD || !Status::permits_body_for(status) {
      return Ok(body);
    }
    let chunked = header
      .get(http::header::TRANSFER_ENCODING)
      .and_then(|te| te.to_str().ok())
      .is_some_and(|te| te.eq_ignore_ascii_case("chunked"));
    if chunked {
      return self.read_chunked_body().await;
    }
    let content_length = match header.get(http::header::CONTENT_LENGTH) {
      Some(length) => Some(
        length
          .to_str()
          .map_err(|_| new_io_error(std::io::ErrorKind::InvalidData, "invalid content-length"))?
          .trim()
          .parse::<usize>()?,
      ),
      None => None,
    };
    let timeout = self.config.timeout;
    let read = async {
      match content_length {
        Some(length) => match (&mut self.reader)
          .take(length as u64)
          .read_to_end(&mut body)
          .await
        {
          Ok(read) if read == length => Ok(()),
          Ok(_) => Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "body shorter than content-length",
          )),
          Err(err) => Err(err),
        },
        None => self.reader.read_to_end(&mut body).await.map(|_| ()),
      }
    };
    match timeout {
      None => read.await?,
      Some(t) => tokio::time::timeout(t, read)
        .await
        .map_err(|_| new_io_error(std::io::ErrorKind::TimedOut, "read body timed out"))??,
    }
    Ok(body)
  }

  async fn read_chunked_body(&mut self) -> Result<Vec<u8>> {
    let mut body: Vec<u8> = Vec::new();
    let mut line = Vec::new();
    loop {
      line.clear();
      if self.read_line(&mut line).await? == 0 {
        return Err(new_io_error(
          std::io::ErrorKind::UnexpectedEof,
          "truncated chunked body",
        ));
      }
      let size = String::from_utf8_lossy(&line);
      // chunk extensions follow a `;`
      let size = size.split(';').next().unwrap_or_default().trim();
      if size.is_empty() {
        continue;
      }
      let size = usize::from_str_radix(size, 16)?;
      if size == 0 {
        // trailers, up to the closing empty line
        loop {
          line.clear();
          if self.read_line(&mut line).await? == 0 || line == CR_LF || line == b"\n" {
            break;
          }
        }
        break;
      }
      let start = body.len();
      if start.checked_add(size).is_none() {
        return Err(new_io_error(
          std::io::ErrorKind::InvalidData,
          "chunked body size overflow",
        ));
      }
      let read = (&mut self.reader).take(size as u64).read_to_end(&mut body).await?;
      if read != size {
        return Err(new_io_error(
          std::io::ErrorKind::UnexpectedEof,
          "truncated chunk",
        ));
      }
    }
    Ok(body)
  }

  /// Parse the status line, headers and body into a `Response`.
  pub async fn build(mut self) -> Result<Response> {
    let (v, c) = self.parser_version().await?;
    self.builder = self.builder.version(v).status(c);
    let header = self.read_headers().await?;
    let body = self.read_body(c, &header).await?;
    if let Some(h) = self.builder.headers_mut() {
      *h = header;
    }
    let resp = self.builder.body(body)?;
    Ok(resp.into())
  }
}

pub(crate) fn parser_headers(buffer: &[u8]) -> Result<(http::HeaderName, http::HeaderValue)> {
  let buffer = buffer.strip_suffix(b"\n").unwrap_or(buffer);
  let buffer = buffer.strip_suffix(b"\r").unwrap_or(buffer);
  let mut split = buffer.splitn(2, |s| s == &b':');
  let name = split.next().unwrap_or_default();
  let value = split
    .next()
    .ok_or_else(|| new_io_error(std::io::ErrorKind::InvalidData, "header line without colon"))?;
  let value = value.trim_ascii();
  let name = http::HeaderName::from_bytes(name)?;
  let value = http::HeaderValue::from_bytes(value)?;
  Ok((name, value))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  fn raw_response(status_line: &str, headers: &[(&str, &str)], body: &str) -> Vec<u8> {
    let mut response = format!("{status_line}\r\n");
    for (name, value) in headers {
      response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    response.push_str(body);
    response.into_bytes()
  }

  async fn parse(bytes: Vec<u8>, method: Method) -> Result<Response> {
    let reader = BufReader::new(Cursor::new(bytes));
    ResponseBuilder::new(reader, ResponseConfig::new(&method, None))
      .build()
      .await
  }

  #[tokio::test]
  async fn content_length_body() {
    let bytes = raw_response(
      "HTTP/1.1 200 OK",
      &[("Content-Type", "application/json"), ("Content-Length", "8")],
      r#"{"id":1}"#,
    );
    let response = parse(bytes, Method::GET).await.unwrap();
    assert_eq!(response.status_code(), http::StatusCode::OK);
    assert_eq!(response.content_length(), Some(8));
    assert_eq!(response.text().unwrap(), r#"{"id":1}"#);
  }

  #[tokio::test]
  async fn duplicate_headers_are_kept_in_order() {
    let bytes = raw_response(
      "HTTP/1.1 204 No Content",
      &[("Set-Cookie", "a=1"), ("Set-Cookie", "b=2")],
      "",
    );
    let response = parse(bytes, Method::DELETE).await.unwrap();
    let cookies: Vec<_> = response.headers().get_all("set-cookie").iter().collect();
    assert_eq!(cookies, ["a=1", "b=2"]);
    assert!(response.body().is_none());
  }

  #[tokio::test]
  async fn chunked_body() {
    let bytes = raw_response(
      "HTTP/1.1 200 OK",
      &[("Transfer-Encoding", "chunked")],
      "4\r\nwidg\r\n3;ext=1\r\nets\r\n0\r\n\r\n",
    );
    let response = parse(bytes, Method::GET).await.unwrap();
    assert_eq!(response.text().unwrap(), "widgets");
  }

  fn io_kind(err: Error) -> std::io::ErrorKind {
    match err {
      Error::IO(e) => e.kind(),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[tokio::test]
  async fn oversized_content_length_is_an_error() {
    let bytes = raw_response(
      "HTTP/1.1 200 OK",
      &[("Content-Length", "18446744073709551615")],
      "x",
    );
    let err = parse(bytes, Method::GET).await.unwrap_err();
    assert_eq!(io_kind(err), std::io::ErrorKind::UnexpectedEof);
  }

  #[tokio::test]
  async fn short_body_is_an_error() {
    let bytes = raw_response("HTTP/1.1 200 OK", &[("Content-Length", "10")], "short");
    let err = parse(bytes, Method::GET).await.unwrap_err();
    assert_eq!(io_kind(err), std::io::ErrorKind::UnexpectedEof);
  }

  #[tokio::test]
  async fn overflowing_chunk_size_is_an_error() {
    let bytes = raw_response(
      "HTTP/1.1 200 OK",
      &[("Transfer-Encoding", "chunked")],
      "5\r\nhello\r\nffffffffffffffff\r\nx",
    );
    let err = parse(bytes, Method::GET).await.unwrap_err();
    assert_eq!(io_kind(err), std::io::ErrorKind::InvalidData);
  }

  #[tokio::test]
  async fn huge_first_chunk_is_an_error() {
    let bytes = raw_response(
      "HTTP/1.1 200 OK",
      &[("Transfer-Encoding", "chunked")],
      "ffffffffffffffff\r\nx",
    );
    let err = parse(bytes, Method::GET).await.unwrap_err();
    assert_eq!(io_kind(err), std::io::ErrorKind::UnexpectedEof);
  }

  #[tokio::test]
  async fn body_until_eof_without_length() {
    let bytes = raw_response("HTTP/1.0 200 OK", &[], "until close");
    let response = parse(bytes, Method::GET).await.unwrap();
    assert_eq!(response.version(), http::Version::HTTP_10);
    assert_eq!(response.text().unwrap(), "until close");
  }

  #[tokio::test]
  async fn head_has_no_body() {
    let bytes = raw_response("HTTP/1.1 200 OK", &[("Content-Length", "8")], "");
    let response = parse(bytes, Method::HEAD).await.unwrap();
    assert!(response.body().is_none());
  }

  #[tokio::test]
  async fn garbage_status_line_fails() {
    let err = parse(b"SSH-2.0-OpenSSH\r\n".to_vec(), Method::GET).await.unwrap_err();
    assert!(matches!(err, Error::IO(_)));
  }

  #[test]
  fn raw_response_has_reason_phrase() {
    let response: Response = Response::builder()
      .status(404)
      .header("content-type", "text/plain")
      .body("missing")
      .unwrap()
      .into();
    let raw = String::from_utf8(response.to_raw().to_vec()).unwrap();
    assert_eq!(raw, "HTTP/1.1 404 Not Found\r\ncontent-type: text/plain\r\n\r\nmissing");
  }
}
