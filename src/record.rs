use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::{Request, Response};

/// Marks a response produced by a simulated application.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Simulated {
  /// name of the application that answered
  pub application: String,
}

/// How an intercepted call was served.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Route {
  /// answered in-process by the named application
  Simulated(Simulated),
  /// forwarded to the real transport
  Passthrough,
}

impl Route {
  /// Whether a simulated application answered.
  pub fn is_simulated(&self) -> bool {
    matches!(self, Route::Simulated(_))
  }
}

/// One intercepted call: the request as issued and the response returned.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transaction {
  /// position in the log, starting at 0
  pub index: usize,
  /// the run the call was intercepted in, starting at 1; 0 outside of a run
  pub run: u64,
  /// request
  pub request: Request,
  #[cfg_attr(feature = "serde", serde(skip))]
  /// raw_request
  pub raw_request: Bytes,
  /// response
  pub response: Response,
  #[cfg_attr(feature = "serde", serde(skip))]
  /// raw_response
  pub raw_response: Bytes,
  /// route
  pub route: Route,
}

impl Transaction {
  fn new(index: usize, run: u64, request: Request, response: Response, route: Route) -> Transaction {
    Transaction {
      index,
      run,
      raw_request: request.to_raw(),
      request,
      raw_response: response.to_raw(),
      response,
      route,
    }
  }
  /// A curl command replaying the request of this transaction.
  pub fn curl(&self) -> String {
    self.request.get_command()
  }
}

/// Append-only, ordered log of transactions.
///
/// Clones share the same log. Appends are serialized by a lock and the
/// ordinal is assigned under that lock, so `index` follows completion order.
#[derive(Debug, Clone, Default)]
pub struct TransactionLog {
  inner: Arc<Mutex<Vec<Transaction>>>,
}

impl TransactionLog {
  /// An empty log.
  pub fn new() -> TransactionLog {
    TransactionLog::default()
  }
  fn lock(&self) -> MutexGuard<'_, Vec<Transaction>> {
    // a panicking scenario must not hide what was already logged
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
  /// Record one call, returning its ordinal.
  pub(crate) fn push(&self, run: u64, request: Request, response: Response, route: Route) -> usize {
    let mut log = self.lock();
    let index = log.len();
    log.push(Transaction::new(index, run, request, response, route));
    index
  }
  /// Copy of every transaction logged so far.
  pub fn snapshot(&self) -> Vec<Transaction> {
    self.lock().clone()
  }
  /// Copy of the transactions from ordinal `start` on.
  pub fn since(&self, start: usize) -> Vec<Transaction> {
    self.lock().iter().skip(start).cloned().collect()
  }
  /// Number of transactions logged.
  pub fn len(&self) -> usize {
    self.lock().len()
  }
  /// Whether nothing has been logged.
  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }
}

/// curl command
#[derive(Clone, Debug)]
pub struct CommandRecord {
  /// curl command
  pub command: String,
}

impl From<&Request> for CommandRecord {
  fn from(value: &Request) -> Self {
    let uri = value.uri();
    let https = uri.scheme() == Some(&http::uri::Scheme::HTTPS);
    let mut curl_cmd = vec!["curl", "-X", value.method().as_str()];
    if https {
      curl_cmd.push("-k");
    }
    let mut command = curl_cmd.join(" ");
    command.push_str(" \\\n");
    for (k, v) in value.headers() {
      command.push_str(" -H ");
      let header = format!("{}: {}", k.as_str(), String::from_utf8_lossy(v.as_bytes()));
      command.push_str(&bash_escape(&header));
      command.push_str(" \\\n");
    }
    if let Some(body) = value.body() {
      command.push_str(" --data-binary ");
      command.push_str(&format!("$'{}' \\\n", body.escape_ascii()));
    }
    command.push(' ');
    command.push_str(&bash_escape(&uri.to_string()));
    CommandRecord { command }
  }
}

fn bash_escape(s: &str) -> String {
  format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Body;

  fn request(path: &'static str) -> Request {
    Request::builder()
      .uri(path)
      .body(Body::empty())
      .unwrap()
      .into()
  }

  fn response(status: u16) -> Response {
    Response::builder().status(status).body("ok").unwrap().into()
  }

  #[test]
  fn ordinals_follow_append_order() {
    let log = TransactionLog::new();
    assert!(log.is_empty());
    assert_eq!(log.push(1, request("http://a.local/1"), response(200), Route::Passthrough), 0);
    let route = Route::Simulated(Simulated {
      application: "b".to_string(),
    });
    assert_eq!(log.push(1, request("http://b.local/2"), response(201), route), 1);
    let all = log.snapshot();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].request.path(), "/2");
    assert!(all[1].route.is_simulated());
    assert_eq!(log.since(1).len(), 1);
    assert!(all[0].raw_response.starts_with(b"HTTP/1.1 200 OK\r\n"));
  }

  #[test]
  fn clones_share_the_log() {
    let log = TransactionLog::new();
    let other = log.clone();
    other.push(0, request("http://a.local/"), response(204), Route::Passthrough);
    assert_eq!(log.len(), 1);
  }

  #[test]
  fn curl_command_quotes_headers() {
    let req: Request = Request::builder()
      .method("POST")
      .uri("https://test.local/widgets")
      .header("X-Note", "it's")
      .body(Body::from("{}"))
      .unwrap()
      .into();
    let command = CommandRecord::from(&req).command;
    assert!(command.starts_with("curl -X POST -k"));
    assert!(command.contains(r#"-H 'x-note: it'\''s'"#));
    assert!(command.contains("--data-binary $'{}'"));
    assert!(command.ends_with("'https://test.local/widgets'"));
  }

  #[test]
  fn curl_command_continues_lines_for_the_shell() {
    let req: Request = Request::builder()
      .method("PUT")
      .uri("http://test.local/widgets/1")
      .header("Accept", "application/json")
      .header("X-Trace", "t")
      .body(Body::from("v"))
      .unwrap()
      .into();
    let command = CommandRecord::from(&req).command;
    assert!(!command.contains('\r'));
    let lines: Vec<&str> = command.split('\n').collect();
    assert_eq!(lines.len(), 5);
    let (last, continued) = lines.split_last().unwrap();
    assert!(continued.iter().all(|line| line.ends_with(" \\")));
    assert_eq!(*last, " 'http://test.local/widgets/1'");
  }
}
