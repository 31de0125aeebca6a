//! interceptor error
use std::io::ErrorKind;
use std::num::ParseIntError;
use thiserror::Error as ThisError;

/// A `Result` alias where the `Err` case is `request_interceptor::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type a simulated application's handler returns.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// The Errors that may occur while intercepting a request.
#[derive(ThisError, Debug)]
pub enum Error {
  /// A matched application was asked to simulate a verb other than
  /// GET, POST, PUT or DELETE.
  #[error("simulating {0} is not supported")]
  UnsupportedMethod(http::Method),
  /// `Runner::run` was called while the runner was already active.
  #[error("request interception is already running")]
  AlreadyRunning,
  /// The simulated application's handler failed.
  #[error("{0}")]
  Handler(HandlerError),
  /// A handler answered with a status code that has no canonical reason phrase.
  #[error("unknown status code {0}")]
  UnknownStatus(u16),
  /// A body was given both on the request and as a separate argument.
  #[error("both of body argument and request body set")]
  BodyAlreadyAttached,
  /// A request uri without a host cannot be routed.
  #[error("request uri `{0}` has no host")]
  MissingHost(http::Uri),
  /// A regex host pattern failed to compile.
  #[error(transparent)]
  InvalidPattern(#[from] regex::Error),
  /// Error
  #[error(transparent)]
  IO(#[from] std::io::Error),
  /// http::Error
  #[error(transparent)]
  Http(http::Error),
  /// ParseIntError
  #[error(transparent)]
  IntError(#[from] ParseIntError),
  /// A failure raised by a scenario itself, for tests that end a run
  /// with their own error.
  #[error("{0}")]
  Other(String),
}

impl Error {
  /// Wrap a handler failure, leaving the original error reachable unchanged.
  pub fn handler<E: Into<HandlerError>>(e: E) -> Error {
    Error::Handler(e.into())
  }
  /// Returns the handler's own error if this is a handler failure.
  pub fn as_handler_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
    match self {
      Error::Handler(e) => Some(e.as_ref()),
      _ => None,
    }
  }
}

impl From<http::Error> for Error {
  fn from(value: http::Error) -> Self {
    Error::Http(value)
  }
}

impl From<http::header::InvalidHeaderName> for Error {
  fn from(value: http::header::InvalidHeaderName) -> Self {
    Error::Http(http::Error::from(value))
  }
}

impl From<http::header::InvalidHeaderValue> for Error {
  fn from(value: http::header::InvalidHeaderValue) -> Self {
    Error::Http(http::Error::from(value))
  }
}

pub(crate) fn new_io_error(error_kind: ErrorKind, msg: &str) -> Error {
  Error::IO(std::io::Error::new(error_kind, msg))
}
