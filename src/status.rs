//! Status code lookup.
//!
//! Maps the numeric status a simulated application answers with onto the
//! registered `http::StatusCode`, its canonical reason phrase, and whether a
//! response of that status may carry a body.
use http::StatusCode;

use crate::errors::{Error, Result};

/// A registered HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
  code: StatusCode,
  reason: &'static str,
}

impl Status {
  /// Look up a numeric status code.
  ///
  /// Codes without a canonical reason phrase are rejected with
  /// `Error::UnknownStatus` instead of being coerced to some default.
  ///
  /// ```
  /// # use request_interceptor::Status;
  /// let status = Status::from_code(201).unwrap();
  /// assert_eq!(status.reason(), "Created");
  /// assert!(Status::from_code(299).is_err());
  /// ```
  pub fn from_code(code: u16) -> Result<Status> {
    let status = StatusCode::from_u16(code).map_err(|_| Error::UnknownStatus(code))?;
    let reason = status
      .canonical_reason()
      .ok_or(Error::UnknownStatus(code))?;
    Ok(Status {
      code: status,
      reason,
    })
  }
  /// The status code.
  pub fn code(&self) -> StatusCode {
    self.code
  }
  /// The canonical reason phrase.
  pub fn reason(&self) -> &'static str {
    self.reason
  }
  /// Whether a response with this status carries a body.
  pub fn permits_body(&self) -> bool {
    Status::permits_body_for(self.code)
  }
  /// Informational responses, 204, 205 and 304 are bodyless.
  pub(crate) fn permits_body_for(code: StatusCode) -> bool {
    !(code.is_informational()
      || code == StatusCode::NO_CONTENT
      || code == StatusCode::RESET_CONTENT
      || code == StatusCode::NOT_MODIFIED)
  }
}
