//! The simulate path: translate a request into a handler call and turn the
//! handler's raw answer back into a `Response`.
use http::{HeaderName, HeaderValue};

use crate::application::{Application, Environment, HandlerResponse, SimulatedMethod};
use crate::errors::Result;
use crate::record::Simulated;
use crate::request::Destination;
use crate::status::Status;
use crate::{Request, Response};

/// Invoke `app` with `request` in the handler calling convention.
///
/// GET and DELETE hand over headers only. POST and PUT also hand over the
/// request body as input, empty when the request had none. Any other verb
/// is rejected before the handler runs.
pub fn dispatch(
  app: &Application,
  request: &Request,
  destination: &Destination,
) -> Result<HandlerResponse> {
  let method = SimulatedMethod::try_from(request.method())?;
  let input = if method.carries_input() {
    Some(request.body().map(|b| b.bytes()).unwrap_or_default())
  } else {
    None
  };
  let env = Environment::new(
    method,
    request.uri(),
    request.headers().clone(),
    destination.clone(),
    input,
  );
  tracing::debug!(application = app.name(), %method, path = env.path(), "dispatching simulated request");
  app.call(&env)
}

/// Build the response a simulated application answered with.
///
/// The status must be registered. Header fields are appended in the order
/// the handler gave them and the body is kept byte for byte, except that
/// bodyless statuses drop it.
pub fn synthesize(raw: HandlerResponse, uri: &http::Uri, application: &str) -> Result<Response> {
  let status = Status::from_code(raw.status)?;
  let mut builder = Response::builder()
    .version(http::Version::HTTP_11)
    .status(status.code());
  if let Some(headers) = builder.headers_mut() {
    for (k, v) in raw.headers {
      headers.append(HeaderName::try_from(k)?, HeaderValue::try_from(v)?);
    }
  }
  let body = if status.permits_body() {
    raw.body
  } else {
    if !raw.body.is_empty() {
      tracing::warn!(
        application,
        status = status.code().as_u16(),
        dropped = raw.body.len(),
        "dropping body of bodyless simulated response"
      );
    }
    Default::default()
  };
  let mut response: Response = builder.body(body)?.into();
  *response.uri_mut() = uri.clone();
  response.extensions_mut().insert(Simulated {
    application: application.to_string(),
  });
  Ok(response)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::errors::Error;
  use crate::Body;
  use std::sync::{Arc, Mutex};

  fn request(method: http::Method, body: Option<&'static str>) -> Request {
    let mut request: Request = Request::builder()
      .method(method)
      .uri("http://test.local/widgets?page=2")
      .header("Accept", "application/json")
      .body(Body::empty())
      .unwrap()
      .into();
    request.attach_body(body.map(Body::from)).unwrap();
    request
  }

  fn echo_app(seen: Arc<Mutex<Vec<Environment>>>) -> Application {
    Application::new("test.local", move |env| {
      seen.lock().unwrap().push(env.clone());
      Ok(HandlerResponse::ok("done"))
    })
  }

  #[test]
  fn get_and_delete_carry_no_input() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = echo_app(seen.clone());
    let destination = Destination::new("test.local", 80);
    dispatch(&app, &request(http::Method::GET, None), &destination).unwrap();
    dispatch(&app, &request(http::Method::DELETE, Some("ignored")), &destination).unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].method(), SimulatedMethod::Get);
    assert_eq!(seen[0].path(), "/widgets");
    assert_eq!(seen[0].query(), Some("page=2"));
    assert_eq!(seen[0].header("accept"), Some("application/json"));
    assert!(seen[0].input().is_none());
    assert!(seen[1].input().is_none());
  }

  #[test]
  fn post_and_put_carry_the_body() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = echo_app(seen.clone());
    let destination = Destination::new("test.local", 80);
    dispatch(&app, &request(http::Method::POST, Some(r#"{"id":1}"#)), &destination).unwrap();
    dispatch(&app, &request(http::Method::PUT, None), &destination).unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].input_text(), r#"{"id":1}"#);
    assert_eq!(seen[1].input().map(|b| b.len()), Some(0));
  }

  #[test]
  fn other_verbs_never_reach_the_handler() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = echo_app(seen.clone());
    let err = dispatch(
      &app,
      &request(http::Method::PATCH, None),
      &Destination::new("test.local", 80),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedMethod(_)));
    assert!(seen.lock().unwrap().is_empty());
  }

  #[test]
  fn synthesized_headers_keep_multiplicity_and_order() {
    let raw = HandlerResponse::new(201)
      .header("Content-Type", "application/json")
      .header("Set-Cookie", "a=1")
      .header("Set-Cookie", "b=2")
      .header("X-Trace", "t")
      .body(r#"{"id":1}"#);
    let uri = http::Uri::from_static("http://test.local/widgets");
    let response = synthesize(raw, &uri, "widgets").unwrap();
    assert_eq!(response.status_code(), http::StatusCode::CREATED);
    assert_eq!(response.reason(), Some("Created"));
    let fields: Vec<(String, String)> = response
      .headers()
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_str().unwrap().to_string()))
      .collect();
    assert_eq!(
      fields,
      [
        ("content-type", "application/json"),
        ("set-cookie", "a=1"),
        ("set-cookie", "b=2"),
        ("x-trace", "t"),
      ]
      .map(|(k, v)| (k.to_string(), v.to_string()))
    );
    assert_eq!(response.body().as_ref().map(|b| b.bytes()).unwrap(), r#"{"id":1}"#.as_bytes());
    assert_eq!(response.uri(), &uri);
    assert_eq!(response.simulated().unwrap().application, "widgets");
  }

  #[test]
  fn synthesize_rejects_unknown_status() {
    let uri = http::Uri::from_static("http://test.local/");
    let err = synthesize(HandlerResponse::new(799), &uri, "x").unwrap_err();
    assert!(matches!(err, Error::UnknownStatus(799)));
  }

  #[test]
  fn bodyless_status_drops_body() {
    let uri = http::Uri::from_static("http://test.local/");
    let response = synthesize(HandlerResponse::new(204).body("stray"), &uri, "x").unwrap();
    assert!(response.body().is_none());
  }

  #[test]
  fn invalid_header_name_fails() {
    let uri = http::Uri::from_static("http://test.local/");
    let raw = HandlerResponse::ok("x").header("bad header", "v");
    assert!(matches!(synthesize(raw, &uri, "x"), Err(Error::Http(_))));
  }
}
