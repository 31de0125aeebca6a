use crate::application::Application;
use crate::request::Destination;

/// Ordered registry of simulated applications.
///
/// Rules may overlap; the application registered first wins.
#[derive(Debug, Clone, Default)]
pub struct Router {
  applications: Vec<Application>,
}

impl Router {
  /// Create a router over `applications`, keeping their order.
  pub fn new(applications: Vec<Application>) -> Router {
    Router { applications }
  }
  /// Register one more application, behind every existing one.
  pub fn push(&mut self, application: Application) {
    self.applications.push(application);
  }
  /// The first application whose host rule matches `destination`.
  ///
  /// `None` means the request goes to the real network.
  pub fn route(&self, destination: &Destination) -> Option<&Application> {
    let matched = self
      .applications
      .iter()
      .find(|app| app.matches(destination.host()));
    match matched {
      Some(app) => tracing::debug!(%destination, application = app.name(), "route matched"),
      None => tracing::debug!(%destination, "no route, passing through"),
    }
    matched
  }
  /// Registered applications in order.
  pub fn applications(&self) -> &[Application] {
    &self.applications
  }
  /// Number of registered applications.
  pub fn len(&self) -> usize {
    self.applications.len()
  }
  /// Whether no application is registered.
  pub fn is_empty(&self) -> bool {
    self.applications.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::application::{HandlerResponse, HostPattern};

  fn app(pattern: impl Into<HostPattern>, name: &str) -> Application {
    Application::new(pattern, |_env| Ok(HandlerResponse::ok(""))).named(name)
  }

  #[test]
  fn first_match_wins() {
    let router = Router::new(vec![
      app(HostPattern::regex(r"^api\.").unwrap(), "wide"),
      app("api.test.local", "narrow"),
    ]);
    let hit = router.route(&Destination::new("api.test.local", 80)).unwrap();
    assert_eq!(hit.name(), "wide");
  }

  #[test]
  fn exact_match_ignores_case() {
    let router = Router::new(vec![app("Test.Local", "t")]);
    assert!(router.route(&Destination::new("test.local", 80)).is_some());
  }

  #[test]
  fn no_match_is_passthrough() {
    let mut router = Router::default();
    assert!(router.is_empty());
    router.push(app(HostPattern::predicate(|h| h.ends_with(".internal")), "p"));
    assert_eq!(router.len(), 1);
    assert!(router.route(&Destination::new("example.com", 80)).is_none());
    assert!(router.route(&Destination::new("db.internal", 80)).is_some());
  }
}
