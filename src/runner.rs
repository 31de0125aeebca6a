//! The runner: interception lifecycle and per-call orchestration.
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::Application;
use crate::connector::ConnectorBuilder;
use crate::errors::{Error, Result};
use crate::record::{Route, Simulated, Transaction, TransactionLog};
use crate::request::Destination;
use crate::router::Router;
use crate::simulate;
use crate::transport::{HttpTransport, Transport};
use crate::{Body, Client, Request, Response};

/// Callback yielded the response before the call returns it.
pub type Continuation<'a> = Box<dyn FnOnce(&Response) + Send + 'a>;

/// Where a runner is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
  /// not running, requests go straight to the real transport
  Idle,
  /// a scenario is running and requests are intercepted
  Active,
  /// running, with at least one unmatched request out on the real transport
  Forwarding,
}

/// Runs test scenarios with their outbound HTTP intercepted.
///
/// Requests for hosts claimed by a registered [`Application`] are answered
/// in-process. Anything else reaches the real transport untouched. Each
/// intercepted call is recorded as a [`Transaction`].
///
/// ```rust
/// use request_interceptor::{Application, HandlerResponse, Runner};
/// # async fn run() -> Result<(), request_interceptor::Error> {
/// let runner = Runner::new(vec![Application::new("test.local", |env| {
///   assert_eq!(env.path(), "/widgets");
///   Ok(HandlerResponse::ok(r#"{"id":1}"#).header("Content-Type", "application/json"))
/// })]);
/// let transactions = runner
///   .run(|client| async move {
///     client.get("http://test.local/widgets").send().await?;
///     Ok(())
///   })
///   .await?;
/// assert_eq!(transactions[0].response.status_code(), 200);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Runner {
  inner: Arc<RunnerRef>,
}

#[derive(Debug)]
struct RunnerRef {
  router: Router,
  real: Arc<dyn Transport>,
  log: TransactionLog,
  // id of the active run, 0 while idle
  current: AtomicU64,
  runs: AtomicU64,
  forwarding: AtomicUsize,
}

impl Runner {
  /// A runner over `applications` that passes everything else to the
  /// real network.
  pub fn new(applications: Vec<Application>) -> Runner {
    Runner::from_parts(Router::new(applications), Arc::new(HttpTransport::new()))
  }
  /// Creates a `RunnerBuilder` to configure a `Runner`.
  pub fn builder() -> RunnerBuilder {
    RunnerBuilder::new()
  }
  fn from_parts(router: Router, real: Arc<dyn Transport>) -> Runner {
    Runner {
      inner: Arc::new(RunnerRef {
        router,
        real,
        log: TransactionLog::new(),
        current: AtomicU64::new(0),
        runs: AtomicU64::new(0),
        forwarding: AtomicUsize::new(0),
      }),
    }
  }
  /// The registered applications.
  pub fn router(&self) -> &Router {
    &self.inner.router
  }
  /// Current lifecycle state.
  pub fn state(&self) -> RunState {
    if !self.is_active() {
      RunState::Idle
    } else if self.inner.forwarding.load(Ordering::Acquire) > 0 {
      RunState::Forwarding
    } else {
      RunState::Active
    }
  }
  /// Every transaction recorded by this runner, across all runs.
  pub fn transactions(&self) -> Vec<Transaction> {
    self.inner.log.snapshot()
  }
  /// A client routed through this runner.
  ///
  /// While a scenario runs its requests are intercepted. Outside of a run
  /// it behaves like the real transport and records nothing.
  pub fn client(&self) -> Client {
    Client::with_transport(Arc::new(InterceptingTransport {
      runner: self.clone(),
    }))
  }
  /// Run `scenario` with interception active.
  ///
  /// The scenario receives an intercepting [`Client`]. Interception is
  /// switched off again however the scenario ends, including an error,
  /// a panic or the returned future being dropped.
  ///
  /// Returns the transactions of calls intercepted during this run, in
  /// completion order. A call issued in an earlier run that completes
  /// during this one stays with the run it was issued in.
  ///
  /// # Errors
  ///
  /// [`Error::AlreadyRunning`] if a run is in progress, before the
  /// scenario is called. Otherwise whatever the scenario returned.
  pub async fn run<F, Fut>(&self, scenario: F) -> Result<Vec<Transaction>>
  where
    F: FnOnce(Client) -> Fut,
    Fut: Future<Output = Result<()>>,
  {
    let activation = Activation::enter(&self.inner.current, &self.inner.runs)?;
    let run = activation.run;
    let start = self.inner.log.len();
    tracing::info!(run, applications = self.inner.router.len(), "interception activated");
    let outcome = scenario(self.client()).await;
    drop(activation);
    let transactions: Vec<Transaction> = self
      .inner
      .log
      .since(start)
      .into_iter()
      .filter(|t| t.run == run)
      .collect();
    match outcome {
      Ok(()) => {
        tracing::info!(transactions = transactions.len(), "run finished");
        Ok(transactions)
      }
      Err(err) => {
        tracing::info!(transactions = transactions.len(), %err, "run failed");
        Err(err)
      }
    }
  }
  /// Serve one intercepted call.
  ///
  /// `body` is attached to `request` first, failing if the request already
  /// carries one. A matching application answers in-process, otherwise the
  /// request goes to the real transport. The `continuation`, if any, sees
  /// the response before it is recorded and returned.
  ///
  /// The transaction is tagged with the run active when the call came in,
  /// or 0 outside of a run. A call that fails, in the handler or on the
  /// network, records nothing.
  pub async fn handle_request(
    &self,
    destination: &Destination,
    mut request: Request,
    body: Option<Body>,
    continuation: Option<Continuation<'_>>,
  ) -> Result<Response> {
    request.attach_body(body)?;
    let run = self.inner.current.load(Ordering::Acquire);
    let (response, route) = match self.inner.router.route(destination) {
      Some(app) => {
        let raw = simulate::dispatch(app, &request, destination).inspect_err(|err| {
          if let Error::Handler(cause) = err {
            tracing::warn!(application = app.name(), %cause, "simulated application failed");
          }
        })?;
        let response = simulate::synthesize(raw, request.uri(), app.name())?;
        let route = Route::Simulated(Simulated {
          application: app.name().to_string(),
        });
        (response, route)
      }
      None => {
        let _forwarding = Forwarding::enter(&self.inner.forwarding);
        let response = self.inner.real.send(request.clone()).await?;
        (response, Route::Passthrough)
      }
    };
    if let Some(continuation) = continuation {
      continuation(&response);
    }
    let index = self.inner.log.push(run, request, response.clone(), route);
    tracing::debug!(index, run, %destination, status = response.status_code().as_u16(), "transaction recorded");
    Ok(response)
  }
  fn is_active(&self) -> bool {
    self.inner.current.load(Ordering::Acquire) != 0
  }
}

/// Marks the runner active until dropped.
struct Activation<'a> {
  current: &'a AtomicU64,
  run: u64,
}

impl<'a> Activation<'a> {
  fn enter(current: &'a AtomicU64, runs: &AtomicU64) -> Result<Activation<'a>> {
    if current.load(Ordering::Acquire) != 0 {
      return Err(Error::AlreadyRunning);
    }
    let run = runs.fetch_add(1, Ordering::AcqRel) + 1;
    current
      .compare_exchange(0, run, Ordering::AcqRel, Ordering::Acquire)
      .map_err(|_| Error::AlreadyRunning)?;
    Ok(Activation { current, run })
  }
}

impl Drop for Activation<'_> {
  fn drop(&mut self) {
    self.current.store(0, Ordering::Release);
    tracing::debug!(run = self.run, "interception deactivated");
  }
}

/// Counts one passthrough in flight until dropped.
struct Forwarding<'a> {
  count: &'a AtomicUsize,
}

impl<'a> Forwarding<'a> {
  fn enter(count: &'a AtomicUsize) -> Forwarding<'a> {
    count.fetch_add(1, Ordering::AcqRel);
    Forwarding { count }
  }
}

impl Drop for Forwarding<'_> {
  fn drop(&mut self) {
    self.count.fetch_sub(1, Ordering::AcqRel);
  }
}

/// The transport behind [`Runner::client`].
#[derive(Debug)]
struct InterceptingTransport {
  runner: Runner,
}

#[async_trait]
impl Transport for InterceptingTransport {
  async fn send(&self, request: Request) -> Result<Response> {
    if !self.runner.is_active() {
      return self.runner.inner.real.send(request).await;
    }
    let destination = request.destination()?;
    self
      .runner
      .handle_request(&destination, request, None, None)
      .await
  }
}

/// A `RunnerBuilder` can be used to create a `Runner` with custom configuration.
///
/// ```
/// # fn run() -> Result<(), request_interceptor::Error> {
/// use request_interceptor::{Application, HandlerResponse, Runner};
///
/// let runner = Runner::builder()
///   .application(Application::new("billing.local", |_env| Ok(HandlerResponse::new(204))))
///   .application(Application::new("users.local", |_env| Ok(HandlerResponse::ok("[]"))))
///   .build()?;
/// assert_eq!(runner.router().len(), 2);
/// # Ok(())
/// # }
/// ```
#[must_use]
#[derive(Debug, Default)]
pub struct RunnerBuilder {
  applications: Vec<Application>,
  transport: Option<Arc<dyn Transport>>,
  connector: ConnectorBuilder,
}

impl RunnerBuilder {
  /// Constructs a new `RunnerBuilder`.
  pub fn new() -> RunnerBuilder {
    RunnerBuilder::default()
  }
  /// Register an application. Earlier registrations win on overlap.
  pub fn application(mut self, application: Application) -> RunnerBuilder {
    self.applications.push(application);
    self
  }
  /// Register several applications in order.
  pub fn applications<I>(mut self, applications: I) -> RunnerBuilder
  where
    I: IntoIterator<Item = Application>,
  {
    self.applications.extend(applications);
    self
  }
  /// The transport unmatched requests are forwarded to.
  pub fn transport(mut self, transport: Arc<dyn Transport>) -> RunnerBuilder {
    self.transport = Some(transport);
    self
  }
  /// Configure the real network transport.
  ///
  /// Ignored when a custom `transport` is set.
  pub fn connector(mut self, connector: ConnectorBuilder) -> RunnerBuilder {
    self.connector = connector;
    self
  }
  /// Returns a `Runner` that uses this configuration.
  ///
  /// # Errors
  ///
  /// This method fails if the connector configuration cannot be built.
  pub fn build(self) -> Result<Runner> {
    let real = match self.transport {
      Some(transport) => transport,
      None => Arc::new(HttpTransport::with_connector(&self.connector)?),
    };
    Ok(Runner::from_parts(Router::new(self.applications), real))
  }
}
