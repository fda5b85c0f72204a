use crate::error::ZmqError;
use crate::socket::Socket;

type Initializer = Box<dyn FnOnce(&Socket) -> Result<(), ZmqError> + Send>;

/// Deferred configuration for one of a device's sockets.
///
/// Steps are recorded up front and applied exactly once, the first time the
/// device starts: socket initializers first (options, subscriptions), then
/// binds, then connects, in the order they were added. A device stopped and
/// restarted does not re-apply its setup.
pub struct DeviceSetup {
  initializers: Vec<Initializer>,
  bindings: Vec<String>,
  connections: Vec<String>,
  configured: bool,
}

impl DeviceSetup {
  pub(crate) fn new() -> Self {
    Self {
      initializers: Vec::new(),
      bindings: Vec::new(),
      connections: Vec::new(),
      configured: false,
    }
  }

  fn ensure_unconfigured(&self) -> Result<(), ZmqError> {
    if self.configured {
      Err(ZmqError::InvalidState("device socket is already configured"))
    } else {
      Ok(())
    }
  }

  /// Schedules a bind to `endpoint` when the device starts.
  pub fn bind_to(&mut self, endpoint: &str) -> Result<&mut Self, ZmqError> {
    self.ensure_unconfigured()?;
    self.bindings.push(endpoint.to_string());
    Ok(self)
  }

  /// Schedules a connect to `endpoint` when the device starts.
  pub fn connect_to(&mut self, endpoint: &str) -> Result<&mut Self, ZmqError> {
    self.ensure_unconfigured()?;
    self.connections.push(endpoint.to_string());
    Ok(self)
  }

  /// Schedules a subscription for `prefix`. Only meaningful on a
  /// subscribe-capable socket.
  pub fn subscribe(&mut self, prefix: &[u8]) -> Result<&mut Self, ZmqError> {
    let prefix = prefix.to_vec();
    self.initialize(move |socket| socket.subscribe(&prefix))
  }

  /// Schedules a subscription to every message.
  pub fn subscribe_all(&mut self) -> Result<&mut Self, ZmqError> {
    self.subscribe(b"")
  }

  /// Schedules an arbitrary initialization step, run against the socket
  /// before any bind or connect.
  pub fn initialize(
    &mut self,
    step: impl FnOnce(&Socket) -> Result<(), ZmqError> + Send + 'static,
  ) -> Result<&mut Self, ZmqError> {
    self.ensure_unconfigured()?;
    self.initializers.push(Box::new(step));
    Ok(self)
  }

  pub fn is_configured(&self) -> bool {
    self.configured
  }

  /// Applies the recorded steps to `socket`. A second call is a no-op.
  pub(crate) fn configure(&mut self, socket: &Socket) -> Result<(), ZmqError> {
    if self.configured {
      return Ok(());
    }
    for step in self.initializers.drain(..) {
      step(socket)?;
    }
    for endpoint in &self.bindings {
      socket.bind(endpoint)?;
    }
    for endpoint in &self.connections {
      socket.connect(endpoint)?;
    }
    self.configured = true;
    Ok(())
  }
}
