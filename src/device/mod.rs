//! Store-and-forward devices: long-running relays between two sockets.
//!
//! A [`Device`] owns a frontend and a backend socket from the same context
//! and shuttles message parts between them, preserving multi-part framing.
//! The relay checks its running flag at a coarse interval, so a stop request
//! is honored within [`POLLING_INTERVAL`] even while idle.
//!
//! [`Device::start`] blocks the calling thread; [`Device::start_threaded`]
//! moves the device onto a dedicated thread and returns a
//! [`ThreadedDevice`] for lifecycle control.

mod setup;

pub use setup::DeviceSetup;

use crate::context::Context;
use crate::error::{ErrorClass, ZmqError};
use crate::socket::{Socket, SocketType};
use crate::transport::{TransportContext, DEVICE_POLL_INTERVAL_MS};

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Interval at which a running relay re-checks its stop flag.
pub const POLLING_INTERVAL: Duration = Duration::from_millis(DEVICE_POLL_INTERVAL_MS);

/// Shared run state: the relay's running flag plus a "stopped" event that is
/// set whenever no relay loop is executing.
struct DeviceControl {
  running: AtomicBool,
  stopped: Mutex<bool>,
  stopped_cond: Condvar,
  last_error: Mutex<Option<ZmqError>>,
}

impl DeviceControl {
  fn new() -> Self {
    Self {
      running: AtomicBool::new(false),
      stopped: Mutex::new(true),
      stopped_cond: Condvar::new(),
      last_error: Mutex::new(None),
    }
  }

  fn begin(&self) {
    *self.last_error.lock() = None;
    *self.stopped.lock() = false;
    self.running.store(true, Ordering::Release);
  }

  fn finish(&self) {
    self.running.store(false, Ordering::Release);
    *self.stopped.lock() = true;
    self.stopped_cond.notify_all();
  }

  fn request_stop(&self) {
    self.running.store(false, Ordering::Release);
  }

  fn is_running(&self) -> bool {
    self.running.load(Ordering::Acquire)
  }

  /// Waits until no relay loop is executing. Returns whether the stopped
  /// state was reached within the timeout (`None` waits indefinitely).
  fn wait_stopped(&self, timeout: Option<Duration>) -> bool {
    let mut stopped = self.stopped.lock();
    match timeout {
      None => {
        while !*stopped {
          self.stopped_cond.wait(&mut stopped);
        }
        true
      }
      Some(timeout) => {
        let _ = self
          .stopped_cond
          .wait_while_for(&mut stopped, |s| !*s, timeout);
        *stopped
      }
    }
  }
}

/// A cloneable lifecycle handle for a device running on another thread.
#[derive(Clone)]
pub struct DeviceMonitor {
  control: Arc<DeviceControl>,
}

impl DeviceMonitor {
  /// Requests the relay to stop. Honored within [`POLLING_INTERVAL`].
  pub fn stop(&self) {
    self.control.request_stop();
  }

  pub fn is_running(&self) -> bool {
    self.control.is_running()
  }

  /// Blocks until the relay has stopped.
  pub fn join(&self) {
    self.control.wait_stopped(None);
  }

  /// Waits up to `timeout` for the relay to stop; returns whether it did.
  pub fn join_timeout(&self, timeout: Duration) -> bool {
    self.control.wait_stopped(Some(timeout))
  }
}

/// A relay between a frontend and a backend socket.
///
/// Dropping a device stops it and closes both sockets, like [`Device::close`].
pub struct Device {
  frontend: Socket,
  backend: Socket,
  frontend_setup: DeviceSetup,
  backend_setup: DeviceSetup,
  transport: Arc<dyn TransportContext>,
  control: Arc<DeviceControl>,
}

impl Device {
  /// Creates a device with freshly opened sockets of the given types.
  pub fn new(
    context: &Context,
    frontend_kind: SocketType,
    backend_kind: SocketType,
  ) -> Result<Self, ZmqError> {
    let frontend = context.socket(frontend_kind)?;
    let backend = context.socket(backend_kind)?;
    Self::with_sockets(context, frontend, backend)
  }

  /// Wraps two existing sockets. Both must belong to `context`.
  pub fn with_sockets(
    context: &Context,
    frontend: Socket,
    backend: Socket,
  ) -> Result<Self, ZmqError> {
    if frontend.context_id() != context.id() || backend.context_id() != context.id() {
      return Err(ZmqError::InvalidArgument(
        "device sockets must belong to the device's context".into(),
      ));
    }
    Ok(Self {
      frontend,
      backend,
      frontend_setup: DeviceSetup::new(),
      backend_setup: DeviceSetup::new(),
      transport: Arc::clone(context.transport()),
      control: Arc::new(DeviceControl::new()),
    })
  }

  /// A queue device: shared request broker between ROUTER and DEALER.
  pub fn queue(context: &Context) -> Result<Self, ZmqError> {
    Self::new(context, SocketType::Router, SocketType::Dealer)
  }

  /// A forwarder device: pub-sub proxy between SUB and PUB.
  pub fn forwarder(context: &Context) -> Result<Self, ZmqError> {
    Self::new(context, SocketType::Sub, SocketType::Pub)
  }

  /// A streamer device: pipeline stage between PULL and PUSH.
  pub fn streamer(context: &Context) -> Result<Self, ZmqError> {
    Self::new(context, SocketType::Pull, SocketType::Push)
  }

  /// Deferred configuration of the frontend socket.
  pub fn frontend_setup(&mut self) -> &mut DeviceSetup {
    &mut self.frontend_setup
  }

  /// Deferred configuration of the backend socket.
  pub fn backend_setup(&mut self) -> &mut DeviceSetup {
    &mut self.backend_setup
  }

  pub fn frontend(&self) -> &Socket {
    &self.frontend
  }

  pub fn backend(&self) -> &Socket {
    &self.backend
  }

  pub fn is_running(&self) -> bool {
    self.control.is_running()
  }

  /// A handle that can stop and await this device from another thread.
  pub fn monitor(&self) -> DeviceMonitor {
    DeviceMonitor {
      control: Arc::clone(&self.control),
    }
  }

  /// Applies both socket setups if they have not been applied yet.
  pub fn configure(&mut self) -> Result<(), ZmqError> {
    self.frontend_setup.configure(&self.frontend)?;
    self.backend_setup.configure(&self.backend)?;
    Ok(())
  }

  /// Runs the relay on the calling thread until [`DeviceMonitor::stop`] is
  /// called or the context terminates. Termination is a normal exit, not an
  /// error; interrupted relay calls are resumed.
  pub fn start(&mut self) -> Result<(), ZmqError> {
    self.configure()?;
    self.control.begin();
    self.run_to_completion()
  }

  // Relay body shared by `start` and the thread spawned by `start_threaded`;
  // expects `begin` to have run already.
  fn run_to_completion(&mut self) -> Result<(), ZmqError> {
    tracing::debug!(
      frontend = self.frontend.kind().name(),
      backend = self.backend.kind().name(),
      "device starting"
    );
    let result = self.run_relay();
    self.control.finish();
    if let Err(e) = &result {
      *self.control.last_error.lock() = Some(e.clone());
      tracing::error!(error = %e, "device relay failed");
    } else {
      tracing::debug!("device stopped");
    }
    result
  }

  fn run_relay(&self) -> Result<(), ZmqError> {
    loop {
      match self
        .transport
        .run_device(self.frontend.raw(), self.backend.raw(), &self.control.running)
      {
        Ok(()) => return Ok(()),
        Err(raw) => match raw.class() {
          ErrorClass::RecoverableInterrupted => continue,
          ErrorClass::ContextTerminated => return Ok(()),
          _ => return Err(raw.into()),
        },
      }
    }
  }

  /// Moves the device to a dedicated thread and starts it there.
  pub fn start_threaded(mut self) -> Result<ThreadedDevice, ZmqError> {
    // Configure and flip the run state on the caller's thread: setup errors
    // surface here, and a stop requested as soon as this returns is honored.
    self.configure()?;
    let control = Arc::clone(&self.control);
    self.control.begin();
    let builder = thread::Builder::new().name("device-relay".into());
    let handle = match builder.spawn(move || {
      let _ = self.run_to_completion();
      self
    }) {
      Ok(handle) => handle,
      Err(e) => {
        control.finish();
        tracing::error!(error = %e, "failed to spawn device thread");
        return Err(ZmqError::InvalidState("failed to spawn device thread"));
      }
    };
    Ok(ThreadedDevice {
      control,
      handle: Some(handle),
    })
  }

  /// Stops the relay, waits out the polling grace period, and closes both
  /// sockets. Idempotent.
  pub fn close(&mut self) -> Result<(), ZmqError> {
    self.control.request_stop();
    if !self.control.wait_stopped(Some(shutdown_grace())) {
      tracing::warn!("device did not stop within the shutdown grace period");
    }
    self.frontend.close()?;
    self.backend.close()?;
    Ok(())
  }

  /// The error that ended the most recent run, if any.
  pub fn last_error(&self) -> Option<ZmqError> {
    self.control.last_error.lock().clone()
  }
}

impl Drop for Device {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      tracing::warn!(error = %e, "error while closing device on drop");
    }
  }
}

/// A device running on its own thread.
pub struct ThreadedDevice {
  control: Arc<DeviceControl>,
  handle: Option<JoinHandle<Device>>,
}

impl ThreadedDevice {
  /// Requests the relay to stop. Honored within [`POLLING_INTERVAL`].
  pub fn stop(&self) {
    self.control.request_stop();
  }

  pub fn is_running(&self) -> bool {
    self.control.is_running()
  }

  /// Blocks until the relay has stopped.
  pub fn join(&self) {
    self.control.wait_stopped(None);
  }

  /// Waits up to `timeout` for the relay to stop; returns whether it did.
  pub fn join_timeout(&self, timeout: Duration) -> bool {
    self.control.wait_stopped(Some(timeout))
  }

  /// Stops the device, joins its thread, and closes both sockets, returning
  /// the error that ended the run if there was one.
  pub fn close(mut self) -> Result<(), ZmqError> {
    self.stop();
    if !self.control.wait_stopped(Some(shutdown_grace())) {
      tracing::warn!("device did not stop within the shutdown grace period");
    }
    if let Some(handle) = self.handle.take() {
      match handle.join() {
        Ok(mut device) => {
          let run_error = device.last_error();
          device.close()?;
          if let Some(e) = run_error {
            return Err(e);
          }
        }
        Err(_) => return Err(ZmqError::InvalidState("device thread panicked")),
      }
    }
    Ok(())
  }
}

impl Drop for ThreadedDevice {
  fn drop(&mut self) {
    self.stop();
    if let Some(handle) = self.handle.take() {
      if handle.join().is_err() {
        tracing::warn!("device thread panicked");
      }
    }
  }
}

/// Twice the relay polling interval, giving an idle loop one full cycle to
/// notice the cleared flag and unwind.
fn shutdown_grace() -> Duration {
  POLLING_INTERVAL.saturating_mul(2)
}
