//! The transport primitive contract.
//!
//! A binding implements these traits to put a concrete messaging engine behind
//! the socket, poll, and device layers. Every operation returns an explicit
//! `Result` carrying the raw numeric code on failure; there is no ambient
//! "last error" state to consult.

use crate::error::{error_message, ErrorClass, ZmqError};
use crate::message::SocketFlags;
use crate::poll::PollEvents;
use crate::socket::types::SocketType;

use bytes::Bytes;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::Any;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[cfg(feature = "inproc")]
pub mod inproc;

/// Granularity at which a transport's device loop re-checks its running flag.
pub const DEVICE_POLL_INTERVAL_MS: u64 = 500;

/// A raw failure reported by the transport: the numeric error code plus the
/// transport-provided message.
#[derive(Debug, Clone)]
pub struct RawError {
  pub code: i32,
  pub message: String,
}

impl RawError {
  pub fn from_code(code: i32) -> Self {
    Self {
      code,
      message: error_message(code).to_string(),
    }
  }

  pub fn class(&self) -> ErrorClass {
    ErrorClass::of(self.code)
  }
}

impl From<RawError> for ZmqError {
  fn from(raw: RawError) -> Self {
    ZmqError::Transport {
      code: raw.code,
      message: raw.message,
    }
  }
}

pub type RawResult<T> = Result<T, RawError>;

/// One transport-level socket reference.
///
/// Send/receive work on single message parts; `SocketFlags::DONT_WAIT` selects
/// the immediate mode (EAGAIN when not ready) and `SocketFlags::SEND_MORE`
/// marks multi-part continuation. Options are addressed by their i32 id.
pub trait TransportSocket: Send + Sync {
  fn bind(&self, endpoint: &str) -> RawResult<()>;
  fn connect(&self, endpoint: &str) -> RawResult<()>;
  fn close(&self) -> RawResult<()>;
  fn send(&self, flags: SocketFlags, data: &[u8]) -> RawResult<()>;
  fn recv(&self, flags: SocketFlags) -> RawResult<Bytes>;
  fn set_option(&self, option: i32, value: &[u8]) -> RawResult<()>;
  fn get_option(&self, option: i32) -> RawResult<Vec<u8>>;

  /// Downcast hook so a binding can recognize its own sockets in
  /// `PollWaiter::wait` and `TransportContext::run_device`.
  fn as_any(&self) -> &dyn Any;
}

/// One entry of a multiplexed wait: the raw socket, the interest flags, and
/// the observed flags filled in by the binding.
pub struct RawPollItem<'a> {
  pub socket: &'a dyn TransportSocket,
  pub events: PollEvents,
  pub revents: PollEvents,
}

/// The multiplexed-wait resource backing one `PollSet`. Dropping it releases
/// whatever the binding allocated for the item array.
pub trait PollWaiter: Send {
  /// Blocks until at least one item is ready or `timeout_ms` elapses
  /// (-1 encodes "infinite"). Returns the number of ready items and fills
  /// `revents` on every entry.
  fn wait(&mut self, items: &mut [RawPollItem<'_>], timeout_ms: i64) -> RawResult<usize>;
}

/// A transport binding's per-context entry points.
pub trait TransportContext: Send + Sync {
  fn open_socket(&self, kind: SocketType) -> RawResult<Box<dyn TransportSocket>>;

  /// Allocates the wait resource for a poll set of `capacity` items.
  fn poller(&self, capacity: usize) -> RawResult<Box<dyn PollWaiter>>;

  /// Runs the store-and-forward relay between two sockets of this binding
  /// until `running` is cleared (checked at `DEVICE_POLL_INTERVAL_MS`
  /// granularity) or a fatal error occurs.
  fn run_device(
    &self,
    frontend: &dyn TransportSocket,
    backend: &dyn TransportSocket,
    running: &AtomicBool,
  ) -> RawResult<()>;

  /// Initiates orderly shutdown: blocked operations unwind with ETERM.
  fn terminate(&self) -> RawResult<()>;

  /// Stable identity used to validate that sockets share one context.
  fn id(&self) -> usize;
}

/// Factory producing the process-wide default transport binding.
pub type TransportFactory = fn() -> RawResult<Arc<dyn TransportContext>>;

static DEFAULT_FACTORY: Lazy<RwLock<Option<TransportFactory>>> = Lazy::new(|| RwLock::new(None));

/// Registers the binding `Context::new` will use. The bundled in-process
/// binding is the fallback when nothing is registered.
pub fn register_default_transport(factory: TransportFactory) {
  *DEFAULT_FACTORY.write() = Some(factory);
}

pub(crate) fn default_transport() -> RawResult<Arc<dyn TransportContext>> {
  if let Some(factory) = *DEFAULT_FACTORY.read() {
    return factory();
  }
  #[cfg(feature = "inproc")]
  {
    Ok(inproc::InprocTransport::create())
  }
  #[cfg(not(feature = "inproc"))]
  {
    Err(RawError::from_code(crate::error::ENOTSUP))
  }
}

/// Rejects empty or malformed endpoints before they reach the transport.
/// Accepted shape is `transport://address` with both halves non-empty.
pub(crate) fn validate_endpoint(endpoint: &str) -> Result<(), ZmqError> {
  let (scheme, rest) = endpoint
    .split_once("://")
    .ok_or_else(|| ZmqError::InvalidEndpoint(endpoint.to_string()))?;
  if scheme.is_empty() || rest.is_empty() {
    return Err(ZmqError::InvalidEndpoint(endpoint.to_string()));
  }
  url::Url::parse(endpoint).map_err(|_| ZmqError::InvalidEndpoint(endpoint.to_string()))?;
  Ok(())
}
