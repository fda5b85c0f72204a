use crate::error::ZmqError;
use crate::poll::{PollItem, PollSet};
use crate::socket::{Socket, SocketType};
use crate::transport::{self, TransportContext};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The entry point of the library: owns one transport context and hands out
/// sockets, poll sets, and devices bound to it.
///
/// Terminating the context (explicitly or by dropping it) makes every
/// operation blocked on one of its sockets unwind with an `Interrupted`
/// outcome instead of an error, which is the intended shutdown sequence:
/// terminate the context, then let each thread observe the interruption and
/// close its sockets.
pub struct Context {
  transport: Arc<dyn TransportContext>,
  terminated: AtomicBool,
}

impl Context {
  /// Creates a context over the process-wide default transport binding.
  pub fn new() -> Result<Self, ZmqError> {
    Ok(Self::with_transport(transport::default_transport()?))
  }

  /// Creates a context over an explicit transport binding.
  pub fn with_transport(transport: Arc<dyn TransportContext>) -> Self {
    Self {
      transport,
      terminated: AtomicBool::new(false),
    }
  }

  /// Opens a socket of the given type within this context.
  pub fn socket(&self, kind: SocketType) -> Result<Socket, ZmqError> {
    self.ensure_alive()?;
    let raw = self.transport.open_socket(kind)?;
    Ok(Socket::new(raw, kind, self.transport.id()))
  }

  /// Builds a poll set over `items`. Every member socket must belong to this
  /// context.
  pub fn poll_set<'a>(&self, items: Vec<PollItem<'a>>) -> Result<PollSet<'a>, ZmqError> {
    self.ensure_alive()?;
    if items.is_empty() {
      return Err(ZmqError::InvalidArgument(
        "a poll set needs at least one item".into(),
      ));
    }
    for item in &items {
      if item.context_id() != self.id() {
        return Err(ZmqError::InvalidArgument(
          "poll set sockets must belong to the polling context".into(),
        ));
      }
    }
    let waiter = self.transport.poller(items.len())?;
    Ok(PollSet::new(items, waiter))
  }

  /// Initiates orderly shutdown. Idempotent; only the first call reaches the
  /// transport.
  pub fn terminate(&self) -> Result<(), ZmqError> {
    if self.terminated.swap(true, Ordering::AcqRel) {
      return Ok(());
    }
    tracing::debug!(context = self.id(), "terminating context");
    self.transport.terminate().map_err(ZmqError::from)
  }

  pub fn is_terminated(&self) -> bool {
    self.terminated.load(Ordering::Acquire)
  }

  fn ensure_alive(&self) -> Result<(), ZmqError> {
    if self.is_terminated() {
      Err(ZmqError::InvalidState("context is terminated"))
    } else {
      Ok(())
    }
  }

  pub(crate) fn transport(&self) -> &Arc<dyn TransportContext> {
    &self.transport
  }

  pub(crate) fn id(&self) -> usize {
    self.transport.id()
  }
}

impl Drop for Context {
  fn drop(&mut self) {
    if let Err(e) = self.terminate() {
      tracing::warn!(error = %e, "error while terminating context on drop");
    }
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context")
      .field("id", &self.id())
      .field("terminated", &self.is_terminated())
      .finish()
  }
}
