//! Readiness multiplexing over a set of sockets.
//!
//! A [`PollSet`] borrows its sockets for its whole lifetime, holds the
//! transport's wait resource, and dispatches per-item callbacks when a wait
//! reports readiness. Interrupted waits are retried with the elapsed time
//! deducted from the caller's timeout; context termination ends the wait
//! quietly with zero ready items so shutdown paths need no special casing.

use crate::error::{ErrorClass, ZmqError};
use crate::socket::Socket;
use crate::transport::{PollWaiter, RawPollItem};

use std::time::{Duration, Instant};

bitflags::bitflags! {
  /// Readiness event flags, combined bitwise.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
  pub struct PollEvents: i16 {
    /// At least one message part may be received without blocking.
    const IN = 0x1;
    /// At least one message part may be sent without blocking.
    const OUT = 0x2;
    /// The socket is in an error state.
    const ERR = 0x4;
  }
}

impl PollEvents {
  pub const NONE: PollEvents = PollEvents::empty();
}

type ReadyHandler<'a> = Box<dyn FnMut(&Socket) + 'a>;

/// One socket's membership in a poll set: the interest flags, the events
/// observed by the last wait, and optional readiness callbacks.
pub struct PollItem<'a> {
  socket: &'a Socket,
  events: PollEvents,
  revents: PollEvents,
  receive_handler: Option<ReadyHandler<'a>>,
  send_handler: Option<ReadyHandler<'a>>,
}

impl<'a> PollItem<'a> {
  pub fn new(socket: &'a Socket, events: PollEvents) -> Self {
    Self {
      socket,
      events,
      revents: PollEvents::empty(),
      receive_handler: None,
      send_handler: None,
    }
  }

  /// An item whose interest covers everything the socket's type can do.
  pub fn for_socket(socket: &'a Socket) -> Self {
    let mut events = PollEvents::empty();
    if socket.kind().can_receive() {
      events |= PollEvents::IN;
    }
    if socket.kind().can_send() {
      events |= PollEvents::OUT;
    }
    Self::new(socket, events)
  }

  /// Registers a callback invoked when the socket becomes readable.
  /// Implies interest in [`PollEvents::IN`].
  pub fn on_receive_ready(mut self, handler: impl FnMut(&Socket) + 'a) -> Self {
    self.events |= PollEvents::IN;
    self.receive_handler = Some(Box::new(handler));
    self
  }

  /// Registers a callback invoked when the socket becomes writable.
  /// Implies interest in [`PollEvents::OUT`].
  pub fn on_send_ready(mut self, handler: impl FnMut(&Socket) + 'a) -> Self {
    self.events |= PollEvents::OUT;
    self.send_handler = Some(Box::new(handler));
    self
  }

  pub fn socket(&self) -> &'a Socket {
    self.socket
  }

  /// Events observed by the most recent wait.
  pub fn revents(&self) -> PollEvents {
    self.revents
  }

  pub(crate) fn context_id(&self) -> usize {
    self.socket.context_id()
  }
}

/// A reusable multiplexed wait over a fixed set of sockets.
pub struct PollSet<'a> {
  items: Vec<PollItem<'a>>,
  waiter: Option<Box<dyn PollWaiter>>,
}

impl<'a> PollSet<'a> {
  pub(crate) fn new(items: Vec<PollItem<'a>>, waiter: Box<dyn PollWaiter>) -> Self {
    Self {
      items,
      waiter: Some(waiter),
    }
  }

  /// Waits indefinitely for readiness on any member socket, dispatches the
  /// registered callbacks, and returns the number of ready items. Returns
  /// `Ok(0)` when the context is terminated mid-wait.
  pub fn poll(&mut self) -> Result<usize, ZmqError> {
    self.ensure_open()?;
    self.poll_blocking()
  }

  /// Like [`PollSet::poll`] with an upper bound on the wait. An interrupted
  /// wait is resumed with the remaining time; a zero timeout performs exactly
  /// one non-blocking pass. Returns `Ok(0)` when the time runs out.
  pub fn poll_timeout(&mut self, timeout: Duration) -> Result<usize, ZmqError> {
    self.ensure_open()?;
    self.poll_deadline(timeout)
  }

  fn ensure_open(&self) -> Result<(), ZmqError> {
    if self.waiter.is_none() {
      Err(ZmqError::InvalidState("poll set is closed"))
    } else {
      Ok(())
    }
  }

  fn poll_blocking(&mut self) -> Result<usize, ZmqError> {
    loop {
      match self.wait_once(-1) {
        Ok(ready) => {
          self.dispatch();
          return Ok(ready);
        }
        Err(raw) => match raw.class() {
          ErrorClass::RecoverableInterrupted => continue,
          ErrorClass::ContextTerminated => return Ok(0),
          _ => return Err(raw.into()),
        },
      }
    }
  }

  fn poll_deadline(&mut self, timeout: Duration) -> Result<usize, ZmqError> {
    let timer = Instant::now();
    loop {
      let remaining = timeout.saturating_sub(timer.elapsed());
      let remaining_ms = remaining.as_millis().min(i64::MAX as u128) as i64;
      match self.wait_once(remaining_ms) {
        Ok(ready) => {
          self.dispatch();
          return Ok(ready);
        }
        Err(raw) => match raw.class() {
          ErrorClass::RecoverableInterrupted => {
            if timer.elapsed() >= timeout {
              return Ok(0);
            }
          }
          ErrorClass::ContextTerminated => return Ok(0),
          _ => return Err(raw.into()),
        },
      }
    }
  }

  fn wait_once(&mut self, timeout_ms: i64) -> Result<usize, crate::transport::RawError> {
    let waiter = self
      .waiter
      .as_mut()
      .ok_or_else(|| crate::transport::RawError::from_code(crate::error::ENOTSOCK))?;

    let mut raw_items: Vec<RawPollItem<'_>> = self
      .items
      .iter()
      .map(|item| RawPollItem {
        socket: item.socket.raw(),
        events: item.events,
        revents: PollEvents::empty(),
      })
      .collect();

    let ready = waiter.wait(&mut raw_items, timeout_ms)?;
    for (item, raw_item) in self.items.iter_mut().zip(&raw_items) {
      item.revents = raw_item.revents;
    }
    Ok(ready)
  }

  fn dispatch(&mut self) {
    for item in &mut self.items {
      if item.revents.contains(PollEvents::IN) {
        if let Some(handler) = &mut item.receive_handler {
          handler(item.socket);
        }
      }
      if item.revents.contains(PollEvents::OUT) {
        if let Some(handler) = &mut item.send_handler {
          handler(item.socket);
        }
      }
    }
  }

  pub fn items(&self) -> &[PollItem<'a>] {
    &self.items
  }

  /// Releases the transport's wait resource. Later polls fail with an
  /// invalid-state error. Idempotent.
  pub fn close(&mut self) {
    self.waiter = None;
  }
}
