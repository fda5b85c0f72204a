use crate::error::{ErrorClass, ZmqError};
use crate::message::{ReceiveResult, ReceivedMessage, SendResult, SocketFlags};
use crate::socket::options::{self, IDENTITY, RCVMORE, SUBSCRIBE, UNSUBSCRIBE};
use crate::socket::types::SocketType;
use crate::transport::{validate_endpoint, TransportSocket};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A message-oriented socket over one transport-level socket reference.
///
/// The handle owns the transport socket exclusively and may be shared across
/// threads; the binding serializes concurrent access internally. Closing is
/// idempotent, and dropping the handle closes it.
pub struct Socket {
  raw: Box<dyn TransportSocket>,
  kind: SocketType,
  context_id: usize,
  closed: AtomicBool,
}

impl Socket {
  pub(crate) fn new(raw: Box<dyn TransportSocket>, kind: SocketType, context_id: usize) -> Self {
    Self {
      raw,
      kind,
      context_id,
      closed: AtomicBool::new(false),
    }
  }

  pub fn kind(&self) -> SocketType {
    self.kind
  }

  pub(crate) fn context_id(&self) -> usize {
    self.context_id
  }

  pub(crate) fn raw(&self) -> &dyn TransportSocket {
    &*self.raw
  }

  fn ensure_open(&self) -> Result<(), ZmqError> {
    if self.closed.load(Ordering::Acquire) {
      Err(ZmqError::InvalidState("socket is closed"))
    } else {
      Ok(())
    }
  }

  fn ensure_can_send(&self) -> Result<(), ZmqError> {
    if self.kind.can_send() {
      Ok(())
    } else {
      Err(ZmqError::InvalidSocketType(self.kind.name()))
    }
  }

  fn ensure_can_receive(&self) -> Result<(), ZmqError> {
    if self.kind.can_receive() {
      Ok(())
    } else {
      Err(ZmqError::InvalidSocketType(self.kind.name()))
    }
  }

  // --- Connection management ---

  /// Creates an endpoint for accepting connections and binds it to this
  /// socket. Endpoints have the form `transport://address`.
  pub fn bind(&self, endpoint: &str) -> Result<(), ZmqError> {
    self.ensure_open()?;
    validate_endpoint(endpoint)?;
    tracing::debug!(kind = self.kind.name(), endpoint, "binding socket");
    self.raw.bind(endpoint).map_err(ZmqError::from)
  }

  /// Connects this socket to the endpoint `transport://address`.
  pub fn connect(&self, endpoint: &str) -> Result<(), ZmqError> {
    self.ensure_open()?;
    validate_endpoint(endpoint)?;
    tracing::debug!(kind = self.kind.name(), endpoint, "connecting socket");
    self.raw.connect(endpoint).map_err(ZmqError::from)
  }

  /// Releases the transport socket. Safe to call more than once; only the
  /// first call reaches the transport.
  pub fn close(&self) -> Result<(), ZmqError> {
    if self.closed.swap(true, Ordering::AcqRel) {
      return Ok(());
    }
    tracing::debug!(kind = self.kind.name(), "closing socket");
    self.raw.close().map_err(ZmqError::from)
  }

  // --- Send ---

  /// Sends one message part according to `flags`, classifying any transport
  /// failure: would-block becomes [`SendResult::TryAgain`], an interrupted
  /// call is retried, and context termination becomes
  /// [`SendResult::Interrupted`].
  pub fn send_flags(&self, buffer: &[u8], flags: SocketFlags) -> Result<SendResult, ZmqError> {
    self.ensure_open()?;
    self.ensure_can_send()?;
    loop {
      match self.raw.send(flags, buffer) {
        Ok(()) => return Ok(SendResult::Sent),
        Err(raw) => match raw.class() {
          ErrorClass::RecoverableRetry => return Ok(SendResult::TryAgain),
          ErrorClass::RecoverableInterrupted => continue,
          ErrorClass::ContextTerminated => return Ok(SendResult::Interrupted),
          ErrorClass::Fatal => return Err(raw.into()),
        },
      }
    }
  }

  /// Queues a single-part message (or the final part of a multi-part
  /// message), blocking until the transport accepts it.
  pub fn send(&self, buffer: &[u8]) -> Result<SendResult, ZmqError> {
    self.send_flags(buffer, SocketFlags::NONE)
  }

  /// Queues a non-final part of a multi-part message, blocking until the
  /// transport accepts it.
  pub fn send_part(&self, buffer: &[u8]) -> Result<SendResult, ZmqError> {
    self.send_flags(buffer, SocketFlags::SEND_MORE)
  }

  /// Sends with a bounded wait. `Duration::MAX` delegates to the blocking
  /// mode; any other value loops non-blocking attempts until the deadline
  /// and then reports [`SendResult::TryAgain`]. A zero timeout makes exactly
  /// one attempt. Multi-part framing in `flags` is preserved.
  pub fn send_flags_timeout(
    &self,
    buffer: &[u8],
    flags: SocketFlags,
    timeout: Duration,
  ) -> Result<SendResult, ZmqError> {
    if timeout == Duration::MAX {
      return self.send_flags(buffer, flags - SocketFlags::DONT_WAIT);
    }

    let flags = flags | SocketFlags::DONT_WAIT;
    let timer = Instant::now();
    loop {
      let result = self.send_flags(buffer, flags)?;
      if result != SendResult::TryAgain || timer.elapsed() >= timeout {
        return Ok(result);
      }
    }
  }

  /// `send` with a bounded wait; see [`Socket::send_flags_timeout`].
  pub fn send_timeout(&self, buffer: &[u8], timeout: Duration) -> Result<SendResult, ZmqError> {
    self.send_flags_timeout(buffer, SocketFlags::NONE, timeout)
  }

  /// `send_part` with a bounded wait; see [`Socket::send_flags_timeout`].
  pub fn send_part_timeout(&self, buffer: &[u8], timeout: Duration) -> Result<SendResult, ZmqError> {
    self.send_flags_timeout(buffer, SocketFlags::SEND_MORE, timeout)
  }

  // --- Receive ---

  /// Receives one message part according to `flags`. On success the
  /// transport's receive-more indicator is queried once to fill
  /// [`ReceivedMessage::has_more`]. Failure classification mirrors
  /// [`Socket::send_flags`].
  pub fn recv_flags(&self, flags: SocketFlags) -> Result<ReceivedMessage, ZmqError> {
    self.ensure_open()?;
    self.ensure_can_receive()?;
    loop {
      match self.raw.recv(flags) {
        Ok(data) => {
          let has_more = self.receive_more_quiet()?;
          return Ok(ReceivedMessage::received(data, has_more));
        }
        Err(raw) => match raw.class() {
          ErrorClass::RecoverableRetry => return Ok(ReceivedMessage::try_again()),
          ErrorClass::RecoverableInterrupted => continue,
          ErrorClass::ContextTerminated => return Ok(ReceivedMessage::interrupted()),
          ErrorClass::Fatal => return Err(raw.into()),
        },
      }
    }
  }

  /// Receives one message part, blocking until one is available.
  pub fn recv(&self) -> Result<ReceivedMessage, ZmqError> {
    self.recv_flags(SocketFlags::NONE)
  }

  /// Receives with a bounded wait. `Duration::MAX` delegates to the blocking
  /// mode; any other value loops non-blocking attempts until the deadline and
  /// then returns the [`ReceiveResult::TryAgain`] outcome with empty data.
  /// A zero timeout makes exactly one probe.
  pub fn recv_timeout(&self, timeout: Duration) -> Result<ReceivedMessage, ZmqError> {
    if timeout == Duration::MAX {
      return self.recv_flags(SocketFlags::NONE);
    }

    let timer = Instant::now();
    loop {
      let message = self.recv_flags(SocketFlags::DONT_WAIT)?;
      if message.result() != ReceiveResult::TryAgain || timer.elapsed() >= timeout {
        return Ok(message);
      }
    }
  }

  /// Receives into a caller-provided buffer. Parts larger than the buffer
  /// are reported as [`ReceiveResult::Truncated`] with the overflow
  /// discarded.
  pub fn recv_into(&self, buffer: &mut [u8], flags: SocketFlags) -> Result<ReceivedMessage, ZmqError> {
    let message = self.recv_flags(flags)?;
    if message.result() != ReceiveResult::Received || message.len() <= buffer.len() {
      let n = message.len().min(buffer.len());
      buffer[..n].copy_from_slice(&message.data()[..n]);
      return Ok(message);
    }

    let has_more = message.has_more();
    let data = message.into_bytes().slice(..buffer.len());
    buffer.copy_from_slice(&data);
    Ok(ReceivedMessage::truncated(data, has_more))
  }

  /// Whether the multi-part message currently being read has more parts to
  /// follow. Fetched from the transport on every call.
  pub fn receive_more(&self) -> Result<bool, ZmqError> {
    self.ensure_open()?;
    self.receive_more_quiet()
  }

  // Consulted right after a successful raw receive; a context tearing down
  // at that instant must not turn the received part into an error.
  fn receive_more_quiet(&self) -> Result<bool, ZmqError> {
    match self.raw.get_option(RCVMORE) {
      Ok(value) => options::parse_bool_option(&value, RCVMORE),
      Err(raw) if raw.class() == ErrorClass::ContextTerminated => Ok(false),
      Err(raw) => Err(raw.into()),
    }
  }

  // --- Subscriptions ---

  /// Adds a message filter: parts starting with `prefix` will be delivered.
  /// Only valid on subscribe-capable sockets.
  pub fn subscribe(&self, prefix: &[u8]) -> Result<(), ZmqError> {
    self.ensure_subscribe_capable()?;
    self.set_option_raw(SUBSCRIBE, prefix)
  }

  /// Subscribes to every message (the empty prefix).
  pub fn subscribe_all(&self) -> Result<(), ZmqError> {
    self.subscribe(b"")
  }

  /// Removes a previously added message filter.
  pub fn unsubscribe(&self, prefix: &[u8]) -> Result<(), ZmqError> {
    self.ensure_subscribe_capable()?;
    self.set_option_raw(UNSUBSCRIBE, prefix)
  }

  fn ensure_subscribe_capable(&self) -> Result<(), ZmqError> {
    if self.kind.can_subscribe() {
      Ok(())
    } else {
      Err(ZmqError::InvalidSocketType(self.kind.name()))
    }
  }

  // --- Options ---

  /// Sets an option from its raw byte encoding.
  pub fn set_option_raw(&self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    self.ensure_open()?;
    self.raw.set_option(option, value).map_err(ZmqError::from)
  }

  /// Gets an option in its raw byte encoding.
  pub fn get_option_raw(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    self.ensure_open()?;
    self.raw.get_option(option).map_err(ZmqError::from)
  }

  fn get_option_i32(&self, option: i32) -> Result<i32, ZmqError> {
    options::parse_i32_option(&self.get_option_raw(option)?, option)
  }

  fn set_option_i32(&self, option: i32, value: i32) -> Result<(), ZmqError> {
    self.set_option_raw(option, &options::encode_i32(value))
  }

  fn get_option_duration(&self, option: i32) -> Result<Option<Duration>, ZmqError> {
    options::parse_duration_ms_option(&self.get_option_raw(option)?, option)
  }

  fn set_option_duration(&self, option: i32, value: Option<Duration>) -> Result<(), ZmqError> {
    self.set_option_raw(option, &options::encode_duration_ms(value))
  }

  /// I/O thread affinity for newly created connections.
  pub fn affinity(&self) -> Result<u64, ZmqError> {
    options::parse_u64_option(&self.get_option_raw(options::AFFINITY)?, options::AFFINITY)
  }

  pub fn set_affinity(&self, value: u64) -> Result<(), ZmqError> {
    self.set_option_raw(options::AFFINITY, &options::encode_u64(value))
  }

  /// Maximum length of the queue of outstanding peer connections.
  pub fn backlog(&self) -> Result<i32, ZmqError> {
    self.get_option_i32(options::BACKLOG)
  }

  pub fn set_backlog(&self, value: i32) -> Result<(), ZmqError> {
    self.set_option_i32(options::BACKLOG, value)
  }

  /// The identity of this socket (at most 255 bytes).
  pub fn identity(&self) -> Result<Vec<u8>, ZmqError> {
    self.get_option_raw(IDENTITY)
  }

  pub fn set_identity(&self, value: &[u8]) -> Result<(), ZmqError> {
    options::check_identity(value)?;
    self.set_option_raw(IDENTITY, value)
  }

  /// Linger period for socket shutdown; `None` means infinite.
  pub fn linger(&self) -> Result<Option<Duration>, ZmqError> {
    self.get_option_duration(options::LINGER)
  }

  pub fn set_linger(&self, value: Option<Duration>) -> Result<(), ZmqError> {
    self.set_option_duration(options::LINGER, value)
  }

  /// Maximum inbound message size in bytes; -1 means no limit.
  pub fn max_message_size(&self) -> Result<i64, ZmqError> {
    options::parse_i64_option(&self.get_option_raw(options::MAX_MSG_SIZE)?, options::MAX_MSG_SIZE)
  }

  pub fn set_max_message_size(&self, value: i64) -> Result<(), ZmqError> {
    self.set_option_raw(options::MAX_MSG_SIZE, &options::encode_i64(value))
  }

  /// Time-to-live of multicast packets, in network hops.
  pub fn multicast_hops(&self) -> Result<i32, ZmqError> {
    self.get_option_i32(options::MULTICAST_HOPS)
  }

  pub fn set_multicast_hops(&self, value: i32) -> Result<(), ZmqError> {
    self.set_option_i32(options::MULTICAST_HOPS, value)
  }

  /// Maximum send/receive rate for multicast transports, in kbps.
  pub fn multicast_rate(&self) -> Result<i32, ZmqError> {
    self.get_option_i32(options::RATE)
  }

  pub fn set_multicast_rate(&self, value: i32) -> Result<(), ZmqError> {
    self.set_option_i32(options::RATE, value)
  }

  /// Recovery interval for multicast transports.
  pub fn multicast_recovery_interval(&self) -> Result<Option<Duration>, ZmqError> {
    self.get_option_duration(options::RECOVERY_IVL)
  }

  pub fn set_multicast_recovery_interval(&self, value: Option<Duration>) -> Result<(), ZmqError> {
    self.set_option_duration(options::RECOVERY_IVL, value)
  }

  /// Kernel receive buffer size in bytes; 0 selects the OS default.
  pub fn receive_buffer_size(&self) -> Result<i32, ZmqError> {
    self.get_option_i32(options::RCVBUF)
  }

  pub fn set_receive_buffer_size(&self, value: i32) -> Result<(), ZmqError> {
    self.set_option_i32(options::RCVBUF, value)
  }

  /// Kernel transmit buffer size in bytes; 0 selects the OS default.
  pub fn send_buffer_size(&self) -> Result<i32, ZmqError> {
    self.get_option_i32(options::SNDBUF)
  }

  pub fn set_send_buffer_size(&self, value: i32) -> Result<(), ZmqError> {
    self.set_option_i32(options::SNDBUF, value)
  }

  /// High water mark for inbound messages, in message parts.
  pub fn receive_high_watermark(&self) -> Result<i32, ZmqError> {
    self.get_option_i32(options::RCVHWM)
  }

  pub fn set_receive_high_watermark(&self, value: i32) -> Result<(), ZmqError> {
    self.set_option_i32(options::RCVHWM, value)
  }

  /// High water mark for outbound messages, in message parts.
  pub fn send_high_watermark(&self) -> Result<i32, ZmqError> {
    self.get_option_i32(options::SNDHWM)
  }

  pub fn set_send_high_watermark(&self, value: i32) -> Result<(), ZmqError> {
    self.set_option_i32(options::SNDHWM, value)
  }

  /// Default timeout for receive operations; `None` means infinite.
  pub fn rcvtimeo(&self) -> Result<Option<Duration>, ZmqError> {
    self.get_option_duration(options::RCVTIMEO)
  }

  pub fn set_rcvtimeo(&self, value: Option<Duration>) -> Result<(), ZmqError> {
    self.set_option_duration(options::RCVTIMEO, value)
  }

  /// Default timeout for send operations; `None` means infinite.
  pub fn sndtimeo(&self) -> Result<Option<Duration>, ZmqError> {
    self.get_option_duration(options::SNDTIMEO)
  }

  pub fn set_sndtimeo(&self, value: Option<Duration>) -> Result<(), ZmqError> {
    self.set_option_duration(options::SNDTIMEO, value)
  }

  /// Initial reconnection interval.
  pub fn reconnect_interval(&self) -> Result<Option<Duration>, ZmqError> {
    self.get_option_duration(options::RECONNECT_IVL)
  }

  pub fn set_reconnect_interval(&self, value: Option<Duration>) -> Result<(), ZmqError> {
    self.set_option_duration(options::RECONNECT_IVL, value)
  }

  /// Maximum reconnection interval; zero disables the exponential backoff.
  pub fn reconnect_interval_max(&self) -> Result<Option<Duration>, ZmqError> {
    self.get_option_duration(options::RECONNECT_IVL_MAX)
  }

  pub fn set_reconnect_interval_max(&self, value: Option<Duration>) -> Result<(), ZmqError> {
    self.set_option_duration(options::RECONNECT_IVL_MAX, value)
  }
}

impl Drop for Socket {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      tracing::warn!(kind = self.kind.name(), error = %e, "error while closing socket on drop");
    }
  }
}

impl fmt::Debug for Socket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Socket")
      .field("kind", &self.kind)
      .field("closed", &self.closed.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}
