use bytes::Bytes;
use std::fmt;

bitflags::bitflags! {
  /// Send and receive behavior flags, combined bitwise.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
  pub struct SocketFlags: i32 {
    /// Perform the operation in non-blocking mode.
    const DONT_WAIT = 0x1;
    /// The part being sent is not the final part of a multi-part message.
    const SEND_MORE = 0x2;
  }
}

impl SocketFlags {
  pub const NONE: SocketFlags = SocketFlags::empty();
}

/// Outcome of a receive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveResult {
  /// A message part was retrieved.
  Received,
  /// A message part was retrieved but did not fit in the caller's buffer.
  Truncated,
  /// No message was available; try again.
  TryAgain,
  /// The operation was cut short by context termination.
  Interrupted,
}

/// Outcome of a send operation. Never raised as an error by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
  /// The message part was queued by the transport.
  Sent,
  /// The transport could not queue the part right now; try again.
  TryAgain,
  /// The operation was cut short by context termination.
  Interrupted,
}

/// Immutable result of a receive operation: the payload bytes, the outcome
/// tag, and whether further parts of a multi-part message follow.
#[derive(Clone)]
pub struct ReceivedMessage {
  data: Bytes,
  result: ReceiveResult,
  has_more: bool,
}

impl ReceivedMessage {
  pub(crate) fn received(data: Bytes, has_more: bool) -> Self {
    Self {
      data,
      result: ReceiveResult::Received,
      has_more,
    }
  }

  pub(crate) fn truncated(data: Bytes, has_more: bool) -> Self {
    Self {
      data,
      result: ReceiveResult::Truncated,
      has_more,
    }
  }

  pub(crate) fn try_again() -> Self {
    Self {
      data: Bytes::new(),
      result: ReceiveResult::TryAgain,
      has_more: false,
    }
  }

  pub(crate) fn interrupted() -> Self {
    Self {
      data: Bytes::new(),
      result: ReceiveResult::Interrupted,
      has_more: false,
    }
  }

  /// The payload. Empty for `TryAgain` and `Interrupted` outcomes.
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// The payload as a cheaply cloneable `Bytes` handle.
  pub fn into_bytes(self) -> Bytes {
    self.data
  }

  pub fn result(&self) -> ReceiveResult {
    self.result
  }

  /// Whether the multi-part message being read has more parts to follow.
  pub fn has_more(&self) -> bool {
    self.has_more
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl fmt::Debug for ReceivedMessage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ReceivedMessage")
      .field("size", &self.data.len())
      .field("result", &self.result)
      .field("has_more", &self.has_more)
      .finish()
  }
}
