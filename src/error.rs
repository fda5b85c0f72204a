use thiserror::Error;

// Native-range codes shared with the transport. These match the values the
// classic C bindings report on POSIX platforms.
pub const EINTR: i32 = 4;
pub const EAGAIN: i32 = 11;
pub const ENOMEM: i32 = 12;
pub const EFAULT: i32 = 14;
pub const EINVAL: i32 = 22;
pub const EMFILE: i32 = 24;

/// Base of the transport's private error-code range, for conditions that have
/// no portable native errno.
pub const HAUSNUMERO: i32 = 156_384_712;

pub const ENOTSUP: i32 = HAUSNUMERO + 1;
pub const EPROTONOSUPPORT: i32 = HAUSNUMERO + 2;
pub const ENOBUFS: i32 = HAUSNUMERO + 3;
pub const ENETDOWN: i32 = HAUSNUMERO + 4;
pub const EADDRINUSE: i32 = HAUSNUMERO + 5;
pub const EADDRNOTAVAIL: i32 = HAUSNUMERO + 6;
pub const ECONNREFUSED: i32 = HAUSNUMERO + 7;
pub const EINPROGRESS: i32 = HAUSNUMERO + 8;
pub const ENOTSOCK: i32 = HAUSNUMERO + 9;
pub const EFSM: i32 = HAUSNUMERO + 51;
pub const ENOCOMPATPROTO: i32 = HAUSNUMERO + 52;
pub const ETERM: i32 = HAUSNUMERO + 53;
pub const EMTHREAD: i32 = HAUSNUMERO + 54;

/// Human-readable message for a raw transport error code.
pub fn error_message(code: i32) -> &'static str {
  match code {
    EINTR => "Interrupted system call",
    EAGAIN => "Resource temporarily unavailable",
    ENOMEM => "Cannot allocate memory",
    EFAULT => "Bad address",
    EINVAL => "Invalid argument",
    EMFILE => "Too many open files",
    ENOTSUP => "Operation not supported",
    EPROTONOSUPPORT => "Protocol not supported",
    ENOBUFS => "No buffer space available",
    ENETDOWN => "Network is down",
    EADDRINUSE => "Address already in use",
    EADDRNOTAVAIL => "Address not available",
    ECONNREFUSED => "Connection refused",
    EINPROGRESS => "Operation in progress",
    ENOTSOCK => "The provided socket was invalid",
    EFSM => "Operation cannot be accomplished in current state",
    ENOCOMPATPROTO => "The protocol is not compatible with the socket type",
    ETERM => "Context was terminated",
    EMTHREAD => "No thread available",
    _ => "Unknown error",
  }
}

/// How a raw transport error code must be handled by the caller.
///
/// Only `Fatal` ever surfaces as an error value; the other three classes are
/// absorbed into `TryAgain`/`Interrupted` outcomes or internal retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// The operation would block (EAGAIN); report a TryAgain outcome.
  RecoverableRetry,
  /// A signal interrupted the call before completion (EINTR); retry it.
  RecoverableInterrupted,
  /// The owning context is shutting down (ETERM); finish quietly.
  ContextTerminated,
  /// Everything else; surface as a typed failure.
  Fatal,
}

impl ErrorClass {
  pub fn of(code: i32) -> Self {
    match code {
      EAGAIN => ErrorClass::RecoverableRetry,
      EINTR => ErrorClass::RecoverableInterrupted,
      ETERM => ErrorClass::ContextTerminated,
      _ => ErrorClass::Fatal,
    }
  }
}

#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ZmqError {
  /// A fatal error reported by the transport, with its numeric code and the
  /// transport-provided message.
  #[error("Transport error {code}: {message}")]
  Transport { code: i32, message: String },

  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String),

  #[error("Invalid endpoint format: {0}")]
  InvalidEndpoint(String),

  /// The operation is not part of the socket's capability set.
  #[error("Operation is invalid for the socket type ({0})")]
  InvalidSocketType(&'static str),

  /// Disposed-object reuse and similar state violations.
  #[error("Operation is invalid for the current state: {0}")]
  InvalidState(&'static str),

  #[error("Invalid value provided for option ID {0}")]
  InvalidOptionValue(i32),
}

impl ZmqError {
  /// The numeric transport code, for `Transport` errors.
  pub fn code(&self) -> Option<i32> {
    match self {
      ZmqError::Transport { code, .. } => Some(*code),
      _ => None,
    }
  }
}
