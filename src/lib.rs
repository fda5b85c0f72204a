//! A blocking, thread-oriented messaging library in the ZeroMQ style.
//!
//! The crate layers a safe, typed API over a pluggable transport binding:
//! a [`Context`] hands out pattern-typed [`Socket`]s, a [`PollSet`]
//! multiplexes readiness over many sockets, and [`Device`]s relay messages
//! between two sockets on a dedicated thread.
//!
//! Blocking calls cooperate with shutdown instead of failing: terminating a
//! context makes them return an `Interrupted` outcome, and timeouts are
//! emulated with non-blocking retries so `recv_timeout`/`send_timeout` work
//! uniformly across bindings.
//!
//! The default binding is the bundled in-process transport (feature
//! `inproc`, enabled by default); an alternative binding is installed with
//! [`register_default_transport`] or per context via
//! [`Context::with_transport`].
//!
//! ```no_run
//! use zsock::{Context, SocketType};
//!
//! fn main() -> Result<(), zsock::ZmqError> {
//!   let context = Context::new()?;
//!   let server = context.socket(SocketType::Pair)?;
//!   let client = context.socket(SocketType::Pair)?;
//!   server.bind("inproc://greeting")?;
//!   client.connect("inproc://greeting")?;
//!
//!   client.send(b"hello")?;
//!   let message = server.recv()?;
//!   assert_eq!(message.data(), b"hello");
//!   Ok(())
//! }
//! ```

pub mod context;
pub mod device;
pub mod error;
pub mod message;
pub mod poll;
pub mod socket;
pub mod transport;

pub use context::Context;
pub use device::{Device, DeviceMonitor, DeviceSetup, ThreadedDevice, POLLING_INTERVAL};
pub use error::{ErrorClass, ZmqError};
pub use message::{ReceiveResult, ReceivedMessage, SendResult, SocketFlags};
pub use poll::{PollEvents, PollItem, PollSet};
pub use socket::{Socket, SocketType};
pub use transport::{register_default_transport, TransportContext};

/// The crate version as a `(major, minor, patch)` triple.
pub fn version() -> (u32, u32, u32) {
  let parse = |s: &str| s.parse().unwrap_or(0);
  (
    parse(env!("CARGO_PKG_VERSION_MAJOR")),
    parse(env!("CARGO_PKG_VERSION_MINOR")),
    parse(env!("CARGO_PKG_VERSION_PATCH")),
  )
}
