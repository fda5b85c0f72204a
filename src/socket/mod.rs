//! Socket handle, socket types, and the option surface.

mod handle;
pub mod options;
pub(crate) mod types;

pub use handle::Socket;
pub use types::SocketType;
