pub mod error;
pub mod events;
pub mod geometry;
pub mod io;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod source;
pub mod tracker;
pub mod viewport;

#[cfg(test)]
mod testing;

pub use error::{ArError, ArResult, DatabaseError};
pub use runtime::RuntimeContext;
pub use session::{Frame, FrameControl, Session, SessionHandle, SessionOptions};
