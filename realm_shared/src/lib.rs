//! `realm_shared`
//!
//! I/O-free building blocks for the world server.
//!
//! Design goals:
//! - Bit-exact wire encoding, tested in both directions.
//! - No sockets, clocks or global state; the server crate owns those.
//! - Typed errors at every fallible seam.
//! - No `unsafe`.

pub mod config;
pub mod cursor;
pub mod flags;
pub mod login;
pub mod net;
pub mod position;
pub mod registry;
pub mod task;
pub mod text;
pub mod walking;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::cursor::{ReadCursor, WriteCursor};
    pub use crate::flags::UpdateFlags;
    pub use crate::net::*;
    pub use crate::position::*;
    pub use crate::registry::{EntityRegistry, Handle, Indexed};
    pub use crate::task::*;
    pub use crate::walking::WalkingQueue;
}
