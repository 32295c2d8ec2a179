//! Types shared between the pong server and its clients:
//! the wire protocol and the snapshot delta codec.

pub mod delta;
pub mod protocol;
