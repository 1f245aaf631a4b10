//! RESP (REdis Serialization Protocol) scanning and streaming, the proxy's
//! C1 component.
//!
//! `command_frame` scans complete client commands out of a byte buffer
//! without losing the verbatim bytes needed to forward them upstream.
//! `reply` streams upstream reply frames back to the client one at a time,
//! and writes the handful of replies the proxy synthesizes itself.
//! `parse` is the strict decimal-integer parser shared by both.

pub mod command_frame;
pub mod parse;
pub mod reply;

pub use command_frame::CommandFrame;
