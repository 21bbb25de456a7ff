//! Typed key-value envelope codec used on relay control channels.
//!
//! A *pack* is an unordered mapping from case-insensitive ASCII keys to
//! typed value arrays, serialized big-endian. On the wire a pack is framed
//! with a `u32` payload length and, on control streams, followed by the
//! 20-byte SHA-1 of the payload.
//!
//! The five value types are fixed by the protocol: `u32`, raw data, UTF-8
//! string, "unicode" string, and `u64`. Every key maps to an *array* of
//! values for compatibility with senders that emit arrays; readers here only
//! consume the first element.

mod error;
mod framed;
mod pack;

pub use error::PackError;
pub use framed::{recv_pack, send_pack};
pub use pack::{Pack, Values};
