//! Typed swap events decoded from channel log entries.

mod decoder;
mod types;

pub use decoder::{DecodeError, decode_entry};
pub use types::{SwapEvent, SwapEventBody};
