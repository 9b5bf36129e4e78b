//! Length-prefixed message framing.
//!
//! Turns a TCP byte stream into a sequence of discrete messages. Every
//! message is framed with a 4-byte big-endian payload length followed by
//! exactly that many payload bytes:
//!
//! ```text
//! ┌────────────────┬──────────────────┐
//! │ Length (4B BE) │ Payload (Length) │
//! └────────────────┴──────────────────┘
//! ```
//!
//! Decoding never assumes message boundaries align with read boundaries:
//! partial input is left in the buffer until the rest arrives.

pub mod codec;
pub mod error;
pub mod framed;

pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use framed::FrameCodec;
