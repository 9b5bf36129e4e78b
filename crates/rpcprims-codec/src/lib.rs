//! Pluggable object serialization.
//!
//! A [`Codec`] turns any `serde` type into bytes and back. The schema is the
//! type's own derived structure, so deserialization builds a fresh instance
//! of the target type without positional field values. Both ends of a
//! connection must agree on the codec; the target type is always known to
//! the caller (requests flow as one type, responses as another).

pub mod codec;
pub mod error;

pub use codec::Codec;
pub use error::{CodecError, Result};
