/// Errors raised while converting values to or from bytes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value's runtime shape cannot be represented by the codec.
    #[error("{codec} serialization failed: {message}")]
    Serialization {
        codec: &'static str,
        message: String,
    },

    /// The bytes could not be coerced into the target type.
    #[error("{codec} deserialization into {target} failed: {message}")]
    Deserialization {
        codec: &'static str,
        target: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, CodecError>;
