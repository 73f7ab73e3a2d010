//! Error types for the protocol layer.
//!
//! Each crate in Skirmish defines its own error enum. A `ProtocolError`
//! always means the bytes or a wire value were bad, never that a session
//! rule was broken.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `type` tag, missing
    /// required fields, or truncated frames.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A join code that is not exactly six ASCII digits in
    /// `100000..=999999`.
    #[error("invalid join code: {0:?}")]
    InvalidJoinCode(String),
}
