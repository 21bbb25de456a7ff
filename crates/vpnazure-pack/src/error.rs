//! Pack codec error type.

/// Errors produced by the pack codec and framed transport.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Structurally invalid pack: truncated field, bad key length,
    /// unknown type tag.
    #[error("malformed pack")]
    Malformed,
    /// Framed payload length exceeds the protocol cap.
    #[error("pack size too large")]
    TooLarge,
    /// The SHA-1 trailer did not match the payload.
    #[error("invalid checksum")]
    ChecksumMismatch,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
