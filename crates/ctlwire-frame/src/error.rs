/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes are available than a header, prefix or field requires.
    #[error("truncated frame data (needed {needed} bytes, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// A string field is not valid UTF-8.
    #[error("field `{field}` is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    /// The header's declared body length disagrees with the body.
    #[error("body length mismatch (header declares {declared}, body has {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// The body exceeds the configured maximum size.
    #[error("body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: usize, max: usize },

    /// A variable-length field does not fit its 32-bit length prefix.
    #[error("field `{field}` too long for a 32-bit length prefix ({len} bytes)")]
    FieldTooLong { field: &'static str, len: usize },

    /// Bytes remain after the last body field.
    #[error("{count} unexpected trailing bytes after body")]
    TrailingBytes { count: usize },

    /// The metadata block carries a version this codec does not understand.
    #[error("unsupported metadata encoding version {0}")]
    UnsupportedMetadataVersion(u32),

    /// The metadata block names the same key more than once.
    #[error("duplicate metadata key `{0}`")]
    DuplicateMetadataKey(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the error is a read/write deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
