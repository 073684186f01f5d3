//! Error types.
use std::io;

/// Failures while loading, decoding or scanning inputs.
///
/// Programming errors (fingerprints of different lengths, grids of the wrong size) are not
/// represented here; those panic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hasher or scan configuration, or invalid command-line arguments.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A file or directory could not be opened, read or written.
    #[error("cannot access {subject}: {source}")]
    Io {
        subject: String,
        #[source]
        source: io::Error,
    },

    /// An image could not be decoded or encoded.
    #[error("cannot decode {subject}: {source}")]
    Decode {
        subject: String,
        #[source]
        source: image::ImageError,
    },

    /// An image whose channel layout is neither grayscale nor 3-channel color.
    #[error("unsupported pixel format in {subject}: {channels} channels (expected 1 or 3)")]
    UnsupportedFormat { subject: String, channels: u8 },

    /// The video decoder could not be started or produced a broken stream.
    #[error("video {subject}: {message}")]
    Video { subject: String, message: String },
}

impl Error {
    pub(crate) fn io(subject: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            subject: subject.into(),
            source,
        }
    }

    pub(crate) fn video(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Video {
            subject: subject.into(),
            message: message.into(),
        }
    }
}

/// Failure to parse a [`Fingerprint`](crate::Fingerprint) from one of its text encodings.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A bit string contained something other than `'0'` or `'1'`.
    #[error("invalid character {character:?} at index {index} in bit string")]
    InvalidCharacter { index: usize, character: char },

    /// The input was not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes do not describe a fingerprint.
    #[error("malformed fingerprint bytes: {0}")]
    Malformed(&'static str),
}
