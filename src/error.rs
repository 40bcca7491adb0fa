
//! Error type for everything that can go wrong while reading an x3f file.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::io::ErrorKind;

/// A result that may contain an x3f error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains an x3f error.
pub type UnitResult = Result<()>;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;

/// An error that may happen while reading an x3f file.
/// Each variant describes one kind of file defect,
/// so that the consumer can react to each error kind on its own.
#[derive(Debug)]
pub enum Error {

    /// The input ended before the structure that was being read was complete.
    TruncatedInput(Cow<'static, str>),

    /// The file starts with the wrong magic bytes or contains
    /// impossible values in its main header.
    MalformedHeader(Cow<'static, str>),

    /// The file declares a major format version this crate does not know.
    UnsupportedVersion(u32),

    /// A directory entry or section contains inconsistent sizes,
    /// overlapping offsets, or out-of-bounds indices.
    MalformedSection(Cow<'static, str>),

    /// A huffman coding table contains a duplicate code
    /// or an impossible code length.
    MalformedTable(Cow<'static, str>),

    /// A compressed bit stream ended before
    /// the expected number of symbols was decoded.
    UnexpectedEndOfStream(Cow<'static, str>),

    /// Decrypting or decompressing a camf section
    /// produced a different number of bytes than the section declared.
    CipherInconsistency(Cow<'static, str>),

    /// A property list string is not terminated or not valid utf16.
    MalformedProperty(Cow<'static, str>),

    /// A camf entry declares dimensions or offsets
    /// that do not match its payload.
    MalformedCamfEntry(Cow<'static, str>),

    /// The underlying byte source reported an error
    /// that was not a simple end-of-input condition.
    Io(IoError),
}

impl Error {

    /// Create an error of the variant `TruncatedInput`.
    pub(crate) fn truncated(message: impl Into<Cow<'static, str>>) -> Self {
        Error::TruncatedInput(message.into())
    }

    /// Create an error of the variant `MalformedHeader`.
    pub(crate) fn header(message: impl Into<Cow<'static, str>>) -> Self {
        Error::MalformedHeader(message.into())
    }

    /// Create an error of the variant `MalformedSection`.
    pub(crate) fn section(message: impl Into<Cow<'static, str>>) -> Self {
        Error::MalformedSection(message.into())
    }

    /// Create an error of the variant `MalformedTable`.
    pub(crate) fn table(message: impl Into<Cow<'static, str>>) -> Self {
        Error::MalformedTable(message.into())
    }

    /// Create an error of the variant `UnexpectedEndOfStream`.
    pub(crate) fn end_of_stream(message: impl Into<Cow<'static, str>>) -> Self {
        Error::UnexpectedEndOfStream(message.into())
    }

    /// Create an error of the variant `CipherInconsistency`.
    pub(crate) fn cipher(message: impl Into<Cow<'static, str>>) -> Self {
        Error::CipherInconsistency(message.into())
    }

    /// Create an error of the variant `MalformedProperty`.
    pub(crate) fn property(message: impl Into<Cow<'static, str>>) -> Self {
        Error::MalformedProperty(message.into())
    }

    /// Create an error of the variant `MalformedCamfEntry`.
    pub(crate) fn camf_entry(message: impl Into<Cow<'static, str>>) -> Self {
        Error::MalformedCamfEntry(message.into())
    }
}

/// Enable using the `?` operator on `io::Result`.
/// An unexpected end of the byte source is a property of the file,
/// not of the machine, and therefore becomes `TruncatedInput`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        if error.kind() == ErrorKind::UnexpectedEof {
            Error::truncated("unexpected end of input")
        }
        else {
            Error::Io(error)
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TruncatedInput(message) => write!(formatter, "truncated input: {}", message),
            Error::MalformedHeader(message) => write!(formatter, "malformed header: {}", message),
            Error::UnsupportedVersion(version) => write!(
                formatter, "unsupported file format version {}.{}",
                version >> 16, version & 0xffff
            ),
            Error::MalformedSection(message) => write!(formatter, "malformed section: {}", message),
            Error::MalformedTable(message) => write!(formatter, "malformed huffman table: {}", message),
            Error::UnexpectedEndOfStream(message) => write!(formatter, "unexpected end of bit stream: {}", message),
            Error::CipherInconsistency(message) => write!(formatter, "camf decoding inconsistency: {}", message),
            Error::MalformedProperty(message) => write!(formatter, "malformed property list: {}", message),
            Error::MalformedCamfEntry(message) => write!(formatter, "malformed camf entry: {}", message),
            Error::Io(error) => write!(formatter, "io error: {}", error),
        }
    }
}
