// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error handling for the device engine and HID++ transport layers.

use std::error::Error as StdError;
use std::fmt::{Display, Formatter};

use thiserror::Error;

/// More convenient alias for `Box<dyn StdError + Send + Sync>`,
/// which shows up in a few signatures and structs.
type BoxedError = Box<dyn StdError + Send + Sync>;

/// Kinds of errors for [Error]. Use [ErrorKind::error] and [ErrorKind::error_from] to generate the
/// [Error] value for this ErrorKind.
#[derive(Debug)]
pub enum ErrorKind
{
    /// Feature, opcode, or capability not present on this device.
    NotSupported(/** what **/ Option<String>),

    /// Device, instance-id, pairing slot, or quirk entry absent.
    NotFound(/** what **/ Option<String>),

    /// Malformed wire data: bad Intel-HEX, bad RDFU magic, CRC mismatch.
    InvalidData(/** why **/ Option<String>),

    /// Malformed quirk file or firmware container.
    InvalidFile(/** why **/ Option<String>),

    /// Underlying IO failure (character device read/write, filesystem).
    Io,

    /// No reply arrived before the deadline.
    TimedOut,

    /// HID++ error frame decoded to "busy".
    Busy,

    /// Pairing or auth mismatch (HID++1.0 `WRONG_PIN`, bad passkey).
    AuthFailed,

    /// Invariant violation. Never swallowed silently.
    Internal(&'static str),

    /// Unhandled external error.
    External(ErrorSource),
}

impl ErrorKind
{
    /// Creates a new [Error] from this error kind.
    #[inline(always)]
    pub fn error(self) -> Error
    {
        Error::new(self, None)
    }

    /// Creates a new [Error] from this error kind, with the passed error as the source.
    #[inline(always)]
    pub fn error_from<E: StdError + Send + Sync + 'static>(self, source: E) -> Error
    {
        Error::new(self, Some(Box::new(source)))
    }
}

impl From<ErrorKind> for Error
{
    fn from(other: ErrorKind) -> Self
    {
        other.error()
    }
}

impl Display for ErrorKind
{
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result
    {
        use ErrorKind::*;
        match self {
            NotSupported(None) => write!(f, "not supported"),
            NotSupported(Some(what)) => write!(f, "not supported: {}", what),
            NotFound(None) => write!(f, "not found"),
            NotFound(Some(what)) => write!(f, "not found: {}", what),
            InvalidData(None) => write!(f, "invalid data"),
            InvalidData(Some(why)) => write!(f, "invalid data: {}", why),
            InvalidFile(None) => write!(f, "invalid file"),
            InvalidFile(Some(why)) => write!(f, "invalid file: {}", why),
            Io => write!(f, "input/output error"),
            TimedOut => write!(f, "timed out waiting for a reply"),
            Busy => write!(f, "device busy"),
            AuthFailed => write!(f, "authentication failed"),
            Internal(why) => write!(f, "internal invariant violation: {}", why),
            External(source) => write!(f, "{}", source),
        }
    }
}

#[derive(Debug)]
/// Error type for device/HID++ operations. Easily constructed from [ErrorKind].
pub struct Error
{
    pub kind: ErrorKind,
    pub source: Option<BoxedError>,

    /// A string for additional context about what was being attempted when this error occurred.
    ///
    /// Example: "reading feature map".
    pub context: Option<String>,
}

impl Error
{
    #[inline(always)]
    pub fn new(kind: ErrorKind, source: Option<BoxedError>) -> Self
    {
        Self {
            kind,
            source,
            context: None,
        }
    }

    /// Add additional context about what was being attempted when this error occurred.
    pub fn with_ctx(mut self, ctx: &str) -> Self
    {
        self.context = Some(ctx.to_string());
        self
    }

    /// Removes previously added context.
    #[allow(dead_code)]
    pub fn without_ctx(mut self) -> Self
    {
        self.context = None;
        self
    }
}

impl Display for Error
{
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result
    {
        if let Some(ctx) = &self.context {
            write!(f, "(while {}): {}", ctx, self.kind)?;
        } else {
            write!(f, "{}", self.kind)?;
        }

        if let Some(source) = &self.source {
            write!(f, "\nCaused by: {}", source)?;
        }

        Ok(())
    }
}

impl StdError for Error
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)>
    {
        self.source.as_deref().map(|e| e as &dyn StdError)
    }
}

impl From<std::io::Error> for Error
{
    fn from(other: std::io::Error) -> Self
    {
        use std::io::ErrorKind as IoKind;
        match other.kind() {
            IoKind::NotFound => ErrorKind::NotFound(None).error_from(other),
            IoKind::TimedOut => ErrorKind::TimedOut.error_from(other),
            _ => ErrorKind::Io.error_from(other),
        }
    }
}

impl From<hidapi::HidError> for Error
{
    fn from(other: hidapi::HidError) -> Self
    {
        ErrorKind::External(ErrorSource::Hid(other)).error()
    }
}

impl From<rusqlite::Error> for Error
{
    fn from(other: rusqlite::Error) -> Self
    {
        ErrorKind::External(ErrorSource::Sqlite(other)).error()
    }
}

impl From<uuid::Error> for Error
{
    fn from(other: uuid::Error) -> Self
    {
        ErrorKind::InvalidData(Some(String::from("malformed GUID string"))).error_from(other)
    }
}

impl From<toml::de::Error> for Error
{
    fn from(other: toml::de::Error) -> Self
    {
        ErrorKind::External(ErrorSource::Toml(other)).error()
    }
}

/// Sources of external error in this library.
#[derive(Debug, Error)]
pub enum ErrorSource
{
    #[error(transparent)]
    StdIo(#[from] std::io::Error),

    #[error(transparent)]
    Hid(#[from] hidapi::HidError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Uuid(#[from] uuid::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// Extension trait to enable getting the error kind from a Result<T, Error> with one method.
pub trait ResErrorKind<T>
{
    type Kind;
    fn err_kind(&self) -> Result<&T, &Self::Kind>;
}

impl<T> ResErrorKind<T> for Result<T, Error>
{
    type Kind = ErrorKind;

    fn err_kind(&self) -> Result<&T, &Self::Kind>
    {
        self.as_ref().map_err(|e| &e.kind)
    }
}


#[macro_export]
macro_rules! log_and_return
{
    ($err:expr) => {
        let err = $err;
        log::error!("{}", err);
        return Err(err);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn context_prefixes_display()
    {
        let err = ErrorKind::NotFound(Some("peripheral".into())).error().with_ctx("probing device");
        let text = err.to_string();
        assert!(text.starts_with("(while probing device):"));
        assert!(text.contains("peripheral"));
    }

    #[test]
    fn err_kind_extracts_kind()
    {
        let result: Result<(), Error> = Err(ErrorKind::Busy.error());
        match result.err_kind() {
            Err(ErrorKind::Busy) => (),
            _ => panic!("expected Busy"),
        }
    }

    #[test]
    fn io_not_found_maps_to_not_found_kind()
    {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let err: Error = io_err.into();
        match err.kind {
            ErrorKind::NotFound(_) => (),
            _ => panic!("expected NotFound"),
        }
    }
}
