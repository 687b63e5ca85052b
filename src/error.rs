//! Defines the load error and its location
use std::fmt;
use std::path::PathBuf;

use saphyr_parser::ScanError;

use crate::budget::BudgetBreach;
use crate::location::Location;

/// Everything that can make a load fail.
///
/// A load is all-or-nothing: whichever variant is returned, the partially populated
/// destination tree has already been released.
#[derive(Debug)]
pub enum Error {
    /// An allocation (destination block, sequence growth or frame stack) could not be made.
    OutOfMemory {
        requested: usize,
    },
    /// The YAML text is malformed (reported by the tokenizer).
    Parser {
        msg: String,
        location: Location,
    },
    /// The event stream ended before the document was complete.
    Eof {
        location: Location,
    },
    /// A structural event arrived where the current state does not allow it.
    UnexpectedEvent {
        found: &'static str,
        expected: String,
        location: Location,
    },
    /// Anchors and aliases (`*ref`) are not supported.
    AliasUnsupported {
        location: Location,
    },
    /// The root schema, or the document root, is not a mapping.
    TopLevelType {
        found: &'static str,
        location: Location,
    },
    /// A mapping key has no matching field in the schema.
    InvalidKey {
        key: String,
        location: Location,
    },
    /// A mapping key occurred twice and the duplicate policy rejects that.
    DuplicateKey {
        key: String,
        location: Location,
    },
    /// A value could not be parsed, is out of range, or has the wrong shape.
    InvalidValue {
        msg: String,
        location: Location,
    },
    /// The schema itself is malformed. Never caused by the document.
    BadTypeInSchema {
        msg: String,
    },
    /// Engine invariant violated (a bug, not bad input).
    Internal {
        msg: &'static str,
        location: Location,
    },
    /// A configured [`crate::Budget`] limit was exceeded.
    Budget {
        breach: BudgetBreach,
        location: Location,
    },
    /// The input file could not be opened.
    FileOpen {
        path: PathBuf,
        cause: std::io::Error,
    },
    /// Reading the input failed part way.
    Io {
        cause: std::io::Error,
    },
    /// The event source could not be set up for this input.
    SourceInit {
        msg: String,
    },
}

impl Error {
    pub(crate) fn invalid_value<S: Into<String>>(msg: S) -> Self {
        Error::InvalidValue {
            msg: msg.into(),
            location: Location::UNKNOWN,
        }
    }

    pub(crate) fn invalid_key<S: Into<String>>(key: S) -> Self {
        Error::InvalidKey {
            key: key.into(),
            location: Location::UNKNOWN,
        }
    }

    pub(crate) fn bad_schema<S: Into<String>>(msg: S) -> Self {
        Error::BadTypeInSchema { msg: msg.into() }
    }

    pub(crate) fn internal(msg: &'static str) -> Self {
        Error::Internal {
            msg,
            location: Location::UNKNOWN,
        }
    }

    pub(crate) fn out_of_memory(requested: usize) -> Self {
        Error::OutOfMemory { requested }
    }

    /// Attach `set_location` to errors that carry one; others are returned unchanged.
    pub(crate) fn with_location(mut self, set_location: Location) -> Self {
        match &mut self {
            Error::Parser { location, .. }
            | Error::Eof { location }
            | Error::UnexpectedEvent { location, .. }
            | Error::AliasUnsupported { location }
            | Error::TopLevelType { location, .. }
            | Error::InvalidKey { location, .. }
            | Error::DuplicateKey { location, .. }
            | Error::InvalidValue { location, .. }
            | Error::Internal { location, .. }
            | Error::Budget { location, .. } => {
                *location = set_location;
            }
            Error::OutOfMemory { .. }
            | Error::BadTypeInSchema { .. }
            | Error::FileOpen { .. }
            | Error::Io { .. }
            | Error::SourceInit { .. } => {}
        }
        self
    }

    /// Source location of the failure, when known.
    pub fn location(&self) -> Option<Location> {
        match self {
            Error::Parser { location, .. }
            | Error::Eof { location }
            | Error::UnexpectedEvent { location, .. }
            | Error::AliasUnsupported { location }
            | Error::TopLevelType { location, .. }
            | Error::InvalidKey { location, .. }
            | Error::DuplicateKey { location, .. }
            | Error::InvalidValue { location, .. }
            | Error::Internal { location, .. }
            | Error::Budget { location, .. } => {
                if location.is_known() {
                    Some(*location)
                } else {
                    None
                }
            }
            Error::OutOfMemory { .. }
            | Error::BadTypeInSchema { .. }
            | Error::FileOpen { .. }
            | Error::Io { .. }
            | Error::SourceInit { .. } => None,
        }
    }

    /// Map a `saphyr_parser::ScanError` into our error type with location.
    pub(crate) fn from_scan_error(err: ScanError) -> Self {
        let mark = err.marker();
        let location = Location::new(mark.line(), mark.col() + 1);
        Error::Parser {
            msg: err.info().to_owned(),
            location,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory { requested } => {
                write!(f, "out of memory allocating {requested} bytes")
            }
            Error::Parser { msg, location } => fmt_with_location(f, msg, location),
            Error::Eof { location } => fmt_with_location(f, "unexpected end of input", location),
            Error::UnexpectedEvent {
                found,
                expected,
                location,
            } => fmt_with_location(
                f,
                &format!("unexpected event {found}: expected {expected}"),
                location,
            ),
            Error::AliasUnsupported { location } => {
                fmt_with_location(f, "aliases are not supported", location)
            }
            Error::TopLevelType { found, location } => fmt_with_location(
                f,
                &format!("top level must be a mapping, found {found}"),
                location,
            ),
            Error::InvalidKey { key, location } => {
                fmt_with_location(f, &format!("invalid key: {key}"), location)
            }
            Error::DuplicateKey { key, location } => {
                fmt_with_location(f, &format!("duplicate mapping key: {key}"), location)
            }
            Error::InvalidValue { msg, location } => {
                fmt_with_location(f, &format!("invalid value: {msg}"), location)
            }
            Error::BadTypeInSchema { msg } => write!(f, "bad type in schema: {msg}"),
            Error::Internal { msg, location } => {
                fmt_with_location(f, &format!("internal error: {msg}"), location)
            }
            Error::Budget { breach, location } => fmt_with_location(
                f,
                &format!("YAML budget exceeded: {breach}"),
                location,
            ),
            Error::FileOpen { path, cause } => {
                write!(f, "failed to open {}: {cause}", path.display())
            }
            Error::Io { cause } => write!(f, "I/O error: {cause}"),
            Error::SourceInit { msg } => write!(f, "cannot initialise YAML parser: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FileOpen { cause, .. } | Error::Io { cause } => Some(cause),
            _ => None,
        }
    }
}

fn fmt_with_location(f: &mut fmt::Formatter<'_>, msg: &str, location: &Location) -> fmt::Result {
    if location.is_known() {
        write!(
            f,
            "{msg} at line {}, column {}",
            location.line, location.column
        )
    } else {
        write!(f, "{msg}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_when_known() {
        let err = Error::invalid_key("tag").with_location(Location::new(2, 5));
        assert_eq!(err.to_string(), "invalid key: tag at line 2, column 5");
        assert_eq!(err.location(), Some(Location::new(2, 5)));
    }

    #[test]
    fn display_omits_unknown_location() {
        let err = Error::invalid_value("out of range");
        assert_eq!(err.to_string(), "invalid value: out of range");
        assert_eq!(err.location(), None);
    }

    #[test]
    fn schema_errors_ignore_location() {
        let err = Error::bad_schema("int width 9").with_location(Location::new(1, 1));
        assert!(err.location().is_none());
        assert_eq!(err.to_string(), "bad type in schema: int width 9");
    }
}
