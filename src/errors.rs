use crate::container::FormatError;
use std::fmt;
use std::path::{Path, PathBuf};

/// An error that can occur when extracting or writing companion data
#[derive(Debug)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Error(Box::new(kind))
    }

    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Error {
        Error::new(ErrorKind::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }

    /// Return the specific type of error
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Consumes the error, returning its kind
    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// The file path involved in the failure (if available)
    pub fn path(&self) -> Option<&Path> {
        match *self.0 {
            ErrorKind::Io { ref path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Specific type of error
#[derive(Debug)]
pub enum ErrorKind {
    /// The container or its metadata section is malformed or unsupported
    Format(FormatError),

    /// Reading or writing a file failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The bundled schema template did not produce the expected reference
    /// data
    Schema(String),

    /// The database rejected a statement
    Database(rusqlite::Error),

    /// The vocabulary could not be compiled into a pattern
    Pattern(regex::Error),

    /// The vocabulary document is not valid
    #[cfg(feature = "json")]
    Vocabulary(serde_json::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self.0 {
            ErrorKind::Format(ref err) => Some(err),
            ErrorKind::Io { ref source, .. } => Some(source),
            ErrorKind::Database(ref err) => Some(err),
            ErrorKind::Pattern(ref err) => Some(err),
            #[cfg(feature = "json")]
            ErrorKind::Vocabulary(ref err) => Some(err),
            ErrorKind::Schema(_) => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self.0 {
            ErrorKind::Format(ref err) => write!(f, "format error: {}", err),
            ErrorKind::Io { ref path, ref source } => {
                write!(f, "io error at {}: {}", path.display(), source)
            }
            ErrorKind::Schema(ref msg) => write!(f, "schema error: {}", msg),
            ErrorKind::Database(ref err) => write!(f, "database error: {}", err),
            ErrorKind::Pattern(ref err) => write!(f, "unable to compile vocabulary: {}", err),
            #[cfg(feature = "json")]
            ErrorKind::Vocabulary(ref err) => write!(f, "invalid vocabulary: {}", err),
        }
    }
}

impl From<FormatError> for Error {
    fn from(error: FormatError) -> Self {
        Error::new(ErrorKind::Format(error))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        Error::new(ErrorKind::Database(error))
    }
}

impl From<regex::Error> for Error {
    fn from(error: regex::Error) -> Self {
        Error::new(ErrorKind::Pattern(error))
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::new(ErrorKind::Vocabulary(error))
    }
}
