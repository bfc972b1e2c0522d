use std::{error, fmt, io, path::Path, path::PathBuf, result};

#[derive(Debug)]
enum ErrorKind {
    Open { path: PathBuf, err: io::Error },
    Map { reason: &'static str },
}

/// Error surfaced when opening an input for parsing.
///
/// Parsing itself never fails: every byte stream parses to some sequence
/// of rows, and read errors at fill time are treated as end of input.
#[derive(Debug)]
pub struct Error(ErrorKind);

impl Error {
    pub(crate) fn open(path: &Path, err: io::Error) -> Self {
        Self(ErrorKind::Open {
            path: path.to_path_buf(),
            err,
        })
    }

    pub(crate) fn map(reason: &'static str) -> Self {
        Self(ErrorKind::Map { reason })
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        Self::new(io::ErrorKind::Other, err)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.0 {
            ErrorKind::Open { err, .. } => Some(err),
            ErrorKind::Map { .. } => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0 {
            ErrorKind::Open { path, err } => write!(f, "{}: {}", path.display(), err),
            ErrorKind::Map { reason } => write!(f, "mmap: {}", reason),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
