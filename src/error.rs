//! Error taxonomy shared by the georeference and block I/O
//! halves of the crate.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid caller input.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Object-state misuse.
    #[error("logic error: {0}")]
    Logic(String),

    /// The backend store could not be opened, parsed or
    /// written. Carries the backend's diagnostic text.
    #[error("i/o error: {0}")]
    Io(String),

    /// Projection context could not be constructed or
    /// applied.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Unsupported combination requested.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wraps a backend failure (with its full context chain)
    /// as an [`Error::Io`].
    pub(crate) fn backend(what: &str, err: anyhow::Error) -> Self {
        Error::Io(format!("{}:\n\t{:#}", what, err))
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Error::Argument(format!("buffer shape: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn backend_errors_keep_diagnostic_chain() {
        let err: anyhow::Result<()> = Err(anyhow!("bad magic number"));
        let err = err.context("reading header").unwrap_err();
        let err = Error::backend("could not open foo.tif", err);

        match &err {
            Error::Io(msg) => {
                assert!(msg.contains("foo.tif"));
                assert!(msg.contains("reading header"));
                assert!(msg.contains("bad magic number"));
            }
            other => panic!("unexpected error kind: {:?}", other),
        }
    }

    #[test]
    fn shape_errors_are_argument_errors() {
        let err = ndarray::Array2::<f32>::from_shape_vec((2, 2), vec![0.; 3]).unwrap_err();
        assert!(matches!(Error::from(err), Error::Argument(_)));
    }
}
