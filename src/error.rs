//! Error types for fanmap.
//!
//! [`Error`] is a single failure; [`Errors`] is the aggregate every engine
//! returns alongside its (possibly partial) results.

use std::fmt;
use std::ops::Deref;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to map \"{item}\": {source}")]
    Item {
        item: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("context errored before mapping \"{item}\"")]
    CancelledBeforeDispatch { item: String },

    #[error("context timeout before mapping \"{item}\"")]
    AdmissionTimeout { item: String },

    #[error("failed to map \"{item}\": result index {index} out of range")]
    IndexOutOfRange { item: String, index: usize },

    #[error("task mapping \"{item}\" panicked: {reason}")]
    Panicked { item: String, reason: String },

    #[error(transparent)]
    Operation(anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for failures synthesized because the token fired, as opposed to
    /// failures of the work itself.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Error::CancelledBeforeDispatch { .. } | Error::AdmissionTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Independent failures collected during one engine call, in the order they
/// were recorded.
///
/// An empty `Errors` means nothing failed. Rendering joins the member messages
/// with `", "`.
#[derive(Debug, Default)]
pub struct Errors(Vec<Error>);

impl Errors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    /// `Ok(())` when empty, otherwise the aggregate itself.
    pub fn into_result(self) -> std::result::Result<(), Errors> {
        if self.0.is_empty() { Ok(()) } else { Err(self) }
    }

    pub fn into_vec(self) -> Vec<Error> {
        self.0
    }
}

impl Deref for Errors {
    type Target = [Error];

    fn deref(&self) -> &[Error] {
        &self.0
    }
}

impl From<Vec<Error>> for Errors {
    fn from(errs: Vec<Error>) -> Self {
        Self(errs)
    }
}

impl Extend<Error> for Errors {
    fn extend<I: IntoIterator<Item = Error>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Errors {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a Error;
    type IntoIter = std::slice::Iter<'a, Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}
