//! Three-way result of an existence check.

use crate::Error;

/// Outcome of [`Client::probe`](crate::Client::probe).
///
/// Separates "the store says the object is absent" from "the store could not
/// answer".
#[derive(Debug)]
pub enum Presence {
    /// The object exists.
    Present,
    /// The store reported that the object does not exist.
    Absent,
    /// The check could not complete.
    Unknown(Error),
}

impl Presence {
    /// Returns `true` only for [`Presence::Present`].
    #[inline]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }

    /// Returns `true` only for [`Presence::Absent`].
    #[inline]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Converts into a definite answer, surfacing the error of an unknown result.
    pub fn into_result(self) -> Result<bool, Error> {
        match self {
            Self::Present => Ok(true),
            Self::Absent => Ok(false),
            Self::Unknown(err) => Err(err),
        }
    }
}
