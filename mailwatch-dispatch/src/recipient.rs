use std::fmt;

use crate::{error::RecipientError, source::Candidate};

/// Syntactic sanity check, deliberately far looser than RFC 5322: there must
/// be an `@`, and a `.` somewhere after the first `@`.
///
/// Control characters are never accepted. A quoted CSV field may span lines,
/// and a line break inside an address would end the SMTP command early.
#[must_use]
pub fn is_valid_address(candidate: &str) -> bool {
    !candidate.chars().any(char::is_control)
        && candidate
            .split_once('@')
            .is_some_and(|(_, domain)| domain.contains('.'))
}

/// An address that passed [`is_valid_address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    address: String,
    row: usize,
}

impl Recipient {
    /// # Errors
    ///
    /// [`RecipientError::InvalidAddress`] if the candidate fails validation.
    pub fn parse(candidate: Candidate) -> Result<Self, RecipientError> {
        if is_valid_address(&candidate.address) {
            Ok(Self {
                address: candidate.address,
                row: candidate.row,
            })
        } else {
            Err(RecipientError::InvalidAddress {
                address: candidate.address,
                row: candidate.row,
            })
        }
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Line of the recipient source this address was read from.
    #[must_use]
    pub const fn row(&self) -> usize {
        self.row
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}
