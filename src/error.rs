// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for rental processing.
//!
//! [`RentalError`] is what coordinator callers see. Storage collaborators
//! report [`StoreError`], which the coordinator translates so that raw storage
//! detail never reaches a caller.

use crate::rent::RentStatus;
use crate::vehicle::Availability;
use thiserror::Error;

/// Coarse classification of a [`RentalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced rent, vehicle or customer does not exist.
    NotFound,
    /// Malformed input, such as an unknown status value.
    Validation,
    /// The request is well formed but conflicts with current state.
    Conflict,
    /// Storage was unreachable or timed out. Reads may be retried.
    Persistence,
    /// Stored state contradicts the rental invariants.
    Internal,
}

/// Transient storage failures, safe to report to callers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceFailure {
    #[error("operation timed out")]
    Timeout,

    #[error("storage unavailable")]
    Unavailable,
}

/// Rental processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RentalError {
    /// Referenced rent does not exist
    #[error("rent not found")]
    RentNotFound,

    /// Referenced vehicle does not exist
    #[error("vehicle not found")]
    VehicleNotFound,

    /// Referenced customer does not exist
    #[error("customer not found")]
    CustomerNotFound,

    /// Requested status is not one of `ongoing`, `completed`, `cancelled`
    #[error("invalid status value: {0:?}")]
    InvalidStatusValue(String),

    /// Vehicle cannot be rented or serviced in its current state
    #[error("vehicle is not available (status: {status})")]
    VehicleUnavailable { status: Availability },

    /// Rent is already completed or cancelled
    #[error("cannot change status from {from}")]
    TerminalStateViolation { from: RentStatus },

    /// Storage failed or an operation exceeded its time bound
    #[error("persistence failure: {0}")]
    Persistence(PersistenceFailure),

    /// Rental price exceeds the representable range for the vehicle's rate
    #[error("rental price overflow")]
    PriceOverflow,

    /// Stored state violates a rental invariant
    #[error("inconsistent rental state: {0}")]
    Inconsistency(String),
}

impl RentalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RentNotFound | Self::VehicleNotFound | Self::CustomerNotFound => {
                ErrorKind::NotFound
            }
            Self::InvalidStatusValue(_) => ErrorKind::Validation,
            Self::VehicleUnavailable { .. } | Self::TerminalStateViolation { .. } => {
                ErrorKind::Conflict
            }
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::PriceOverflow | Self::Inconsistency(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` if resending a read that failed with this error may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }
}

impl From<PersistenceFailure> for RentalError {
    fn from(failure: PersistenceFailure) -> Self {
        RentalError::Persistence(failure)
    }
}

/// Errors reported by storage collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with the requested id
    #[error("record not found")]
    NotFound,

    /// Conditional status update found a different status
    #[error("status mismatch (actual: {actual})")]
    StatusMismatch { actual: Availability },

    /// Storage did not answer within its time bound
    #[error("storage timed out")]
    Timeout,

    /// Storage is unreachable or rejected the write
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Translates storage failures that are not domain outcomes.
    ///
    /// `NotFound` and `StatusMismatch` carry domain meaning and are mapped by
    /// the caller; this covers everything else.
    pub(crate) fn into_persistence(self) -> RentalError {
        match self {
            StoreError::Timeout => RentalError::Persistence(PersistenceFailure::Timeout),
            StoreError::Unavailable(detail) => {
                tracing::warn!(%detail, "storage unavailable");
                RentalError::Persistence(PersistenceFailure::Unavailable)
            }
            StoreError::NotFound => RentalError::Inconsistency("record vanished".to_string()),
            StoreError::StatusMismatch { actual } => {
                RentalError::Inconsistency(format!("unexpected vehicle status {actual}"))
            }
        }
    }
}
