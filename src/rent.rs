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

//! Rent records and their status state machine.
//!
//! ```text
//!                 ┌──complete──► Completed (priced, returned, vehicle released)
//!  Ongoing ───────┤
//!                 └──cancel────► Cancelled (no charge, vehicle released)
//! ```
//!
//! `Completed` and `Cancelled` are terminal. Every move out of them is
//! rejected, including re-submitting the same terminal status.

use crate::RentalError;
use crate::base::{ActorId, CustomerId, RentId, VehicleId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentStatus {
    Ongoing,
    Completed,
    Cancelled,
}

/// The effect a validated status change has on the rent and its vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `ongoing → ongoing`: status untouched, vehicle untouched.
    Unchanged,
    /// `ongoing → completed`: price the rental and release the vehicle.
    Complete,
    /// `ongoing → cancelled`: release the vehicle without charge.
    Cancel,
}

impl RentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Validates a move from `self` to `to`.
    ///
    /// # Errors
    ///
    /// [`RentalError::TerminalStateViolation`] when `self` is terminal.
    pub fn transition(self, to: RentStatus) -> Result<Transition, RentalError> {
        match (self, to) {
            (Self::Ongoing, Self::Ongoing) => Ok(Transition::Unchanged),
            (Self::Ongoing, Self::Completed) => Ok(Transition::Complete),
            (Self::Ongoing, Self::Cancelled) => Ok(Transition::Cancel),
            (Self::Completed | Self::Cancelled, _) => {
                Err(RentalError::TerminalStateViolation { from: self })
            }
        }
    }
}

impl fmt::Display for RentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RentStatus {
    type Err = RentalError;

    /// Parses the exact lowercase wire values.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(RentalError::InvalidStatusValue(other.to_string())),
        }
    }
}

/// A rental of one vehicle to one customer.
///
/// # Invariants
///
/// - `returned_at` is `Some` iff `status` is `Completed`.
/// - `total_price` is non-zero only when `status` is `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rent {
    pub id: RentId,
    pub customer_id: CustomerId,
    pub vehicle_id: VehicleId,
    pub rented_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub total_price: Decimal,
    pub status: RentStatus,
    pub notes: String,
    pub created_by: ActorId,
    pub updated_by: ActorId,
}

impl Rent {
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// A rent that has not yet been assigned an id by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRent {
    pub customer_id: CustomerId,
    pub vehicle_id: VehicleId,
    pub rented_at: DateTime<Utc>,
    pub notes: String,
    pub created_by: ActorId,
}

impl NewRent {
    /// Materializes the ongoing rent once the ledger has chosen its id.
    pub fn into_rent(self, id: RentId) -> Rent {
        Rent {
            id,
            customer_id: self.customer_id,
            vehicle_id: self.vehicle_id,
            rented_at: self.rented_at,
            returned_at: None,
            total_price: Decimal::ZERO,
            status: RentStatus::Ongoing,
            notes: self.notes,
            created_by: self.created_by,
            updated_by: self.created_by,
        }
    }
}

/// Request to open a rental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRental {
    pub customer_id: CustomerId,
    pub vehicle_id: VehicleId,
    #[serde(default)]
    pub notes: String,
}

/// Partial update of a rent. Absent fields are left untouched.
///
/// The status stays a raw string so that an unknown value is reported only
/// after the rent itself has been resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}
