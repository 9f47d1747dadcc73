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

//! Denormalized rent representation for callers.

use crate::base::RentId;
use crate::error::{RentalError, StoreError};
use crate::party::{Customer, User};
use crate::rent::{Rent, RentStatus};
use crate::store::Stores;
use crate::vehicle::Vehicle;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A rent with its customer, vehicle and actors resolved.
///
/// Timestamps are rendered as `YYYY-MM-DD HH:MM:SS` (UTC). An absent return
/// date is rendered as an empty string. Actors missing from the user
/// directory are rendered as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentView {
    pub id: RentId,
    pub customer: Customer,
    pub vehicle: Vehicle,
    pub rent_date: String,
    pub return_date: String,
    pub total_price: Decimal,
    pub status: RentStatus,
    pub notes: String,
    pub created_by: Option<User>,
    pub updated_by: Option<User>,
}

impl RentView {
    /// Reads through the stores to build the view. Nothing is cached.
    pub fn resolve(rent: &Rent, stores: &Stores) -> Result<Self, RentalError> {
        let customer = stores
            .customers
            .find_by_id(rent.customer_id)
            .map_err(|err| match err {
                StoreError::NotFound => RentalError::CustomerNotFound,
                other => other.into_persistence(),
            })?;
        let vehicle = stores
            .vehicles
            .find_by_id(rent.vehicle_id)
            .map_err(|err| match err {
                StoreError::NotFound => RentalError::VehicleNotFound,
                other => other.into_persistence(),
            })?;
        let lookup_user = |id| match stores.users.find_by_id(id) {
            Ok(user) => Ok(Some(user)),
            Err(StoreError::NotFound) => Ok(None),
            Err(other) => Err(other.into_persistence()),
        };

        Ok(Self {
            id: rent.id,
            customer,
            vehicle,
            rent_date: format_date(Some(rent.rented_at)),
            return_date: format_date(rent.returned_at),
            total_price: rent.total_price,
            status: rent.status,
            notes: rent.notes.clone(),
            created_by: lookup_user(rent.created_by)?,
            updated_by: lookup_user(rent.updated_by)?,
        })
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}
