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

//! Vehicle records and their availability status.

use crate::base::VehicleId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a vehicle can be newly rented.
///
/// `Rented` is only ever set by the coordinator, and holds exactly while one
/// ongoing rent references the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Rented,
    Maintenance,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Rented => "rented",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Availability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "rented" => Ok(Self::Rented),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleKind {
    Car,
    Bike,
}

/// A rentable vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    #[serde(rename = "type")]
    pub kind: VehicleKind,
    pub plate_number: String,
    pub brand: String,
    pub model: String,
    pub year: u16,
    pub price_per_day: Decimal,
    pub status: Availability,
}

impl Vehicle {
    /// Creates an available car with no descriptive attributes.
    pub fn new(id: VehicleId, price_per_day: Decimal) -> Self {
        Self {
            id,
            kind: VehicleKind::Car,
            plate_number: String::new(),
            brand: String::new(),
            model: String::new(),
            year: 0,
            price_per_day,
            status: Availability::Available,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == Availability::Available
    }
}
