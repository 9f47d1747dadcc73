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

//! CSV loaders for the records the coordinator consumes but does not own.
//!
//! Malformed rows are skipped and logged; they do not stop loading.
//!
//! # CSV Formats
//!
//! ```csv
//! id,type,plate_number,brand,model,year,price_per_day,status
//! 1,car,B 1234 XY,Toyota,Avanza,2021,350000,available
//! ```
//!
//! ```csv
//! id,name,phone,email,address,id_card
//! 1,Ana,+62811000,ana@example.com,Jl. Merdeka 1,3174000000000001
//! ```
//!
//! ```csv
//! id,name,username,role
//! 1,Front Desk,desk,staff
//! ```

use crate::base::{ActorId, CustomerId, VehicleId};
use crate::party::{Customer, Role, User};
use crate::store::{MemoryCustomerStore, MemoryUserStore, VehicleStore};
use crate::vehicle::{Availability, Vehicle, VehicleKind};
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use tracing::warn;

/// Outcome of loading one CSV source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct VehicleRecord {
    id: u32,
    #[serde(rename = "type")]
    kind: VehicleKind,
    plate_number: String,
    brand: String,
    model: String,
    year: u16,
    price_per_day: Decimal,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    status: Option<Availability>,
}

impl VehicleRecord {
    /// Returns `None` for records that cannot be loaded as-is.
    ///
    /// A vehicle can only become `rented` through a rental, so seeding one in
    /// that state is refused.
    fn into_vehicle(self) -> Option<Vehicle> {
        if self.price_per_day < Decimal::ZERO {
            return None;
        }
        let status = self.status.unwrap_or(Availability::Available);
        if status == Availability::Rented {
            return None;
        }
        Some(Vehicle {
            id: VehicleId(self.id),
            kind: self.kind,
            plate_number: self.plate_number,
            brand: self.brand,
            model: self.model,
            year: self.year,
            price_per_day: self.price_per_day,
            status,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CustomerRecord {
    id: u32,
    name: String,
    phone: String,
    email: String,
    address: String,
    id_card: String,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: u32,
    name: String,
    username: String,
    role: Role,
}

fn reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader)
}

/// Loads vehicles into `store`.
///
/// # Errors
///
/// Returns a CSV error if the header cannot be read.
pub fn load_vehicles<R: Read>(
    source: R,
    store: &dyn VehicleStore,
) -> Result<SeedReport, csv::Error> {
    let mut rdr = reader(source);
    rdr.headers()?;
    let mut report = SeedReport::default();

    for result in rdr.deserialize::<VehicleRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping malformed vehicle row");
                report.skipped += 1;
                continue;
            }
        };
        let id = record.id;
        let Some(vehicle) = record.into_vehicle() else {
            warn!(vehicle_id = id, "skipping vehicle with negative price or rented status");
            report.skipped += 1;
            continue;
        };
        match store.save(vehicle) {
            Ok(()) => report.loaded += 1,
            Err(e) => {
                warn!(vehicle_id = id, error = %e, "failed to store vehicle");
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

/// Loads customers into `store`.
pub fn load_customers<R: Read>(
    source: R,
    store: &MemoryCustomerStore,
) -> Result<SeedReport, csv::Error> {
    let mut rdr = reader(source);
    rdr.headers()?;
    let mut report = SeedReport::default();

    for result in rdr.deserialize::<CustomerRecord>() {
        match result {
            Ok(record) => {
                store.insert(Customer {
                    id: CustomerId(record.id),
                    name: record.name,
                    phone: record.phone,
                    email: record.email,
                    address: record.address,
                    id_card: record.id_card,
                });
                report.loaded += 1;
            }
            Err(e) => {
                warn!(error = %e, "skipping malformed customer row");
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

/// Loads staff users into `store`.
pub fn load_users<R: Read>(source: R, store: &MemoryUserStore) -> Result<SeedReport, csv::Error> {
    let mut rdr = reader(source);
    rdr.headers()?;
    let mut report = SeedReport::default();

    for result in rdr.deserialize::<UserRecord>() {
        match result {
            Ok(record) => {
                store.insert(User {
                    id: ActorId(record.id),
                    name: record.name,
                    username: record.username,
                    role: record.role,
                });
                report.loaded += 1;
            }
            Err(e) => {
                warn!(error = %e, "skipping malformed user row");
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}
