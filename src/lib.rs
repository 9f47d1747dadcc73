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

//! # Rental Coordinator
//!
//! This library keeps vehicle rentals consistent with vehicle availability:
//! it opens a rental when a vehicle is handed to a customer, and closes it
//! when the vehicle comes back (pricing the rental) or the rental is
//! cancelled.
//!
//! ## Core Components
//!
//! - [`Coordinator`]: The rental state machine and sole writer of rental
//!   status and vehicle availability
//! - [`RentStatus`]: Rental states and their transition table
//! - [`rental_price`]: Per-started-day pricing
//! - [`VehicleStore`], [`CustomerStore`], [`UserStore`], [`RentLedger`]:
//!   Storage collaborators, with in-memory versions in [`MemoryStores`]
//! - [`RentalError`]: Error types for rental failures
//!
//! ## Example
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use rental_coordinator::{
//!     ActorId, Availability, Coordinator, CoordinatorConfig, Customer, CustomerId,
//!     ManualClock, MemoryStores, OpenRental, RentStatus, Vehicle, VehicleId, VehicleStore,
//! };
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let memory = MemoryStores::new();
//! memory.vehicles.save(Vehicle::new(VehicleId(1), dec!(100))).unwrap();
//! memory.customers.insert(Customer::new(CustomerId(1), "Ana"));
//!
//! let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
//! let coordinator = Coordinator::with_clock(memory.stores(), clock.clone(), CoordinatorConfig::default());
//!
//! // Open a rental
//! let request = OpenRental { customer_id: CustomerId(1), vehicle_id: VehicleId(1), notes: String::new() };
//! let rent = coordinator.open_rental(request, ActorId(1)).unwrap();
//! assert_eq!(coordinator.vehicle(VehicleId(1)).unwrap().status, Availability::Rented);
//!
//! // Return it two days later
//! clock.advance(Duration::hours(48));
//! let rent = coordinator.transition_status(rent.id, RentStatus::Completed, None, ActorId(1)).unwrap();
//! assert_eq!(rent.total_price, dec!(200));
//! assert_eq!(coordinator.vehicle(VehicleId(1)).unwrap().status, Availability::Available);
//! ```
//!
//! ## Thread Safety
//!
//! The coordinator serializes operations per vehicle and runs operations on
//! different vehicles in parallel.

pub mod api;
mod base;
mod clock;
mod coordinator;
pub mod error;
mod lock;
mod party;
pub mod pricing;
mod rent;
pub mod seed;
pub mod store;
mod vehicle;
mod view;

pub use base::{ActorId, CustomerId, RentId, VehicleId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use error::{ErrorKind, PersistenceFailure, RentalError, StoreError};
pub use party::{Customer, Role, User};
pub use pricing::{billable_days, rental_price};
pub use rent::{NewRent, OpenRental, Rent, RentStatus, RentUpdate, Transition};
pub use store::{
    CustomerStore, MemoryCustomerStore, MemoryRentLedger, MemoryStores, MemoryUserStore,
    MemoryVehicleStore, RentLedger, Stores, UserStore, VehicleStore,
};
pub use vehicle::{Availability, Vehicle, VehicleKind};
pub use view::RentView;
