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

//! Storage collaborators consumed by the coordinator, and in-memory versions.
//!
//! The coordinator only needs load-by-id, save, and an atomic conditional
//! update of a vehicle's availability. Any backend offering those can stand in
//! for the in-memory stores defined here.

use crate::base::{ActorId, CustomerId, RentId, VehicleId};
use crate::error::StoreError;
use crate::party::{Customer, User};
use crate::rent::{NewRent, Rent};
use crate::vehicle::{Availability, Vehicle};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub trait VehicleStore: Send + Sync {
    fn find_by_id(&self, id: VehicleId) -> Result<Vehicle, StoreError>;

    /// Inserts or replaces a vehicle.
    fn save(&self, vehicle: Vehicle) -> Result<(), StoreError>;

    /// Atomically sets the status to `new` if it currently equals `expected`.
    ///
    /// Returns the vehicle as it is after the update.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] - No vehicle with this id.
    /// - [`StoreError::StatusMismatch`] - Current status differs from `expected`;
    ///   nothing was written.
    fn compare_and_set_status(
        &self,
        id: VehicleId,
        expected: Availability,
        new: Availability,
    ) -> Result<Vehicle, StoreError>;

    /// All vehicles, ordered by id.
    fn all(&self) -> Result<Vec<Vehicle>, StoreError>;
}

pub trait CustomerStore: Send + Sync {
    fn find_by_id(&self, id: CustomerId) -> Result<Customer, StoreError>;
}

pub trait UserStore: Send + Sync {
    fn find_by_id(&self, id: ActorId) -> Result<User, StoreError>;
}

/// Append/amend storage for rent records. Records are never deleted.
pub trait RentLedger: Send + Sync {
    /// Assigns the next id and stores the rent as ongoing.
    fn insert(&self, rent: NewRent) -> Result<Rent, StoreError>;

    fn find_by_id(&self, id: RentId) -> Result<Rent, StoreError>;

    /// Replaces an existing rent record.
    fn update(&self, rent: Rent) -> Result<(), StoreError>;

    /// All rents, ordered by id.
    fn all(&self) -> Result<Vec<Rent>, StoreError>;
}

/// The set of collaborators a coordinator is wired to.
#[derive(Clone)]
pub struct Stores {
    pub vehicles: Arc<dyn VehicleStore>,
    pub customers: Arc<dyn CustomerStore>,
    pub users: Arc<dyn UserStore>,
    pub rents: Arc<dyn RentLedger>,
}

// === In-memory implementations ===

#[derive(Debug, Default)]
pub struct MemoryVehicleStore {
    vehicles: DashMap<VehicleId, Vehicle>,
}

impl MemoryVehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

impl VehicleStore for MemoryVehicleStore {
    fn find_by_id(&self, id: VehicleId) -> Result<Vehicle, StoreError> {
        self.vehicles
            .get(&id)
            .map(|vehicle| vehicle.clone())
            .ok_or(StoreError::NotFound)
    }

    fn save(&self, vehicle: Vehicle) -> Result<(), StoreError> {
        self.vehicles.insert(vehicle.id, vehicle);
        Ok(())
    }

    fn compare_and_set_status(
        &self,
        id: VehicleId,
        expected: Availability,
        new: Availability,
    ) -> Result<Vehicle, StoreError> {
        // The shard write lock is held for the whole read-compare-write.
        let mut vehicle = self.vehicles.get_mut(&id).ok_or(StoreError::NotFound)?;
        if vehicle.status != expected {
            return Err(StoreError::StatusMismatch {
                actual: vehicle.status,
            });
        }
        vehicle.status = new;
        Ok(vehicle.clone())
    }

    fn all(&self) -> Result<Vec<Vehicle>, StoreError> {
        let mut vehicles: Vec<Vehicle> = self.vehicles.iter().map(|v| v.clone()).collect();
        vehicles.sort_by_key(|v| v.id);
        Ok(vehicles)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCustomerStore {
    customers: DashMap<CustomerId, Customer>,
}

impl MemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }
}

impl CustomerStore for MemoryCustomerStore {
    fn find_by_id(&self, id: CustomerId) -> Result<Customer, StoreError> {
        self.customers
            .get(&id)
            .map(|customer| customer.clone())
            .ok_or(StoreError::NotFound)
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<ActorId, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserStore for MemoryUserStore {
    fn find_by_id(&self, id: ActorId) -> Result<User, StoreError> {
        self.users
            .get(&id)
            .map(|user| user.clone())
            .ok_or(StoreError::NotFound)
    }
}

/// Rent ledger backed by a [`DashMap`], with ids drawn from an atomic counter.
#[derive(Debug)]
pub struct MemoryRentLedger {
    rents: DashMap<RentId, Rent>,
    next_id: AtomicU32,
}

impl MemoryRentLedger {
    pub fn new() -> Self {
        Self {
            rents: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.rents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rents.is_empty()
    }
}

impl Default for MemoryRentLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl RentLedger for MemoryRentLedger {
    fn insert(&self, rent: NewRent) -> Result<Rent, StoreError> {
        let id = RentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let rent = rent.into_rent(id);

        // Entry API keeps the uniqueness check and the insert atomic.
        match self.rents.entry(id) {
            Entry::Occupied(_) => Err(StoreError::Unavailable(format!(
                "rent id {id} already allocated"
            ))),
            Entry::Vacant(entry) => {
                entry.insert(rent.clone());
                Ok(rent)
            }
        }
    }

    fn find_by_id(&self, id: RentId) -> Result<Rent, StoreError> {
        self.rents
            .get(&id)
            .map(|rent| rent.clone())
            .ok_or(StoreError::NotFound)
    }

    fn update(&self, rent: Rent) -> Result<(), StoreError> {
        let mut stored = self.rents.get_mut(&rent.id).ok_or(StoreError::NotFound)?;
        *stored = rent;
        Ok(())
    }

    fn all(&self) -> Result<Vec<Rent>, StoreError> {
        let mut rents: Vec<Rent> = self.rents.iter().map(|r| r.clone()).collect();
        rents.sort_by_key(|r| r.id);
        Ok(rents)
    }
}

/// In-memory stores with concrete handles, for seeding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStores {
    pub vehicles: Arc<MemoryVehicleStore>,
    pub customers: Arc<MemoryCustomerStore>,
    pub users: Arc<MemoryUserStore>,
    pub rents: Arc<MemoryRentLedger>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Type-erased handles sharing the same underlying maps.
    pub fn stores(&self) -> Stores {
        Stores {
            vehicles: self.vehicles.clone(),
            customers: self.customers.clone(),
            users: self.users.clone(),
            rents: self.rents.clone(),
        }
    }
}
