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

//! Rental lifecycle coordinator.
//!
//! The [`Coordinator`] is the only component that writes a rent's status,
//! return timestamp and price, and the only one that moves a vehicle into or
//! out of `rented`. It keeps the two consistent:
//!
//! - **Open**: check-and-set the vehicle `available → rented`, then append an
//!   ongoing rent. A failed append puts the vehicle back.
//! - **Complete**: price the rental from the vehicle's current daily rate,
//!   release the vehicle, then write the rent. A failed write re-rents the
//!   vehicle.
//! - **Cancel**: release the vehicle, then write the rent without a charge.
//!
//! # Thread Safety
//!
//! Every write runs under the per-vehicle lock from [`VehicleLocks`], so
//! operations on the same vehicle are serialized while operations on
//! different vehicles proceed in parallel. Lock waits are bounded by
//! [`CoordinatorConfig::lock_timeout`].

use crate::base::{ActorId, RentId, VehicleId};
use crate::clock::{Clock, SystemClock};
use crate::error::{RentalError, StoreError};
use crate::lock::VehicleLocks;
use crate::pricing::rental_price;
use crate::rent::{NewRent, OpenRental, Rent, RentStatus, RentUpdate, Transition};
use crate::store::Stores;
use crate::vehicle::{Availability, Vehicle};
use crate::view::RentView;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Longest wait for a vehicle lock before failing with a timeout.
    pub lock_timeout: Duration,
}

impl CoordinatorConfig {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Self::DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Coordinates rent records with vehicle availability.
///
/// # Invariants
///
/// - A vehicle is `rented` iff exactly one ongoing rent references it.
/// - Rents only move `ongoing → completed` or `ongoing → cancelled`.
/// - `total_price` and `returned_at` are set exactly when a rent completes.
pub struct Coordinator {
    stores: Stores,
    clock: Arc<dyn Clock>,
    locks: VehicleLocks,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Creates a coordinator using wall-clock time and default limits.
    pub fn new(stores: Stores) -> Self {
        Self::with_clock(stores, Arc::new(SystemClock), CoordinatorConfig::default())
    }

    pub fn with_clock(stores: Stores, clock: Arc<dyn Clock>, config: CoordinatorConfig) -> Self {
        Self {
            stores,
            clock,
            locks: VehicleLocks::new(),
            config,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    /// Opens a rental of `request.vehicle_id` for `request.customer_id`.
    ///
    /// # Errors
    ///
    /// - [`RentalError::CustomerNotFound`] - Unknown customer.
    /// - [`RentalError::VehicleNotFound`] - Unknown vehicle.
    /// - [`RentalError::VehicleUnavailable`] - Vehicle is rented or in maintenance.
    /// - [`RentalError::Persistence`] - Storage failed or the vehicle lock timed out.
    /// - [`RentalError::Inconsistency`] - Storage failed and the vehicle could
    ///   not be put back.
    pub fn open_rental(&self, request: OpenRental, actor: ActorId) -> Result<Rent, RentalError> {
        self.stores
            .customers
            .find_by_id(request.customer_id)
            .map_err(|err| match err {
                StoreError::NotFound => RentalError::CustomerNotFound,
                other => other.into_persistence(),
            })?;

        let vehicle_id = request.vehicle_id;
        self.locks
            .with_lock(vehicle_id, self.config.lock_timeout, || {
                self.stores
                    .vehicles
                    .compare_and_set_status(vehicle_id, Availability::Available, Availability::Rented)
                    .map_err(|err| match err {
                        StoreError::NotFound => RentalError::VehicleNotFound,
                        StoreError::StatusMismatch { actual } => {
                            warn!(%vehicle_id, status = %actual, "rejected rental of unavailable vehicle");
                            RentalError::VehicleUnavailable { status: actual }
                        }
                        other => other.into_persistence(),
                    })?;

                let draft = NewRent {
                    customer_id: request.customer_id,
                    vehicle_id,
                    rented_at: self.clock.now(),
                    notes: request.notes,
                    created_by: actor,
                };

                match self.stores.rents.insert(draft) {
                    Ok(rent) => {
                        info!(rent_id = %rent.id, %vehicle_id, customer_id = %rent.customer_id, %actor, "rental opened");
                        Ok(rent)
                    }
                    Err(err) => {
                        warn!(%vehicle_id, error = %err, "rent write failed, releasing vehicle");
                        self.restore_vehicle(vehicle_id, Availability::Rented, Availability::Available)?;
                        Err(err.into_persistence())
                    }
                }
            })
    }

    /// Applies a partial update to a rent.
    ///
    /// Validation runs in order: the rent must exist, the status (if given)
    /// must be a known value, and the rent must not be terminal when a status
    /// is given. The update is all or nothing: notes are only written when the
    /// status part succeeds. A notes-only update is accepted on any rent.
    ///
    /// # Errors
    ///
    /// - [`RentalError::RentNotFound`] - Unknown rent.
    /// - [`RentalError::InvalidStatusValue`] - Status is not a known value.
    /// - [`RentalError::TerminalStateViolation`] - Rent is completed or cancelled.
    /// - [`RentalError::VehicleNotFound`] - The rented vehicle vanished.
    /// - [`RentalError::Persistence`] - Storage failed or the vehicle lock timed out.
    /// - [`RentalError::Inconsistency`] - Vehicle state contradicts the rent.
    pub fn update_rent(
        &self,
        rent_id: RentId,
        update: RentUpdate,
        actor: ActorId,
    ) -> Result<Rent, RentalError> {
        let current = self.get_rent(rent_id)?;
        let requested = update
            .status
            .as_deref()
            .map(str::parse::<RentStatus>)
            .transpose()?;

        self.locks
            .with_lock(current.vehicle_id, self.config.lock_timeout, || {
                // Re-read under the lock; another writer may have closed it.
                let rent = self.get_rent(rent_id)?;
                let transition = requested.map(|to| rent.status.transition(to)).transpose()?;
                self.apply(rent, transition, update.notes, actor)
            })
    }

    /// Moves a rent to `status`, optionally replacing its notes.
    ///
    /// Same semantics and errors as [`Coordinator::update_rent`] with a status.
    pub fn transition_status(
        &self,
        rent_id: RentId,
        status: RentStatus,
        notes: Option<String>,
        actor: ActorId,
    ) -> Result<Rent, RentalError> {
        self.update_rent(
            rent_id,
            RentUpdate {
                status: Some(status.to_string()),
                notes,
            },
            actor,
        )
    }

    /// Writes a validated update. Must run under the rent's vehicle lock.
    fn apply(
        &self,
        mut rent: Rent,
        transition: Option<Transition>,
        notes: Option<String>,
        actor: ActorId,
    ) -> Result<Rent, RentalError> {
        let released = match transition {
            Some(Transition::Complete) => {
                // Price before any write so an unpriceable rent stays ongoing.
                let vehicle = self.vehicle(rent.vehicle_id)?;
                let returned_at = self.clock.now();
                let total_price = rental_price(rent.rented_at, returned_at, vehicle.price_per_day)
                    .ok_or_else(|| {
                        error!(
                            rent_id = %rent.id,
                            vehicle_id = %rent.vehicle_id,
                            price_per_day = %vehicle.price_per_day,
                            "rental price overflows"
                        );
                        RentalError::PriceOverflow
                    })?;
                self.release_vehicle(rent.vehicle_id)?;
                rent.returned_at = Some(returned_at);
                rent.total_price = total_price;
                rent.status = RentStatus::Completed;
                true
            }
            Some(Transition::Cancel) => {
                self.release_vehicle(rent.vehicle_id)?;
                rent.status = RentStatus::Cancelled;
                true
            }
            Some(Transition::Unchanged) | None => false,
        };

        if let Some(notes) = notes {
            rent.notes = notes;
        }
        rent.updated_by = actor;

        if let Err(err) = self.stores.rents.update(rent.clone()) {
            warn!(rent_id = %rent.id, error = %err, "rent write failed");
            if released {
                self.restore_vehicle(rent.vehicle_id, Availability::Available, Availability::Rented)?;
            }
            return Err(err.into_persistence());
        }

        match transition {
            Some(Transition::Complete) => {
                info!(rent_id = %rent.id, vehicle_id = %rent.vehicle_id, total_price = %rent.total_price, %actor, "rental completed")
            }
            Some(Transition::Cancel) => {
                info!(rent_id = %rent.id, vehicle_id = %rent.vehicle_id, %actor, "rental cancelled")
            }
            _ => {}
        }
        Ok(rent)
    }

    /// Sets a rented vehicle back to available, returning its current record.
    fn release_vehicle(&self, vehicle_id: VehicleId) -> Result<Vehicle, RentalError> {
        self.stores
            .vehicles
            .compare_and_set_status(vehicle_id, Availability::Rented, Availability::Available)
            .map_err(|err| match err {
                StoreError::NotFound => {
                    error!(%vehicle_id, "vehicle of an ongoing rent no longer exists");
                    RentalError::VehicleNotFound
                }
                StoreError::StatusMismatch { actual } => {
                    error!(%vehicle_id, status = %actual, "vehicle of an ongoing rent is not rented");
                    RentalError::Inconsistency(format!(
                        "vehicle {vehicle_id} of an ongoing rent is {actual}"
                    ))
                }
                other => other.into_persistence(),
            })
    }

    /// Undoes a vehicle status change after the paired rent write failed.
    fn restore_vehicle(
        &self,
        vehicle_id: VehicleId,
        from: Availability,
        to: Availability,
    ) -> Result<(), RentalError> {
        match self.stores.vehicles.compare_and_set_status(vehicle_id, from, to) {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(%vehicle_id, %from, %to, error = %err, "failed to roll back vehicle status");
                Err(RentalError::Inconsistency(format!(
                    "vehicle {vehicle_id} left {from} after a failed rent write"
                )))
            }
        }
    }

    /// Takes an available vehicle out of service.
    ///
    /// # Errors
    ///
    /// - [`RentalError::VehicleNotFound`] - Unknown vehicle.
    /// - [`RentalError::VehicleUnavailable`] - Vehicle is rented or already in
    ///   maintenance.
    pub fn begin_maintenance(&self, vehicle_id: VehicleId) -> Result<Vehicle, RentalError> {
        self.locks.with_lock(vehicle_id, self.config.lock_timeout, || {
            let vehicle = self
                .stores
                .vehicles
                .compare_and_set_status(
                    vehicle_id,
                    Availability::Available,
                    Availability::Maintenance,
                )
                .map_err(|err| match err {
                    StoreError::NotFound => RentalError::VehicleNotFound,
                    StoreError::StatusMismatch { actual } => {
                        RentalError::VehicleUnavailable { status: actual }
                    }
                    other => other.into_persistence(),
                })?;
            info!(%vehicle_id, "vehicle entered maintenance");
            Ok(vehicle)
        })
    }

    /// Returns a vehicle from maintenance to service.
    ///
    /// Ending maintenance on an available vehicle is a no-op.
    ///
    /// # Errors
    ///
    /// - [`RentalError::VehicleNotFound`] - Unknown vehicle.
    /// - [`RentalError::VehicleUnavailable`] - Vehicle is rented.
    pub fn end_maintenance(&self, vehicle_id: VehicleId) -> Result<Vehicle, RentalError> {
        self.locks.with_lock(vehicle_id, self.config.lock_timeout, || {
            match self.stores.vehicles.compare_and_set_status(
                vehicle_id,
                Availability::Maintenance,
                Availability::Available,
            ) {
                Ok(vehicle) => {
                    info!(%vehicle_id, "vehicle returned to service");
                    Ok(vehicle)
                }
                Err(StoreError::NotFound) => Err(RentalError::VehicleNotFound),
                Err(StoreError::StatusMismatch {
                    actual: Availability::Available,
                }) => self.vehicle(vehicle_id),
                Err(StoreError::StatusMismatch { actual }) => {
                    Err(RentalError::VehicleUnavailable { status: actual })
                }
                Err(other) => Err(other.into_persistence()),
            }
        })
    }

    pub fn get_rent(&self, rent_id: RentId) -> Result<Rent, RentalError> {
        self.stores
            .rents
            .find_by_id(rent_id)
            .map_err(|err| match err {
                StoreError::NotFound => RentalError::RentNotFound,
                other => other.into_persistence(),
            })
    }

    /// All rents, oldest first.
    pub fn list_rents(&self) -> Result<Vec<Rent>, RentalError> {
        self.stores
            .rents
            .all()
            .map_err(StoreError::into_persistence)
    }

    pub fn vehicle(&self, vehicle_id: VehicleId) -> Result<Vehicle, RentalError> {
        self.stores
            .vehicles
            .find_by_id(vehicle_id)
            .map_err(|err| match err {
                StoreError::NotFound => RentalError::VehicleNotFound,
                other => other.into_persistence(),
            })
    }

    /// Vehicles ordered by id, optionally restricted to one status.
    pub fn list_vehicles(
        &self,
        status: Option<Availability>,
    ) -> Result<Vec<Vehicle>, RentalError> {
        let vehicles = self
            .stores
            .vehicles
            .all()
            .map_err(StoreError::into_persistence)?;
        Ok(vehicles
            .into_iter()
            .filter(|v| status.is_none_or(|s| v.status == s))
            .collect())
    }

    /// Resolves the customer, vehicle and actors a rent references.
    pub fn describe(&self, rent: &Rent) -> Result<RentView, RentalError> {
        RentView::resolve(rent, &self.stores)
    }
}
