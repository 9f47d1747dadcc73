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

//! Per-vehicle exclusive locks with bounded acquisition.

use crate::base::VehicleId;
use crate::error::{PersistenceFailure, RentalError};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Lock table serializing every operation that touches the same vehicle.
///
/// Locks are created on first use and kept for the lifetime of the table.
/// Operations on different vehicles never contend.
#[derive(Debug, Default)]
pub struct VehicleLocks {
    locks: DashMap<VehicleId, Arc<Mutex<()>>>,
}

impl VehicleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `vehicle_id`.
    ///
    /// # Errors
    ///
    /// [`PersistenceFailure::Timeout`] if the lock is not acquired within
    /// `timeout`; otherwise whatever `f` returns.
    pub fn with_lock<T>(
        &self,
        vehicle_id: VehicleId,
        timeout: Duration,
        f: impl FnOnce() -> Result<T, RentalError>,
    ) -> Result<T, RentalError> {
        // Clone the Arc so the DashMap shard is not held while waiting.
        let lock = Arc::clone(
            self.locks
                .entry(vehicle_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );

        let Some(_guard) = lock.try_lock_for(timeout) else {
            tracing::warn!(%vehicle_id, ?timeout, "timed out waiting for vehicle lock");
            return Err(PersistenceFailure::Timeout.into());
        };
        f()
    }
}
