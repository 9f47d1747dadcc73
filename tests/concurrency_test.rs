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

//! Concurrency tests using parking_lot's built-in deadlock detector.
//!
//! These tests hammer the coordinator from many threads and verify that
//! availability stays consistent with the rent ledger: no vehicle is ever
//! double-booked, and the vehicle locks never form a cycle.
//!
//! The `deadlock_detection` feature of parking_lot is enabled for tests, so
//! the coordinator's own locks are checked.

use parking_lot::deadlock;
use rental_coordinator::{
    ActorId, Availability, Coordinator, CoordinatorConfig, Customer, CustomerId, MemoryStores,
    OpenRental, RentStatus, RentalError, Vehicle, VehicleId, VehicleStore,
};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// === Deadlock Detection Infrastructure ===

/// Starts a background thread that checks for deadlocks.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
}

// === Fixtures ===

fn coordinator(vehicles: u32, customers: u32) -> (MemoryStores, Arc<Coordinator>) {
    let memory = MemoryStores::new();
    for id in 1..=vehicles {
        memory
            .vehicles
            .save(Vehicle::new(VehicleId(id), dec!(100)))
            .unwrap();
    }
    for id in 1..=customers {
        memory
            .customers
            .insert(Customer::new(CustomerId(id), format!("customer-{id}")));
    }
    let config = CoordinatorConfig {
        lock_timeout: Duration::from_secs(10),
    };
    let coordinator = Coordinator::with_clock(
        memory.stores(),
        Arc::new(rental_coordinator::SystemClock),
        config,
    );
    (memory, Arc::new(coordinator))
}

fn open(customer: u32, vehicle: u32) -> OpenRental {
    OpenRental {
        customer_id: CustomerId(customer),
        vehicle_id: VehicleId(vehicle),
        notes: String::new(),
    }
}

/// Checks that every vehicle is rented iff exactly one ongoing rent
/// references it.
fn assert_availability_matches_ledger(coordinator: &Coordinator) {
    let mut ongoing: HashMap<VehicleId, usize> = HashMap::new();
    for rent in coordinator.list_rents().unwrap() {
        if rent.status == RentStatus::Ongoing {
            *ongoing.entry(rent.vehicle_id).or_default() += 1;
        }
    }

    for vehicle in coordinator.list_vehicles(None).unwrap() {
        let count = ongoing.get(&vehicle.id).copied().unwrap_or(0);
        assert!(count <= 1, "vehicle {} has {} ongoing rents", vehicle.id, count);
        assert_eq!(
            vehicle.status == Availability::Rented,
            count == 1,
            "vehicle {} is {} with {} ongoing rents",
            vehicle.id,
            vehicle.status,
            count
        );
    }
}

// === Tests ===

/// Simultaneous opens on one vehicle: exactly one wins.
#[test]
fn simultaneous_opens_on_one_vehicle() {
    let detector = start_deadlock_detector();
    let (memory, coordinator) = coordinator(1, 32);

    const NUM_THREADS: u32 = 32;
    let barrier = Arc::new(Barrier::new(NUM_THREADS as usize));
    let mut handles = Vec::with_capacity(NUM_THREADS as usize);

    for customer in 1..=NUM_THREADS {
        let coordinator = coordinator.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            coordinator.open_rental(open(customer, 1), ActorId(customer))
        }));
    }

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    stop_deadlock_detector(detector);

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(RentalError::VehicleUnavailable {
                    status: Availability::Rented
                })
            )
        })
        .count();

    assert_eq!(successes, 1);
    assert_eq!(conflicts, NUM_THREADS as usize - 1);
    assert_eq!(memory.rents.len(), 1);
    assert_availability_matches_ledger(&coordinator);
}

/// Many threads open and close rentals over a small fleet.
#[test]
fn no_double_booking_under_churn() {
    let detector = start_deadlock_detector();
    let (_memory, coordinator) = coordinator(4, 8);

    const NUM_THREADS: u32 = 8;
    const OPS_PER_THREAD: usize = 200;

    let opened = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::with_capacity(NUM_THREADS as usize);

    for customer in 1..=NUM_THREADS {
        let coordinator = coordinator.clone();
        let opened = opened.clone();

        handles.push(thread::spawn(move || {
            for i in 0..OPS_PER_THREAD {
                let vehicle = (i as u32 + customer) % 4 + 1;
                match coordinator.open_rental(open(customer, vehicle), ActorId(customer)) {
                    Ok(rent) => {
                        opened.fetch_add(1, Ordering::SeqCst);
                        let target = if i % 2 == 0 {
                            RentStatus::Completed
                        } else {
                            RentStatus::Cancelled
                        };
                        coordinator
                            .transition_status(rent.id, target, None, ActorId(customer))
                            .expect("closing our own rent must succeed");
                    }
                    Err(RentalError::VehicleUnavailable { .. }) => {}
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert!(opened.load(Ordering::SeqCst) > 0);
    assert_eq!(coordinator.list_rents().unwrap().len(), opened.load(Ordering::SeqCst));
    for vehicle in coordinator.list_vehicles(None).unwrap() {
        assert_eq!(vehicle.status, Availability::Available);
    }
    assert_availability_matches_ledger(&coordinator);
}

/// Racing completions of the same rent: exactly one bills.
#[test]
fn racing_completions_bill_once() {
    let detector = start_deadlock_detector();
    let (_memory, coordinator) = coordinator(1, 1);
    let rent = coordinator.open_rental(open(1, 1), ActorId(1)).unwrap();

    const NUM_THREADS: usize = 16;
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let mut handles = Vec::with_capacity(NUM_THREADS);

    for i in 0..NUM_THREADS {
        let coordinator = coordinator.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            let target = if i % 2 == 0 {
                RentStatus::Completed
            } else {
                RentStatus::Cancelled
            };
            coordinator.transition_status(rent.id, target, None, ActorId(1))
        }));
    }

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    stop_deadlock_detector(detector);

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(err, RentalError::TerminalStateViolation { .. }));
        }
    }

    let stored = coordinator.get_rent(rent.id).unwrap();
    assert_eq!(&stored, winners[0]);
    assert_eq!(
        coordinator.vehicle(VehicleId(1)).unwrap().status,
        Availability::Available
    );
}

/// Readers iterate while writers mutate.
#[test]
fn no_deadlock_iteration_during_mutation() {
    let detector = start_deadlock_detector();
    let (_memory, coordinator) = coordinator(10, 10);
    let running = Arc::new(AtomicBool::new(true));

    let mut writers = Vec::new();
    for customer in 1..=4u32 {
        let coordinator = coordinator.clone();
        writers.push(thread::spawn(move || {
            for i in 0..100u32 {
                let vehicle = (i * customer) % 10 + 1;
                if let Ok(rent) =
                    coordinator.open_rental(open(customer, vehicle), ActorId(customer))
                {
                    let _ = coordinator.transition_status(
                        rent.id,
                        RentStatus::Completed,
                        None,
                        ActorId(customer),
                    );
                }
                if i % 10 == 0 {
                    let _ = coordinator.begin_maintenance(VehicleId(vehicle));
                    let _ = coordinator.end_maintenance(VehicleId(vehicle));
                }
            }
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..4 {
        let coordinator = coordinator.clone();
        let running = running.clone();
        readers.push(thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                for rent in coordinator.list_rents().unwrap() {
                    let _ = coordinator.describe(&rent);
                }
                let _ = coordinator.list_vehicles(Some(Availability::Available));
            }
        }));
    }

    for writer in writers {
        writer.join().expect("Thread panicked");
    }
    running.store(false, Ordering::SeqCst);
    for reader in readers {
        reader.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);
    assert_availability_matches_ledger(&coordinator);
}
