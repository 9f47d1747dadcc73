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

//! Integration tests for the REST API server.
//!
//! These tests start the real router on an ephemeral port and drive it with
//! an HTTP client, including concurrent requests racing for one vehicle.

use reqwest::{Client, StatusCode};
use rental_coordinator::api::{ACTOR_HEADER, AppState, ErrorResponse, create_router};
use rental_coordinator::{
    ActorId, Availability, Coordinator, Customer, CustomerId, CustomerStore, MemoryStores, Rent,
    RentStatus, RentView, Role, StoreError, Stores, User, Vehicle, VehicleId, VehicleStore,
};
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::net::TcpListener;

/// Test server that binds to an ephemeral port.
struct TestServer {
    base_url: String,
    memory: MemoryStores,
    client: Client,
}

/// Customer directory that goes offline after a fixed number of lookups.
struct FadingCustomers {
    inner: Arc<dyn CustomerStore>,
    remaining: AtomicUsize,
}

impl CustomerStore for FadingCustomers {
    fn find_by_id(&self, id: CustomerId) -> Result<Customer, StoreError> {
        let answered = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if answered {
            self.inner.find_by_id(id)
        } else {
            Err(StoreError::Unavailable("directory offline".into()))
        }
    }
}

impl TestServer {
    async fn new() -> Self {
        Self::with_stores(|stores| stores).await
    }

    /// Seeds the fixture data, then lets the caller swap in store doubles.
    async fn with_stores(wrap: impl FnOnce(Stores) -> Stores) -> Self {
        let memory = MemoryStores::new();
        memory
            .vehicles
            .save(Vehicle::new(VehicleId(1), dec!(100)))
            .unwrap();
        memory
            .vehicles
            .save(Vehicle::new(VehicleId(2), dec!(75)))
            .unwrap();
        memory.customers.insert(Customer::new(CustomerId(1), "Ana"));
        memory.users.insert(User::new(ActorId(1), "staff", Role::Staff));

        let state = AppState {
            coordinator: Arc::new(Coordinator::new(wrap(memory.stores()))),
        };

        let app = create_router(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to be ready by polling with retries
        let client = Client::new();
        let health_url = format!("{}/vehicles", base_url);
        for _ in 0..50 {
            match client.get(&health_url).send().await {
                Ok(_) => break,
                Err(_) => tokio::time::sleep(tokio::time::Duration::from_millis(50)).await,
            }
        }

        TestServer {
            base_url,
            memory,
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn open(&self, vehicle_id: u32) -> reqwest::Response {
        self.client
            .post(self.url("/rents"))
            .header(ACTOR_HEADER, "1")
            .json(&json!({ "customer_id": 1, "vehicle_id": vehicle_id, "notes": "airport" }))
            .send()
            .await
            .unwrap()
    }
}

// === Tests ===

#[tokio::test]
async fn missing_actor_header_is_unauthenticated() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/rents"))
        .json(&json!({ "customer_id": 1, "vehicle_id": 1 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.code, "UNAUTHENTICATED");
    assert_eq!(
        server.memory.vehicles.find_by_id(VehicleId(1)).unwrap().status,
        Availability::Available
    );
}

#[tokio::test]
async fn open_returns_the_resolved_rent() {
    let server = TestServer::new().await;

    let response = server.open(1).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let view: RentView = response.json().await.unwrap();
    assert_eq!(view.status, RentStatus::Ongoing);
    assert_eq!(view.customer.name, "Ana");
    assert_eq!(view.vehicle.status, Availability::Rented);
    assert_eq!(view.notes, "airport");
    assert_eq!(view.return_date, "");
    assert_eq!(view.total_price, dec!(0));
    assert_eq!(view.created_by.map(|u| u.username), Some("staff".to_string()));
}

#[tokio::test]
async fn committed_open_is_reported_when_view_cannot_resolve() {
    // The open itself checks the customer once; resolving the view fails.
    let server = TestServer::with_stores(|mut stores| {
        stores.customers = Arc::new(FadingCustomers {
            inner: stores.customers,
            remaining: AtomicUsize::new(1),
        });
        stores
    })
    .await;

    let response = server.open(1).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let rent: Rent = response.json().await.unwrap();
    assert_eq!(rent.status, RentStatus::Ongoing);
    assert_eq!(rent.vehicle_id, VehicleId(1));
    assert_eq!(rent.notes, "airport");
    assert_eq!(server.memory.rents.len(), 1);
    assert_eq!(
        server.memory.vehicles.find_by_id(VehicleId(1)).unwrap().status,
        Availability::Rented
    );
}

#[tokio::test]
async fn renting_a_rented_vehicle_conflicts() {
    let server = TestServer::new().await;
    assert_eq!(server.open(1).await.status(), StatusCode::CREATED);

    let response = server.open(1).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.code, "VEHICLE_UNAVAILABLE");
    assert!(body.error.contains("rented"));
}

#[tokio::test]
async fn completing_a_rent_prices_it_and_frees_the_vehicle() {
    let server = TestServer::new().await;
    let opened: RentView = server.open(1).await.json().await.unwrap();

    let response = server
        .client
        .put(server.url(&format!("/rents/{}", opened.id)))
        .header(ACTOR_HEADER, "1")
        .json(&json!({ "status": "completed", "notes": "returned clean" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let view: RentView = response.json().await.unwrap();
    assert_eq!(view.status, RentStatus::Completed);
    assert_eq!(view.total_price, dec!(100));
    assert_eq!(view.notes, "returned clean");
    assert_ne!(view.return_date, "");
    assert_eq!(view.vehicle.status, Availability::Available);

    let again = server
        .client
        .put(server.url(&format!("/rents/{}", opened.id)))
        .header(ACTOR_HEADER, "1")
        .json(&json!({ "status": "cancelled" }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);
    let body: ErrorResponse = again.json().await.unwrap();
    assert_eq!(body.code, "TERMINAL_STATE_VIOLATION");
}

#[tokio::test]
async fn unknown_status_value_is_a_bad_request() {
    let server = TestServer::new().await;
    let opened: RentView = server.open(1).await.json().await.unwrap();

    let response = server
        .client
        .put(server.url(&format!("/rents/{}", opened.id)))
        .header(ACTOR_HEADER, "1")
        .json(&json!({ "status": "returned" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.code, "INVALID_STATUS_VALUE");
    assert_eq!(
        server.memory.vehicles.find_by_id(VehicleId(1)).unwrap().status,
        Availability::Rented
    );
}

#[tokio::test]
async fn unknown_rent_is_not_found() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/rents/999"))
        .header(ACTOR_HEADER, "1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.code, "RENT_NOT_FOUND");
}

#[tokio::test]
async fn vehicles_can_be_filtered_by_status() {
    let server = TestServer::new().await;
    server.open(1).await;

    let available: Vec<Vehicle> = server
        .client
        .get(server.url("/vehicles?status=available"))
        .header(ACTOR_HEADER, "1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        available.iter().map(|v| v.id).collect::<Vec<_>>(),
        vec![VehicleId(2)]
    );

    let bad = server
        .client
        .get(server.url("/vehicles?status=stolen"))
        .header(ACTOR_HEADER, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn maintenance_blocks_rentals_until_ended() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/vehicles/2/maintenance"))
        .header(ACTOR_HEADER, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.open(2).await.status(), StatusCode::CONFLICT);

    let response = server
        .client
        .delete(server.url("/vehicles/2/maintenance"))
        .header(ACTOR_HEADER, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.open(2).await.status(), StatusCode::CREATED);
}

/// Concurrent opens for the same vehicle: exactly one is created.
#[tokio::test]
async fn concurrent_opens_single_vehicle() {
    let server = Arc::new(TestServer::new().await);

    const NUM_REQUESTS: usize = 50;
    let start = Instant::now();

    let mut handles = Vec::with_capacity(NUM_REQUESTS);
    for _ in 0..NUM_REQUESTS {
        let server = server.clone();
        handles.push(tokio::spawn(async move { server.open(1).await.status() }));
    }

    let results: Vec<_> = futures::future::join_all(handles).await;
    let elapsed = start.elapsed();

    let statuses: Vec<StatusCode> = results.into_iter().map(|r| r.unwrap()).collect();
    let created = statuses
        .iter()
        .filter(|s| **s == StatusCode::CREATED)
        .count();
    let conflicts = statuses
        .iter()
        .filter(|s| **s == StatusCode::CONFLICT)
        .count();

    println!(
        "Single vehicle: {} opens in {:?} ({:.0} req/s)",
        NUM_REQUESTS,
        elapsed,
        NUM_REQUESTS as f64 / elapsed.as_secs_f64()
    );

    assert_eq!(created, 1, "exactly one open should win");
    assert_eq!(conflicts, NUM_REQUESTS - 1);
    assert_eq!(server.memory.rents.len(), 1);
}

/// Rent and return many vehicles from many concurrent clients.
#[tokio::test]
#[ignore = "heavy load test, run manually"]
async fn concurrent_rent_cycles_across_fleet() {
    let server = Arc::new(TestServer::new().await);
    const FLEET: u32 = 100;
    for id in 3..=FLEET {
        server
            .memory
            .vehicles
            .save(Vehicle::new(VehicleId(id), dec!(10)))
            .unwrap();
    }

    let mut handles = Vec::with_capacity(FLEET as usize);
    for id in 1..=FLEET {
        let server = server.clone();
        handles.push(tokio::spawn(async move {
            let opened: RentView = server.open(id).await.json().await.unwrap();
            server
                .client
                .put(server.url(&format!("/rents/{}", opened.id)))
                .header(ACTOR_HEADER, "1")
                .json(&json!({ "status": "completed" }))
                .send()
                .await
                .unwrap()
                .status()
        }));
    }

    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap(), StatusCode::OK);
    }
    for vehicle in server.memory.vehicles.all().unwrap() {
        assert_eq!(vehicle.status, Availability::Available);
    }
    assert_eq!(server.memory.rents.len(), FLEET as usize);
}
