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

//! HTTP binding for the coordinator.
//!
//! ## Endpoints
//!
//! - `POST /rents` - Open a rental
//! - `GET /rents` - List all rentals
//! - `GET /rents/{id}` - Get a rental by id
//! - `PUT /rents/{id}` - Update a rental's status and/or notes
//! - `GET /vehicles` - List vehicles, optionally `?status=available`
//! - `GET /vehicles/{id}` - Get a vehicle by id
//! - `POST /vehicles/{id}/maintenance` - Take a vehicle out of service
//! - `DELETE /vehicles/{id}/maintenance` - Return a vehicle to service
//!
//! Authentication happens upstream; the authenticated user is passed in the
//! `x-actor-id` header.
//!
//! Rents are returned resolved (customer, vehicle and users inlined). When a
//! write has committed but resolving it fails, the bare rent record is
//! returned instead of an error.
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/rents \
//!   -H "Content-Type: application/json" -H "x-actor-id: 1" \
//!   -d '{"customer_id": 1, "vehicle_id": 1, "notes": "airport pickup"}'
//!
//! curl -X PUT http://localhost:3000/rents/1 \
//!   -H "Content-Type: application/json" -H "x-actor-id: 1" \
//!   -d '{"status": "completed"}'
//! ```

use crate::base::{ActorId, RentId, VehicleId};
use crate::coordinator::Coordinator;
use crate::error::{ErrorKind, RentalError};
use crate::rent::{OpenRental, Rent, RentUpdate};
use crate::vehicle::{Availability, Vehicle};
use crate::view::RentView;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Response body for errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Body returned after a rent write.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RentBody {
    View(RentView),
    /// The write committed but its references could not be resolved.
    Record(Rent),
}

/// Shared application state containing the coordinator.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

// === Error Handling ===

pub enum ApiError {
    Rental(RentalError),
    Unauthenticated,
    BadRequest(String),
    Internal,
}

impl From<RentalError> for ApiError {
    fn from(err: RentalError) -> Self {
        ApiError::Rental(err)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Rental(err) => {
                let (status, code) = match err {
                    RentalError::RentNotFound => (StatusCode::NOT_FOUND, "RENT_NOT_FOUND"),
                    RentalError::VehicleNotFound => (StatusCode::NOT_FOUND, "VEHICLE_NOT_FOUND"),
                    RentalError::CustomerNotFound => (StatusCode::NOT_FOUND, "CUSTOMER_NOT_FOUND"),
                    RentalError::InvalidStatusValue(_) => {
                        (StatusCode::BAD_REQUEST, "INVALID_STATUS_VALUE")
                    }
                    RentalError::VehicleUnavailable { .. } => {
                        (StatusCode::CONFLICT, "VEHICLE_UNAVAILABLE")
                    }
                    RentalError::TerminalStateViolation { .. } => {
                        (StatusCode::CONFLICT, "TERMINAL_STATE_VIOLATION")
                    }
                    RentalError::Persistence(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "PERSISTENCE_FAILURE")
                    }
                    RentalError::PriceOverflow => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "PRICE_OVERFLOW")
                    }
                    RentalError::Inconsistency(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "INCONSISTENT_STATE")
                    }
                };
                let message = match err.kind() {
                    ErrorKind::Persistence => {
                        "storage temporarily unavailable, retry later".to_string()
                    }
                    ErrorKind::Internal => "internal error".to_string(),
                    _ => err.to_string(),
                };
                (status, code, message)
            }
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "user not authenticated".to_string(),
            ),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", message.clone())
            }
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                "internal error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = self.parts();
        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Extractors ===

/// The authenticated user, read from the `x-actor-id` header.
pub struct Actor(pub ActorId);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u32>().ok())
            .map(|id| Actor(ActorId(id)))
            .ok_or(ApiError::Unauthenticated)
    }
}

#[derive(Debug, Deserialize)]
pub struct VehicleFilter {
    pub status: Option<String>,
}

/// Runs a coordinator call on the blocking pool; lock waits must not stall
/// the async workers.
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Coordinator) -> Result<T, RentalError> + Send + 'static,
{
    let coordinator = Arc::clone(&state.coordinator);
    tokio::task::spawn_blocking(move || f(&coordinator))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "coordinator task failed");
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}

/// Resolves a committed rent, falling back to the record itself.
fn present(c: &Coordinator, rent: Rent) -> RentBody {
    match c.describe(&rent) {
        Ok(view) => RentBody::View(view),
        Err(err) => {
            tracing::warn!(
                rent_id = %rent.id,
                error = %err,
                "rent committed but its view could not be resolved"
            );
            RentBody::Record(rent)
        }
    }
}

// === Handlers ===

/// POST /rents - Open a rental.
async fn open_rental(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(request): Json<OpenRental>,
) -> Result<(StatusCode, Json<RentBody>), ApiError> {
    let body = blocking(&state, move |c| {
        let rent = c.open_rental(request, actor)?;
        Ok(present(c, rent))
    })
    .await?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// GET /rents - List all rentals.
async fn list_rents(
    State(state): State<AppState>,
    Actor(_): Actor,
) -> Result<Json<Vec<RentView>>, ApiError> {
    let views = blocking(&state, |c| {
        c.list_rents()?
            .iter()
            .map(|rent| c.describe(rent))
            .collect::<Result<Vec<_>, _>>()
    })
    .await?;
    Ok(Json(views))
}

/// GET /rents/{id} - Get a rental by id.
async fn get_rent(
    State(state): State<AppState>,
    Actor(_): Actor,
    Path(id): Path<u32>,
) -> Result<Json<RentView>, ApiError> {
    let view = blocking(&state, move |c| c.describe(&c.get_rent(RentId(id))?)).await?;
    Ok(Json(view))
}

/// PUT /rents/{id} - Update a rental.
async fn update_rent(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<u32>,
    Json(update): Json<RentUpdate>,
) -> Result<Json<RentBody>, ApiError> {
    let body = blocking(&state, move |c| {
        let rent = c.update_rent(RentId(id), update, actor)?;
        Ok(present(c, rent))
    })
    .await?;
    Ok(Json(body))
}

/// GET /vehicles - List vehicles.
async fn list_vehicles(
    State(state): State<AppState>,
    Actor(_): Actor,
    Query(filter): Query<VehicleFilter>,
) -> Result<Json<Vec<Vehicle>>, ApiError> {
    let status = filter
        .status
        .map(|s| s.parse::<Availability>())
        .transpose()
        .map_err(|s| ApiError::BadRequest(format!("unknown vehicle status {s:?}")))?;
    let vehicles = blocking(&state, move |c| c.list_vehicles(status)).await?;
    Ok(Json(vehicles))
}

/// GET /vehicles/{id} - Get a vehicle by id.
async fn get_vehicle(
    State(state): State<AppState>,
    Actor(_): Actor,
    Path(id): Path<u32>,
) -> Result<Json<Vehicle>, ApiError> {
    let vehicle = blocking(&state, move |c| c.vehicle(VehicleId(id))).await?;
    Ok(Json(vehicle))
}

/// POST /vehicles/{id}/maintenance - Take a vehicle out of service.
async fn begin_maintenance(
    State(state): State<AppState>,
    Actor(_): Actor,
    Path(id): Path<u32>,
) -> Result<Json<Vehicle>, ApiError> {
    let vehicle = blocking(&state, move |c| c.begin_maintenance(VehicleId(id))).await?;
    Ok(Json(vehicle))
}

/// DELETE /vehicles/{id}/maintenance - Return a vehicle to service.
async fn end_maintenance(
    State(state): State<AppState>,
    Actor(_): Actor,
    Path(id): Path<u32>,
) -> Result<Json<Vehicle>, ApiError> {
    let vehicle = blocking(&state, move |c| c.end_maintenance(VehicleId(id))).await?;
    Ok(Json(vehicle))
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/rents", post(open_rental).get(list_rents))
        .route("/rents/{id}", get(get_rent).put(update_rent))
        .route("/vehicles", get(list_vehicles))
        .route("/vehicles/{id}", get(get_vehicle))
        .route(
            "/vehicles/{id}/maintenance",
            post(begin_maintenance).delete(end_maintenance),
        )
        .with_state(state)
}
