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

use clap::Parser;
use rental_coordinator::api::{AppState, create_router};
use rental_coordinator::seed::{self, SeedReport};
use rental_coordinator::{
    Coordinator, CoordinatorConfig, MemoryStores, SystemClock,
};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Rental Coordinator - Serve the vehicle rental API
///
/// Seeds in-memory vehicle, customer and user records from CSV files and
/// serves rentals over HTTP.
#[derive(Parser, Debug)]
#[command(name = "rental-coordinator")]
#[command(about = "Serves vehicle rentals over HTTP", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// CSV file with vehicles
    ///
    /// Expected format: id,type,plate_number,brand,model,year,price_per_day,status
    #[arg(long, value_name = "FILE")]
    vehicles: Option<PathBuf>,

    /// CSV file with customers
    ///
    /// Expected format: id,name,phone,email,address,id_card
    #[arg(long, value_name = "FILE")]
    customers: Option<PathBuf>,

    /// CSV file with staff users
    ///
    /// Expected format: id,name,username,role
    #[arg(long, value_name = "FILE")]
    users: Option<PathBuf>,

    /// Longest wait for a vehicle lock, in milliseconds
    #[arg(long, default_value_t = 5000)]
    lock_timeout_ms: u64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG wins if set
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match args.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), String> {
    let memory = MemoryStores::new();

    if let Some(path) = &args.vehicles {
        let report = seed::load_vehicles(open(path)?, memory.vehicles.as_ref())
            .map_err(|e| format!("error reading '{}': {e}", path.display()))?;
        log_report("vehicles", path, report);
    }
    if let Some(path) = &args.customers {
        let report = seed::load_customers(open(path)?, &memory.customers)
            .map_err(|e| format!("error reading '{}': {e}", path.display()))?;
        log_report("customers", path, report);
    }
    if let Some(path) = &args.users {
        let report = seed::load_users(open(path)?, &memory.users)
            .map_err(|e| format!("error reading '{}': {e}", path.display()))?;
        log_report("users", path, report);
    }

    let config = CoordinatorConfig {
        lock_timeout: Duration::from_millis(args.lock_timeout_ms),
    };
    let coordinator = Coordinator::with_clock(memory.stores(), Arc::new(SystemClock), config);
    let app = create_router(AppState {
        coordinator: Arc::new(coordinator),
    });

    let listener = TcpListener::bind(args.bind)
        .await
        .map_err(|e| format!("error binding {}: {e}", args.bind))?;
    info!(address = %args.bind, "rental API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("server error: {e}"))
}

fn open(path: &Path) -> Result<BufReader<File>, String> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| format!("error opening file '{}': {e}", path.display()))
}

fn log_report(kind: &str, path: &Path, report: SeedReport) {
    info!(
        kind,
        file = %path.display(),
        loaded = report.loaded,
        skipped = report.skipped,
        "seeded records"
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}
