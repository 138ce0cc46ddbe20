//! Mockbus server binary
//!
//! Serves the SunSpec-style mock register map over Modbus TCP: a block at
//! base 40000, 69 registers long, answering every read with fresh random
//! values in [0, 255].
//!
//! Usage: mockbus [bind_address]
//! Example: mockbus 0.0.0.0:1502
//!
//! The default bind address is 0.0.0.0:502; the reserved Modbus port usually
//! requires elevated privilege, so tests and unprivileged runs should pass an
//! explicit high port.

use std::sync::Arc;

use mockbus::{ModbusTcpServer, RegisterStore};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let bind_address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("0.0.0.0:{}", mockbus::DEFAULT_TCP_PORT));

    let store = Arc::new(RegisterStore::sunspec_mock());
    let mut server = ModbusTcpServer::from_address(&bind_address, store)?;

    // Bind failure is fatal and reported through the error return, no retry
    let addr = server.start().await?;
    info!("mockbus v{} serving mock registers on {addr}", mockbus::VERSION);

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    server.stop();

    Ok(())
}
