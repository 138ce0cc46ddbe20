//! Modbus TCP server
//!
//! Binds a listening socket, accepts clients and runs one tokio task per
//! connection. Each connection owns a receive buffer; frames are decoded
//! incrementally and handled strictly in arrival order, so requests on one
//! connection are never reordered. Connections share the register store
//! behind an `Arc`. A malformed frame closes the connection without a
//! response; protocol errors are answered with exception PDUs and the
//! connection stays open.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::constants::MODBUS_FRAME_BUFFER_SIZE;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{self, TcpFrame};
use crate::handler::handle_request;
use crate::store::RegisterStore;

/// Modbus TCP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address and port to listen on. Port 502 is the reserved Modbus port
    /// and usually needs elevated privilege; port 0 picks an ephemeral port.
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:502".parse().expect("valid default address"),
        }
    }
}

/// Modbus TCP server owning the accept loop and all connection tasks
pub struct ModbusTcpServer {
    config: ServerConfig,
    store: Arc<RegisterStore>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    is_running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
}

impl ModbusTcpServer {
    /// Create a server with the default configuration
    pub fn new(store: Arc<RegisterStore>) -> Self {
        Self::with_config(ServerConfig::default(), store)
    }

    /// Create a server with a custom configuration
    pub fn with_config(config: ServerConfig, store: Arc<RegisterStore>) -> Self {
        Self {
            config,
            store,
            shutdown_tx: None,
            is_running: Arc::new(AtomicBool::new(false)),
            local_addr: None,
        }
    }

    /// Parse `bind_address` and create a server with defaults otherwise
    pub fn from_address(bind_address: &str, store: Arc<RegisterStore>) -> ModbusResult<Self> {
        let bind_address = bind_address
            .parse()
            .map_err(|e| ModbusError::configuration(format!("invalid bind address: {e}")))?;
        Ok(Self::with_config(ServerConfig { bind_address }, store))
    }

    /// Bind the listening socket and start accepting connections.
    ///
    /// Returns the actual bound address (useful with port 0). A bind failure
    /// is returned to the caller and never retried here; the owning process
    /// decides what to do with it.
    pub async fn start(&mut self) -> ModbusResult<SocketAddr> {
        if self.is_running.load(Ordering::Relaxed) {
            return Err(ModbusError::protocol("server is already running"));
        }

        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                ModbusError::connection(format!(
                    "failed to bind {}: {e}",
                    self.config.bind_address
                ))
            })?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        info!("Modbus TCP server listening on {local_addr}");

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());
        self.is_running.store(true, Ordering::Relaxed);

        let store = self.store.clone();
        let is_running = self.is_running.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                debug!("Accepted connection from {peer}");
                                let store = store.clone();
                                let shutdown_rx = shutdown_tx.subscribe();
                                tokio::spawn(async move {
                                    handle_connection(stream, peer, store, shutdown_rx).await;
                                });
                            }
                            Err(e) => {
                                // One failed accept does not take the server down
                                error!("Failed to accept connection: {e}");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Shutdown signal received, closing listener");
                        break;
                    }
                }
            }
            is_running.store(false, Ordering::Relaxed);
        });

        Ok(local_addr)
    }

    /// Stop accepting and signal all connection tasks to close
    pub fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        self.is_running.store(false, Ordering::Relaxed);
        info!("Modbus TCP server stopped");
    }

    /// Whether the accept loop is running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// The bound address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for ModbusTcpServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// Per-connection loop: buffer bytes, decode frames, answer in order
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    store: Arc<RegisterStore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("Client connected: {peer}");

    let mut buffer = BytesMut::with_capacity(MODBUS_FRAME_BUFFER_SIZE);
    let mut chunk = [0u8; MODBUS_FRAME_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Shutdown signal received for client {peer}");
                break;
            }

            result = stream.read(&mut chunk) => {
                match result {
                    Ok(0) => {
                        debug!("Client {peer} closed the connection");
                        break;
                    }
                    Ok(n) => {
                        buffer.extend_from_slice(&chunk[..n]);
                        if !drain_frames(&mut stream, &mut buffer, &store, peer).await {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("Read error from {peer}: {e}");
                        break;
                    }
                }
            }
        }
    }

    info!("Client disconnected: {peer}");
}

/// Decode and answer every complete frame currently buffered.
///
/// Returns `false` when the connection must be closed (malformed frame or
/// write failure); nothing is written back for a malformed frame.
async fn drain_frames(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
    store: &RegisterStore,
    peer: SocketAddr,
) -> bool {
    loop {
        match frame::decode(buffer) {
            Ok(Some((request, consumed))) => {
                buffer.advance(consumed);

                let response_pdu = handle_request(&request.pdu, store);
                let response = frame::encode(&TcpFrame::new(
                    request.transaction_id,
                    request.unit_id,
                    response_pdu,
                ));

                if let Err(e) = stream.write_all(&response).await {
                    error!("Failed to write response to {peer}: {e}");
                    return false;
                }
            }
            Ok(None) => return true,
            Err(e) => {
                warn!("Malformed frame from {peer}, closing connection: {e}");
                return false;
            }
        }
    }
}
