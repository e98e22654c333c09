//! TCP listener, per-client handlers and the supervisor lifecycle.
//!
//! The slave runs one listener task, one handler task per live
//! connection and one auto-increment worker per enabled bank. A
//! process-wide atomic run flag plus a broadcast channel coordinate
//! shutdown: the flag stops workers on their next wake, the channel
//! unblocks the listener and any handler parked in a read. `stop` joins
//! everything before returning.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::autoinc::run_worker;
use crate::config::SlaveConfig;
use crate::engine::ProtocolEngine;
use crate::error::{ModsimError, ModsimResult};
use crate::frame::{MbapHeader, MAX_PDU_LEN};
use crate::store::{RegisterStore, WordBank};
use crate::utils::bytes_to_hex;
use crate::RECV_BUFFER_LEN;

/// Listen backlog for the accepting socket
const LISTEN_BACKLOG: u32 = 128;

/// Modbus slave lifecycle
#[async_trait]
pub trait ModbusSlave: Send + Sync {
    /// Bind the listener and start workers and handlers
    async fn start(&mut self) -> ModsimResult<()>;

    /// Clear the run flag, close the listener and join every task
    async fn stop(&mut self) -> ModsimResult<()>;

    /// Check if the slave is running
    fn is_running(&self) -> bool;
}

/// Modbus TCP slave simulator
pub struct ModbusTcpSlave {
    config: SlaveConfig,
    store: Arc<RegisterStore>,
    engine: Arc<ProtocolEngine>,
    running: Arc<AtomicBool>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    listener_handle: Option<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
    bound_addr: Option<SocketAddr>,
}

impl ModbusTcpSlave {
    /// Create a slave from a materialized configuration
    ///
    /// The configuration is taken as-is; callers validate it first
    /// (the CLI does so before constructing the slave).
    pub fn new(config: SlaveConfig) -> Self {
        let sizes = config.bank_sizes;
        let store = Arc::new(RegisterStore::new(
            sizes.coils,
            sizes.discrete,
            sizes.holding,
            sizes.input,
        ));
        let engine = Arc::new(ProtocolEngine::new(config.unit_id, store.clone()));

        Self {
            config,
            store,
            engine,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
            listener_handle: None,
            worker_handles: Vec::new(),
            bound_addr: None,
        }
    }

    /// Shared handle to the register banks
    pub fn store(&self) -> Arc<RegisterStore> {
        self.store.clone()
    }

    /// Actual bound address, available after `start`
    ///
    /// Differs from the configured port when it was 0 (ephemeral bind,
    /// useful for tests and embedding).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }
}

#[async_trait]
impl ModbusSlave for ModbusTcpSlave {
    async fn start(&mut self) -> ModsimResult<()> {
        if self.is_running() {
            return Err(ModsimError::connection("slave is already running"));
        }

        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.port));
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.set_nodelay(true)?;
        socket.bind(bind_addr).map_err(|e| {
            ModsimError::connection(format!("failed to bind {}: {}", bind_addr, e))
        })?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        let local_addr = listener.local_addr()?;
        self.bound_addr = Some(local_addr);

        let (shutdown_tx, _) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());
        self.running.store(true, Ordering::Release);

        info!("modbus slave listening on {}", local_addr);
        info!(
            "unit id {}, banks: coils={} discrete={} holding={} input={}",
            self.config.unit_id,
            self.config.bank_sizes.coils,
            self.config.bank_sizes.discrete,
            self.config.bank_sizes.holding,
            self.config.bank_sizes.input
        );

        for (bank, slot) in [
            (WordBank::Holding, &self.config.holding_auto),
            (WordBank::Input, &self.config.input_auto),
        ] {
            if slot.enabled {
                self.worker_handles.push(tokio::spawn(run_worker(
                    self.store.clone(),
                    bank,
                    slot.clone(),
                    self.running.clone(),
                )));
            }
        }

        let engine = self.engine.clone();
        let running = self.running.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        self.listener_handle = Some(tokio::spawn(async move {
            let mut clients: Vec<JoinHandle<()>> = Vec::new();

            loop {
                tokio::select! {
                    result = listener.accept() => match result {
                        Ok((stream, peer)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                warn!("cannot set TCP_NODELAY for {}: {}", peer, e);
                            }
                            clients.push(tokio::spawn(handle_client(
                                stream,
                                peer,
                                engine.clone(),
                                running.clone(),
                                shutdown_tx.subscribe(),
                            )));
                        }
                        Err(e) => {
                            error!("accept failed: {}", e);
                        }
                    },
                    _ = shutdown_rx.recv() => break,
                }

                clients.retain(|handle| !handle.is_finished());
            }

            // Close the accepting socket, then wait out the handlers.
            drop(listener);
            for client in clients {
                let _ = client.await;
            }
            debug!("listener stopped");
        }));

        Ok(())
    }

    async fn stop(&mut self) -> ModsimResult<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.await;
        }
        for handle in self.worker_handles.drain(..) {
            let _ = handle.await;
        }

        info!("modbus slave stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Receive, reassemble and answer frames for one connection
///
/// Bytes accumulate until a complete `6 + MBAP.length` frame is
/// available, so requests split across TCP segments and pipelined
/// requests both dispatch correctly. A frame declaring a length of 0 or
/// beyond the PDU maximum closes the connection as malformed.
async fn handle_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    engine: Arc<ProtocolEngine>,
    running: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    debug!("client connected: {}", peer);

    let mut buf = [0u8; RECV_BUFFER_LEN];
    let mut pending = BytesMut::with_capacity(RECV_BUFFER_LEN);

    'conn: loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break 'conn,
            result = stream.read(&mut buf) => {
                let n = match result {
                    Ok(0) => break 'conn,
                    Ok(n) => n,
                    Err(e) => {
                        debug!("read error from {}: {}", peer, e);
                        break 'conn;
                    }
                };
                pending.extend_from_slice(&buf[..n]);

                while let Some(header) = MbapHeader::parse(&pending[..]) {
                    if header.length == 0 || header.length as usize > MAX_PDU_LEN + 1 {
                        warn!(
                            "malformed frame from {} (declared length {}), closing",
                            peer, header.length
                        );
                        break 'conn;
                    }
                    if pending.len() < header.frame_len() {
                        break;
                    }

                    let request = pending.split_to(header.frame_len());
                    debug!("request from {}: {}", peer, bytes_to_hex(&request));

                    if let Some(response) = engine.process(&request) {
                        if let Err(e) = stream.write_all(&response).await {
                            debug!("write error to {}: {}", peer, e);
                            break 'conn;
                        }
                    }
                }
            }
        }

        if !running.load(Ordering::Acquire) {
            break;
        }
    }

    debug!("client disconnected: {}", peer);
}
