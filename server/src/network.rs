//! UDP bridge between a racing host and the stats tracker
//!
//! Host events arrive as bincode packets, one per datagram. UDP may reorder
//! them, so a `Ready` that beats its `Connect` is held for
//! [`PENDING_READY_TTL`] and applied once the session exists. Velocity
//! reports are only kept for players with an active session.

use crate::clock::ServerClock;
use crate::stat_store::{JsonFileBackend, StatStore};
use crate::tracker::{SpeedTracker, TrackerConfig};
use crate::velocity::VelocityTable;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PlayerGuid};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Largest payload a single UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// How long a `Ready` for an unknown player waits for its `Connect`
pub const PENDING_READY_TTL: Duration = Duration::from_secs(10);

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    Shutdown,
}

/// Receives host events over UDP and drives the tracker's periodic tick
pub struct Server {
    socket: Arc<UdpSocket>,
    tracker: SpeedTracker,
    velocities: Arc<VelocityTable>,
    tick_duration: Duration,
    pending_ready: HashMap<PlayerGuid, Instant>,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the bridge with file-backed storage and the server clock
    pub async fn new(addr: &str, config: &TrackerConfig) -> Result<Self, BoxError> {
        let velocities = Arc::new(VelocityTable::new());
        let store = Arc::new(StatStore::new(JsonFileBackend::new(&config.data_dir)));
        let tracker = SpeedTracker::start(
            Arc::new(ServerClock::new()),
            velocities.clone(),
            store,
            config.persist_queue_capacity,
        );

        info!("Storing driver stats in {}", config.data_dir.display());
        Self::bind(addr, tracker, velocities, config.tick_interval).await
    }

    /// Binds the bridge around an already constructed tracker
    pub async fn bind(
        addr: &str,
        tracker: SpeedTracker,
        velocities: Arc<VelocityTable>,
        tick_duration: Duration,
    ) -> Result<Self, BoxError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            tracker,
            velocities,
            tick_duration,
            pending_ready: HashMap::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn tracker(&self) -> SpeedTracker {
        self.tracker.clone()
    }

    /// Handle for stopping the main loop from another task
    pub fn shutdown_sender(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        let result = match serialize(packet) {
            Ok(data) => self.socket.send_to(&data, addr).await.map(|_| ()),
            Err(e) => {
                error!("Failed to serialize packet: {}", e);
                return;
            }
        };

        if let Err(e) = result {
            error!("Failed to send packet to {}: {}", addr, e);
        }
    }

    /// Applies one host event to the tracker
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { guid, name, model } => {
                if !self.tracker.on_connect(guid, name, model).await {
                    debug!("Ignoring repeated connect for {} from {}", guid, addr);
                    return;
                }

                if let Some(received) = self.pending_ready.remove(&guid) {
                    if received.elapsed() <= PENDING_READY_TTL {
                        debug!("Applying early ready for {}", guid);
                        self.tracker.on_ready(guid).await;
                    }
                }
            }

            Packet::Ready { guid } => {
                if !self.tracker.on_ready(guid).await {
                    debug!("Ready for unknown player {}, holding until connect", guid);
                    self.pending_ready.insert(guid, Instant::now());
                }
            }

            Packet::Velocity { guid, velocity } => {
                if self.tracker.has_session(guid).await {
                    self.velocities.update(guid, velocity);
                }
            }

            Packet::Disconnect { guid } => {
                self.pending_ready.remove(&guid);
                self.velocities.remove(guid);
                self.tracker.on_disconnect(guid).await;
            }

            Packet::EntryList { cars } => {
                let queued = self.tracker.register_models(&cars).await;
                debug!("Queued {} model summaries from {}", queued, addr);
            }

            Packet::QueryStats { guid } => {
                let response = Packet::LiveStats {
                    guid,
                    name: self.tracker.sanitized_name(guid).await,
                    average_speed: self.tracker.average_speed(guid).await,
                    top_speed: self.tracker.top_speed(guid).await,
                };
                self.send_packet(&response, addr).await;
            }

            Packet::LiveStats { .. } => {
                warn!("Unexpected packet type from host at {}", addr);
            }
        }
    }

    /// Main server loop: host events and sampling ticks
    ///
    /// Runs until a shutdown message arrives, then saves every open session.
    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.spawn_network_receiver();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let sampled = self.tracker.on_tick().await;
                    self.expire_pending_ready();
                    ticks += 1;

                    if ticks % 60 == 0 {
                        let sessions = self.tracker.session_count().await;
                        debug!("Tick {}: {} sessions, {} sampled", ticks, sessions, sampled);
                    }
                },
            }
        }

        self.tracker.shutdown().await?;
        self.velocities.clear();
        self.pending_ready.clear();
        Ok(())
    }

    fn expire_pending_ready(&mut self) {
        self.pending_ready.retain(|guid, received| {
            let keep = received.elapsed() <= PENDING_READY_TTL;
            if !keep {
                warn!("Dropping ready for {}: no connect arrived", guid);
            }
            keep
        });
    }
}
