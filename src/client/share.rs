//! Share client: keeps a connection to the relay, publishes local observations on every tick and
//! merges the relay's heartbeats into the shared [`ShareState`].
//!
//! Two tasks run while the client is started: the tick task (observe, decide, queue a frame) and
//! the connection task (connect, send queued frames, read heartbeats, reconnect). They only meet
//! through the `Mutex<ShareState>` and an unbounded frame queue.

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::observer::{LocalObservation, LocalObserver, MapReader, PlayerMapState, PlayerView};
use super::state::ShareState;
use crate::config::client::{ClientConfig, TICK_INTERVAL_MS};
use crate::identity::IdentityHasher;
use crate::protocol::{MapIdentifier, PseudonymousId, ShareData, parse_share};

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a connection attempt or an established connection ended.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("connection failed: {0}")]
    Connect(#[source] tungstenite::Error),
    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[source] tungstenite::Error),
    #[error("relay closed the connection")]
    Closed,
    #[error("no message from relay for {0:?}")]
    Stale(Duration),
}

/// State shared between the tasks and the rendering side.
struct Shared {
    state: Mutex<ShareState>,
    connected: AtomicBool,
    observation: Mutex<LocalObservation>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    hasher: IdentityHasher,
    observer: Arc<dyn LocalObserver>,
    reader: Arc<dyn MapReader>,
}

impl Shared {
    /// One tick: observe, derive ids, update the state, queue a frame if the state asks for it.
    fn tick(&self, now: Instant) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        let observation = self.observer.observe();
        let sent = if observation.is_grouped() {
            let own_id = self.hasher.make_id(observation.player_id, observation.group_id, observation.group_id2);
            let party: Vec<PseudonymousId> = observation
                .others()
                .map(|m| self.hasher.make_id(m.player_id, observation.group_id, observation.group_id2))
                .collect();
            let own = self.reader.current_map();
            self.publish(&own_id, own, &party, now)
        } else {
            self.publish("", MapIdentifier::NONE, &[], now)
        };
        *self.observation.lock() = observation;
        sent
    }

    fn publish(&self, own_id: &str, own: MapIdentifier, party: &[PseudonymousId], now: Instant) -> bool {
        let frame = self.state.lock().update(own_id, own, party, now);
        let Some(frame) = frame else {
            return false;
        };
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Goes online for a fresh connection. Frames still queued for the previous connection are
    /// discarded first; anything queued after the memo reset belongs to this connection.
    fn begin_session(&self, outbound: &mut mpsc::UnboundedReceiver<String>) {
        while outbound.try_recv().is_ok() {}
        self.on_connected();
    }

    fn on_connected(&self) {
        self.state.lock().reset_transmitted();
        self.connected.store(true, Ordering::SeqCst);
    }

    fn on_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.state.lock().reset_transmitted();
    }

    fn on_message(&self, text: &str) {
        match parse_share(text) {
            Ok(update) => {
                let applied = self.state.lock().apply_inbound(&update);
                debug!("[Share] Heartbeat applied to {} party member(s)", applied);
            }
            Err(e) => error!("[Share] Dropped inbound payload: {}", e),
        }
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Handle owned by the host. Must be started from inside a Tokio runtime.
pub struct ShareClient {
    shared: Arc<Shared>,
    tick_interval: Duration,
    running: Option<Running>,
}

impl ShareClient {
    pub fn new(observer: Arc<dyn LocalObserver>, reader: Arc<dyn MapReader>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ShareState::new()),
                connected: AtomicBool::new(false),
                observation: Mutex::new(LocalObservation::default()),
                outbound: Mutex::new(None),
                hasher: IdentityHasher::new(),
                observer,
                reader,
            }),
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            running: None,
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Builds a client and starts it right away if the configuration asks for it.
    pub fn launch(config: ClientConfig, observer: Arc<dyn LocalObserver>, reader: Arc<dyn MapReader>) -> Self {
        let mut client = Self::new(observer, reader);
        if config.connect_on_startup {
            client.start(config);
        }
        client
    }

    /// Spawns the tick and connection tasks. No-op if already started.
    pub fn start(&mut self, config: ClientConfig) {
        if self.running.is_some() {
            return;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock() = Some(outbound_tx);

        info!("[Share] Starting client for {}", config.url());
        let connection = tokio::spawn(run_connection(
            self.shared.clone(),
            config,
            outbound_rx,
            shutdown_rx.clone(),
        ));
        let ticks = tokio::spawn(run_ticks(self.shared.clone(), self.tick_interval, shutdown_rx));
        self.running = Some(Running {
            shutdown,
            tasks: vec![connection, ticks],
        });
    }

    /// Closes the socket, stops reconnecting and cancels the tick.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
            for task in running.tasks {
                let _ = task.await;
            }
            info!("[Share] Client stopped");
        }
        self.shared.outbound.lock().take();
        self.shared.on_disconnected();
    }

    /// Restarts with a new configuration (e.g. after the host changed the relay address).
    pub async fn reset(&mut self, config: ClientConfig) {
        self.stop().await;
        self.start(config);
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    /// Offline indicator for the rendering layer.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Per-tick entry point for hosts that compute ids themselves. Returns whether a frame was
    /// queued; nothing is published while offline.
    pub fn update(&self, own_id: &str, own: MapIdentifier, party: &[PseudonymousId]) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.shared.publish(own_id, own, party, Instant::now())
    }

    /// Party id → best-known map.
    pub fn party_view(&self) -> BTreeMap<PseudonymousId, Option<MapIdentifier>> {
        self.shared.state.lock().party_view()
    }

    pub fn snapshot(&self) -> ShareData {
        self.shared.state.lock().data().clone()
    }

    /// The local player followed by the party members seen on the last tick.
    pub fn players(&self) -> Vec<PlayerView> {
        let observation = self.shared.observation.lock().clone();
        let grouped = observation.is_grouped();
        let pseudonym = |player_id: u64| {
            grouped.then(|| {
                self.shared
                    .hasher
                    .make_id(player_id, observation.group_id, observation.group_id2)
            })
        };

        let mut players = vec![PlayerView {
            player_id: observation.player_id,
            name: observation.name.clone(),
            pseudonym: pseudonym(observation.player_id),
            state: PlayerMapState::Local(self.shared.reader.clone()),
        }];
        let state = self.shared.state.lock();
        for member in observation.others() {
            let id = pseudonym(member.player_id);
            let known = id.as_deref().and_then(|id| state.known(id));
            players.push(PlayerView {
                player_id: member.player_id,
                name: member.name.clone(),
                pseudonym: id,
                state: PlayerMapState::Remote(known),
            });
        }
        players
    }
}

impl Drop for ShareClient {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
            for task in running.tasks {
                task.abort();
            }
        }
    }
}

async fn run_ticks(shared: Arc<Shared>, tick_interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                shared.tick(Instant::now());
            }
            _ = shutdown.changed() => return,
        }
    }
}

async fn run_connection(
    shared: Arc<Shared>,
    config: ClientConfig,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let url = config.url();
    loop {
        let attempt = tokio::time::timeout(config.reconnect_timeout(), connect_async(url.as_str()));
        let result = tokio::select! {
            result = attempt => result,
            _ = shutdown.changed() => return,
        };

        let delay = match result {
            Ok(Ok((socket, _))) => {
                shared.begin_session(&mut outbound);
                info!("[Share] Connected to {}", url);
                let outcome = drive_session(&shared, socket, &mut outbound, &mut shutdown, config.stale_after()).await;
                shared.on_disconnected();
                match outcome {
                    Ok(()) => return,
                    Err(e) => {
                        warn!("[Share] Disconnected - {}", e);
                        config.lost_reconnect_timeout()
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("[Share] {}", ShareError::Connect(e));
                config.error_reconnect_timeout()
            }
            Err(_) => {
                warn!("[Share] {}", ShareError::ConnectTimeout(config.reconnect_timeout()));
                config.error_reconnect_timeout()
            }
        };

        debug!("[Share] Reconnecting in {:?}", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

/// Runs one established connection. `Ok(())` means shutdown was requested.
async fn drive_session(
    shared: &Shared,
    socket: RelaySocket,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &mut watch::Receiver<bool>,
    stale_after: Duration,
) -> Result<(), ShareError> {
    let (mut sink, mut stream) = socket.split();
    let stale = tokio::time::sleep(stale_after);
    tokio::pin!(stale);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                sink.send(Message::Text(frame.into())).await.map_err(ShareError::Transport)?;
            }
            msg = stream.next() => {
                stale.as_mut().reset(tokio::time::Instant::now() + stale_after);
                match msg {
                    Some(Ok(Message::Text(text))) => shared.on_message(text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => shared.on_message(text),
                        Err(e) => error!("[Share] Dropped non UTF-8 payload: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => return Err(ShareError::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ShareError::Transport(e)),
                }
            }
            _ = &mut stale => return Err(ShareError::Stale(stale_after)),
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}
