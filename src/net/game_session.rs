//! Game session - owns the lobby, routes messages to connections and runs
//! the per-room timers.
//!
//! Every lobby operation runs under the session's write lock and returns a
//! [`Dispatch`]. [`apply`] delivers its messages through each player's
//! outbound channel and spawns the timer tasks it asks for. Timer handles are
//! stored on the room, so destroying or finishing a room aborts them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::game::state::{PlayerId, RoomId};
use crate::lobby::manager::{Dispatch, LobbyManager, LobbySettings, OutboundMessage, Schedule};
use crate::metrics::Metrics;
use crate::net::protocol::{ClientMessage, ServerMessage};

pub type SharedSession = Arc<RwLock<GameSession>>;

/// Timer durations
#[derive(Debug, Clone, Copy)]
pub struct SessionTimings {
    pub tick_interval: Duration,
    pub match_duration: Duration,
    pub rematch_delay: Duration,
    pub waiting_room_ttl: Option<Duration>,
}

impl From<&ServerConfig> for SessionTimings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            match_duration: config.match_duration,
            rematch_delay: config.rematch_delay,
            waiting_room_ttl: config.waiting_room_ttl,
        }
    }
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// Shared state behind the session lock
pub struct GameSession {
    pub lobby: LobbyManager,
    connections: HashMap<PlayerId, mpsc::UnboundedSender<ServerMessage>>,
    timings: SessionTimings,
    metrics: Arc<Metrics>,
}

impl GameSession {
    pub fn new(lobby: LobbyManager, timings: SessionTimings, metrics: Arc<Metrics>) -> Self {
        Self {
            lobby,
            connections: HashMap::new(),
            timings,
            metrics,
        }
    }

    pub fn from_config(config: &ServerConfig, metrics: Arc<Metrics>) -> Self {
        let timings = SessionTimings::from(config);
        let lobby = LobbyManager::new(LobbySettings {
            max_rooms: config.max_rooms,
            expire_waiting_rooms: timings.waiting_room_ttl.is_some(),
            ..LobbySettings::default()
        });
        Self::new(lobby, timings, metrics)
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    #[cfg(test)]
    pub fn is_connected(&self, player_id: PlayerId) -> bool {
        self.connections.contains_key(&player_id)
    }

    fn register(&mut self) -> (PlayerId, mpsc::UnboundedReceiver<ServerMessage>) {
        let player_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive, cannot fail
        let _ = tx.send(ServerMessage::Connected { player_id });
        self.connections.insert(player_id, tx);
        (player_id, rx)
    }

    fn deliver(&self, outbound: Vec<OutboundMessage>) {
        for OutboundMessage { to, message } in outbound {
            trace!("-> {} {}", to, message.event_name());
            let sent = self
                .connections
                .get(&to)
                .is_some_and(|tx| tx.send(message).is_ok());
            if sent {
                self.metrics.messages_sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            } else {
                debug!("Dropping message for disconnected player {}", to);
                self.metrics.messages_dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }
}

/// Register a new connection; its first queued message is `connected`
pub async fn connect(session: &SharedSession) -> (PlayerId, mpsc::UnboundedReceiver<ServerMessage>) {
    let mut guard = session.write().await;
    let (player_id, rx) = guard.register();
    info!("Player {} connected ({} online)", player_id, guard.connections.len());
    (player_id, rx)
}

/// Route one decoded client message
pub async fn handle_message(session: &SharedSession, player_id: PlayerId, message: ClientMessage) {
    let mut guard = session.write().await;
    let dispatch = guard.lobby.handle_message(player_id, message);
    apply(session, &mut guard, dispatch);
}

/// Drop the connection and close the player's room
pub async fn disconnect(session: &SharedSession, player_id: PlayerId) {
    let mut guard = session.write().await;
    guard.connections.remove(&player_id);
    let dispatch = guard.lobby.player_disconnect(player_id);
    apply(session, &mut guard, dispatch);
    info!("Player {} disconnected ({} online)", player_id, guard.connections.len());
}

/// Close every room and connection
pub async fn shutdown(session: &SharedSession) {
    let mut guard = session.write().await;
    guard.lobby.shutdown_all_rooms();
    guard.connections.clear();
    update_lobby_gauges(&guard);
}

/// Carry out a dispatch: record results, arm timers, deliver messages
fn apply(shared: &SharedSession, session: &mut GameSession, dispatch: Dispatch) {
    use std::sync::atomic::Ordering;

    let Dispatch {
        outbound,
        schedule,
        results,
    } = dispatch;

    for (_, result) in &results {
        session.metrics.record_result(result);
    }
    for message in outbound.iter().map(|o| &o.message) {
        match message {
            ServerMessage::RoomCreated(_) => {
                session.metrics.rooms_created.fetch_add(1, Ordering::Relaxed);
            }
            ServerMessage::RoomExpired => {
                session.metrics.rooms_expired.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
    if outbound.iter().any(|o| o.message == ServerMessage::RematchDeclined) {
        session.metrics.rematches_declined.fetch_add(1, Ordering::Relaxed);
    }

    for entry in schedule {
        arm(shared, session, entry);
    }
    session.deliver(outbound);
    update_lobby_gauges(session);
}

fn update_lobby_gauges(session: &GameSession) {
    let lobby = &session.lobby;
    session.metrics.update_lobby(
        lobby.room_count(),
        lobby.playing_room_count(),
        lobby.total_player_count(),
    );
    session.metrics.connections_active.store(
        session.connections.len() as u64,
        std::sync::atomic::Ordering::Relaxed,
    );
}

/// Spawn the task for a timer and attach it to its room
fn arm(shared: &SharedSession, session: &mut GameSession, entry: Schedule) {
    use std::sync::atomic::Ordering;

    let timings = session.timings;
    let (room_id, handle): (RoomId, JoinHandle<()>) = match entry {
        Schedule::Generation { room_id, generation } => {
            session.metrics.games_started.fetch_add(1, Ordering::Relaxed);
            (
                room_id,
                tokio::spawn(run_generation(shared.clone(), room_id, generation, timings)),
            )
        }
        Schedule::RematchCountdown { room_id, generation } => {
            session.metrics.rematches_agreed.fetch_add(1, Ordering::Relaxed);
            (
                room_id,
                tokio::spawn(run_rematch_countdown(
                    shared.clone(),
                    room_id,
                    generation,
                    timings.rematch_delay,
                )),
            )
        }
        Schedule::WaitingExpiry { room_id } => {
            let Some(ttl) = timings.waiting_room_ttl else {
                return;
            };
            (
                room_id,
                tokio::spawn(run_waiting_expiry(shared.clone(), room_id, ttl)),
            )
        }
    };

    match session.lobby.get_room_mut(room_id) {
        Some(room) => room.timers.install(handle.abort_handle()),
        None => handle.abort(),
    }
}

/// Tick interval and time limit of one generation
///
/// Both funnel into the lobby, which ignores them once the generation is
/// over, so whichever fires second is a no-op.
async fn run_generation(shared: SharedSession, room_id: RoomId, generation: u64, timings: SessionTimings) {
    let mut ticker = interval(timings.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    let deadline = sleep(timings.match_duration);
    tokio::pin!(deadline);

    debug!("Room {} generation {} timers armed", room_id, generation);

    loop {
        tokio::select! {
            biased;

            _ = &mut deadline => {
                let mut guard = shared.write().await;
                let dispatch = guard.lobby.expire_generation(room_id, generation);
                apply(&shared, &mut guard, dispatch);
                return;
            }
            _ = ticker.tick() => {
                let mut guard = shared.write().await;
                let started = Instant::now();
                let report = guard.lobby.tick_room(room_id, generation);
                guard.metrics.record_tick_time(started.elapsed());
                let running = report.running;
                apply(&shared, &mut guard, report.dispatch);
                if !running {
                    return;
                }
            }
        }
    }
}

async fn run_rematch_countdown(shared: SharedSession, room_id: RoomId, generation: u64, delay: Duration) {
    sleep(delay).await;
    let mut guard = shared.write().await;
    let dispatch = guard.lobby.begin_rematch(room_id, generation);
    apply(&shared, &mut guard, dispatch);
}

async fn run_waiting_expiry(shared: SharedSession, room_id: RoomId, ttl: Duration) {
    sleep(ttl).await;
    let mut guard = shared.write().await;
    let dispatch = guard.lobby.expire_waiting_room(room_id);
    apply(&shared, &mut guard, dispatch);
}
