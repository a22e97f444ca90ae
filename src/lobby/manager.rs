use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::input_buffer::IntentOutcome;
use crate::game::match_result::MatchResult;
use crate::game::state::{Direction, Grid, PlayerId, RoomId};
use crate::lobby::room::{GameRoom, RematchProgress, RoomError, RoomState, RoomTick};
use crate::net::protocol::{ClientMessage, ServerMessage};

/// A message addressed to one player
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub to: PlayerId,
    pub message: ServerMessage,
}

/// Timer the network layer must arm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Tick interval and time limit for a new generation
    Generation { room_id: RoomId, generation: u64 },
    /// Delay before the rematch generation starts
    RematchCountdown { room_id: RoomId, generation: u64 },
    /// Close the room if nobody joins in time
    WaitingExpiry { room_id: RoomId },
}

/// Side effects of a lobby operation
#[derive(Debug, Default)]
pub struct Dispatch {
    pub outbound: Vec<OutboundMessage>,
    pub schedule: Vec<Schedule>,
    /// Generations that ended during the operation
    pub results: Vec<(RoomId, MatchResult)>,
}

impl Dispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: PlayerId, message: ServerMessage) {
        self.outbound.push(OutboundMessage { to, message });
    }

    pub fn broadcast<I>(&mut self, players: I, message: ServerMessage)
    where
        I: IntoIterator<Item = PlayerId>,
    {
        for to in players {
            self.send(to, message.clone());
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.schedule.is_empty() && self.results.is_empty()
    }

    /// Messages addressed to `player_id`, in order
    #[cfg(test)]
    pub fn messages_for(&self, player_id: PlayerId) -> Vec<&ServerMessage> {
        self.outbound
            .iter()
            .filter(|o| o.to == player_id)
            .map(|o| &o.message)
            .collect()
    }
}

/// Outcome of a tick timer firing
#[derive(Debug)]
pub struct TickReport {
    pub dispatch: Dispatch,
    /// `false` once the generation is over or the room is gone
    pub running: bool,
}

/// Lobby settings
#[derive(Debug, Clone, Copy)]
pub struct LobbySettings {
    pub max_rooms: usize,
    pub grid: Grid,
    /// Arm a waiting-room expiry timer on create
    pub expire_waiting_rooms: bool,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            max_rooms: 1000,
            grid: Grid::default(),
            expire_waiting_rooms: true,
        }
    }
}

/// Room registry and lifecycle
pub struct LobbyManager {
    rooms: HashMap<RoomId, GameRoom>,
    player_rooms: HashMap<PlayerId, RoomId>,
    settings: LobbySettings,
    rng: StdRng,
}

impl LobbyManager {
    pub fn new(settings: LobbySettings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    pub fn with_rng(settings: LobbySettings, rng: StdRng) -> Self {
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            settings,
            rng,
        }
    }

    /// Handle a decoded client message
    pub fn handle_message(&mut self, player_id: PlayerId, message: ClientMessage) -> Dispatch {
        match message {
            ClientMessage::CreateRoom => self.create_room(player_id),
            ClientMessage::JoinRoom(room_id) => {
                let joined = parse_room_id(&room_id)
                    .ok_or(ManagerError::RoomUnavailable)
                    .and_then(|room_id| self.join_room(room_id, player_id));
                match joined {
                    Ok(dispatch) => dispatch,
                    Err(e) => {
                        debug!("Player {} failed to join {:?}: {}", player_id, room_id, e);
                        let mut dispatch = Dispatch::new();
                        dispatch.send(player_id, ServerMessage::RoomFullOrInvalid);
                        dispatch
                    }
                }
            }
            ClientMessage::Direction(input) => {
                match input.to_direction() {
                    Some(direction) => {
                        self.set_direction(player_id, direction);
                    }
                    None => debug!("Player {} sent invalid direction {:?}", player_id, input),
                }
                Dispatch::new()
            }
            ClientMessage::RequestRematch(room_id) => match parse_room_id(&room_id) {
                Some(room_id) => self.request_rematch(player_id, room_id),
                None => Dispatch::new(),
            },
            ClientMessage::DeclineRematch(room_id) => match parse_room_id(&room_id) {
                Some(room_id) => self.decline_rematch(player_id, room_id),
                None => Dispatch::new(),
            },
            ClientMessage::LeaveRoom => self.player_disconnect(player_id),
            ClientMessage::Ping { timestamp } => {
                let mut dispatch = Dispatch::new();
                dispatch.send(
                    player_id,
                    ServerMessage::Pong {
                        client_timestamp: timestamp,
                        server_timestamp: unix_millis(),
                    },
                );
                dispatch
            }
        }
    }

    /// Create a room with `host` as its only player
    ///
    /// A host already seated elsewhere leaves that room first.
    pub fn create_room(&mut self, host: PlayerId) -> Dispatch {
        let mut dispatch = self.leave_current_room(host);

        if self.rooms.len() >= self.settings.max_rooms {
            warn!("Room limit {} reached, rejecting create from {}", self.settings.max_rooms, host);
            dispatch.send(host, ServerMessage::RoomFullOrInvalid);
            return dispatch;
        }

        let room_id = Uuid::new_v4();
        self.rooms.insert(room_id, GameRoom::new(room_id, host));
        self.player_rooms.insert(host, room_id);
        info!("Room {} created by {}", room_id, host);

        dispatch.send(host, ServerMessage::RoomCreated(room_id));
        if self.settings.expire_waiting_rooms {
            dispatch.schedule.push(Schedule::WaitingExpiry { room_id });
        }
        dispatch
    }

    /// Seat `player_id` in a waiting room and start the first generation
    pub fn join_room(&mut self, room_id: RoomId, player_id: PlayerId) -> Result<Dispatch, ManagerError> {
        let joinable = self
            .rooms
            .get(&room_id)
            .is_some_and(|room| room.state == RoomState::Waiting && !room.is_full() && !room.contains(player_id));
        if !joinable {
            return Err(ManagerError::RoomUnavailable);
        }

        let mut dispatch = self.leave_current_room(player_id);

        let grid = self.settings.grid;
        let room = self.rooms.get_mut(&room_id).ok_or(ManagerError::RoomUnavailable)?;
        room.add_player(player_id)?;
        let generation = room.start_generation(grid, &mut self.rng)?;
        self.player_rooms.insert(player_id, room_id);
        info!("Player {} joined room {}, generation {} starting", player_id, room_id, generation);

        dispatch.broadcast(room.player_ids(), room.start_message());
        dispatch.schedule.push(Schedule::Generation { room_id, generation });
        Ok(dispatch)
    }

    /// Remove a room and its player mappings; its timers are aborted
    pub fn destroy_room(&mut self, room_id: RoomId) -> Option<GameRoom> {
        let room = self.rooms.remove(&room_id)?;
        for player_id in room.player_ids() {
            if self.player_rooms.get(&player_id) == Some(&room_id) {
                self.player_rooms.remove(&player_id);
            }
        }
        debug!("Room {} destroyed", room_id);
        Some(room)
    }

    /// Route a direction intent to the player's running generation
    pub fn set_direction(&mut self, player_id: PlayerId, direction: Direction) -> Option<IntentOutcome> {
        let room_id = self.player_rooms.get(&player_id)?;
        let outcome = self.rooms.get_mut(room_id)?.set_direction(player_id, direction);
        if outcome == Some(IntentOutcome::IllegalReversal) {
            debug!("Player {} reversal to {:?} ignored", player_id, direction);
        }
        outcome
    }

    /// Tick timer fired for `generation`
    pub fn tick_room(&mut self, room_id: RoomId, generation: u64) -> TickReport {
        let mut dispatch = Dispatch::new();
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return TickReport { dispatch, running: false };
        };

        let running = match room.tick(generation, &mut self.rng) {
            RoomTick::Snapshot(snapshot) => {
                dispatch.broadcast(room.player_ids(), ServerMessage::GameState(snapshot));
                true
            }
            RoomTick::Finished(result) => {
                info!(
                    "Room {} generation {} over: {} after {} ticks",
                    room_id,
                    generation,
                    result.reason.as_str(),
                    result.ticks
                );
                dispatch.broadcast(room.player_ids(), ServerMessage::game_over(&result));
                dispatch.results.push((room_id, result));
                false
            }
            RoomTick::Stale => false,
        };

        TickReport { dispatch, running }
    }

    /// Time limit fired for `generation`
    pub fn expire_generation(&mut self, room_id: RoomId, generation: u64) -> Dispatch {
        let mut dispatch = Dispatch::new();
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return dispatch;
        };

        if let Some(result) = room.expire(generation) {
            info!("Room {} generation {} reached the time limit", room_id, generation);
            dispatch.broadcast(room.player_ids(), ServerMessage::game_over(&result));
            dispatch.results.push((room_id, result));
        }
        dispatch
    }

    /// Record a rematch consent
    ///
    /// The opponent hears about the first consent; once both agreed, both
    /// get `prepareRematch` and the countdown is scheduled.
    pub fn request_rematch(&mut self, player_id: PlayerId, room_id: RoomId) -> Dispatch {
        let mut dispatch = Dispatch::new();
        if self.player_rooms.get(&player_id) != Some(&room_id) {
            debug!("Rematch request from {} for foreign room {}", player_id, room_id);
            return dispatch;
        }
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return dispatch;
        };

        match room.request_rematch(player_id) {
            Ok(RematchProgress::AwaitingOpponent) => {
                if let Some(opponent) = room.opponent_of(player_id) {
                    dispatch.send(opponent, ServerMessage::RematchRequested(player_id));
                }
            }
            Ok(RematchProgress::Duplicate) => {}
            Ok(RematchProgress::Agreed) => {
                info!("Room {} rematch agreed", room_id);
                dispatch.broadcast(room.player_ids(), ServerMessage::PrepareRematch);
                dispatch.schedule.push(Schedule::RematchCountdown {
                    room_id,
                    generation: room.generation(),
                });
            }
            Err(e) => debug!("Rematch request from {} ignored: {}", player_id, e),
        }
        dispatch
    }

    /// Countdown elapsed; start the next generation
    pub fn begin_rematch(&mut self, room_id: RoomId, generation: u64) -> Dispatch {
        let mut dispatch = Dispatch::new();
        let grid = self.settings.grid;
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return dispatch;
        };
        if room.state != RoomState::RematchCountdown || room.generation() != generation {
            return dispatch;
        }

        match room.start_generation(grid, &mut self.rng) {
            Ok(next) => {
                info!("Room {} generation {} starting", room_id, next);
                dispatch.broadcast(room.player_ids(), room.start_message());
                dispatch.schedule.push(Schedule::Generation {
                    room_id,
                    generation: next,
                });
            }
            Err(e) => warn!("Room {} rematch failed to start: {}", room_id, e),
        }
        dispatch
    }

    /// A player refused the rematch; the room closes in any state
    pub fn decline_rematch(&mut self, player_id: PlayerId, room_id: RoomId) -> Dispatch {
        let mut dispatch = Dispatch::new();
        if self.player_rooms.get(&player_id) != Some(&room_id) {
            return dispatch;
        }
        if let Some(room) = self.destroy_room(room_id) {
            info!("Room {} closed: rematch declined by {}", room_id, player_id);
            dispatch.broadcast(room.player_ids(), ServerMessage::RematchDeclined);
        }
        dispatch
    }

    /// A player's connection closed, or they left voluntarily
    pub fn player_disconnect(&mut self, player_id: PlayerId) -> Dispatch {
        self.leave_current_room(player_id)
    }

    /// Waiting-room timer fired
    pub fn expire_waiting_room(&mut self, room_id: RoomId) -> Dispatch {
        let mut dispatch = Dispatch::new();
        let waiting = self
            .rooms
            .get(&room_id)
            .is_some_and(|room| room.state == RoomState::Waiting);
        if !waiting {
            return dispatch;
        }
        if let Some(room) = self.destroy_room(room_id) {
            info!("Room {} expired with no opponent", room_id);
            dispatch.broadcast(room.player_ids(), ServerMessage::RoomExpired);
        }
        dispatch
    }

    fn leave_current_room(&mut self, player_id: PlayerId) -> Dispatch {
        let mut dispatch = Dispatch::new();
        let Some(room_id) = self.player_rooms.get(&player_id).copied() else {
            return dispatch;
        };
        if let Some(room) = self.destroy_room(room_id) {
            info!("Player {} left room {}, closing it", player_id, room_id);
            if let Some(opponent) = room.opponent_of(player_id) {
                dispatch.send(opponent, ServerMessage::OpponentDisconnected);
            }
        }
        dispatch
    }

    #[cfg(test)]
    pub fn get_room(&self, room_id: RoomId) -> Option<&GameRoom> {
        self.rooms.get(&room_id)
    }

    pub fn get_room_mut(&mut self, room_id: RoomId) -> Option<&mut GameRoom> {
        self.rooms.get_mut(&room_id)
    }

    pub fn get_player_room(&self, player_id: PlayerId) -> Option<RoomId> {
        self.player_rooms.get(&player_id).copied()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Rooms with a generation in progress
    pub fn playing_room_count(&self) -> usize {
        self.rooms
            .values()
            .filter(|room| room.state == RoomState::Playing)
            .count()
    }

    pub fn total_player_count(&self) -> usize {
        self.player_rooms.len()
    }

    /// Drop every room, aborting all timers
    pub fn shutdown_all_rooms(&mut self) {
        self.rooms.clear();
        self.player_rooms.clear();
    }
}

impl Default for LobbyManager {
    fn default() -> Self {
        Self::new(LobbySettings::default())
    }
}

fn parse_room_id(raw: &str) -> Option<RoomId> {
    Uuid::parse_str(raw.trim()).ok()
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Manager errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("Room unknown, full or not accepting players")]
    RoomUnavailable,
    #[error("Room error: {0}")]
    RoomError(#[from] RoomError),
}
