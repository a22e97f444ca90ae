use hashbrown::HashMap;
use rand::Rng;
use smallvec::SmallVec;
use tokio::task::AbortHandle;

use crate::game::constants::room::MAX_PLAYERS;
use crate::game::input_buffer::IntentOutcome;
use crate::game::match_result::{EndCause, MatchResult};
use crate::game::simulation::{Simulation, StepOutcome};
use crate::game::state::{Direction, Grid, PlayerId, RoomId};
use crate::lobby::player::{LobbyPlayer, PlayerRole};
use crate::net::protocol::{GameSnapshot, ServerMessage};

/// Room state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Host waiting for a second player
    Waiting,
    /// Generation in progress
    Playing,
    /// Generation over, no rematch consent yet
    Ended,
    /// One player asked for a rematch
    RematchPending,
    /// Both agreed; new generation starts after the countdown
    RematchCountdown,
}

/// Abort handles of the timer tasks driving a room
///
/// Cancelling (or dropping) aborts every task, so no timer outlives the
/// room or the generation it was armed for.
#[derive(Debug, Default)]
pub struct RoomTimers {
    handles: Vec<AbortHandle>,
}

impl RoomTimers {
    pub fn install(&mut self, handle: AbortHandle) {
        self.handles.retain(|h| !h.is_finished());
        self.handles.push(handle);
    }

    pub fn cancel(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for RoomTimers {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Result of one tick on a room
#[derive(Debug, Clone)]
pub enum RoomTick {
    Snapshot(GameSnapshot),
    Finished(MatchResult),
    /// Timer belongs to an older generation or the room is not playing
    Stale,
}

/// Rematch negotiation progress after a consent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RematchProgress {
    /// First consent recorded, waiting on the opponent
    AwaitingOpponent,
    /// Player had already consented
    Duplicate,
    /// Both consented; countdown starts
    Agreed,
}

/// Two-player game room
pub struct GameRoom {
    pub id: RoomId,
    pub state: RoomState,
    players: SmallVec<[LobbyPlayer; MAX_PLAYERS]>,
    rematch_votes: SmallVec<[PlayerId; MAX_PLAYERS]>,
    generation: u64,
    simulation: Option<Simulation>,
    pub timers: RoomTimers,
}

impl GameRoom {
    pub fn new(id: RoomId, host: PlayerId) -> Self {
        let mut players = SmallVec::new();
        players.push(LobbyPlayer::new(host, PlayerRole::Host));
        Self {
            id,
            state: RoomState::Waiting,
            players,
            rematch_votes: SmallVec::new(),
            generation: 0,
            simulation: None,
            timers: RoomTimers::default(),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.player_count() >= MAX_PLAYERS
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == player_id)
    }

    pub fn players(&self) -> &[LobbyPlayer] {
        &self.players
    }

    /// Player ids in join order
    pub fn player_ids(&self) -> SmallVec<[PlayerId; MAX_PLAYERS]> {
        self.players.iter().map(|p| p.id).collect()
    }

    pub fn opponent_of(&self, player_id: PlayerId) -> Option<PlayerId> {
        self.players
            .iter()
            .map(|p| p.id)
            .find(|id| *id != player_id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn simulation(&self) -> Option<&Simulation> {
        self.simulation.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn install_simulation(&mut self, simulation: Simulation) {
        self.simulation = Some(simulation);
    }

    #[cfg(test)]
    pub(crate) fn simulation_mut(&mut self) -> Option<&mut Simulation> {
        self.simulation.as_mut()
    }

    pub fn rematch_votes(&self) -> &[PlayerId] {
        &self.rematch_votes
    }

    /// Color tag per player
    pub fn assignments(&self) -> HashMap<PlayerId, String> {
        self.players
            .iter()
            .map(|p| (p.id, p.color().to_string()))
            .collect()
    }

    pub fn start_message(&self) -> ServerMessage {
        ServerMessage::StartGame {
            room_id: self.id,
            players: self.assignments(),
        }
    }

    /// Seat a second player
    pub fn add_player(&mut self, player_id: PlayerId) -> Result<&LobbyPlayer, RoomError> {
        if self.contains(player_id) {
            return Err(RoomError::AlreadySeated);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }
        if self.state != RoomState::Waiting {
            return Err(RoomError::GameInProgress);
        }

        let role = PlayerRole::from_seat(self.players.len());
        self.players.push(LobbyPlayer::new(player_id, role));
        Ok(&self.players[self.players.len() - 1])
    }

    /// Begin a new generation with fresh snakes, scores and fruit
    pub fn start_generation<R: Rng + ?Sized>(&mut self, grid: Grid, rng: &mut R) -> Result<u64, RoomError> {
        match self.state {
            RoomState::Waiting | RoomState::RematchCountdown => {}
            state => return Err(RoomError::InvalidState(state)),
        }
        if !self.is_full() {
            return Err(RoomError::NotEnoughPlayers);
        }

        // Timers of the previous phase (waiting expiry, rematch countdown) are done
        self.timers.cancel();
        self.rematch_votes.clear();
        self.generation += 1;
        self.simulation = Some(Simulation::new(&self.player_ids(), grid, rng));
        self.state = RoomState::Playing;

        Ok(self.generation)
    }

    /// Route a direction intent to the running simulation
    pub fn set_direction(&mut self, player_id: PlayerId, direction: Direction) -> Option<IntentOutcome> {
        if self.state != RoomState::Playing {
            return None;
        }
        self.simulation
            .as_mut()
            .map(|sim| sim.set_intent(player_id, direction))
    }

    /// Run one tick of `generation`
    pub fn tick<R: Rng + ?Sized>(&mut self, generation: u64, rng: &mut R) -> RoomTick {
        if generation != self.generation || self.state != RoomState::Playing {
            return RoomTick::Stale;
        }
        let Some(sim) = self.simulation.as_mut() else {
            return RoomTick::Stale;
        };

        match sim.step(rng) {
            StepOutcome::Advanced { .. } => RoomTick::Snapshot(GameSnapshot::from_simulation(sim)),
            StepOutcome::Finished(result) => {
                self.finish();
                RoomTick::Finished(result)
            }
            StepOutcome::Idle => RoomTick::Stale,
        }
    }

    /// Time limit of `generation` reached
    pub fn expire(&mut self, generation: u64) -> Option<MatchResult> {
        if generation != self.generation || self.state != RoomState::Playing {
            return None;
        }
        let result = self.simulation.as_mut()?.terminate(EndCause::TimeLimit)?;
        self.finish();
        Some(result)
    }

    fn finish(&mut self) {
        self.timers.cancel();
        self.state = RoomState::Ended;
    }

    /// Record a rematch consent
    pub fn request_rematch(&mut self, player_id: PlayerId) -> Result<RematchProgress, RoomError> {
        if !self.contains(player_id) {
            return Err(RoomError::PlayerNotFound);
        }
        match self.state {
            RoomState::Ended | RoomState::RematchPending => {}
            state => return Err(RoomError::InvalidState(state)),
        }
        if self.rematch_votes.contains(&player_id) {
            return Ok(RematchProgress::Duplicate);
        }

        self.rematch_votes.push(player_id);
        if self.rematch_votes.len() == self.players.len() {
            self.rematch_votes.clear();
            self.state = RoomState::RematchCountdown;
            Ok(RematchProgress::Agreed)
        } else {
            self.state = RoomState::RematchPending;
            Ok(RematchProgress::AwaitingOpponent)
        }
    }
}

/// Room errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room is full")]
    RoomFull,
    #[error("Game already in progress")]
    GameInProgress,
    #[error("Not enough players")]
    NotEnoughPlayers,
    #[error("Player not found")]
    PlayerNotFound,
    #[error("Player already seated")]
    AlreadySeated,
    #[error("Not allowed in state {0:?}")]
    InvalidState(RoomState),
}
