//! Wire protocol
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Event names mirror the browser client's handlers.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::match_result::MatchResult;
use crate::game::simulation::Simulation;
use crate::game::state::{Cell, Direction, PlayerId, RoomId};

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Allocate a new room with the sender as host
    CreateRoom,
    /// Join an existing room by id
    JoinRoom(String),
    /// Steering intent
    Direction(DirectionInput),
    /// Consent to a rematch in the given room
    RequestRematch(String),
    /// Refuse the rematch; closes the room
    DeclineRematch(String),
    /// Leave the current room without closing the connection
    LeaveRoom,
    /// Ping for latency measurement
    Ping { timestamp: u64 },
}

/// Raw direction payload; validated before reaching the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionInput {
    pub x: i32,
    pub y: i32,
}

impl DirectionInput {
    pub fn to_direction(self) -> Option<Direction> {
        Direction::from_components(self.x, self.y)
    }
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// First message on every connection
    #[serde(rename_all = "camelCase")]
    Connected { player_id: PlayerId },
    /// Echo of the new room id to its creator
    RoomCreated(RoomId),
    /// Join rejected: unknown or full room
    RoomFullOrInvalid,
    /// A generation begins
    #[serde(rename_all = "camelCase")]
    StartGame {
        room_id: RoomId,
        players: HashMap<PlayerId, String>,
    },
    /// Per-tick snapshot
    GameState(GameSnapshot),
    /// Generation ended; `winner` is `None` on a tie
    GameOver {
        winner: Option<PlayerId>,
        scores: HashMap<PlayerId, u32>,
    },
    /// The given player wants a rematch
    RematchRequested(PlayerId),
    /// Both players agreed; countdown started
    PrepareRematch,
    /// A player declined; the room is closed
    RematchDeclined,
    /// The peer left; the room is closed
    OpponentDisconnected,
    /// Nobody joined in time; the room is closed
    RoomExpired,
    /// Pong response with server timestamp
    #[serde(rename_all = "camelCase")]
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
}

impl ServerMessage {
    pub fn game_over(result: &MatchResult) -> Self {
        ServerMessage::GameOver {
            winner: result.winner,
            scores: result.scores.clone(),
        }
    }

    /// Event name as sent on the wire
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::RoomCreated(_) => "roomCreated",
            ServerMessage::RoomFullOrInvalid => "roomFullOrInvalid",
            ServerMessage::StartGame { .. } => "startGame",
            ServerMessage::GameState(_) => "gameState",
            ServerMessage::GameOver { .. } => "gameOver",
            ServerMessage::RematchRequested(_) => "rematchRequested",
            ServerMessage::PrepareRematch => "prepareRematch",
            ServerMessage::RematchDeclined => "rematchDeclined",
            ServerMessage::OpponentDisconnected => "opponentDisconnected",
            ServerMessage::RoomExpired => "roomExpired",
            ServerMessage::Pong { .. } => "pong",
        }
    }
}

/// Full world state for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub snakes: HashMap<PlayerId, Vec<Cell>>,
    pub fruit: Cell,
    pub fruit_emoji: String,
    pub scores: HashMap<PlayerId, u32>,
}

impl GameSnapshot {
    pub fn from_simulation(sim: &Simulation) -> Self {
        let fruit = sim.fruit();
        Self {
            snakes: sim
                .seats()
                .iter()
                .map(|s| (s.player_id, s.snake.segments().copied().collect()))
                .collect(),
            fruit: fruit.position,
            fruit_emoji: fruit.emoji.to_string(),
            scores: sim.scores(),
        }
    }
}

/// Encode a message as JSON
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(message).map_err(|e| EncodeError(e.to_string()))
}

/// Decode a JSON message
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(data).map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Fruit, Grid, Snake};
    use crate::game::simulation::Seat;
    use serde_json::{json, Value};
    use uuid::Uuid;

    #[test]
    fn test_decode_create_room() {
        let msg: ClientMessage = decode(br#"{"event":"createRoom"}"#).unwrap();
        assert_eq!(msg, ClientMessage::CreateRoom);
    }

    #[test]
    fn test_decode_join_room() {
        let msg: ClientMessage = decode(br#"{"event":"joinRoom","data":"abc"}"#).unwrap();
        assert_eq!(msg, ClientMessage::JoinRoom("abc".to_string()));
    }

    #[test]
    fn test_decode_direction() {
        let msg: ClientMessage = decode(br#"{"event":"direction","data":{"x":0,"y":-1}}"#).unwrap();
        match msg {
            ClientMessage::Direction(input) => {
                assert_eq!(input.to_direction(), Some(Direction::UP));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_direction_rejected() {
        let input = DirectionInput { x: 1, y: 1 };
        assert!(input.to_direction().is_none());
    }

    #[test]
    fn test_decode_rematch_messages() {
        let req: ClientMessage = decode(br#"{"event":"requestRematch","data":"r1"}"#).unwrap();
        let dec: ClientMessage = decode(br#"{"event":"declineRematch","data":"r1"}"#).unwrap();
        assert_eq!(req, ClientMessage::RequestRematch("r1".to_string()));
        assert_eq!(dec, ClientMessage::DeclineRematch("r1".to_string()));
    }

    #[test]
    fn test_decode_unknown_event_fails() {
        let result: Result<ClientMessage, _> = decode(br#"{"event":"teleport"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_start_game_shape() {
        let room_id = Uuid::new_v4();
        let player = Uuid::new_v4();
        let mut players = HashMap::new();
        players.insert(player, "lime".to_string());

        let value: Value = serde_json::from_slice(
            &encode(&ServerMessage::StartGame { room_id, players }).unwrap(),
        )
        .unwrap();

        assert_eq!(value["event"], "startGame");
        assert_eq!(value["data"]["roomId"], json!(room_id.to_string()));
        assert_eq!(value["data"]["players"][player.to_string()], "lime");
    }

    #[test]
    fn test_game_over_tie_has_null_winner() {
        let value: Value = serde_json::from_slice(
            &encode(&ServerMessage::GameOver {
                winner: None,
                scores: HashMap::new(),
            })
            .unwrap(),
        )
        .unwrap();

        assert_eq!(value["event"], "gameOver");
        assert!(value["data"]["winner"].is_null());
    }

    #[test]
    fn test_unit_events_have_no_payload() {
        let value: Value =
            serde_json::from_slice(&encode(&ServerMessage::PrepareRematch).unwrap()).unwrap();
        assert_eq!(value, json!({"event": "prepareRematch"}));
    }

    #[test]
    fn test_event_name_matches_wire() {
        let messages = [
            ServerMessage::RoomFullOrInvalid,
            ServerMessage::RematchRequested(Uuid::new_v4()),
            ServerMessage::OpponentDisconnected,
            ServerMessage::Pong {
                client_timestamp: 1,
                server_timestamp: 2,
            },
        ];
        for msg in messages {
            let value: Value = serde_json::from_slice(&encode(&msg).unwrap()).unwrap();
            assert_eq!(value["event"], msg.event_name());
        }
    }

    #[test]
    fn test_snapshot_from_simulation() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let sim = Simulation::from_parts(
            Grid::default(),
            vec![
                Seat {
                    player_id: a,
                    snake: Snake::from_segments([Cell::new(3, 3), Cell::new(2, 3)]).unwrap(),
                    score: 1,
                },
                Seat {
                    player_id: b,
                    snake: Snake::new(Cell::new(9, 9)),
                    score: 0,
                },
            ],
            Fruit::new(Cell::new(20, 20), "🍇"),
        );

        let snapshot = GameSnapshot::from_simulation(&sim);
        let value: Value = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(snapshot.snakes[&a], vec![Cell::new(3, 3), Cell::new(2, 3)]);
        assert_eq!(snapshot.scores[&a], 1);
        assert_eq!(value["fruit"], json!({"x": 20, "y": 20}));
        assert_eq!(value["fruitEmoji"], "🍇");
    }
}
