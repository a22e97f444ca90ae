//! Per-player direction intents
//!
//! Holds only the latest accepted intent for each player (last write wins).
//! An intent that exactly reverses the direction applied on the previous tick
//! is dropped, so a snake can never turn back into its own neck.

use hashbrown::HashMap;

use crate::game::state::{Direction, PlayerId};

/// Direction state for one player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Intent {
    /// Direction that will be applied at the next tick
    current: Direction,
    /// Direction applied at the previous tick
    last_applied: Direction,
}

impl Default for Intent {
    fn default() -> Self {
        Self {
            current: Direction::RIGHT,
            last_applied: Direction::RIGHT,
        }
    }
}

/// Result of submitting an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    Accepted,
    /// Exact inverse of the last applied direction, ignored
    IllegalReversal,
    UnknownPlayer,
}

/// Input buffer for one simulation generation
#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    intents: HashMap<PlayerId, Intent>,
}

impl InputBuffer {
    /// Every player starts heading right
    pub fn new(players: &[PlayerId]) -> Self {
        Self {
            intents: players.iter().map(|id| (*id, Intent::default())).collect(),
        }
    }

    /// Overwrite the player's intent unless it reverses the last applied direction
    pub fn set_intent(&mut self, player_id: PlayerId, direction: Direction) -> IntentOutcome {
        let Some(intent) = self.intents.get_mut(&player_id) else {
            return IntentOutcome::UnknownPlayer;
        };

        if direction.is_opposite(intent.last_applied) {
            return IntentOutcome::IllegalReversal;
        }

        intent.current = direction;
        IntentOutcome::Accepted
    }

    /// Direction to apply this tick
    pub fn current(&self, player_id: PlayerId) -> Option<Direction> {
        self.intents.get(&player_id).map(|i| i.current)
    }

    pub fn last_applied(&self, player_id: PlayerId) -> Option<Direction> {
        self.intents.get(&player_id).map(|i| i.last_applied)
    }

    /// Record that the current intent was applied this tick
    pub fn mark_applied(&mut self, player_id: PlayerId) {
        if let Some(intent) = self.intents.get_mut(&player_id) {
            intent.last_applied = intent.current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_starts_rightward() {
        let id = Uuid::new_v4();
        let buffer = InputBuffer::new(&[id]);
        assert_eq!(buffer.current(id), Some(Direction::RIGHT));
        assert_eq!(buffer.last_applied(id), Some(Direction::RIGHT));
    }

    #[test]
    fn test_reversal_rejected_for_every_axis() {
        let id = Uuid::new_v4();
        for dir in Direction::ALL {
            let mut buffer = InputBuffer::new(&[id]);
            // Establish `dir` as the applied direction first
            if buffer.set_intent(id, dir) == IntentOutcome::Accepted {
                buffer.mark_applied(id);
            } else {
                // LEFT from the initial RIGHT: go through UP first
                buffer.set_intent(id, Direction::UP);
                buffer.mark_applied(id);
                assert_eq!(buffer.set_intent(id, dir), IntentOutcome::Accepted);
                buffer.mark_applied(id);
            }
            assert_eq!(buffer.last_applied(id), Some(dir));

            let outcome = buffer.set_intent(id, dir.opposite());
            assert_eq!(outcome, IntentOutcome::IllegalReversal);
            assert_eq!(buffer.current(id), Some(dir));
        }
    }

    #[test]
    fn test_last_write_wins() {
        let id = Uuid::new_v4();
        let mut buffer = InputBuffer::new(&[id]);

        assert_eq!(buffer.set_intent(id, Direction::UP), IntentOutcome::Accepted);
        assert_eq!(buffer.set_intent(id, Direction::DOWN), IntentOutcome::Accepted);

        assert_eq!(buffer.current(id), Some(Direction::DOWN));
    }

    #[test]
    fn test_reversal_checked_against_applied_not_pending() {
        let id = Uuid::new_v4();
        let mut buffer = InputBuffer::new(&[id]);

        // Pending UP does not make DOWN a reversal; applied RIGHT makes LEFT one
        buffer.set_intent(id, Direction::UP);
        assert_eq!(buffer.set_intent(id, Direction::DOWN), IntentOutcome::Accepted);
        assert_eq!(buffer.set_intent(id, Direction::LEFT), IntentOutcome::IllegalReversal);
        assert_eq!(buffer.current(id), Some(Direction::DOWN));
    }

    #[test]
    fn test_mark_applied() {
        let id = Uuid::new_v4();
        let mut buffer = InputBuffer::new(&[id]);

        buffer.set_intent(id, Direction::UP);
        buffer.mark_applied(id);

        assert_eq!(buffer.last_applied(id), Some(Direction::UP));
        assert_eq!(buffer.set_intent(id, Direction::LEFT), IntentOutcome::Accepted);
    }

    #[test]
    fn test_unknown_player() {
        let mut buffer = InputBuffer::new(&[Uuid::new_v4()]);
        let outcome = buffer.set_intent(Uuid::new_v4(), Direction::UP);
        assert_eq!(outcome, IntentOutcome::UnknownPlayer);
    }

    #[test]
    fn test_players_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut buffer = InputBuffer::new(&[a, b]);

        buffer.set_intent(a, Direction::DOWN);

        assert_eq!(buffer.current(a), Some(Direction::DOWN));
        assert_eq!(buffer.current(b), Some(Direction::RIGHT));
    }
}
