use crate::game::constants::room::COLORS;
use crate::game::state::PlayerId;

/// Seat role, assigned by join order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerRole {
    /// Room creator
    Host,
    /// Second joiner
    Guest,
}

impl PlayerRole {
    pub fn from_seat(seat: usize) -> Self {
        if seat == 0 {
            PlayerRole::Host
        } else {
            PlayerRole::Guest
        }
    }

    /// Color tag sent to clients
    pub fn color(&self) -> &'static str {
        match self {
            PlayerRole::Host => COLORS[0],
            PlayerRole::Guest => COLORS[1],
        }
    }
}

/// A player seated in a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyPlayer {
    pub id: PlayerId,
    pub role: PlayerRole,
}

impl LobbyPlayer {
    pub fn new(id: PlayerId, role: PlayerRole) -> Self {
        Self { id, role }
    }

    pub fn color(&self) -> &'static str {
        self.role.color()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_roles_by_seat() {
        assert_eq!(PlayerRole::from_seat(0), PlayerRole::Host);
        assert_eq!(PlayerRole::from_seat(1), PlayerRole::Guest);
    }

    #[test]
    fn test_colors() {
        let host = LobbyPlayer::new(Uuid::new_v4(), PlayerRole::Host);
        let guest = LobbyPlayer::new(Uuid::new_v4(), PlayerRole::Guest);
        assert_eq!(host.color(), "lime");
        assert_eq!(guest.color(), "cyan");
    }
}
