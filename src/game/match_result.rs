//! Match result resolution
//!
//! Turns a termination cause (collisions or the time limit) into a winner.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::game::state::PlayerId;

/// Kind of collision detected for a proposed head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionKind {
    /// Head entered a non-head segment of its own body
    SelfBody,
    /// Head entered any segment of the opponent
    OpponentBody,
    /// Both heads moved into the same cell
    HeadOn,
}

/// A player whose proposed head collided this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collision {
    pub player_id: PlayerId,
    pub kind: CollisionKind,
}

/// Why a generation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndCause {
    Collision(SmallVec<[Collision; 2]>),
    TimeLimit,
}

/// Reason reported with the result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEndReason {
    /// Exactly one player crashed
    Collision,
    /// Both players crashed in the same tick
    MutualCollision,
    /// Wall-clock limit reached
    TimeLimit,
}

impl MatchEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchEndReason::Collision => "collision",
            MatchEndReason::MutualCollision => "mutual_collision",
            MatchEndReason::TimeLimit => "time_limit",
        }
    }
}

/// Final outcome of a generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// `None` on a tie
    pub winner: Option<PlayerId>,
    pub scores: HashMap<PlayerId, u32>,
    pub reason: MatchEndReason,
    pub ticks: u64,
}

/// Determine the outcome from a termination cause
///
/// `seats` is in join order with each player's score.
pub fn determine_result(seats: &[(PlayerId, u32)], cause: &EndCause, ticks: u64) -> MatchResult {
    let scores: HashMap<PlayerId, u32> = seats.iter().copied().collect();

    let (winner, reason) = match cause {
        EndCause::TimeLimit => (winner_by_score(seats), MatchEndReason::TimeLimit),
        EndCause::Collision(collisions) => {
            let survivors: SmallVec<[PlayerId; 2]> = seats
                .iter()
                .map(|(id, _)| *id)
                .filter(|id| !collisions.iter().any(|c| c.player_id == *id))
                .collect();

            match survivors.as_slice() {
                [winner] => (Some(*winner), MatchEndReason::Collision),
                _ => (None, MatchEndReason::MutualCollision),
            }
        }
    };

    MatchResult {
        winner,
        scores,
        reason,
        ticks,
    }
}

/// Player with the strictly highest score, `None` on a tie
pub fn winner_by_score(seats: &[(PlayerId, u32)]) -> Option<PlayerId> {
    let best = seats.iter().map(|(_, score)| *score).max()?;
    let mut leaders = seats.iter().filter(|(_, score)| *score == best);
    let leader = leaders.next()?;
    if leaders.next().is_some() {
        None
    } else {
        Some(leader.0)
    }
}
