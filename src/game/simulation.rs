//! Fixed-tick simulation for one room generation
//!
//! Each tick proposes a new head for every snake (toroidal wraparound),
//! checks the proposals against the pre-tick bodies, then either ends the
//! generation or commits the moves and resolves fruit.
//!
//! The simulation owns no timers. Both the tick interval and the time limit
//! funnel into [`Simulation::terminate`], which fires at most once.

use hashbrown::HashMap;
use rand::Rng;
use smallvec::SmallVec;

use crate::game::input_buffer::{InputBuffer, IntentOutcome};
use crate::game::match_result::{
    determine_result, Collision, CollisionKind, EndCause, MatchResult,
};
use crate::game::state::{Cell, Direction, Fruit, Grid, PlayerId, Snake};

/// Simulation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationPhase {
    Running,
    Ended,
}

/// One player's entities
#[derive(Debug, Clone)]
pub struct Seat {
    pub player_id: PlayerId,
    pub snake: Snake,
    pub score: u32,
}

/// What a tick produced
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Moves committed; players who ate this tick
    Advanced { eaten: SmallVec<[PlayerId; 2]> },
    /// A collision ended the generation
    Finished(MatchResult),
    /// Generation already over, nothing happened
    Idle,
}

/// Simulation state for one generation
#[derive(Debug, Clone)]
pub struct Simulation {
    grid: Grid,
    seats: Vec<Seat>,
    inputs: InputBuffer,
    fruit: Fruit,
    phase: SimulationPhase,
    tick: u64,
}

impl Simulation {
    /// Fresh generation: one-cell snakes in distinct random rows, fruit on a free cell
    pub fn new<R: Rng + ?Sized>(players: &[PlayerId], grid: Grid, rng: &mut R) -> Self {
        let mut rows: Vec<i32> = Vec::with_capacity(players.len());
        let mut seats = Vec::with_capacity(players.len());

        for player_id in players {
            let mut head = grid.random_cell(rng);
            // Distinct rows keep rightward-moving spawns from meeting head-on
            if rows.len() < grid.height as usize {
                while rows.contains(&head.y) {
                    head = grid.random_cell(rng);
                }
            }
            rows.push(head.y);
            seats.push(Seat {
                player_id: *player_id,
                snake: Snake::new(head),
                score: 0,
            });
        }

        let occupied: Vec<Cell> = seats.iter().map(|s| s.snake.head()).collect();
        let fruit = Fruit::spawn(rng, grid, &occupied);

        Self::from_parts(grid, seats, fruit)
    }

    /// Build from explicit entities (directions start rightward)
    pub fn from_parts(grid: Grid, seats: Vec<Seat>, fruit: Fruit) -> Self {
        let ids: Vec<PlayerId> = seats.iter().map(|s| s.player_id).collect();
        Self {
            grid,
            inputs: InputBuffer::new(&ids),
            seats,
            fruit,
            phase: SimulationPhase::Running,
            tick: 0,
        }
    }

    pub fn phase(&self) -> SimulationPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == SimulationPhase::Running
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    #[cfg(test)]
    pub fn seat(&self, player_id: PlayerId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.player_id == player_id)
    }

    pub fn fruit(&self) -> Fruit {
        self.fruit
    }

    pub fn inputs(&self) -> &InputBuffer {
        &self.inputs
    }

    pub fn scores(&self) -> HashMap<PlayerId, u32> {
        self.seats.iter().map(|s| (s.player_id, s.score)).collect()
    }

    /// Queue a direction for the next tick
    pub fn set_intent(&mut self, player_id: PlayerId, direction: Direction) -> IntentOutcome {
        self.inputs.set_intent(player_id, direction)
    }

    /// Advance one tick
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> StepOutcome {
        if !self.is_running() {
            return StepOutcome::Idle;
        }
        self.tick += 1;

        let proposed: SmallVec<[(PlayerId, Cell); 2]> = self
            .seats
            .iter()
            .map(|seat| {
                let dir = self.inputs.current(seat.player_id).unwrap_or_default();
                (seat.player_id, seat.snake.head().step(dir, self.grid))
            })
            .collect();

        let collisions = self.detect_collisions(&proposed);
        if !collisions.is_empty() {
            return match self.terminate(EndCause::Collision(collisions)) {
                Some(result) => StepOutcome::Finished(result),
                None => StepOutcome::Idle,
            };
        }

        let mut eaten: SmallVec<[PlayerId; 2]> = SmallVec::new();
        for (seat, (player_id, head)) in self.seats.iter_mut().zip(proposed.iter()) {
            let ate = *head == self.fruit.position;
            seat.snake.advance(*head, ate);
            self.inputs.mark_applied(*player_id);
            if ate {
                seat.score += 1;
                eaten.push(*player_id);
            }
        }

        if !eaten.is_empty() {
            let occupied: Vec<Cell> = self
                .seats
                .iter()
                .flat_map(|s| s.snake.segments().copied())
                .collect();
            self.fruit = Fruit::spawn(rng, self.grid, &occupied);
        }

        StepOutcome::Advanced { eaten }
    }

    #[cfg(test)]
    pub(crate) fn place_fruit(&mut self, fruit: Fruit) {
        self.fruit = fruit;
    }

    /// Check every proposed head against the pre-tick bodies
    fn detect_collisions(&self, proposed: &[(PlayerId, Cell)]) -> SmallVec<[Collision; 2]> {
        let mut collisions: SmallVec<[Collision; 2]> = SmallVec::new();

        for (idx, (player_id, head)) in proposed.iter().enumerate() {
            let own = &self.seats[idx].snake;
            let kind = if own.body_contains(*head) {
                Some(CollisionKind::SelfBody)
            } else if self
                .seats
                .iter()
                .enumerate()
                .any(|(other, seat)| other != idx && seat.snake.occupies(*head))
            {
                Some(CollisionKind::OpponentBody)
            } else if proposed
                .iter()
                .enumerate()
                .any(|(other, (_, cell))| other != idx && cell == head)
            {
                Some(CollisionKind::HeadOn)
            } else {
                None
            };

            if let Some(kind) = kind {
                collisions.push(Collision {
                    player_id: *player_id,
                    kind,
                });
            }
        }

        collisions
    }

    /// End the generation. Returns `None` if it already ended.
    pub fn terminate(&mut self, cause: EndCause) -> Option<MatchResult> {
        if !self.is_running() {
            return None;
        }
        self.phase = SimulationPhase::Ended;

        let seats: SmallVec<[(PlayerId, u32); 2]> =
            self.seats.iter().map(|s| (s.player_id, s.score)).collect();
        Some(determine_result(&seats, &cause, self.tick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::match_result::MatchEndReason;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0xC0FFEE)
    }

    fn seat(player_id: PlayerId, cells: &[(i32, i32)]) -> Seat {
        Seat {
            player_id,
            snake: Snake::from_segments(cells.iter().map(|(x, y)| Cell::new(*x, *y))).unwrap(),
            score: 0,
        }
    }

    fn fruit_at(x: i32, y: i32) -> Fruit {
        Fruit::new(Cell::new(x, y), "🍎")
    }

    fn two_player_sim(a_cells: &[(i32, i32)], b_cells: &[(i32, i32)], fruit: Fruit) -> (Simulation, PlayerId, PlayerId) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let sim = Simulation::from_parts(
            Grid::default(),
            vec![seat(a, a_cells), seat(b, b_cells)],
            fruit,
        );
        (sim, a, b)
    }

    #[test]
    fn test_new_places_snakes_in_distinct_rows() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rng = rng();
        for _ in 0..50 {
            let sim = Simulation::new(&[a, b], Grid::default(), &mut rng);
            let seats = sim.seats();
            assert_eq!(seats.len(), 2);
            assert_ne!(seats[0].snake.head().y, seats[1].snake.head().y);
            assert!(seats.iter().all(|s| s.snake.len() == 1 && s.score == 0));
            assert!(!seats.iter().any(|s| s.snake.occupies(sim.fruit().position)));
        }
    }

    #[test]
    fn test_step_moves_right_by_default() {
        let (mut sim, a, b) = two_player_sim(&[(5, 5)], &[(5, 10)], fruit_at(30, 20));

        let outcome = sim.step(&mut rng());

        assert!(matches!(outcome, StepOutcome::Advanced { .. }));
        assert_eq!(sim.seat(a).unwrap().snake.head(), Cell::new(6, 5));
        assert_eq!(sim.seat(b).unwrap().snake.head(), Cell::new(6, 10));
        assert_eq!(sim.tick_count(), 1);
    }

    #[test]
    fn test_wraparound_at_right_edge() {
        let (mut sim, a, _) = two_player_sim(&[(39, 4)], &[(10, 10)], fruit_at(30, 20));

        sim.step(&mut rng());

        assert_eq!(sim.seat(a).unwrap().snake.head(), Cell::new(0, 4));
    }

    #[test]
    fn test_wraparound_at_bottom_edge() {
        let (mut sim, a, _) = two_player_sim(&[(3, 29)], &[(10, 10)], fruit_at(30, 20));
        sim.set_intent(a, Direction::DOWN);

        sim.step(&mut rng());

        assert_eq!(sim.seat(a).unwrap().snake.head(), Cell::new(3, 0));
    }

    #[test]
    fn test_eating_grows_and_scores() {
        let (mut sim, a, b) = two_player_sim(&[(5, 5)], &[(5, 10)], fruit_at(6, 5));

        let outcome = sim.step(&mut rng());

        match outcome {
            StepOutcome::Advanced { eaten } => assert_eq!(eaten.as_slice(), &[a]),
            other => panic!("unexpected outcome {:?}", other),
        }
        let seat_a = sim.seat(a).unwrap();
        assert_eq!(seat_a.score, 1);
        assert_eq!(seat_a.snake.len(), 2);
        assert_eq!(sim.seat(b).unwrap().snake.len(), 1);
        assert_ne!(sim.fruit().position, Cell::new(6, 5));
        assert!(!seat_a.snake.occupies(sim.fruit().position));
    }

    #[test]
    fn test_length_tracks_fruit_eaten() {
        let (mut sim, a, b) = two_player_sim(&[(0, 0)], &[(0, 15)], fruit_at(30, 25));
        let mut rng = rng();
        let mut eaten_a = 0u32;
        let mut previous_score = 0;

        // Straight along row 0; every third tick the fruit sits on the next cell
        for tick in 0..60 {
            if tick % 3 == 0 {
                let next = sim.seat(a).unwrap().snake.head().step(Direction::RIGHT, sim.grid());
                sim.place_fruit(fruit_at(next.x, next.y));
            }

            match sim.step(&mut rng) {
                StepOutcome::Advanced { eaten } => {
                    eaten_a += eaten.iter().filter(|id| **id == a).count() as u32;
                }
                other => panic!("tick {} ended the game: {:?}", tick, other),
            }

            let seat = sim.seat(a).unwrap();
            assert_eq!(seat.score, eaten_a);
            assert!(seat.score >= previous_score);
            assert_eq!(seat.snake.len(), 1 + eaten_a as usize);
            previous_score = seat.score;

            let other = sim.seat(b).unwrap();
            assert_eq!(other.snake.len(), 1 + other.score as usize);
        }

        assert!(eaten_a >= 20);
    }

    #[test]
    fn test_single_segment_never_self_collides() {
        let (mut sim, a, _) = two_player_sim(&[(5, 5)], &[(5, 20)], fruit_at(30, 25));
        let mut rng = rng();

        for dir in [Direction::UP, Direction::LEFT, Direction::DOWN, Direction::RIGHT] {
            sim.set_intent(a, dir);
            assert!(matches!(sim.step(&mut rng), StepOutcome::Advanced { .. }));
            assert_eq!(sim.seat(a).unwrap().snake.len(), 1);
        }
    }

    #[test]
    fn test_self_collision_into_third_segment() {
        // Body curls back under the head; turning down runs into (5,6)
        let (mut sim, a, b) = two_player_sim(
            &[(5, 5), (4, 5), (4, 6), (5, 6), (6, 6)],
            &[(20, 20)],
            fruit_at(30, 25),
        );
        sim.set_intent(a, Direction::DOWN);

        let outcome = sim.step(&mut rng());

        match outcome {
            StepOutcome::Finished(result) => {
                assert_eq!(result.winner, Some(b));
                assert_eq!(result.reason, MatchEndReason::Collision);
            }
            other => panic!("expected finish, got {:?}", other),
        }
        assert_eq!(sim.phase(), SimulationPhase::Ended);
        // No movement applied on the terminal tick
        assert_eq!(sim.seat(a).unwrap().snake.head(), Cell::new(5, 5));
        assert_eq!(sim.seat(b).unwrap().snake.head(), Cell::new(20, 20));
    }

    #[test]
    fn test_opponent_collision() {
        let (mut sim, a, b) = two_player_sim(&[(5, 5)], &[(6, 4), (6, 5), (6, 6)], fruit_at(30, 25));
        sim.set_intent(b, Direction::UP);

        let outcome = sim.step(&mut rng());

        match outcome {
            StepOutcome::Finished(result) => assert_eq!(result.winner, Some(b)),
            other => panic!("expected finish, got {:?}", other),
        }
        let _ = a;
    }

    #[test]
    fn test_head_on_into_each_other_is_tie() {
        let (mut sim, _, b) = two_player_sim(&[(5, 5)], &[(6, 5)], fruit_at(30, 25));
        sim.set_intent(b, Direction::UP);
        sim.inputs.mark_applied(b);
        sim.set_intent(b, Direction::LEFT);

        match sim.step(&mut rng()) {
            StepOutcome::Finished(result) => {
                assert!(result.winner.is_none());
                assert_eq!(result.reason, MatchEndReason::MutualCollision);
            }
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn test_heads_into_same_cell_is_tie() {
        let (mut sim, _, b) = two_player_sim(&[(5, 5)], &[(6, 6)], fruit_at(30, 25));
        sim.set_intent(b, Direction::UP);

        match sim.step(&mut rng()) {
            StepOutcome::Finished(result) => assert!(result.winner.is_none()),
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn test_terminate_is_one_shot() {
        let (mut sim, a, b) = two_player_sim(&[(5, 5)], &[(5, 10)], fruit_at(30, 25));
        sim.seats[0].score = 2;

        let first = sim.terminate(EndCause::TimeLimit);
        let second = sim.terminate(EndCause::TimeLimit);

        let result = first.unwrap();
        assert_eq!(result.winner, Some(a));
        assert_eq!(result.scores[&b], 0);
        assert!(second.is_none());
        assert_eq!(sim.step(&mut rng()), StepOutcome::Idle);
    }

    #[test]
    fn test_terminate_after_collision_is_noop() {
        let (mut sim, _, _) = two_player_sim(&[(5, 5)], &[(6, 5)], fruit_at(30, 25));

        assert!(matches!(sim.step(&mut rng()), StepOutcome::Finished(_)));
        assert!(sim.terminate(EndCause::TimeLimit).is_none());
    }

    #[test]
    fn test_reversal_input_ignored_during_play() {
        let (mut sim, a, _) = two_player_sim(&[(5, 5), (4, 5)], &[(5, 10)], fruit_at(30, 25));

        assert_eq!(sim.set_intent(a, Direction::LEFT), IntentOutcome::IllegalReversal);
        assert!(matches!(sim.step(&mut rng()), StepOutcome::Advanced { .. }));
        assert_eq!(sim.seat(a).unwrap().snake.head(), Cell::new(6, 5));
    }

    #[test]
    fn test_inputs_coalesce_between_ticks() {
        let (mut sim, a, _) = two_player_sim(&[(5, 5)], &[(5, 10)], fruit_at(30, 25));

        sim.set_intent(a, Direction::UP);
        sim.set_intent(a, Direction::DOWN);
        sim.step(&mut rng());

        assert_eq!(sim.seat(a).unwrap().snake.head(), Cell::new(5, 6));
        assert_eq!(sim.inputs().last_applied(a), Some(Direction::DOWN));
    }
}
