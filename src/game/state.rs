//! Grid and entity definitions
//!
//! Plain data: cells, directions, snakes and the fruit. Behaviour here is
//! limited to what keeps each type's invariants.

use std::collections::VecDeque;

use bitvec::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::constants::{grid, FRUIT_EMOJIS};

/// Unique player identifier (one per connection)
pub type PlayerId = Uuid;

/// Unique, shareable room identifier
pub type RoomId = Uuid;

/// A single grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Neighbouring cell in `dir` on the toroidal grid
    pub fn step(self, dir: Direction, grid: Grid) -> Self {
        Self {
            x: (self.x + dir.x).rem_euclid(grid.width),
            y: (self.y + dir.y).rem_euclid(grid.height),
        }
    }
}

/// Unit movement vector along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Direction {
    pub x: i32,
    pub y: i32,
}

impl Direction {
    pub const RIGHT: Direction = Direction { x: 1, y: 0 };
    pub const LEFT: Direction = Direction { x: -1, y: 0 };
    pub const UP: Direction = Direction { x: 0, y: -1 };
    pub const DOWN: Direction = Direction { x: 0, y: 1 };

    #[cfg(test)]
    pub const ALL: [Direction; 4] = [Self::RIGHT, Self::LEFT, Self::UP, Self::DOWN];

    /// Accept only the four axis unit vectors
    pub fn from_components(x: i32, y: i32) -> Option<Self> {
        match (x, y) {
            (1, 0) | (-1, 0) | (0, 1) | (0, -1) => Some(Self { x, y }),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }

    pub fn is_opposite(self, other: Direction) -> bool {
        self.opposite() == other
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::RIGHT
    }
}

/// Bounds of the toroidal playfield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub width: i32,
    pub height: i32,
}

impl Grid {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn cell_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn contains(&self, cell: Cell) -> bool {
        (0..self.width).contains(&cell.x) && (0..self.height).contains(&cell.y)
    }

    fn index(&self, cell: Cell) -> usize {
        (cell.y * self.width + cell.x) as usize
    }

    fn cell_at(&self, index: usize) -> Cell {
        let index = index as i32;
        Cell::new(index % self.width, index / self.width)
    }

    /// Uniformly random cell
    pub fn random_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Cell {
        Cell::new(rng.gen_range(0..self.width), rng.gen_range(0..self.height))
    }

    /// Uniformly random cell not in `occupied`; any cell when the grid is full
    pub fn random_free_cell<'a, R, I>(&self, rng: &mut R, occupied: I) -> Cell
    where
        R: Rng + ?Sized,
        I: IntoIterator<Item = &'a Cell>,
    {
        let mut taken = bitvec![0; self.cell_count()];
        for cell in occupied {
            if self.contains(*cell) {
                taken.set(self.index(*cell), true);
            }
        }

        let free = taken.count_zeros();
        if free == 0 {
            return self.random_cell(rng);
        }

        let pick = rng.gen_range(0..free);
        match taken.iter_zeros().nth(pick) {
            Some(index) => self.cell_at(index),
            None => self.random_cell(rng),
        }
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(grid::WIDTH, grid::HEIGHT)
    }
}

/// Snake body, head first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Snake {
    body: VecDeque<Cell>,
}

impl Snake {
    pub fn new(head: Cell) -> Self {
        let mut body = VecDeque::with_capacity(16);
        body.push_back(head);
        Self { body }
    }

    /// Build from explicit segments, head first. `None` if empty.
    pub fn from_segments(segments: impl IntoIterator<Item = Cell>) -> Option<Self> {
        let body: VecDeque<Cell> = segments.into_iter().collect();
        if body.is_empty() {
            None
        } else {
            Some(Self { body })
        }
    }

    pub fn head(&self) -> Cell {
        // Non-empty by construction
        self.body[0]
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Cell> {
        self.body.iter()
    }

    /// True if `cell` is any segment of this snake
    pub fn occupies(&self, cell: Cell) -> bool {
        self.body.contains(&cell)
    }

    /// True if `cell` is a non-head segment of this snake
    pub fn body_contains(&self, cell: Cell) -> bool {
        self.body.iter().skip(1).any(|seg| *seg == cell)
    }

    /// Prepend a new head; drop the tail unless growing
    pub fn advance(&mut self, new_head: Cell, grow: bool) {
        self.body.push_front(new_head);
        if !grow {
            self.body.pop_back();
        }
    }
}

/// The single fruit on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fruit {
    pub position: Cell,
    pub emoji: &'static str,
}

impl Fruit {
    pub fn new(position: Cell, emoji: &'static str) -> Self {
        Self { position, emoji }
    }

    /// Place a fruit with a random flavor on a free cell
    pub fn spawn<'a, R, I>(rng: &mut R, grid: Grid, occupied: I) -> Self
    where
        R: Rng + ?Sized,
        I: IntoIterator<Item = &'a Cell>,
    {
        let position = grid.random_free_cell(rng, occupied);
        let emoji = FRUIT_EMOJIS[rng.gen_range(0..FRUIT_EMOJIS.len())];
        Self { position, emoji }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_wrap_right_edge() {
        let grid = Grid::default();
        let cell = Cell::new(39, 7).step(Direction::RIGHT, grid);
        assert_eq!(cell, Cell::new(0, 7));
    }

    #[test]
    fn test_wrap_left_edge() {
        let grid = Grid::default();
        let cell = Cell::new(0, 7).step(Direction::LEFT, grid);
        assert_eq!(cell, Cell::new(39, 7));
    }

    #[test]
    fn test_wrap_vertical_edges() {
        let grid = Grid::default();
        assert_eq!(Cell::new(5, 29).step(Direction::DOWN, grid), Cell::new(5, 0));
        assert_eq!(Cell::new(5, 0).step(Direction::UP, grid), Cell::new(5, 29));
    }

    #[test]
    fn test_direction_validation() {
        for dir in Direction::ALL {
            assert_eq!(Direction::from_components(dir.x, dir.y), Some(dir));
        }
        assert!(Direction::from_components(0, 0).is_none());
        assert!(Direction::from_components(1, 1).is_none());
        assert!(Direction::from_components(2, 0).is_none());
    }

    #[test]
    fn test_direction_opposites() {
        assert!(Direction::RIGHT.is_opposite(Direction::LEFT));
        assert!(Direction::UP.is_opposite(Direction::DOWN));
        assert!(!Direction::UP.is_opposite(Direction::LEFT));
        assert!(!Direction::UP.is_opposite(Direction::UP));
    }

    #[test]
    fn test_snake_advance_and_grow() {
        let mut snake = Snake::new(Cell::new(5, 5));
        snake.advance(Cell::new(6, 5), false);
        assert_eq!(snake.len(), 1);
        assert_eq!(snake.head(), Cell::new(6, 5));

        snake.advance(Cell::new(7, 5), true);
        assert_eq!(snake.len(), 2);
        assert_eq!(snake.head(), Cell::new(7, 5));
        assert!(snake.body_contains(Cell::new(6, 5)));
        assert!(!snake.body_contains(Cell::new(7, 5)));
    }

    #[test]
    fn test_single_segment_has_no_body() {
        let snake = Snake::new(Cell::new(3, 3));
        assert!(!snake.body_contains(Cell::new(3, 3)));
        assert!(snake.occupies(Cell::new(3, 3)));
    }

    #[test]
    fn test_from_segments_rejects_empty() {
        assert!(Snake::from_segments(Vec::new()).is_none());
    }

    #[test]
    fn test_random_free_cell_avoids_occupied() {
        let grid = Grid::new(3, 1);
        let occupied = [Cell::new(0, 0), Cell::new(2, 0)];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(grid.random_free_cell(&mut rng, &occupied), Cell::new(1, 0));
        }
    }

    #[test]
    fn test_random_free_cell_full_grid_falls_back() {
        let grid = Grid::new(2, 1);
        let occupied = [Cell::new(0, 0), Cell::new(1, 0)];
        let mut rng = StdRng::seed_from_u64(1);
        let cell = grid.random_free_cell(&mut rng, &occupied);
        assert!(grid.contains(cell));
    }

    #[test]
    fn test_fruit_spawn_in_bounds() {
        let grid = Grid::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let fruit = Fruit::spawn(&mut rng, grid, &[]);
            assert!(grid.contains(fruit.position));
            assert!(FRUIT_EMOJIS.contains(&fruit.emoji));
        }
    }
}
