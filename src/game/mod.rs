//! Grid, snakes, fruit and the per-room simulation

pub mod constants;
pub mod state;
pub mod input_buffer;
pub mod simulation;
pub mod match_result;
