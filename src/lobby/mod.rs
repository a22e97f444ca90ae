//! Room registry and session lifecycle
//!
//! Rooms pair two players, run generations of the simulation and negotiate
//! rematches. Everything here is synchronous: operations return a
//! [`manager::Dispatch`] describing what to send and which timers to arm,
//! and the network layer carries it out.

pub mod room;
pub mod manager;
pub mod player;
