//! Snake Duel Server Library
//!
//! Two-player snake matches over WebTransport: a room registry, a fixed-tick
//! simulation on a toroidal grid and rematch negotiation.

pub mod config;
pub mod game;
pub mod lobby;
pub mod metrics;
pub mod net;
