//! Networking: wire protocol, framing, TLS, the WebTransport server and the
//! session that drives rooms.

pub mod framing;
pub mod game_session;
pub mod protocol;
pub mod tls;
pub mod transport;
