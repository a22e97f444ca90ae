/// Playfield constants
pub mod grid {
    /// Grid width in cells
    pub const WIDTH: i32 = 40;
    /// Grid height in cells
    pub const HEIGHT: i32 = 30;
}

/// Simulation timing
pub mod timing {
    use std::time::Duration;

    /// Tick period in milliseconds
    pub const TICK_DURATION_MS: u64 = 100;
    /// Wall-clock limit of one generation
    pub const MATCH_DURATION: Duration = Duration::from_secs(300);
    /// Countdown between both rematch consents and the new generation
    pub const REMATCH_DELAY: Duration = Duration::from_secs(5);
    /// How long a room may wait for its second player
    pub const WAITING_ROOM_TTL: Duration = Duration::from_secs(30 * 60);
}

/// Room constants
pub mod room {
    /// Seats per room
    pub const MAX_PLAYERS: usize = 2;
    /// Color tags by join order
    pub const COLORS: [&str; MAX_PLAYERS] = ["lime", "cyan"];
}

/// Fruit flavors, picked at random on every (re)spawn
pub const FRUIT_EMOJIS: [&str; 8] = ["🍎", "🍌", "🍇", "🍉", "🍒", "🍓", "🍍", "🥝"];

/// Networking constants
pub mod net {
    /// Maximum reliable message size
    pub const MAX_MESSAGE_SIZE: usize = 65536;
}
