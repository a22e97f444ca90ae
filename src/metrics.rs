//! Prometheus-compatible metrics endpoint
//!
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::match_result::{MatchEndReason, MatchResult};

const TICK_HISTORY: usize = 1000;

/// Metrics registry for the game server
#[derive(Debug)]
pub struct Metrics {
    // Lobby
    pub rooms_active: AtomicU64,
    pub rooms_playing: AtomicU64,
    pub players_seated: AtomicU64,
    pub rooms_created: AtomicU64,
    pub rooms_expired: AtomicU64,

    // Generations
    pub games_started: AtomicU64,
    pub games_ended_collision: AtomicU64,
    pub games_ended_mutual: AtomicU64,
    pub games_ended_time_limit: AtomicU64,
    pub games_tied: AtomicU64,
    pub rematches_agreed: AtomicU64,
    pub rematches_declined: AtomicU64,

    // Room tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Network
    pub connections_active: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,

    start_time: Instant,

    // Rolling window for percentiles
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            rooms_active: AtomicU64::new(0),
            rooms_playing: AtomicU64::new(0),
            players_seated: AtomicU64::new(0),
            rooms_created: AtomicU64::new(0),
            rooms_expired: AtomicU64::new(0),
            games_started: AtomicU64::new(0),
            games_ended_collision: AtomicU64::new(0),
            games_ended_mutual: AtomicU64::new(0),
            games_ended_time_limit: AtomicU64::new(0),
            games_tied: AtomicU64::new(0),
            rematches_agreed: AtomicU64::new(0),
            rematches_declined: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record how long one room tick took and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Count a finished generation by how it ended
    pub fn record_result(&self, result: &MatchResult) {
        let counter = match result.reason {
            MatchEndReason::Collision => &self.games_ended_collision,
            MatchEndReason::MutualCollision => &self.games_ended_mutual,
            MatchEndReason::TimeLimit => &self.games_ended_time_limit,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if result.winner.is_none() {
            self.games_tied.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot the lobby gauges
    pub fn update_lobby(&self, rooms: usize, playing: usize, players: usize) {
        self.rooms_active.store(rooms as u64, Ordering::Relaxed);
        self.rooms_playing.store(playing as u64, Ordering::Relaxed);
        self.players_seated.store(players as u64, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("snake_duel_rooms_active", "Open rooms", "gauge",
            self.rooms_active.load(Ordering::Relaxed));
        metric!("snake_duel_rooms_playing", "Rooms with a generation in progress", "gauge",
            self.rooms_playing.load(Ordering::Relaxed));
        metric!("snake_duel_players_seated", "Players seated in a room", "gauge",
            self.players_seated.load(Ordering::Relaxed));
        metric!("snake_duel_rooms_created_total", "Rooms created", "counter",
            self.rooms_created.load(Ordering::Relaxed));
        metric!("snake_duel_rooms_expired_total", "Waiting rooms closed without an opponent", "counter",
            self.rooms_expired.load(Ordering::Relaxed));

        metric!("snake_duel_games_started_total", "Generations started", "counter",
            self.games_started.load(Ordering::Relaxed));
        output.push_str(
            "# HELP snake_duel_games_ended_total Generations ended by reason\n# TYPE snake_duel_games_ended_total counter\n",
        );
        for (reason, counter) in [
            (MatchEndReason::Collision, &self.games_ended_collision),
            (MatchEndReason::MutualCollision, &self.games_ended_mutual),
            (MatchEndReason::TimeLimit, &self.games_ended_time_limit),
        ] {
            output.push_str(&format!(
                "snake_duel_games_ended_total{{reason=\"{}\"}} {}\n",
                reason.as_str(),
                counter.load(Ordering::Relaxed)
            ));
        }
        metric!("snake_duel_games_tied_total", "Generations without a winner", "counter",
            self.games_tied.load(Ordering::Relaxed));
        metric!("snake_duel_rematches_agreed_total", "Rematches both players agreed to", "counter",
            self.rematches_agreed.load(Ordering::Relaxed));
        metric!("snake_duel_rematches_declined_total", "Rematches declined", "counter",
            self.rematches_declined.load(Ordering::Relaxed));

        metric!("snake_duel_tick_time_microseconds", "Last room tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("snake_duel_tick_time_p95_microseconds", "95th percentile room tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("snake_duel_tick_time_p99_microseconds", "99th percentile room tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("snake_duel_tick_time_max_microseconds", "Maximum room tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("snake_duel_tick_count", "Room ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("snake_duel_connections_active", "Active WebTransport connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("snake_duel_messages_sent_total", "Messages sent", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("snake_duel_messages_received_total", "Messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("snake_duel_messages_dropped_total", "Messages for players no longer connected", "counter",
            self.messages_dropped.load(Ordering::Relaxed));
        metric!("snake_duel_bytes_sent_total", "Bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("snake_duel_bytes_received_total", "Bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));
        metric!("snake_duel_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON view of the same counters
    pub fn to_json(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        serde_json::json!({
            "lobby": {
                "rooms": load(&self.rooms_active),
                "playing": load(&self.rooms_playing),
                "players": load(&self.players_seated),
                "created": load(&self.rooms_created),
                "expired": load(&self.rooms_expired),
            },
            "games": {
                "started": load(&self.games_started),
                "ended_collision": load(&self.games_ended_collision),
                "ended_mutual_collision": load(&self.games_ended_mutual),
                "ended_time_limit": load(&self.games_ended_time_limit),
                "tied": load(&self.games_tied),
                "rematches_agreed": load(&self.rematches_agreed),
                "rematches_declined": load(&self.rematches_declined),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
            },
            "network": {
                "connections": load(&self.connections_active),
                "messages_sent": load(&self.messages_sent),
                "messages_received": load(&self.messages_received),
                "messages_dropped": load(&self.messages_dropped),
                "bytes_sent": load(&self.bytes_sent),
                "bytes_received": load(&self.bytes_received),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the HTTP response for a raw request
fn route(metrics: &Metrics, request: &str) -> String {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("");

    let (content_type, body) = match path {
        "/metrics" => ("text/plain; version=0.0.4", metrics.to_prometheus()),
        "/metrics/json" | "/json" => ("application/json", metrics.to_json()),
        "/health" | "/" => ("text/plain", "OK".to_string()),
        _ => return "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    };

    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = route(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
