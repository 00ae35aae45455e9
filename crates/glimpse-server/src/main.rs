//! `glimpsed` - the Glimpse media relay server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use glimpse_audit::TracingAuditSink;
use glimpse_auth::StaticTokenValidator;
use glimpse_core::{Identity, UserRole};
use glimpse_limits::{
    IpThrottle, LockoutConfig, MemoryBlockedIpStore, RateLimitConfig, RateLimiter,
};
use glimpse_relay::{EngineConfig, RelayEngine};
use glimpse_server::{AppState, router};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Extra WebSocket framing headroom above the payload cap, so an
/// oversized media frame reaches the relay and earns a `VAL_004`
/// error instead of dying as a protocol violation.
const WS_SIZE_HEADROOM: usize = 64 * 1024;

#[derive(Debug, Parser)]
#[command(name = "glimpsed", version, about = "Glimpse media relay server")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "GLIMPSE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = glimpse_config::load(args.config.as_deref()).context("loading configuration")?;

    let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        messages_per_second: config.limits.messages_per_second,
        room_creations_per_hour: config.limits.room_creations_per_hour,
    }));
    let throttle = Arc::new(IpThrottle::new(
        Box::new(MemoryBlockedIpStore::default()),
        LockoutConfig {
            failed_auth_before_block: config.limits.failed_auth_before_block,
            block_duration: Duration::from_secs(config.limits.ip_block_duration_minutes * 60),
        },
    ));
    throttle
        .load()
        .await
        .context("loading persisted IP blocks")?;

    let engine = RelayEngine::new(
        EngineConfig {
            max_binary_payload: config.server.max_binary_payload,
            max_viewers_per_room: usize::try_from(config.rooms.max_viewers_per_room)
                .unwrap_or(100),
            max_rooms: config.rooms.max_rooms,
            max_rooms_per_user: config.rooms.max_rooms_per_user,
            access_code_ttl: Duration::from_secs(config.rooms.access_code_expiry_hours * 3600),
        },
        Arc::clone(&limiter),
        throttle,
        Arc::new(TracingAuditSink),
    );

    let mut validator = StaticTokenValidator::default();
    for entry in &config.auth.tokens {
        if !glimpse_core::validate::is_valid_username(&entry.username) {
            warn!(username = %entry.username, "skipping token with invalid username");
            continue;
        }
        let role = if entry.role == "admin" {
            UserRole::Admin
        } else {
            UserRole::User
        };
        validator.insert(entry.token.clone(), Identity::new(&entry.username, role));
    }
    if config.auth.tokens.is_empty() {
        warn!("no auth tokens configured; every connection will be rejected");
    }

    let state = Arc::new(AppState {
        engine,
        validator: Arc::new(validator),
        trust_proxy_headers: config.server.trust_proxy_headers,
        max_message_size: config.server.max_binary_payload + WS_SIZE_HEADROOM,
    });

    let _sweeper = limiter.spawn_sweeper();
    let reaper = spawn_idle_reaper(
        Arc::clone(&state),
        Duration::from_secs(config.rooms.idle_timeout_minutes * 60),
    );

    let app = router(Arc::clone(&state), &config.server.cors_origins);
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "glimpsed listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    reaper.abort();
    info!("glimpsed stopped");
    Ok(())
}

fn init_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Close sessions with no inbound activity past the cutoff.
fn spawn_idle_reaper(state: Arc<AppState>, idle_timeout: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            for session_id in state.engine.sessions().idle_sessions(idle_timeout) {
                if let Some(session) = state.engine.sessions().get(session_id) {
                    info!(session_id = %session_id, "reaping idle session");
                    session.close();
                }
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
