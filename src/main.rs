//! Tomato Timer - A state-managed HTTP server hosting a pomodoro timer
//!
//! This is the main entry point for the tomato-timer application.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use tomato_timer::{
    config::Config,
    state::{AppState, TimerCore},
    api::create_router,
    services::{AlarmPlayer, CommandAlarm, LocalPresence, PresenceClient, SilentAlarm},
    storage::{load_settings, FileSettingsStore, SettingsStore},
    tasks::{presence_cleanup_task, presence_heartbeat_task, spawn_timer, TimerCommand},
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("tomato_timer={},tower_http=info", config.log_level()))
        .init();

    info!("Starting tomato-timer server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: host={}, port={}, data_dir={}",
          config.host, config.port, config.data_dir.display());

    // Seed the timer from persisted settings
    let store: Arc<dyn SettingsStore> = Arc::new(FileSettingsStore::new(&config.data_dir));
    let settings = load_settings(store.as_ref());
    info!("Loaded settings: pomodoro={}s, short break={}s, long break={}s",
          settings.pomodoro, settings.short_break, settings.long_break);

    let alarm: Box<dyn AlarmPlayer> = match &config.alarm_sound {
        Some(sound) => {
            info!("Alarm: {} via {}", sound.display(), config.alarm_player);
            Box::new(CommandAlarm::new(config.alarm_player.clone(), sound.clone()))
        }
        None => {
            info!("No alarm sound configured, completions will be silent");
            Box::new(SilentAlarm)
        }
    };

    // Start the countdown background task
    let (timer, timer_task) = spawn_timer(TimerCore::new(settings), alarm, store, config.tick_period());

    // Start the presence background tasks
    let presence = Arc::new(PresenceClient::new(Arc::new(LocalPresence::new())));
    let heartbeat_task = tokio::spawn(presence_heartbeat_task(Arc::clone(&presence)));
    let cleanup_task = tokio::spawn(presence_cleanup_task(Arc::clone(&presence)));

    // Create application state and HTTP router with all endpoints
    let state = Arc::new(AppState::new(timer.clone(), Arc::clone(&presence), config.port, config.host.clone()));
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET   /timer              - Current timer state");
    info!("  POST  /timer/start        - Start the countdown");
    info!("  POST  /timer/pause        - Pause the countdown");
    info!("  POST  /timer/reset        - Reset the current mode");
    info!("  POST  /timer/mode/:mode   - Switch to pomodoro, shortBreak or longBreak");
    info!("  POST  /timer/mute         - Toggle mute");
    info!("  POST  /timer/alarm/stop   - Stop a ringing alarm");
    info!("  POST  /timer/dismiss      - Acknowledge completion, move to next mode");
    info!("  POST  /timer/visibility   - Report the view hidden or visible");
    info!("  GET   /settings           - Current settings");
    info!("  PATCH /settings           - Update settings");
    info!("  GET   /presence           - Active sessions");
    info!("  GET   /status             - Timer, presence and server status");
    info!("  GET   /health             - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    // Release the countdown interval and any ringing alarm
    if let Err(e) = timer.send(TimerCommand::Shutdown).await {
        tracing::warn!("Timer already stopped: {}", e);
    }
    if let Err(e) = timer_task.await {
        tracing::error!("Countdown task failed: {}", e);
    }

    heartbeat_task.abort();
    cleanup_task.abort();
    presence.end();

    info!("Server shutdown complete");
    Ok(())
}
