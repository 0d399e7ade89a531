//! Countdown background task
//!
//! Owns the [`TimerCore`] and drives it: control commands arrive over an
//! mpsc channel, ticks come from a single `tokio::time::Interval` that only
//! exists while the timer runs, and every snapshot is published on a watch
//! channel for readers. Settings writes are handed to a separate task so a
//! slow disk never delays a tick.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    services::AlarmPlayer,
    state::{Effect, SettingsPatch, TimerCore, TimerMode, TimerSettings, TimerSnapshot},
    storage::{save_settings, SettingsStore},
};

/// Control operations accepted by the timer task
#[derive(Debug, Clone, PartialEq)]
pub enum TimerCommand {
    Start,
    Pause,
    Reset,
    SetMode(TimerMode),
    UpdateSettings(SettingsPatch),
    ToggleMute,
    StopAlarm,
    DismissCompletion,
    VisibilityChanged { hidden: bool },
    Shutdown,
}

impl TimerCommand {
    /// Short action name used for logging and last-action tracking
    pub fn action(&self) -> &'static str {
        match self {
            TimerCommand::Start => "start",
            TimerCommand::Pause => "pause",
            TimerCommand::Reset => "reset",
            TimerCommand::SetMode(_) => "set-mode",
            TimerCommand::UpdateSettings(_) => "update-settings",
            TimerCommand::ToggleMute => "toggle-mute",
            TimerCommand::StopAlarm => "stop-alarm",
            TimerCommand::DismissCompletion => "dismiss",
            TimerCommand::VisibilityChanged { .. } => "visibility",
            TimerCommand::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerHandleError {
    #[error("timer task is not running")]
    Closed,
}

struct TimerRequest {
    command: TimerCommand,
    reply: oneshot::Sender<TimerSnapshot>,
}

/// Cloneable handle to the timer task
#[derive(Clone)]
pub struct TimerHandle {
    tx: mpsc::Sender<TimerRequest>,
    snapshot_rx: watch::Receiver<TimerSnapshot>,
}

impl TimerHandle {
    /// Apply a command and return the snapshot taken right after it
    pub async fn send(&self, command: TimerCommand) -> Result<TimerSnapshot, TimerHandleError> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(TimerRequest { command, reply })
            .await
            .map_err(|_| TimerHandleError::Closed)?;
        reply_rx.await.map_err(|_| TimerHandleError::Closed)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to snapshot updates (every tick and every command)
    pub fn watch(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshot_rx.clone()
    }
}

/// Spawn the countdown task. `tick_period` is one timer second.
pub fn spawn_timer(
    core: TimerCore,
    alarm: Box<dyn AlarmPlayer>,
    store: Arc<dyn SettingsStore>,
    tick_period: Duration,
) -> (TimerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(32);
    let (snapshot_tx, snapshot_rx) = watch::channel(core.snapshot());
    let (persist_tx, persist_rx) = mpsc::unbounded_channel();
    let persister = tokio::spawn(persist_settings_task(store, persist_rx));

    let task = CountdownTask {
        core,
        alarm,
        tick_period,
        interval: None,
        snapshot_tx,
        persist_tx,
        persister,
    };
    let join = tokio::spawn(task.run(rx));

    (TimerHandle { tx, snapshot_rx }, join)
}

struct CountdownTask {
    core: TimerCore,
    alarm: Box<dyn AlarmPlayer>,
    tick_period: Duration,
    interval: Option<Interval>,
    snapshot_tx: watch::Sender<TimerSnapshot>,
    persist_tx: mpsc::UnboundedSender<TimerSettings>,
    persister: JoinHandle<()>,
}

impl CountdownTask {
    async fn run(mut self, mut rx: mpsc::Receiver<TimerRequest>) {
        info!("Starting countdown task");

        loop {
            tokio::select! {
                _ = next_tick(&mut self.interval) => {
                    let effects = self.core.tick();
                    debug!("Tick: {}s left", self.core.time_left());
                    self.apply(effects);
                    self.publish();
                }

                request = rx.recv() => {
                    let Some(TimerRequest { command, reply }) = request else {
                        debug!("All timer handles dropped");
                        break;
                    };
                    let shutdown = command == TimerCommand::Shutdown;

                    let effects = self.handle(command);
                    self.apply(effects);
                    let snapshot = self.publish();
                    // The caller may have given up waiting
                    let _ = reply.send(snapshot);

                    if shutdown {
                        break;
                    }
                }
            }
        }

        let effects = self.core.shutdown();
        self.apply(effects);
        self.alarm.stop();

        // Let queued writes land before reporting the task as stopped
        drop(self.persist_tx);
        if let Err(e) = self.persister.await {
            warn!("Settings writer failed: {}", e);
        }
        info!("Countdown task stopped");
    }

    fn handle(&mut self, command: TimerCommand) -> Vec<Effect> {
        debug!("Timer command: {}", command.action());
        match command {
            TimerCommand::Start => self.core.start(),
            TimerCommand::Pause => self.core.pause(),
            TimerCommand::Reset => self.core.reset(),
            TimerCommand::SetMode(mode) => self.core.set_mode(mode),
            TimerCommand::UpdateSettings(patch) => self.core.update_settings(patch),
            TimerCommand::ToggleMute => self.core.toggle_mute(),
            TimerCommand::StopAlarm => self.core.stop_alarm(),
            TimerCommand::DismissCompletion => self.core.dismiss_completion(),
            TimerCommand::VisibilityChanged { hidden: true } => self.core.visibility_hidden(),
            TimerCommand::VisibilityChanged { hidden: false } => Vec::new(),
            // Released once the loop exits
            TimerCommand::Shutdown => Vec::new(),
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartCountdown => {
                    // Replacing the interval drops the previous one
                    let mut interval = interval_at(Instant::now() + self.tick_period, self.tick_period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.interval = Some(interval);
                }
                Effect::StopCountdown => {
                    self.interval = None;
                }
                Effect::PlayAlarm { volume, looping } => {
                    if let Err(e) = self.alarm.play(volume, looping) {
                        warn!("Alarm playback failed: {}", e);
                    }
                }
                Effect::StopAlarm => self.alarm.stop(),
                Effect::SetAlarmVolume(volume) => self.alarm.set_volume(volume),
                Effect::PersistSettings(settings) => {
                    if self.persist_tx.send(settings).is_err() {
                        warn!("Settings writer is gone, update not persisted");
                    }
                }
            }
        }
    }

    fn publish(&self) -> TimerSnapshot {
        let snapshot = self.core.snapshot();
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }
}

/// Write settings records in order, off the async workers
async fn persist_settings_task(store: Arc<dyn SettingsStore>, mut rx: mpsc::UnboundedReceiver<TimerSettings>) {
    while let Some(mut settings) = rx.recv().await {
        // Only the newest queued record needs to reach the store
        while let Ok(newer) = rx.try_recv() {
            settings = newer;
        }

        let store = Arc::clone(&store);
        match tokio::task::spawn_blocking(move || save_settings(store.as_ref(), &settings)).await {
            Ok(Ok(())) => debug!("Settings persisted"),
            Ok(Err(e)) => warn!("Failed to persist settings: {}", e),
            Err(e) => warn!("Settings write aborted: {}", e),
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        services::AlarmError,
        storage::{load_settings, MemorySettingsStore, StorageResult},
    };

    #[derive(Clone, Default)]
    struct RecordingAlarm {
        events: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl RecordingAlarm {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl AlarmPlayer for RecordingAlarm {
        fn play(&mut self, volume: f32, looping: bool) -> Result<(), AlarmError> {
            self.events.lock().unwrap().push(format!("play {} {}", volume, looping));
            if self.fail {
                Err(AlarmError::Disabled)
            } else {
                Ok(())
            }
        }

        fn stop(&mut self) {
            self.events.lock().unwrap().push("stop".to_string());
        }

        fn set_volume(&mut self, volume: f32) {
            self.events.lock().unwrap().push(format!("volume {}", volume));
        }

        fn is_playing(&self) -> bool {
            false
        }
    }

    fn spawn_with(settings: TimerSettings, alarm: RecordingAlarm) -> (TimerHandle, Arc<MemorySettingsStore>) {
        let store = Arc::new(MemorySettingsStore::new());
        let (handle, _join) = spawn_timer(
            TimerCore::new(settings),
            Box::new(alarm),
            store.clone(),
            Duration::from_secs(1),
        );
        (handle, store)
    }

    #[tokio::test(start_paused = true)]
    async fn default_pomodoro_runs_to_completion() {
        let alarm = RecordingAlarm::default();
        let (handle, _) = spawn_with(TimerSettings::default(), alarm.clone());

        let snapshot = handle.send(TimerCommand::Start).await.unwrap();
        assert!(snapshot.is_running);

        tokio::time::sleep(Duration::from_millis(1_500_500)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.time_left, 0);
        assert!(!snapshot.is_running);
        assert!(snapshot.is_alarm_ringing);
        assert_eq!(snapshot.completed_pomodoros, 0);

        let snapshot = handle.send(TimerCommand::StopAlarm).await.unwrap();
        assert_eq!(snapshot.completed_pomodoros, 1);
        assert!(!snapshot.is_alarm_ringing);
        assert_eq!(alarm.events(), vec!["play 0.5 true", "stop"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_ticking() {
        let (handle, _) = spawn_with(TimerSettings::default(), RecordingAlarm::default());
        handle.send(TimerCommand::Start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10_500)).await;

        let paused = handle.send(TimerCommand::Pause).await.unwrap();
        assert_eq!(paused.time_left, 1490);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.snapshot().time_left, 1490);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_start_keeps_a_single_interval() {
        let (handle, _) = spawn_with(TimerSettings::default(), RecordingAlarm::default());
        handle.send(TimerCommand::Start).await.unwrap();
        handle.send(TimerCommand::Start).await.unwrap();
        handle.send(TimerCommand::Pause).await.unwrap();
        handle.send(TimerCommand::Start).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(handle.snapshot().time_left, 1495);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_view_pauses() {
        let (handle, _) = spawn_with(TimerSettings::default(), RecordingAlarm::default());
        handle.send(TimerCommand::Start).await.unwrap();

        let visible = handle
            .send(TimerCommand::VisibilityChanged { hidden: false })
            .await
            .unwrap();
        assert!(visible.is_running);

        let hidden = handle
            .send(TimerCommand::VisibilityChanged { hidden: true })
            .await
            .unwrap();
        assert!(!hidden.is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_playback_still_rings() {
        let alarm = RecordingAlarm { fail: true, ..Default::default() };
        let settings = TimerSettings { pomodoro: 60, ..Default::default() };
        let (handle, _) = spawn_with(settings, alarm);

        handle.send(TimerCommand::Start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60_500)).await;
        assert!(handle.snapshot().is_alarm_ringing);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_chain_keeps_counting_down() {
        let settings = TimerSettings {
            pomodoro: 60,
            short_break: 60,
            auto_start_breaks: true,
            ..Default::default()
        };
        let (handle, _) = spawn_with(settings, RecordingAlarm::default());

        handle.send(TimerCommand::Start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(70_500)).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.mode, TimerMode::ShortBreak);
        assert!(snapshot.is_running);
        assert_eq!(snapshot.time_left, 50);
        assert_eq!(snapshot.completed_pomodoros, 1);
    }

    #[tokio::test]
    async fn settings_updates_are_persisted() {
        let store = Arc::new(MemorySettingsStore::new());
        let (handle, join) = spawn_timer(
            TimerCore::default(),
            Box::new(RecordingAlarm::default()),
            store.clone(),
            Duration::from_secs(1),
        );
        let snapshot = handle
            .send(TimerCommand::UpdateSettings(SettingsPatch {
                pomodoro: Some(600),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(snapshot.settings.pomodoro, 600);

        handle.send(TimerCommand::Shutdown).await.unwrap();
        join.await.unwrap();
        assert_eq!(load_settings(store.as_ref()).pomodoro, 600);
    }

    /// Store whose writes block until the test lets them through
    struct GatedStore {
        inner: MemorySettingsStore,
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl SettingsStore for GatedStore {
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            let _ = self.gate.lock().unwrap().recv();
            self.inner.set(key, value)
        }
    }

    #[tokio::test]
    async fn slow_store_does_not_block_commands() {
        let (open_gate, gate) = std::sync::mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: MemorySettingsStore::new(),
            gate: Mutex::new(gate),
        });
        let (handle, join) = spawn_timer(
            TimerCore::default(),
            Box::new(RecordingAlarm::default()),
            store.clone(),
            Duration::from_secs(1),
        );

        handle
            .send(TimerCommand::UpdateSettings(SettingsPatch {
                short_break: Some(45),
                ..Default::default()
            }))
            .await
            .unwrap();

        // The write is stuck; the timer must still answer
        let started = tokio::time::timeout(Duration::from_secs(5), handle.send(TimerCommand::Start))
            .await
            .expect("timer blocked behind the settings write")
            .unwrap();
        assert!(started.is_running);
        assert_eq!(load_settings(&store.inner).short_break, 300);

        open_gate.send(()).unwrap();
        handle.send(TimerCommand::Shutdown).await.unwrap();
        join.await.unwrap();
        assert_eq!(load_settings(&store.inner).short_break, 45);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_alarm_and_closes_handle() {
        let alarm = RecordingAlarm::default();
        let settings = TimerSettings { pomodoro: 60, ..Default::default() };
        let store = Arc::new(MemorySettingsStore::new());
        let (handle, join) = spawn_timer(
            TimerCore::new(settings),
            Box::new(alarm.clone()),
            store,
            Duration::from_secs(1),
        );

        handle.send(TimerCommand::Start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60_500)).await;
        handle.send(TimerCommand::Shutdown).await.unwrap();
        join.await.unwrap();

        assert_eq!(alarm.events().last().map(String::as_str), Some("stop"));
        assert_eq!(handle.send(TimerCommand::Start).await, Err(TimerHandleError::Closed));
    }
}
