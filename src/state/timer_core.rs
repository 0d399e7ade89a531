//! Pomodoro timer state machine
//!
//! `TimerCore` holds countdown, mode, settings and the alarm/completion
//! bookkeeping. It performs no I/O and owns no clock: ticks arrive as calls
//! to [`TimerCore::tick`], and every operation returns the side effects the
//! driving shell has to carry out (start/stop the interval, play/stop the
//! alarm, persist settings).

use tracing::{debug, info};

use super::{SettingsPatch, TimerMode, TimerSettings, TimerSnapshot};

/// Side effect requested by a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Cancel any active countdown interval and start a fresh one
    StartCountdown,
    /// Cancel the active countdown interval
    StopCountdown,
    /// Start alarm playback
    PlayAlarm { volume: f32, looping: bool },
    /// Halt alarm playback
    StopAlarm,
    /// Adjust the volume of a playing alarm
    SetAlarmVolume(f32),
    /// Save the full settings record
    PersistSettings(TimerSettings),
}

pub type Effects = Vec<Effect>;

#[derive(Debug, Clone)]
pub struct TimerCore {
    settings: TimerSettings,
    mode: TimerMode,
    time_left: u32,
    is_running: bool,
    is_muted: bool,
    is_alarm_ringing: bool,
    completed_pomodoros: u32,
    /// Set once the current countdown has reached zero and entered Ringing
    alarm_triggered: bool,
    /// Set once the current pomodoro session has been counted
    pomodoro_counted: bool,
    /// Pomodoro count at the moment the last session reached zero
    completed_at_finish: u32,
}

impl TimerCore {
    /// Create an idle timer in pomodoro mode seeded from `settings`
    pub fn new(mut settings: TimerSettings) -> Self {
        settings.sanitize();
        let time_left = settings.duration(TimerMode::Pomodoro);
        Self {
            settings,
            mode: TimerMode::Pomodoro,
            time_left,
            is_running: false,
            is_muted: false,
            is_alarm_ringing: false,
            completed_pomodoros: 0,
            alarm_triggered: false,
            pomodoro_counted: false,
            completed_at_finish: 0,
        }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    pub fn is_alarm_ringing(&self) -> bool {
        self.is_alarm_ringing
    }

    pub fn completed_pomodoros(&self) -> u32 {
        self.completed_pomodoros
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::new(
            self.mode,
            self.time_left,
            self.is_running,
            self.is_muted,
            self.is_alarm_ringing,
            self.completed_pomodoros,
            &self.settings,
        )
    }

    /// Begin (or resume) the countdown. Stops a ringing alarm first.
    pub fn start(&mut self) -> Effects {
        let mut effects = Effects::new();
        if self.is_running {
            return effects;
        }
        if self.is_alarm_ringing {
            self.acknowledge(&mut effects);
        }

        if self.time_left == 0 {
            self.time_left = self.settings.duration(self.mode);
        }
        self.begin_countdown(&mut effects);
        effects
    }

    pub fn pause(&mut self) -> Effects {
        let mut effects = Effects::new();
        if !self.is_running {
            return effects;
        }
        info!("Pausing {} with {}s left", self.mode, self.time_left);
        self.is_running = false;
        effects.push(Effect::StopCountdown);
        effects
    }

    /// Stop the countdown and refill the current mode's full duration
    pub fn reset(&mut self) -> Effects {
        let mut effects = Effects::new();
        if self.is_alarm_ringing {
            self.acknowledge(&mut effects);
        }
        if self.is_running {
            self.is_running = false;
            effects.push(Effect::StopCountdown);
        }
        self.time_left = self.settings.duration(self.mode);
        self.rearm();
        info!("Reset {} to {}s", self.mode, self.time_left);
        effects
    }

    /// Switch mode. Silences a ringing alarm without counting the session.
    pub fn set_mode(&mut self, mode: TimerMode) -> Effects {
        let mut effects = Effects::new();
        self.switch_mode(mode, &mut effects);
        effects
    }

    /// Merge a partial settings update and persist the result.
    ///
    /// The remaining time of the current session is left alone unless it
    /// exceeds the new duration of the current mode.
    pub fn update_settings(&mut self, patch: SettingsPatch) -> Effects {
        let mut effects = Effects::new();
        let previous_volume = self.settings.volume;
        self.settings.apply(patch);

        let duration = self.settings.duration(self.mode);
        if self.time_left > duration {
            self.time_left = duration;
        }
        if self.is_alarm_ringing && self.settings.volume != previous_volume {
            effects.push(Effect::SetAlarmVolume(self.settings.volume));
        }

        info!("Settings updated");
        effects.push(Effect::PersistSettings(self.settings.clone()));
        effects
    }

    /// Flip the mute flag. Muting a ringing alarm also stops it.
    pub fn toggle_mute(&mut self) -> Effects {
        let mut effects = Effects::new();
        if !self.is_muted && self.is_alarm_ringing {
            self.stop_alarm_into(&mut effects);
        }
        self.is_muted = !self.is_muted;
        info!("Mute {}", if self.is_muted { "on" } else { "off" });
        effects
    }

    /// Acknowledge a ringing alarm, counting a finished pomodoro once
    pub fn stop_alarm(&mut self) -> Effects {
        let mut effects = Effects::new();
        self.stop_alarm_into(&mut effects);
        effects
    }

    /// Acknowledge a finished session and move to the mode that follows it
    /// without starting it. No-op while the session still has time left.
    pub fn dismiss_completion(&mut self) -> Effects {
        let mut effects = Effects::new();
        if self.time_left != 0 || self.is_running {
            return effects;
        }
        if self.is_alarm_ringing {
            self.acknowledge(&mut effects);
        }
        self.count_pomodoro();
        let next = self.mode.next(self.completed_at_finish);
        self.switch_mode(next, &mut effects);
        effects
    }

    /// The host reports the view hidden; a running countdown is paused
    pub fn visibility_hidden(&mut self) -> Effects {
        if self.is_running {
            debug!("View hidden while running");
        }
        self.pause()
    }

    /// Release the countdown and any playing alarm
    pub fn shutdown(&mut self) -> Effects {
        let mut effects = Effects::new();
        if self.is_running {
            self.is_running = false;
            effects.push(Effect::StopCountdown);
        }
        if self.is_alarm_ringing {
            effects.push(Effect::StopAlarm);
        }
        effects
    }

    /// Advance the countdown by one second
    pub fn tick(&mut self) -> Effects {
        let mut effects = Effects::new();
        if !self.is_running {
            return effects;
        }

        if self.time_left > 1 {
            self.time_left -= 1;
            self.alarm_triggered = false;
            return effects;
        }

        self.time_left = 0;
        self.is_running = false;
        effects.push(Effect::StopCountdown);
        self.finish_session(&mut effects);
        effects
    }

    fn begin_countdown(&mut self, effects: &mut Effects) {
        self.rearm();
        self.is_running = true;
        info!("Starting {} with {}s left", self.mode, self.time_left);
        effects.push(Effect::StartCountdown);
    }

    fn switch_mode(&mut self, mode: TimerMode, effects: &mut Effects) {
        if self.is_alarm_ringing {
            self.is_alarm_ringing = false;
            effects.push(Effect::StopAlarm);
        }
        if self.is_running {
            self.is_running = false;
            effects.push(Effect::StopCountdown);
        }
        self.mode = mode;
        self.time_left = self.settings.duration(mode);
        self.rearm();
        info!("Switched to {} ({}s)", mode, self.time_left);
    }

    fn finish_session(&mut self, effects: &mut Effects) {
        if self.alarm_triggered {
            return;
        }
        self.alarm_triggered = true;
        self.completed_at_finish = self.completed_pomodoros;

        let chaining = self.settings.auto_starts_after(self.mode);
        info!("{} session finished", self.mode);

        // Playback is best effort; the ringing flag is the completion signal.
        if !self.is_muted {
            effects.push(Effect::PlayAlarm {
                volume: self.settings.volume,
                looping: !chaining,
            });
        }
        self.is_alarm_ringing = true;

        if chaining {
            self.is_alarm_ringing = false;
            self.settle(effects);
        }
    }

    fn stop_alarm_into(&mut self, effects: &mut Effects) {
        if !self.is_alarm_ringing {
            return;
        }
        self.acknowledge(effects);
        self.settle(effects);
    }

    fn acknowledge(&mut self, effects: &mut Effects) {
        self.is_alarm_ringing = false;
        effects.push(Effect::StopAlarm);
        self.count_pomodoro();
    }

    /// Completion check for a session sitting at zero with no alarm ringing:
    /// count it if it was a pomodoro, then chain if auto-start allows it.
    fn settle(&mut self, effects: &mut Effects) {
        if self.time_left != 0 || self.is_running || self.is_alarm_ringing {
            return;
        }
        self.count_pomodoro();

        let finished = self.mode;
        if self.settings.auto_starts_after(finished) {
            let next = finished.next(self.completed_at_finish);
            info!("Auto-starting {} after {}", next, finished);
            self.switch_mode(next, effects);
            self.begin_countdown(effects);
        }
    }

    fn count_pomodoro(&mut self) {
        if self.time_left != 0 || self.mode != TimerMode::Pomodoro || self.pomodoro_counted {
            return;
        }
        self.pomodoro_counted = true;
        self.completed_pomodoros += 1;
        info!("Completed pomodoros: {}", self.completed_pomodoros);
    }

    fn rearm(&mut self) {
        self.alarm_triggered = false;
        self.pomodoro_counted = false;
    }
}

impl Default for TimerCore {
    fn default() -> Self {
        Self::new(TimerSettings::default())
    }
}
