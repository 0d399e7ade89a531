//! User-configurable timer settings

use serde::{Deserialize, Serialize};

use super::TimerMode;

/// Shortest allowed session, in seconds
pub const MIN_DURATION_SECS: u32 = 1;

pub const MAX_POMODORO_LABEL_LEN: usize = 10;
pub const MAX_BREAK_LABEL_LEN: usize = 12;

const DEFAULT_POMODORO_LABEL: &str = "WORK";
const DEFAULT_SHORT_BREAK_LABEL: &str = "SHORT BREAK";
const DEFAULT_LONG_BREAK_LABEL: &str = "LONG BREAK";

/// Color theme selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeColor {
    #[default]
    Red,
    Blue,
    Green,
}

/// Persisted timer settings. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerSettings {
    pub pomodoro: u32,
    pub short_break: u32,
    pub long_break: u32,
    pub auto_start_breaks: bool,
    pub auto_start_pomodoros: bool,
    pub volume: f32,
    pub theme_color: ThemeColor,
    pub pomodoro_label: String,
    pub short_break_label: String,
    pub long_break_label: String,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            pomodoro: 25 * 60,
            short_break: 5 * 60,
            long_break: 15 * 60,
            auto_start_breaks: false,
            auto_start_pomodoros: false,
            volume: 0.5,
            theme_color: ThemeColor::Red,
            pomodoro_label: DEFAULT_POMODORO_LABEL.to_string(),
            short_break_label: DEFAULT_SHORT_BREAK_LABEL.to_string(),
            long_break_label: DEFAULT_LONG_BREAK_LABEL.to_string(),
        }
    }
}

impl TimerSettings {
    /// Full duration of a session in the given mode
    pub fn duration(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Pomodoro => self.pomodoro,
            TimerMode::ShortBreak => self.short_break,
            TimerMode::LongBreak => self.long_break,
        }
    }

    /// Display label of the given mode
    pub fn label(&self, mode: TimerMode) -> &str {
        match mode {
            TimerMode::Pomodoro => &self.pomodoro_label,
            TimerMode::ShortBreak => &self.short_break_label,
            TimerMode::LongBreak => &self.long_break_label,
        }
    }

    /// Whether finishing a session in `mode` chains straight into the next one
    pub fn auto_starts_after(&self, mode: TimerMode) -> bool {
        match mode {
            TimerMode::Pomodoro => self.auto_start_breaks,
            TimerMode::ShortBreak | TimerMode::LongBreak => self.auto_start_pomodoros,
        }
    }

    /// Merge a partial update into these settings. The result is sanitized.
    pub fn apply(&mut self, patch: SettingsPatch) {
        let SettingsPatch {
            pomodoro,
            short_break,
            long_break,
            auto_start_breaks,
            auto_start_pomodoros,
            volume,
            theme_color,
            pomodoro_label,
            short_break_label,
            long_break_label,
        } = patch;

        if let Some(v) = pomodoro {
            self.pomodoro = v;
        }
        if let Some(v) = short_break {
            self.short_break = v;
        }
        if let Some(v) = long_break {
            self.long_break = v;
        }
        if let Some(v) = auto_start_breaks {
            self.auto_start_breaks = v;
        }
        if let Some(v) = auto_start_pomodoros {
            self.auto_start_pomodoros = v;
        }
        if let Some(v) = volume {
            self.volume = v;
        }
        if let Some(v) = theme_color {
            self.theme_color = v;
        }
        if let Some(v) = pomodoro_label {
            self.pomodoro_label = v;
        }
        if let Some(v) = short_break_label {
            self.short_break_label = v;
        }
        if let Some(v) = long_break_label {
            self.long_break_label = v;
        }

        self.sanitize();
    }

    /// Clamp every field into its valid range.
    ///
    /// Durations of zero are raised to [`MIN_DURATION_SECS`]; any positive
    /// duration is kept as is. Volume is kept within [0, 1] (NaN becomes the
    /// default) and labels are truncated to their maximum length or reset
    /// when blank.
    pub fn sanitize(&mut self) {
        self.pomodoro = clamp_duration(self.pomodoro);
        self.short_break = clamp_duration(self.short_break);
        self.long_break = clamp_duration(self.long_break);

        self.volume = if self.volume.is_nan() {
            Self::default().volume
        } else {
            self.volume.clamp(0.0, 1.0)
        };

        sanitize_label(&mut self.pomodoro_label, MAX_POMODORO_LABEL_LEN, DEFAULT_POMODORO_LABEL);
        sanitize_label(&mut self.short_break_label, MAX_BREAK_LABEL_LEN, DEFAULT_SHORT_BREAK_LABEL);
        sanitize_label(&mut self.long_break_label, MAX_BREAK_LABEL_LEN, DEFAULT_LONG_BREAK_LABEL);
    }
}

fn clamp_duration(secs: u32) -> u32 {
    secs.max(MIN_DURATION_SECS)
}

fn sanitize_label(label: &mut String, max_len: usize, fallback: &str) {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        *label = fallback.to_string();
    } else {
        *label = trimmed.chars().take(max_len).collect();
    }
}

/// Partial settings update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pomodoro: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_break: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_break: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_start_breaks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_start_pomodoros: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<ThemeColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pomodoro_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_break_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_break_label: Option<String>,
}
