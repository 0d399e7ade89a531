//! Alarm playback
//!
//! Playback is best effort. Errors are reported to the caller for logging
//! but never influence the timer state.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::{process::Command, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

/// A looping player run shorter than this did not really play anything
const MIN_PLAY_TIME: Duration = Duration::from_millis(500);
/// Pause before restarting a looping player after a short run
const RESTART_DELAY: Duration = Duration::from_millis(250);
/// Consecutive short runs after which looping playback is abandoned
const MAX_SHORT_RUNS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("no alarm sound configured")]
    Disabled,
    #[error("alarm sound not found: {0}")]
    MissingAsset(PathBuf),
}

/// Something that can ring the alarm
pub trait AlarmPlayer: Send {
    /// Start playback, replacing any playback already in progress
    fn play(&mut self, volume: f32, looping: bool) -> Result<(), AlarmError>;

    /// Halt playback; no-op when nothing is playing
    fn stop(&mut self);

    /// Adjust the volume of the current playback
    fn set_volume(&mut self, volume: f32);

    fn is_playing(&self) -> bool;
}

/// Alarm used when no sound asset is configured
#[derive(Debug, Default)]
pub struct SilentAlarm;

impl AlarmPlayer for SilentAlarm {
    fn play(&mut self, _volume: f32, _looping: bool) -> Result<(), AlarmError> {
        Err(AlarmError::Disabled)
    }

    fn stop(&mut self) {}

    fn set_volume(&mut self, _volume: f32) {}

    fn is_playing(&self) -> bool {
        false
    }
}

/// Plays a sound file through an external player process (`paplay`, `afplay`, ...)
#[derive(Debug)]
pub struct CommandAlarm {
    program: String,
    sound: PathBuf,
    looping: bool,
    playback: Option<JoinHandle<()>>,
}

impl CommandAlarm {
    pub fn new(program: impl Into<String>, sound: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            sound: sound.into(),
            looping: false,
            playback: None,
        }
    }

    pub fn sound(&self) -> &Path {
        &self.sound
    }

    fn spawn_playback(&mut self, volume: f32) {
        let program = self.program.clone();
        let mut args = volume_args(&program, volume);
        args.push(self.sound.to_string_lossy().to_string());
        let looping = self.looping;

        self.playback = Some(tokio::spawn(async move {
            let mut short_runs = 0;
            loop {
                let started = Instant::now();
                let status = Command::new(&program)
                    .args(&args)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .status()
                    .await;

                match status {
                    Ok(status) if status.success() => debug!("Alarm playback finished"),
                    Ok(status) => {
                        warn!("Alarm player exited with {}", status);
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to run alarm player {}: {}", program, e);
                        break;
                    }
                }

                if !looping {
                    break;
                }

                if started.elapsed() < MIN_PLAY_TIME {
                    short_runs += 1;
                    if short_runs >= MAX_SHORT_RUNS {
                        warn!("Alarm player keeps exiting immediately, giving up on {}", program);
                        break;
                    }
                    tokio::time::sleep(RESTART_DELAY).await;
                } else {
                    short_runs = 0;
                }
            }
        }));
    }
}

impl AlarmPlayer for CommandAlarm {
    fn play(&mut self, volume: f32, looping: bool) -> Result<(), AlarmError> {
        self.stop();
        if !self.sound.exists() {
            return Err(AlarmError::MissingAsset(self.sound.clone()));
        }

        self.looping = looping;
        self.spawn_playback(volume);
        info!("Alarm playing (volume {:.2}, looping {})", volume, looping);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.playback.take() {
            // Aborting drops the child future, which kills the player process
            handle.abort();
            debug!("Alarm stopped");
        }
    }

    fn set_volume(&mut self, volume: f32) {
        if self.is_playing() {
            self.stop();
            self.spawn_playback(volume);
        }
    }

    fn is_playing(&self) -> bool {
        self.playback.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for CommandAlarm {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Player-specific volume flags
fn volume_args(program: &str, volume: f32) -> Vec<String> {
    let volume = volume.clamp(0.0, 1.0);
    let name = Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program);

    match name {
        "paplay" => vec![format!("--volume={}", (volume * 65536.0).round() as u32)],
        "afplay" => vec!["-v".to_string(), format!("{:.2}", volume)],
        "mpv" => vec![
            "--no-video".to_string(),
            format!("--volume={}", (volume * 100.0).round() as u32),
        ],
        _ => Vec::new(),
    }
}
