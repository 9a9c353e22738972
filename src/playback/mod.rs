//! Playback of reply clips through an external player process
//!
//! One clip plays at a time. The clip is written to a temp file that lives
//! exactly as long as its player process; a monitor thread reaps the process
//! when it exits on its own or overruns the hard timeout.
//!
//! `play` and `stop` run on the coordinator, the only reader of the event
//! bus, so their notifications never block on it.

use crate::messages::{AssistantEvent, PlaybackEvent};
use crate::{Result, ZelnaError};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Placeholder in player arguments replaced by the clip path
pub const CLIP_PLACEHOLDER: &str = "{clip}";

/// Configuration for the playback controller
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Player executable
    pub program: String,

    /// Player arguments; `{clip}` is replaced by the clip path, which is
    /// appended when no argument mentions it
    pub args: Vec<String>,

    /// Grace period after SIGTERM before the player is killed
    pub stop_timeout: Duration,

    /// Players running longer than this are reaped
    pub hard_timeout: Duration,

    /// How often the monitor checks the player
    pub poll_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            program: "mpg123".to_string(),
            args: vec!["-q".to_string(), CLIP_PLACEHOLDER.to_string()],
            stop_timeout: Duration::from_millis(500),
            hard_timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl PlaybackConfig {
    fn player_args(&self, clip: &str) -> Vec<String> {
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(CLIP_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(CLIP_PLACEHOLDER, clip)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(clip.to_string());
        }
        args
    }
}

/// The clip currently owned by a player process
struct ActiveClip {
    id: u64,
    child: Child,
    file: NamedTempFile,
}

struct Shared {
    current: Mutex<Option<ActiveClip>>,
    next_id: AtomicU64,
}

/// Plays reply audio and stops it on demand
pub struct PlaybackController {
    config: PlaybackConfig,
    shared: Arc<Shared>,
    event_tx: Sender<AssistantEvent>,
}

impl PlaybackController {
    pub fn new(config: PlaybackConfig, event_tx: Sender<AssistantEvent>) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                current: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
            event_tx,
        }
    }

    /// Start playing `audio`, stopping any clip already playing.
    ///
    /// Returns as soon as the player is spawned. A failure is returned to
    /// the caller and leaves the controller idle.
    pub fn play(&self, audio: &[u8]) -> Result<u64> {
        self.stop();

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        let (child, file) = match self.spawn_player(audio) {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!("Playback of clip {} failed: {}", id, e);
                return Err(e);
            }
        };

        info!("Playing clip {} ({} bytes)", id, audio.len());
        *self.shared.current.lock() = Some(ActiveClip { id, child, file });
        self.publish(PlaybackEvent::Started { clip: id });

        self.spawn_monitor(id);
        Ok(id)
    }

    fn spawn_player(&self, audio: &[u8]) -> Result<(Child, NamedTempFile)> {
        let mut file = tempfile::Builder::new()
            .prefix("zelna-clip-")
            .tempfile()
            .map_err(|e| ZelnaError::Playback(format!("Failed to create clip file: {}", e)))?;
        file.write_all(audio)
            .and_then(|_| file.flush())
            .map_err(|e| ZelnaError::Playback(format!("Failed to write clip file: {}", e)))?;

        let path = file.path().to_string_lossy().into_owned();
        let child = Command::new(&self.config.program)
            .args(self.config.player_args(&path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ZelnaError::PlayerMissing(self.config.program.clone()),
                _ => ZelnaError::Playback(format!("Failed to start {}: {}", self.config.program, e)),
            })?;

        Ok((child, file))
    }

    fn spawn_monitor(&self, id: u64) {
        let shared = Arc::clone(&self.shared);
        let event_tx = self.event_tx.clone();
        let poll_interval = self.config.poll_interval;
        let hard_timeout = self.config.hard_timeout;
        let started = Instant::now();

        let spawned = thread::Builder::new()
            .name(format!("playback-monitor-{}", id))
            .spawn(move || loop {
                thread::sleep(poll_interval);

                let mut current = shared.current.lock();
                let Some(active) = current.as_mut().filter(|c| c.id == id) else {
                    // Stopped or replaced by the command path
                    return;
                };

                let outcome = match active.child.try_wait() {
                    Ok(Some(status)) => {
                        debug!("Clip {} player exited: {}", id, status);
                        PlaybackEvent::Finished { clip: id }
                    }
                    Ok(None) if started.elapsed() >= hard_timeout => {
                        warn!("Clip {} exceeded {:?}, killing player", id, hard_timeout);
                        let _ = active.child.kill();
                        let _ = active.child.wait();
                        PlaybackEvent::Error("Playback timed out".to_string())
                    }
                    Ok(None) => continue,
                    Err(e) => PlaybackEvent::Error(format!("Lost track of player: {}", e)),
                };

                // Dropping the clip removes its temp file
                current.take();
                drop(current);
                // Off the coordinator thread, so waiting for room is safe
                let _ = event_tx.send(outcome.into());
                return;
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn playback monitor: {}", e);
        }
    }

    /// Stop the current clip, escalating to a kill after the grace period.
    ///
    /// Returns `false` when nothing was playing.
    pub fn stop(&self) -> bool {
        let Some(mut active) = self.shared.current.lock().take() else {
            return false;
        };

        terminate(&mut active.child, self.config.stop_timeout);
        let id = active.id;
        drop(active);

        debug!("Clip {} stopped", id);
        self.publish(PlaybackEvent::Stopped { clip: id });
        true
    }

    pub fn is_playing(&self) -> bool {
        self.shared.current.lock().is_some()
    }

    pub fn current_clip(&self) -> Option<u64> {
        self.shared.current.lock().as_ref().map(|c| c.id)
    }

    /// Path of the temp file backing the current clip
    pub fn current_clip_path(&self) -> Option<PathBuf> {
        self.shared
            .current
            .lock()
            .as_ref()
            .map(|c| c.file.path().to_path_buf())
    }

    fn publish(&self, event: PlaybackEvent) {
        if let Err(e) = self.event_tx.try_send(event.into()) {
            debug!("Playback notification dropped: {}", e);
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ask the player to exit, then kill it if it lingers
fn terminate(child: &mut Child, grace: Duration) {
    request_exit(child);

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => thread::sleep(Duration::from_millis(10)),
            Err(_) => break,
        }
    }

    debug!("Player {} ignored SIGTERM, killing", child.id());
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: signalling a pid we spawned and have not yet reaped
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_args_substitution() {
        let config = PlaybackConfig::default();
        assert_eq!(config.player_args("/tmp/a"), vec!["-q", "/tmp/a"]);

        let config = PlaybackConfig {
            args: vec!["--quiet".into()],
            ..PlaybackConfig::default()
        };
        assert_eq!(config.player_args("/tmp/a"), vec!["--quiet", "/tmp/a"]);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let controller = PlaybackController::new(PlaybackConfig::default(), tx);
        assert!(!controller.stop());
        assert!(!controller.stop());
        assert!(!controller.is_playing());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_missing_player_reports_error() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = PlaybackConfig {
            program: "zelna-no-such-player".into(),
            ..PlaybackConfig::default()
        };
        let controller = PlaybackController::new(config, tx);

        let result = controller.play(b"clip");
        assert!(matches!(result, Err(ZelnaError::PlayerMissing(_))));
        assert!(!controller.is_playing());
        // The caller reports the failure
        assert!(rx.try_recv().is_err());
    }
}
