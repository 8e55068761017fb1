//! Timed playback of a recording against an injection backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::buttons::Button;
use crate::inject::{KeyInjector, WindowHandle, WindowLocator};
use crate::recording::Recording;
use crate::state::ActiveKeys;

/// Granularity at which waits observe the stop flag.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    /// Playback speed multiplier; recorded delays are divided by this.
    pub speed: f64,
    /// Window name to locate before playback.
    pub window_name: String,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            window_name: String::new(),
        }
    }
}

/// What a playback session actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub samples_applied: usize,
    pub presses: usize,
    pub releases: usize,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Located,
    Playing,
}

/// Replays recordings by diffing each sample against the active key set
/// and emitting only the transitions. Every key still held when a session
/// ends is released, on all exit paths.
pub struct InputPlayer<B> {
    backend: B,
    active: ActiveKeys,
    state: SessionState,
}

impl<B: WindowLocator + KeyInjector> InputPlayer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            active: ActiveKeys::new(),
            state: SessionState::Idle,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn active_keys(&self) -> &ActiveKeys {
        &self.active
    }

    /// `true` when no playback session is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }

    /// Play a full recording. Degraded conditions (window not found,
    /// unknown key, injection failure, non-monotonic timestamps) are
    /// warnings; the session always completes and always drains the
    /// active key set before returning.
    pub fn play(
        &mut self,
        recording: &Recording,
        options: &PlaybackOptions,
        stop: &AtomicBool,
    ) -> PlaybackSummary {
        let speed = if options.speed > 0.0 {
            options.speed
        } else {
            warn!("invalid playback speed {}, using 1.0", options.speed);
            1.0
        };

        let window = match self.backend.find_window(&options.window_name) {
            Some(window) => {
                info!("playback target: window '{}'", options.window_name);
                window
            }
            None => {
                warn!(
                    "window '{}' not found, falling back to root window",
                    options.window_name
                );
                self.backend.root_window()
            }
        };
        self.state = SessionState::Located;

        let mut summary = PlaybackSummary::default();
        self.state = SessionState::Playing;
        let mut prev_ts: Option<u64> = None;

        for sample in &recording.samples {
            if stop.load(Ordering::Relaxed) {
                summary.interrupted = true;
                break;
            }
            if let Some(prev) = prev_ts {
                if sample.timestamp_ms < prev {
                    warn!(
                        "non-monotonic timestamp {} after {}, continuing without delay",
                        sample.timestamp_ms, prev
                    );
                } else {
                    let delta_ms = (sample.timestamp_ms - prev) as f64 / speed;
                    let delay = Duration::from_secs_f64(delta_ms / 1000.0);
                    if !delay.is_zero() && sleep_interruptible(delay, stop) {
                        summary.interrupted = true;
                        break;
                    }
                }
            }
            let (presses, releases) = self.set_button_state(window, sample.buttons);
            summary.presses += presses;
            summary.releases += releases;
            summary.samples_applied += 1;
            prev_ts = Some(sample.timestamp_ms);
        }

        summary.releases += self.release_all(window);
        self.state = SessionState::Idle;
        debug!(
            "playback done: {} samples, {} presses, {} releases{}",
            summary.samples_applied,
            summary.presses,
            summary.releases,
            if summary.interrupted {
                " (interrupted)"
            } else {
                ""
            }
        );
        summary
    }

    /// Apply one bitmask, emitting only the diff against the active set.
    /// Returns the number of (presses, releases) actually delivered.
    /// Applying the same mask twice emits nothing the second time.
    pub fn set_button_state(&mut self, window: WindowHandle, mask: u32) -> (usize, usize) {
        let transition = self.active.diff(mask);
        let mut releases = 0;
        let mut presses = 0;
        for button in transition.releases {
            if self.emit(window, button, false) {
                self.active.release(button);
                releases += 1;
            } else {
                // key could not be released, drop it from tracking anyway
                self.active.release(button);
            }
        }
        for button in transition.presses {
            if self.emit(window, button, true) {
                self.active.press(button);
                presses += 1;
            }
        }
        (presses, releases)
    }

    /// Release every key still held. Returns the number of release events
    /// delivered.
    pub fn release_all(&mut self, window: WindowHandle) -> usize {
        let mut released = 0;
        for button in self.active.drain() {
            if self.emit(window, button, false) {
                released += 1;
            }
        }
        released
    }

    fn emit(&mut self, window: WindowHandle, button: Button, pressed: bool) -> bool {
        let name = button.key_name();
        let action = if pressed { "press" } else { "release" };
        let Some(code) = self.backend.resolve_key(name) else {
            warn!("unknown key '{name}' for {button:?}, skipping {action}");
            return false;
        };
        match self.backend.inject(window, code, pressed) {
            Ok(()) => {
                debug!("{action} {button:?} ('{name}')");
                true
            }
            Err(e) => {
                warn!("failed to {action} '{name}': {e:#}");
                false
            }
        }
    }
}

/// Sleep for `total`, waking early if `stop` is set. Returns `true` when
/// interrupted.
fn sleep_interruptible(total: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::Relaxed) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::VirtualBackend;
    use crate::recording::Sample;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    fn recording(samples: &[(u64, u32)]) -> Recording {
        Recording {
            samples: samples
                .iter()
                .map(|&(timestamp_ms, buttons)| Sample {
                    timestamp_ms,
                    buttons,
                })
                .collect(),
        }
    }

    fn options(window: &str) -> PlaybackOptions {
        PlaybackOptions {
            speed: 1.0,
            window_name: window.to_string(),
        }
    }

    #[test]
    fn press_then_release_with_recorded_delay() {
        let mut backend = VirtualBackend::new();
        let window = backend.add_window("app");
        let mut player = InputPlayer::new(backend);
        let stop = AtomicBool::new(false);

        let rec = recording(&[(0, Button::Up.bit()), (30, 0)]);
        let start = Instant::now();
        let summary = player.play(&rec, &options("app"), &stop);
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(30));
        assert!(player.is_idle());
        assert_eq!(summary.samples_applied, 2);
        assert_eq!(summary.presses, 1);
        assert_eq!(summary.releases, 1);
        assert!(!summary.interrupted);
        assert!(player.active_keys().is_empty());

        let code = VirtualBackend::code_for(Button::Up);
        assert_eq!(
            player.backend().events(),
            &[(window, code, true), (window, code, false)]
        );
    }

    #[test]
    fn repeated_mask_emits_no_redundant_events() {
        let mut backend = VirtualBackend::new();
        backend.add_window("app");
        let mut player = InputPlayer::new(backend);
        let stop = AtomicBool::new(false);

        let mask = Button::A.bit() | Button::B.bit();
        let rec = recording(&[(0, mask), (1, mask), (2, mask), (3, 0)]);
        let summary = player.play(&rec, &options("app"), &stop);

        assert_eq!(summary.presses, 2);
        assert_eq!(summary.releases, 2);
        assert_eq!(player.backend().events().len(), 4);
    }

    #[test]
    fn set_button_state_is_idempotent() {
        let mut backend = VirtualBackend::new();
        let window = backend.add_window("app");
        let mut player = InputPlayer::new(backend);

        let mask = Button::Left.bit();
        assert_eq!(player.set_button_state(window, mask), (1, 0));
        assert_eq!(player.set_button_state(window, mask), (0, 0));
        assert_eq!(player.backend().events().len(), 1);
    }

    #[test]
    fn releases_precede_presses_within_a_sample() {
        let mut backend = VirtualBackend::new();
        let window = backend.add_window("app");
        let mut player = InputPlayer::new(backend);
        let stop = AtomicBool::new(false);

        let rec = recording(&[(0, Button::Up.bit()), (1, Button::Down.bit())]);
        player.play(&rec, &options("app"), &stop);

        let up = VirtualBackend::code_for(Button::Up);
        let down = VirtualBackend::code_for(Button::Down);
        assert_eq!(
            player.backend().events(),
            &[
                (window, up, true),
                (window, up, false),
                (window, down, true),
                (window, down, false),
            ]
        );
    }

    #[test]
    fn missing_window_falls_back_to_root() {
        let backend = VirtualBackend::new();
        let mut player = InputPlayer::new(backend);
        let stop = AtomicBool::new(false);

        let rec = recording(&[(0, Button::Start.bit()), (1, 0)]);
        let summary = player.play(&rec, &options("absent"), &stop);

        assert_eq!(summary.presses, 1);
        for (window, _, _) in player.backend().events() {
            assert_eq!(*window, WindowHandle(0));
        }
    }

    #[test]
    fn unknown_key_is_skipped_without_aborting() {
        let mut backend = VirtualBackend::new();
        backend.add_window("app");
        backend.forget_key(Button::Up.key_name());
        let mut player = InputPlayer::new(backend);
        let stop = AtomicBool::new(false);

        let rec = recording(&[(0, Button::Up.bit() | Button::A.bit()), (1, 0)]);
        let summary = player.play(&rec, &options("app"), &stop);

        // only A produced events, the session still ran to completion
        assert_eq!(summary.samples_applied, 2);
        assert_eq!(summary.presses, 1);
        assert_eq!(summary.releases, 1);
        assert!(player.active_keys().is_empty());
    }

    #[test]
    fn injection_failure_degrades_without_phantom_state() {
        let mut backend = VirtualBackend::new();
        let window = backend.add_window("app");
        backend.fail_injection(true);
        let mut player = InputPlayer::new(backend);

        assert_eq!(player.set_button_state(window, Button::A.bit()), (0, 0));
        assert!(player.active_keys().is_empty());
        assert!(player.backend().events().is_empty());
    }

    #[test]
    fn interrupt_mid_playback_still_releases_keys() {
        let mut backend = VirtualBackend::new();
        backend.add_window("app");
        let mut player = InputPlayer::new(backend);

        let stop = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            setter.store(true, Ordering::Relaxed);
        });

        // second sample is 10s out, the interrupt lands during the wait
        let rec = recording(&[(0, Button::Up.bit()), (10_000, 0)]);
        let start = Instant::now();
        let summary = player.play(&rec, &options("app"), &stop);
        handle.join().unwrap();

        assert!(summary.interrupted);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(summary.releases, 1);
        assert!(player.active_keys().is_empty());
    }

    #[test]
    fn non_monotonic_timestamps_do_not_stall() {
        let mut backend = VirtualBackend::new();
        backend.add_window("app");
        let mut player = InputPlayer::new(backend);
        let stop = AtomicBool::new(false);

        let rec = recording(&[(100, Button::Up.bit()), (50, 0), (50, Button::A.bit()), (51, 0)]);
        let start = Instant::now();
        let summary = player.play(&rec, &options("app"), &stop);

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(summary.samples_applied, 4);
        assert!(player.active_keys().is_empty());
    }
}
