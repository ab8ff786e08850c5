//! Video playback state mirrored from the host player.

use serde::{Deserialize, Serialize};

/// Playback rates offered by the player controls.
pub const PLAYBACK_RATES: [f64; 5] = [0.5, 1.0, 1.25, 1.5, 2.0];
/// Seconds skipped by the seek-forward/back controls.
pub const SEEK_STEP: f64 = 5.0;
/// Frame rate assumed for single-frame stepping.
pub const FRAME_RATE: f64 = 30.0;

/// Snapshot of the player the engine consults for gating and
/// visibility. The host is the source of truth and pushes updates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub playing: bool,
    /// Current position in seconds.
    pub current_time: f64,
    /// Total clip length in seconds, 0 until known.
    pub duration: f64,
    pub playback_rate: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            playing: false,
            current_time: 0.0,
            duration: 0.0,
            playback_rate: 1.0,
        }
    }
}

impl PlaybackState {
    pub fn paused(&self) -> bool {
        !self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn toggle(&mut self) {
        self.playing = !self.playing;
    }

    /// Jump to an absolute position, clamped to the clip.
    pub fn seek(&mut self, time: f64) {
        self.current_time = time.clamp(0.0, self.duration);
    }

    /// Jump relative to the current position.
    pub fn seek_by(&mut self, delta: f64) {
        self.seek(self.current_time + delta);
    }

    /// Step by whole frames while paused.
    pub fn step_frames(&mut self, frames: i32) {
        self.seek_by(frames as f64 / FRAME_RATE);
    }

    pub fn set_rate(&mut self, rate: f64) {
        if PLAYBACK_RATES.contains(&rate) {
            self.playback_rate = rate;
        }
    }

    /// Advance the clock by wall time, respecting the rate. Stops at
    /// the end of the clip.
    pub fn advance(&mut self, dt: f64) {
        if self.playing {
            self.seek(self.current_time + dt * self.playback_rate);
            if self.current_time >= self.duration && self.duration > 0.0 {
                self.playing = false;
            }
        }
    }
}
