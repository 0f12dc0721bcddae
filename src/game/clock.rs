//! Chess clock driven by wall-clock deltas.
//!
//! The controller never owns a timer. Whoever schedules it (the session actor
//! polls every ~100ms) calls [`ClockController::poll`], which charges the real
//! time elapsed since the previous sample to the side to move. Irregular or
//! throttled polling only makes time appear to pass in bursts.

use chess::Color;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Millisecond time source injected into the clock
pub trait TimeSource {
    fn now_ms(&self) -> u64;
}

/// Monotonic time since construction
#[derive(Debug, Clone)]
pub struct SystemTime {
    origin: Instant,
}

impl SystemTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTime {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Virtual time advanced by hand. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now: Arc<AtomicU64>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Remaining time and increment per side, indexed by `Color::to_index`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockState {
    pub remaining_ms: [u64; 2],
    pub increment_ms: [u64; 2],
    pub running: bool,
    pub last_sample_ms: u64,
}

/// A side ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeForfeit {
    pub loser: Color,
}

impl TimeForfeit {
    pub fn winner(&self) -> Color {
        !self.loser
    }
}

pub struct ClockController {
    state: ClockState,
    time: Box<dyn TimeSource>,
}

impl ClockController {
    pub fn new(initial_ms: [u64; 2], increment_ms: [u64; 2], time: Box<dyn TimeSource>) -> Self {
        let last_sample_ms = time.now_ms();
        Self {
            state: ClockState {
                remaining_ms: initial_ms,
                increment_ms,
                running: false,
                last_sample_ms,
            },
            time,
        }
    }

    /// Stop and load a fresh time control
    pub fn reset(&mut self, initial_ms: [u64; 2], increment_ms: [u64; 2]) {
        self.state = ClockState {
            remaining_ms: initial_ms,
            increment_ms,
            running: false,
            last_sample_ms: self.time.now_ms(),
        };
    }

    /// Begin ticking. Returns false (and does nothing) if already running.
    pub fn start(&mut self) -> bool {
        if self.state.running {
            return false;
        }
        self.state.running = true;
        self.state.last_sample_ms = self.time.now_ms();
        true
    }

    pub fn stop(&mut self) {
        self.state.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn remaining(&self, side: Color) -> u64 {
        self.state.remaining_ms[side.to_index()]
    }

    pub fn increment(&self, side: Color) -> u64 {
        self.state.increment_ms[side.to_index()]
    }

    pub fn state(&self) -> &ClockState {
        &self.state
    }

    /// Charge `elapsed_ms` to `active`. Reaching zero stops the clock and
    /// forfeits `active`.
    pub fn tick(&mut self, elapsed_ms: u64, active: Color) -> Option<TimeForfeit> {
        if !self.state.running {
            return None;
        }
        let remaining = &mut self.state.remaining_ms[active.to_index()];
        *remaining = remaining.saturating_sub(elapsed_ms);
        if *remaining == 0 {
            self.state.running = false;
            return Some(TimeForfeit { loser: active });
        }
        None
    }

    /// Sample the time source and tick by the delta since the last sample
    pub fn poll(&mut self, active: Color) -> Option<TimeForfeit> {
        if !self.state.running {
            return None;
        }
        let now = self.time.now_ms();
        let elapsed = now.saturating_sub(self.state.last_sample_ms);
        self.state.last_sample_ms = now;
        self.tick(elapsed, active)
    }

    /// Credit the side that just completed a move
    pub fn apply_increment(&mut self, mover: Color) {
        let index = mover.to_index();
        self.state.remaining_ms[index] += self.state.increment_ms[index];
    }
}
