use crate::model::Stroke;

/// Draw time allotted to each stroke on the timeline.
pub const DEFAULT_STROKE_DURATION_MS: f64 = 200.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// A stroke with its normalized position on the playback timeline.
#[derive(Clone, Debug)]
pub struct TimedStroke {
    pub stroke: Stroke,
    /// Milliseconds from timeline start, 0-based.
    pub start_ms: f64,
    pub duration_ms: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInfo {
    pub current_ms: f64,
    pub total_ms: f64,
    pub speed: f64,
}

type FrameCallback = Box<dyn FnMut(FrameInfo, &[TimedStroke])>;
type StateCallback = Box<dyn FnMut(PlaybackState)>;
type CompleteCallback = Box<dyn FnMut()>;

/// Replays a stroke layer's history. Host-driven: nothing advances except
/// through `tick`, so the host's frame loop owns all timing and playback is
/// cancelable between any two ticks.
pub struct PlaybackEngine {
    timeline: Vec<TimedStroke>,
    total_ms: f64,
    current_ms: f64,
    speed: f64,
    state: PlaybackState,
    destroyed: bool,
    on_frame: Option<FrameCallback>,
    on_state_change: Option<StateCallback>,
    on_complete: Option<CompleteCallback>,
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine {
    pub fn new() -> Self {
        Self {
            timeline: Vec::new(),
            total_ms: 0.0,
            current_ms: 0.0,
            speed: 1.0,
            state: PlaybackState::Stopped,
            destroyed: false,
            on_frame: None,
            on_state_change: None,
            on_complete: None,
        }
    }

    pub fn on_frame(&mut self, cb: impl FnMut(FrameInfo, &[TimedStroke]) + 'static) {
        self.on_frame = Some(Box::new(cb));
    }

    pub fn on_state_change(&mut self, cb: impl FnMut(PlaybackState) + 'static) {
        self.on_state_change = Some(Box::new(cb));
    }

    pub fn on_complete(&mut self, cb: impl FnMut() + 'static) {
        self.on_complete = Some(Box::new(cb));
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_ms(&self) -> f64 {
        self.current_ms
    }

    pub fn total_ms(&self) -> f64 {
        self.total_ms
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Rebuild the timeline. Timestamps are normalized so the earliest
    /// stroke starts at zero; each stroke then plays for a fixed duration.
    /// Playback resets to Stopped at time zero.
    pub fn set_strokes(&mut self, strokes: Vec<Stroke>) {
        if self.destroyed {
            return;
        }
        let mut strokes = strokes;
        strokes.sort_by_key(|s| s.timestamp_ms);
        let first_ts = strokes.first().map(|s| s.timestamp_ms).unwrap_or(0);
        self.timeline = strokes
            .into_iter()
            .map(|stroke| TimedStroke {
                start_ms: (stroke.timestamp_ms - first_ts) as f64,
                duration_ms: DEFAULT_STROKE_DURATION_MS,
                stroke,
            })
            .collect();
        self.total_ms = self
            .timeline
            .iter()
            .map(|t| t.start_ms + t.duration_ms)
            .fold(0.0, f64::max);
        self.current_ms = 0.0;
        self.change_state(PlaybackState::Stopped);
        self.emit_frame();
    }

    pub fn play(&mut self) {
        if self.destroyed || self.state == PlaybackState::Playing {
            return;
        }
        // Replaying from the end restarts from the beginning.
        if self.state == PlaybackState::Stopped && self.current_ms >= self.total_ms {
            self.current_ms = 0.0;
        }
        self.change_state(PlaybackState::Playing);
        self.emit_frame();
    }

    pub fn pause(&mut self) {
        if self.destroyed || self.state != PlaybackState::Playing {
            return;
        }
        self.change_state(PlaybackState::Paused);
    }

    pub fn stop(&mut self) {
        if self.destroyed {
            return;
        }
        self.current_ms = 0.0;
        self.change_state(PlaybackState::Stopped);
        self.emit_frame();
    }

    /// Jump to an absolute time, clamped to the timeline. Works in every
    /// state and emits a frame immediately.
    pub fn seek(&mut self, time_ms: f64) {
        if self.destroyed {
            return;
        }
        self.current_ms = if time_ms.is_finite() {
            time_ms.clamp(0.0, self.total_ms)
        } else {
            0.0
        };
        self.emit_frame();
    }

    /// Takes effect on the next tick; mid-playback changes are allowed.
    pub fn set_speed(&mut self, speed: f64) {
        if self.destroyed {
            return;
        }
        if speed.is_finite() && speed > 0.0 {
            self.speed = speed;
        }
    }

    /// Advance playback by a host frame delta.
    pub fn tick(&mut self, dt_ms: f64) {
        if self.destroyed || self.state != PlaybackState::Playing {
            return;
        }
        if dt_ms.is_finite() && dt_ms > 0.0 {
            self.current_ms += dt_ms * self.speed;
        }
        if self.current_ms >= self.total_ms {
            self.current_ms = self.total_ms;
            self.emit_frame();
            self.change_state(PlaybackState::Stopped);
            if let Some(cb) = &mut self.on_complete {
                cb();
            }
            return;
        }
        self.emit_frame();
    }

    /// Stop ticking for good. Fires one final Stopped state change, then
    /// every later call is a no-op.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.change_state(PlaybackState::Stopped);
        self.destroyed = true;
        self.on_frame = None;
        self.on_state_change = None;
        self.on_complete = None;
    }

    /// Strokes whose start time has been reached.
    pub fn visible(&self) -> &[TimedStroke] {
        let k = self
            .timeline
            .iter()
            .take_while(|t| t.start_ms <= self.current_ms)
            .count();
        &self.timeline[..k]
    }

    fn change_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        self.state = state;
        if let Some(cb) = &mut self.on_state_change {
            cb(state);
        }
    }

    fn emit_frame(&mut self) {
        let info = FrameInfo {
            current_ms: self.current_ms,
            total_ms: self.total_ms,
            speed: self.speed,
        };
        let k = self
            .timeline
            .iter()
            .take_while(|t| t.start_ms <= self.current_ms)
            .count();
        if let Some(cb) = &mut self.on_frame {
            cb(info, &self.timeline[..k]);
        }
    }
}
