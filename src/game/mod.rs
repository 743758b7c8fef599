//! Per-pod game engine: ready/armed/triggered/feedback FSM (spec.md §4.4).

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Ready,
    Armed,
    Triggered,
    Feedback,
}

/// Feedback-mode bitmask: `0x01 = LED`, `0x02 = audio`.
pub const FEEDBACK_LED: u8 = 0x01;
pub const FEEDBACK_AUDIO: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmConfig {
    pub timeout_ms: u32,
    pub feedback_mode: u8,
}

const FEEDBACK_DURATION_US: u64 = 200_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEventKind {
    Hit,
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameEvent {
    pub kind: GameEventKind,
    pub pod_id: u8,
    pub reaction_time_us: u32,
    pub pad_index: u8,
}

/// Feedback actions the engine fires on entering `Feedback` (spec.md §4.4).
/// Supplied by the application; never invoked by the engine during
/// construction.
pub trait FeedbackSink {
    fn flash_white(&mut self);
    fn flash_red(&mut self);
    fn play_beep(&mut self);
}

/// Touch-pad source the engine polls each tick (spec.md §4.4: "polls touch
/// pads"). `touched()` returns the first touched pad index, if any.
pub trait TouchSource {
    fn touched(&self) -> Option<u8>;
}

pub struct GameEngine<C: Clock> {
    clock: C,
    pod_id: u8,
    state: GameState,
    config: Option<ArmConfig>,
    armed_at_us: u64,
    feedback_started_at_us: u64,
    last_reaction_time_us: u32,
    triggered_pad_index: u8,
    triggered_reaction_time_us: u32,
    event_callback: Option<Box<dyn FnMut(GameEvent) + Send>>,
}

impl<C: Clock> GameEngine<C> {
    pub fn new(clock: C, pod_id: u8) -> Self {
        Self {
            clock,
            pod_id,
            state: GameState::Ready,
            config: None,
            armed_at_us: 0,
            feedback_started_at_us: 0,
            last_reaction_time_us: 0,
            triggered_pad_index: 0,
            triggered_reaction_time_us: 0,
            event_callback: None,
        }
    }

    pub fn set_event_callback(&mut self, callback: impl FnMut(GameEvent) + Send + 'static) {
        self.event_callback = Some(Box::new(callback));
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn last_reaction_time_us(&self) -> u32 {
        self.last_reaction_time_us
    }

    pub fn arm(&mut self, config: ArmConfig) {
        self.armed_at_us = self.clock.now_us();
        self.config = Some(config);
        self.state = GameState::Armed;
    }

    pub fn disarm(&mut self) {
        self.state = GameState::Ready;
    }

    /// Advance the FSM one tick (spec.md calls this at ~10 ms intervals).
    /// `touch` is polled for the current-touch state; `feedback` receives
    /// the flash/beep calls on a feedback-entry tick.
    pub fn tick(&mut self, touch: &dyn TouchSource, feedback: &mut dyn FeedbackSink) {
        match self.state {
            GameState::Ready => {}
            GameState::Armed => self.tick_armed(touch, feedback),
            GameState::Triggered => self.enter_feedback(GameEventKind::Hit, feedback),
            GameState::Feedback => self.tick_feedback(),
        }
    }

    fn tick_armed(&mut self, touch: &dyn TouchSource, feedback: &mut dyn FeedbackSink) {
        let config = self.config.expect("Armed state always carries a config");
        let now = self.clock.now_us();
        if let Some(pad_index) = touch.touched() {
            self.triggered_pad_index = pad_index;
            self.triggered_reaction_time_us = (now - self.armed_at_us) as u32;
            self.state = GameState::Triggered;
            self.enter_feedback(GameEventKind::Hit, feedback);
            return;
        }
        if now.saturating_sub(self.armed_at_us) >= config.timeout_ms as u64 * 1000 {
            self.triggered_pad_index = 0;
            self.triggered_reaction_time_us = 0;
            self.enter_feedback(GameEventKind::Miss, feedback);
        }
    }

    fn enter_feedback(&mut self, kind: GameEventKind, feedback: &mut dyn FeedbackSink) {
        let config = self.config.expect("Feedback entry always follows an arm()");
        self.feedback_started_at_us = self.clock.now_us();
        self.state = GameState::Feedback;
        self.last_reaction_time_us = self.triggered_reaction_time_us;

        match kind {
            GameEventKind::Hit => {
                if config.feedback_mode & FEEDBACK_LED != 0 {
                    feedback.flash_white();
                }
                if config.feedback_mode & FEEDBACK_AUDIO != 0 {
                    feedback.play_beep();
                }
            }
            GameEventKind::Miss => {
                if config.feedback_mode & FEEDBACK_LED != 0 {
                    feedback.flash_red();
                }
            }
        }

        let event = GameEvent {
            kind,
            pod_id: self.pod_id,
            reaction_time_us: self.triggered_reaction_time_us,
            pad_index: self.triggered_pad_index,
        };
        if let Some(callback) = &mut self.event_callback {
            callback(event);
        }
        tracing::debug!(?kind, pod_id = self.pod_id, "game event");
    }

    fn tick_feedback(&mut self) {
        let now = self.clock.now_us();
        if now.saturating_sub(self.feedback_started_at_us) >= FEEDBACK_DURATION_US {
            self.state = GameState::Ready;
        }
    }
}
