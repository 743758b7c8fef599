//! A pod's mode FSM and its game engine driven together: entering `Game`
//! unlocks touch/haptic/audio features, a drill round runs, and the 5
//! minute idle-in-Game timeout falls back to `Connected`.

use std::sync::Arc;

use domes::clock::{Clock, MockClock, SharedMockClock};
use domes::config::{Feature, FeatureMask, ModeManager, SystemMode};
use domes::game::{ArmConfig, FeedbackSink, GameEngine, GameState, TouchSource};

#[derive(Clone)]
struct SharedClock(Arc<SharedMockClock>);
impl Clock for SharedClock {
    fn now_us(&self) -> u64 {
        self.0.now_us()
    }
}

struct NoTouch;
impl TouchSource for NoTouch {
    fn touched(&self) -> Option<u8> {
        None
    }
}

struct OneShotTouch(u8);
impl TouchSource for OneShotTouch {
    fn touched(&self) -> Option<u8> {
        Some(self.0)
    }
}

#[derive(Default)]
struct NullFeedback;
impl FeedbackSink for NullFeedback {
    fn flash_white(&mut self) {}
    fn flash_red(&mut self) {}
    fn play_beep(&mut self) {}
}

#[test]
fn entering_game_mode_enables_touch_before_a_round_can_be_armed() {
    let mask = Arc::new(FeatureMask::default());
    let clock = MockClock::new(0);
    let mgr = ModeManager::new(clock, Arc::clone(&mask));

    assert!(!mask.is_enabled(Feature::TOUCH));
    mgr.transition(SystemMode::Idle);
    mgr.transition(SystemMode::Connected);
    assert!(mgr.transition(SystemMode::Game));
    assert!(mask.is_enabled(Feature::TOUCH));
    assert!(mask.is_enabled(Feature::HAPTIC));

    let mut engine = GameEngine::new(MockClock::new(0), 5);
    engine.arm(ArmConfig { timeout_ms: 1000, feedback_mode: 0x03 });
    let mut feedback = NullFeedback::default();
    engine.tick(&OneShotTouch(1), &mut feedback);
    assert_eq!(engine.state(), GameState::Feedback);
}

#[test]
fn idle_drill_falls_back_to_connected_after_five_minutes() {
    let mask = Arc::new(FeatureMask::default());
    let clock = SharedClock(Arc::new(SharedMockClock::new(0)));
    let mgr = ModeManager::new(clock.clone(), Arc::clone(&mask));
    mgr.transition(SystemMode::Idle);
    mgr.transition(SystemMode::Connected);
    mgr.transition(SystemMode::Game);

    let mut engine = GameEngine::new(clock.clone(), 5);
    engine.arm(ArmConfig { timeout_ms: 60_000, feedback_mode: 0x00 });
    let mut feedback = NullFeedback::default();
    engine.tick(&NoTouch, &mut feedback);
    assert_eq!(engine.state(), GameState::Armed, "no touch or timeout yet, still waiting");

    clock.0.advance(5 * 60 * 1_000_000 + 1);
    assert!(mgr.tick().is_some());
    assert_eq!(mgr.current(), SystemMode::Connected);
}
