//! System-mode state machine, feature-mask applier, and ~10 Hz timeout
//! supervisor (spec.md §4.3).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::clock::Clock;
use crate::config::mask::{Feature, FeatureMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SystemMode {
    Booting = 0,
    Idle = 1,
    Triage = 2,
    Connected = 3,
    Game = 4,
    Error = 5,
}

impl SystemMode {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Booting,
            1 => Self::Idle,
            2 => Self::Triage,
            3 => Self::Connected,
            4 => Self::Game,
            _ => Self::Error,
        }
    }

    /// The feature mask applied on entering this mode (spec.md §4.3 table).
    fn feature_mask(self) -> Feature {
        match self {
            Self::Booting => Feature::empty(),
            Self::Idle => Feature::LED | Feature::BLE,
            Self::Triage => Feature::LED | Feature::BLE | Feature::WIFI | Feature::TOUCH | Feature::HAPTIC | Feature::AUDIO,
            Self::Connected | Self::Game => {
                Feature::LED | Feature::BLE | Feature::RADIO_DATAGRAM | Feature::TOUCH | Feature::HAPTIC | Feature::AUDIO
            }
            Self::Error => Feature::LED | Feature::BLE,
        }
    }
}

fn transition_allowed(from: SystemMode, to: SystemMode) -> bool {
    use SystemMode::*;
    if to == Error {
        return true;
    }
    if to == Idle {
        return true;
    }
    matches!(
        (from, to),
        (Booting, Idle) | (Idle, Triage) | (Idle, Connected) | (Triage, Connected) | (Connected, Triage) | (Connected, Game) | (Game, Connected)
    )
}

/// Which timeout rule fired, for logging/diagnostics (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutRule {
    TriageIdle,
    ErrorIdle,
    GameConnected,
}

const TRIAGE_TIMEOUT_US: u64 = 30_000_000;
const ERROR_TIMEOUT_US: u64 = 10_000_000;
const GAME_TIMEOUT_US: u64 = 5 * 60 * 1_000_000;

/// Owns the mode word, its two timestamps, and the shared [`FeatureMask`]
/// it drives on every successful transition.
pub struct ModeManager<C: Clock> {
    clock: C,
    mode: AtomicU8,
    mode_entered_us: AtomicU64,
    last_activity_us: AtomicU64,
    mask: Arc<FeatureMask>,
    on_transition: Option<Box<dyn Fn(SystemMode, SystemMode) + Send + Sync>>,
}

impl<C: Clock> ModeManager<C> {
    pub fn new(clock: C, mask: Arc<FeatureMask>) -> Self {
        let now = clock.now_us();
        mask.set_mask(SystemMode::Booting.feature_mask());
        Self {
            clock,
            mode: AtomicU8::new(SystemMode::Booting as u8),
            mode_entered_us: AtomicU64::new(now),
            last_activity_us: AtomicU64::new(now),
            mask,
            on_transition: None,
        }
    }

    pub fn set_transition_callback(&mut self, callback: impl Fn(SystemMode, SystemMode) + Send + Sync + 'static) {
        self.on_transition = Some(Box::new(callback));
    }

    pub fn current(&self) -> SystemMode {
        SystemMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn mode_entered_us(&self) -> u64 {
        self.mode_entered_us.load(Ordering::Acquire)
    }

    pub fn last_activity_us(&self) -> u64 {
        self.last_activity_us.load(Ordering::Acquire)
    }

    pub fn reset_activity_timer(&self) {
        self.last_activity_us.store(self.clock.now_us(), Ordering::Release);
    }

    /// Attempt `from -> to` (`from` is whatever `current()` returns at call
    /// time). Returns `true` if the transition fired.
    pub fn transition(&self, to: SystemMode) -> bool {
        let from = self.current();
        if !transition_allowed(from, to) {
            return false;
        }
        self.mask.set_mask(to.feature_mask());
        self.mode.store(to as u8, Ordering::Release);
        let now = self.clock.now_us();
        self.mode_entered_us.store(now, Ordering::Release);
        self.last_activity_us.store(now, Ordering::Release);
        if let Some(callback) = &self.on_transition {
            callback(from, to);
        }
        tracing::info!(?from, ?to, "mode transition");
        true
    }

    /// ~10 Hz timeout supervisor (spec.md §4.3).
    pub fn tick(&self) -> Option<TimeoutRule> {
        let now = self.clock.now_us();
        match self.current() {
            SystemMode::Triage if now.saturating_sub(self.last_activity_us()) > TRIAGE_TIMEOUT_US => {
                self.transition(SystemMode::Idle);
                Some(TimeoutRule::TriageIdle)
            }
            SystemMode::Error if now.saturating_sub(self.mode_entered_us()) > ERROR_TIMEOUT_US => {
                self.transition(SystemMode::Idle);
                Some(TimeoutRule::ErrorIdle)
            }
            SystemMode::Game if now.saturating_sub(self.mode_entered_us()) > GAME_TIMEOUT_US => {
                self.transition(SystemMode::Connected);
                Some(TimeoutRule::GameConnected)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn manager() -> ModeManager<MockClock> {
        ModeManager::new(MockClock::new(0), Arc::new(FeatureMask::default()))
    }

    #[test]
    fn booting_to_idle_then_rule_table() {
        let mgr = manager();
        assert!(mgr.transition(SystemMode::Idle));
        assert!(mgr.transition(SystemMode::Triage));
        assert!(!mgr.transition(SystemMode::Game));
        assert_eq!(mgr.current(), SystemMode::Triage);
    }

    #[test]
    fn any_state_can_reach_error_or_idle() {
        let mgr = manager();
        mgr.transition(SystemMode::Idle);
        mgr.transition(SystemMode::Connected);
        assert!(mgr.transition(SystemMode::Error));
        assert!(mgr.transition(SystemMode::Idle));
    }

    #[test]
    fn invalid_transition_leaves_state_unchanged() {
        let mgr = manager();
        assert_eq!(mgr.current(), SystemMode::Booting);
        assert!(!mgr.transition(SystemMode::Connected));
        assert_eq!(mgr.current(), SystemMode::Booting);
    }

    #[test]
    fn mode_timeout_matches_scenario_5() {
        let clock = MockClock::new(0);
        let mask = Arc::new(FeatureMask::default());
        let mgr = ModeManager::new(clock, Arc::clone(&mask));
        mgr.transition(SystemMode::Idle);
        mgr.transition(SystemMode::Triage);

        for t in [0u64, 10_000_000, 20_000_000, 30_000_000] {
            mgr.tick_at(t);
            assert_eq!(mgr.current(), SystemMode::Triage, "unexpected transition at t={t}");
        }
        mgr.tick_at(31_000_000);
        assert_eq!(mgr.current(), SystemMode::Idle);
        assert_eq!(mask.snapshot(), SystemMode::Idle.feature_mask());
    }

    impl ModeManager<MockClock> {
        fn tick_at(&self, us: u64) -> Option<TimeoutRule> {
            self.clock.set(us);
            self.tick()
        }
    }

    #[test]
    fn game_timeout_returns_to_connected() {
        let clock = MockClock::new(0);
        let mgr = ModeManager::new(clock, Arc::new(FeatureMask::default()));
        mgr.transition(SystemMode::Idle);
        mgr.transition(SystemMode::Connected);
        mgr.transition(SystemMode::Game);
        mgr.tick_at(5 * 60 * 1_000_000 + 1);
        assert_eq!(mgr.current(), SystemMode::Connected);
    }
}
