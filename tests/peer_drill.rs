//! Two simulated pods run discovery through to a master-initiated drill
//! round, using only the public `PeerService`/`GameEngine` surface.

use std::sync::Arc;
use std::time::Duration;

use domes::clock::{Clock, SharedMockClock};
use domes::game::{ArmConfig, FeedbackSink, GameEngine, GameState, TouchSource};
use domes::peer::{DiscoveryOutcome, DrillTarget, PeerService, Role, SlaveHandoff};
use domes::transport::{Transport, mock_pair};

#[derive(Clone)]
struct SharedClock<'a>(&'a SharedMockClock);
impl<'a> Clock for SharedClock<'a> {
    fn now_us(&self) -> u64 {
        self.0.now_us()
    }
}

struct NullFeedback;
impl FeedbackSink for NullFeedback {
    fn flash_white(&mut self) {}
    fn flash_red(&mut self) {}
    fn play_beep(&mut self) {}
}

struct FixedTouch(u8);
impl TouchSource for FixedTouch {
    fn touched(&self) -> Option<u8> {
        Some(self.0)
    }
}

struct EngineTarget<'a, C: Clock>(&'a mut GameEngine<C>);
impl<'a, C: Clock> DrillTarget for EngineTarget<'a, C> {
    fn arm(&mut self, config: ArmConfig) {
        self.0.arm(config);
    }
    fn disarm(&mut self) {
        self.0.disarm();
    }
    fn set_color(&mut self, _r: u8, _g: u8, _b: u8) {}
    fn enter_game_mode(&mut self) {}
    fn enter_connected_mode(&mut self) {}
}

struct Noop;
impl DrillTarget for Noop {
    fn arm(&mut self, _config: ArmConfig) {}
    fn disarm(&mut self) {}
    fn set_color(&mut self, _r: u8, _g: u8, _b: u8) {}
    fn enter_game_mode(&mut self) {}
    fn enter_connected_mode(&mut self) {}
}

fn drain(side: &mut impl Transport, buf: &mut [u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let Ok(n) = side.receive(buf, Duration::ZERO) {
        if n == 0 {
            break;
        }
        out.push(buf[..n].to_vec());
    }
    out
}

#[test]
fn master_arms_slave_and_observes_the_hit() {
    let clock = SharedMockClock::new(0);
    let (transport_a, transport_b) = mock_pair();
    let mac_a = [0x02, 0x01, 0, 0, 0, 0];
    let mac_b = [0x02, 0x02, 0, 0, 0, 0];
    let mut master = PeerService::new(mac_a, transport_a, SharedClock(&clock));
    let mut slave = PeerService::new(mac_b, transport_b, SharedClock(&clock));
    let mut slave_engine = GameEngine::new(SharedClock(&clock), 2);
    let mut buf = [0u8; 64];

    master.tick().unwrap();
    slave.tick().unwrap();
    for packet in drain(slave.transport_mut(), &mut buf) {
        slave.handle_message(&packet, &mut Noop).unwrap();
    }
    for packet in drain(master.transport_mut(), &mut buf) {
        master.handle_message(&packet, &mut Noop).unwrap();
    }

    clock.advance(3_000_000);
    master.tick().unwrap();
    for packet in drain(slave.transport_mut(), &mut buf) {
        slave.handle_message(&packet, &mut Noop).unwrap();
    }
    for packet in drain(master.transport_mut(), &mut buf) {
        master.handle_message(&packet, &mut Noop).unwrap();
    }

    let outcome = master.tick().unwrap();
    assert_eq!(outcome, DiscoveryOutcome::RoleAssigned(Role::Master));
    assert_eq!(slave.role(), Role::Slave);

    master.start_round_on_peer(mac_b, (255, 255, 255), ArmConfig { timeout_ms: 2000, feedback_mode: 0x00 }).unwrap();
    for packet in drain(slave.transport_mut(), &mut buf) {
        slave.handle_message(&packet, &mut EngineTarget(&mut slave_engine)).unwrap();
    }
    assert_eq!(slave_engine.state(), GameState::Armed);

    clock.advance(120_000);
    let mut feedback = NullFeedback;
    slave_engine.tick(&FixedTouch(4), &mut feedback);
    assert_eq!(slave_engine.state(), GameState::Feedback);

    let handoff = Arc::new(SlaveHandoff::new());
    handoff.publish_hit(slave_engine.last_reaction_time_us(), 4);
    slave.set_handoff(handoff);
    slave.tick().unwrap();

    for packet in drain(master.transport_mut(), &mut buf) {
        master.handle_message(&packet, &mut Noop).unwrap();
    }

    match master.poll_round() {
        Some(domes::peer::RoundOutcome::Hit { reaction_time_us, pad_index }) => {
            assert_eq!(reaction_time_us, 120_000);
            assert_eq!(pad_index, 4);
        }
        other => panic!("expected a Hit round outcome, got {other:?}"),
    }
}

#[test]
fn a_lone_pod_reports_no_peer_after_the_discovery_timeout() {
    let (transport, _unused) = mock_pair();
    let clock = SharedMockClock::new(0);
    let mut svc = PeerService::new([1, 1, 1, 1, 1, 1], transport, SharedClock(&clock));
    clock.advance(10_000_001);
    assert_eq!(svc.tick().unwrap(), DiscoveryOutcome::NoPeer);
}
