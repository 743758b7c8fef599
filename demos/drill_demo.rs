//! End-to-end walkthrough: two simulated pods discover each other, elect
//! roles, and run one drill round each direction (self-arm and peer-arm).
//!
//! Usage: cargo run --bin domes-drill-demo
//!
//! Everything here runs on an in-memory transport pair and a shared mock
//! clock, so the whole drill is deterministic and needs no real hardware.

use std::sync::Arc;
use std::time::Duration;

use domes::clock::{Clock, SharedMockClock};
use domes::collaborators::Color;
use domes::game::{ArmConfig, FeedbackSink, GameEngine, GameEvent, GameState, TouchSource};
use domes::peer::{DiscoveryOutcome, DrillTarget, PeerService, Role, SlaveHandoff};
use domes::transport::mock_pair;

struct SharedClockHandle<'a>(&'a SharedMockClock);
impl<'a> Clock for SharedClockHandle<'a> {
    fn now_us(&self) -> u64 {
        self.0.now_us()
    }
}

struct ConsoleFeedback {
    label: &'static str,
}
impl FeedbackSink for ConsoleFeedback {
    fn flash_white(&mut self) {
        println!("  [{}] LED flash white", self.label);
    }
    fn flash_red(&mut self) {
        println!("  [{}] LED flash red", self.label);
    }
    fn play_beep(&mut self) {
        println!("  [{}] audio: beep", self.label);
    }
}

/// Touch source driven by the demo's narration, simulating a finger
/// landing on a pad once the shared clock reaches a scripted instant.
struct ScriptedTouch<'a> {
    touch_at_us: u64,
    clock: &'a SharedMockClock,
    pad: u8,
}
impl<'a> TouchSource for ScriptedTouch<'a> {
    fn touched(&self) -> Option<u8> {
        if self.clock.now_us() >= self.touch_at_us { Some(self.pad) } else { None }
    }
}

/// Bridges the peer service's slave-side calls into this pod's local
/// engine and LED; only ever borrowed per call, never owned by the peer
/// service (spec.md §9's cyclic-ownership-avoidance note).
struct PodController<'a, C: Clock> {
    label: &'static str,
    engine: &'a mut GameEngine<C>,
}
impl<'a, C: Clock> DrillTarget for PodController<'a, C> {
    fn arm(&mut self, config: ArmConfig) {
        println!("  [{}] armed: timeout={}ms mode=0x{:02X}", self.label, config.timeout_ms, config.feedback_mode);
        self.engine.arm(config);
    }
    fn disarm(&mut self) {
        self.engine.disarm();
    }
    fn set_color(&mut self, r: u8, g: u8, b: u8) {
        println!("  [{}] LED set_all {:?}", self.label, Color::rgb(r, g, b));
    }
    fn enter_game_mode(&mut self) {
        println!("  [{}] mode -> Game", self.label);
    }
    fn enter_connected_mode(&mut self) {
        println!("  [{}] mode -> Connected", self.label);
    }
}

struct NoopTarget;
impl DrillTarget for NoopTarget {
    fn arm(&mut self, _config: ArmConfig) {}
    fn disarm(&mut self) {}
    fn set_color(&mut self, _r: u8, _g: u8, _b: u8) {}
    fn enter_game_mode(&mut self) {}
    fn enter_connected_mode(&mut self) {}
}

/// Drains whatever each side's transport has queued and routes it through
/// `handle_message`, using a fresh, short-lived [`DrillTarget`] borrow per
/// call rather than holding one for the whole run.
fn relay<T: domes::transport::Transport, C: Clock>(
    svc_a: &mut PeerService<T, C>,
    svc_b: &mut PeerService<T, C>,
    engine_b: &mut GameEngine<C>,
    buf: &mut [u8],
) {
    let zero = Duration::ZERO;
    while let Ok(n) = svc_b.transport_mut().receive(buf, zero) {
        if n == 0 {
            break;
        }
        let mut target_b = PodController { label: "pod-B", engine: engine_b };
        svc_b.handle_message(&buf[..n], &mut target_b).ok();
    }
    while let Ok(n) = svc_a.transport_mut().receive(buf, zero) {
        if n == 0 {
            break;
        }
        svc_a.handle_message(&buf[..n], &mut NoopTarget).ok();
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    println!("=== DOMES drill demo ===");
    let clock = SharedMockClock::new(0);

    println!("\n-- Phase 1: discovery --");
    let (transport_a, transport_b) = mock_pair();
    let mac_a = [0x02, 0x01, 0, 0, 0, 0];
    let mac_b = [0x02, 0x02, 0, 0, 0, 0];
    let mut svc_a = PeerService::new(mac_a, transport_a, SharedClockHandle(&clock));
    let mut svc_b = PeerService::new(mac_b, transport_b, SharedClockHandle(&clock));

    let mut engine_a = GameEngine::new(SharedClockHandle(&clock), 1);
    let mut engine_b = GameEngine::new(SharedClockHandle(&clock), 2);
    engine_a.set_event_callback(|event: GameEvent| {
        println!("  [pod-A] event: {:?} reaction={}us pad={}", event.kind, event.reaction_time_us, event.pad_index);
    });
    engine_b.set_event_callback(|event: GameEvent| {
        println!("  [pod-B] event: {:?} reaction={}us pad={}", event.kind, event.reaction_time_us, event.pad_index);
    });

    let mut buf = [0u8; 64];

    svc_a.tick().unwrap();
    svc_b.tick().unwrap();
    relay(&mut svc_a, &mut svc_b, &mut engine_b, &mut buf);

    clock.advance(3_000_000);
    svc_a.tick().unwrap();
    relay(&mut svc_a, &mut svc_b, &mut engine_b, &mut buf);

    let outcome = svc_a.tick().unwrap();
    println!("pod-A discovery outcome: {outcome:?}");
    match outcome {
        DiscoveryOutcome::RoleAssigned(Role::Master) => println!("pod-A is MASTER, pod-B is SLAVE"),
        other => {
            println!("unexpected discovery outcome: {other:?}, aborting demo");
            return;
        }
    }
    svc_b.tick().unwrap();
    println!("pod-B role: {:?}", svc_b.role());

    println!("\n-- Phase 2: self-arm round on pod-A --");
    let mut feedback_a = ConsoleFeedback { label: "pod-A" };
    engine_a.arm(ArmConfig { timeout_ms: 3000, feedback_mode: 0x03 });
    println!("  [pod-A] armed: timeout=3000ms mode=0x03");
    clock.advance(150_000);
    let touch_a = ScriptedTouch { touch_at_us: clock.now_us(), clock: &clock, pad: 2 };
    engine_a.tick(&touch_a, &mut feedback_a);
    println!("pod-A state after round: {:?}", engine_a.state());

    println!("\n-- Phase 3: peer round, pod-A arms pod-B --");
    svc_a.start_round_on_peer(mac_b, (0, 255, 0), ArmConfig { timeout_ms: 2000, feedback_mode: 0x01 }).unwrap();
    relay(&mut svc_a, &mut svc_b, &mut engine_b, &mut buf);

    let mut feedback_b = ConsoleFeedback { label: "pod-B" };
    clock.advance(80_000);
    let touch_b = ScriptedTouch { touch_at_us: clock.now_us(), clock: &clock, pad: 0 };
    engine_b.tick(&touch_b, &mut feedback_b);

    if engine_b.state() == GameState::Feedback {
        let handoff = Arc::new(SlaveHandoff::new());
        handoff.publish_hit(engine_b.last_reaction_time_us(), 0);
        svc_b.set_handoff(handoff);
    }
    svc_b.tick().unwrap();
    relay(&mut svc_a, &mut svc_b, &mut engine_b, &mut buf);

    if let Some(round) = svc_a.poll_round() {
        println!("pod-A observed round outcome: {round:?}");
    }

    println!("\n=== drill demo complete ===");
}
