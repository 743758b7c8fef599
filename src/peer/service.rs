//! Discovery, role election, and drill-loop driver (spec.md §4.5).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::clock::Clock;
use crate::game::ArmConfig;
use crate::transport::{Transport, TransportError};

use super::{
    ArmTouchBody, MsgHeader, Peer, SetColorBody, TouchEventBody, BROADCAST_MAC, HEADER_LEN, MAX_PEERS, TYPE_ARM_TOUCH,
    TYPE_BEACON, TYPE_JOIN_GAME, TYPE_PING, TYPE_PONG, TYPE_SET_COLOR, TYPE_STOP_ALL, TYPE_TIMEOUT_EVENT,
    TYPE_TOUCH_EVENT,
};

const BEACON_PERIOD_US: u64 = 2_000_000;
const PING_DELAY_US: u64 = 3_000_000;
const DISCOVERY_TIMEOUT_US: u64 = 10_000_000;
pub const INTER_ROUND_DELAY_US: u64 = 1_000_000;
const DRILL_WAIT_SLACK_US: u64 = 5_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unknown,
    Master,
    Slave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Pending,
    RoleAssigned(Role),
    NoPeer,
}

/// The local capabilities the peer service drives through a borrow —
/// never ownership (spec.md §9's cyclic-ownership-avoidance note).
pub trait DrillTarget {
    fn arm(&mut self, config: ArmConfig);
    fn disarm(&mut self);
    fn set_color(&mut self, r: u8, g: u8, b: u8);
    fn enter_game_mode(&mut self);
    fn enter_connected_mode(&mut self);
}

/// Cross-thread handoff from the game-tick callback (running the local
/// `GameEngine`) to the peer-service loop (spec.md §4.5, §9 i).
///
/// The callback writes the payload fields first, with `Relaxed` stores,
/// then publishes a `Release`-ordered pending flag; the loop reads the
/// flag with `Acquire` before consuming the payload, so it never observes
/// a torn read.
#[derive(Default)]
pub struct SlaveHandoff {
    is_hit: AtomicBool,
    reaction_time_us: AtomicU32,
    pad_index: AtomicU8,
    pending: AtomicBool,
}

impl SlaveHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_hit(&self, reaction_time_us: u32, pad_index: u8) {
        self.is_hit.store(true, Ordering::Relaxed);
        self.reaction_time_us.store(reaction_time_us, Ordering::Relaxed);
        self.pad_index.store(pad_index, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    pub fn publish_miss(&self) {
        self.is_hit.store(false, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    fn take(&self) -> Option<(bool, u32, u8)> {
        if !self.pending.load(Ordering::Acquire) {
            return None;
        }
        let result = (
            self.is_hit.load(Ordering::Relaxed),
            self.reaction_time_us.load(Ordering::Relaxed),
            self.pad_index.load(Ordering::Relaxed),
        );
        self.pending.store(false, Ordering::Relaxed);
        Some(result)
    }
}

/// The result of a completed master-side drill round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Hit { reaction_time_us: u32, pad_index: u8 },
    Timeout,
}

struct AwaitingRound {
    peer_mac: [u8; 6],
    deadline_us: u64,
}

pub struct PeerService<T: Transport, C: Clock> {
    own_mac: [u8; 6],
    transport: T,
    clock: C,
    peers: Vec<Peer>,
    role: Role,
    started_at_us: u64,
    last_beacon_us: u64,
    pinged_once: bool,
    outstanding_ping_mac: Option<[u8; 6]>,
    slave_master_mac: Option<[u8; 6]>,
    handoff: Option<Arc<SlaveHandoff>>,
    awaiting_round: Option<AwaitingRound>,
    round_outcome: Option<RoundOutcome>,
}

impl<T: Transport, C: Clock> PeerService<T, C> {
    pub fn new(own_mac: [u8; 6], transport: T, clock: C) -> Self {
        let now = clock.now_us();
        Self {
            own_mac,
            transport,
            clock,
            peers: Vec::with_capacity(MAX_PEERS),
            role: Role::Unknown,
            started_at_us: now,
            last_beacon_us: 0,
            pinged_once: false,
            outstanding_ping_mac: None,
            slave_master_mac: None,
            handoff: None,
            awaiting_round: None,
            round_outcome: None,
        }
    }

    pub fn set_handoff(&mut self, handoff: Arc<SlaveHandoff>) {
        self.handoff = Some(handoff);
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Direct access to the underlying transport, for callers that need to
    /// drive their own receive loop around `tick`/`handle_message`.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// `_dest_mac` is carried for documentation and future addressed
    /// transports; the physical layer here is a point-to-point pipe (the
    /// real radio transport's addressing is a collaborator concern, spec.md
    /// §1 out-of-scope list).
    fn send(&mut self, msg_type: u8, _dest_mac: [u8; 6], body: &[u8]) -> Result<(), TransportError> {
        let header = MsgHeader { msg_type, sender_mac: self.own_mac, timestamp_us: self.clock.now_us() as u32 };
        let mut packet = header.encode().to_vec();
        packet.extend_from_slice(body);
        self.transport.send(&packet)
    }

    fn upsert_peer(&mut self, mac: [u8; 6], now: u64) {
        if let Some(peer) = self.peers.iter_mut().find(|p| p.mac == mac) {
            peer.last_seen_us = now;
            peer.beacon_count += 1;
            return;
        }
        if self.peers.len() < MAX_PEERS {
            self.peers.push(Peer {
                mac,
                first_seen_us: now,
                last_seen_us: now,
                beacon_count: 1,
                last_rtt_us: None,
                ping_sent: false,
                ping_sent_at_us: 0,
            });
        }
    }

    /// Periodic driver: beacons, the first ping, discovery timeout, and
    /// flushing a pending slave handoff to the master. Call at a steady
    /// rate (the service loop's own period, not the game-tick rate).
    pub fn tick(&mut self) -> Result<DiscoveryOutcome, TransportError> {
        let now = self.clock.now_us();

        if self.role == Role::Unknown {
            if now.saturating_sub(self.last_beacon_us) >= BEACON_PERIOD_US {
                self.last_beacon_us = now;
                self.send(TYPE_BEACON, BROADCAST_MAC, &[])?;
            }

            if !self.pinged_once && now.saturating_sub(self.started_at_us) >= PING_DELAY_US {
                if let Some(first) = self.peers.first().copied() {
                    self.pinged_once = true;
                    self.outstanding_ping_mac = Some(first.mac);
                    if let Some(peer) = self.peers.iter_mut().find(|p| p.mac == first.mac) {
                        peer.ping_sent = true;
                        peer.ping_sent_at_us = now;
                    }
                    self.send(TYPE_PING, first.mac, &[])?;
                }
            }

            if let Some(peer) = self.peers.iter().find(|p| p.last_rtt_us.is_some()) {
                self.role = if self.own_mac < peer.mac { Role::Master } else { Role::Slave };
                tracing::info!(role = ?self.role, peer_mac = ?peer.mac, "role assigned");
                return Ok(DiscoveryOutcome::RoleAssigned(self.role));
            }

            if now.saturating_sub(self.started_at_us) >= DISCOVERY_TIMEOUT_US {
                return Ok(DiscoveryOutcome::NoPeer);
            }
            return Ok(DiscoveryOutcome::Pending);
        }

        if let (Some(handoff), Some(master_mac)) = (&self.handoff, self.slave_master_mac) {
            if let Some((is_hit, reaction_time_us, pad_index)) = handoff.take() {
                if is_hit {
                    let body = TouchEventBody { reaction_time_us, pad_index }.encode();
                    self.send(TYPE_TOUCH_EVENT, master_mac, &body)?;
                } else {
                    self.send(TYPE_TIMEOUT_EVENT, master_mac, &[])?;
                }
            }
        }

        if let Some(awaiting) = &self.awaiting_round {
            if self.round_outcome.is_none() && now >= awaiting.deadline_us {
                self.round_outcome = Some(RoundOutcome::Timeout);
            }
        }

        Ok(DiscoveryOutcome::RoleAssigned(self.role))
    }

    /// Dispatch one received peer-service frame. `target` is the borrowed
    /// local drill capability (LED + game engine + mode manager).
    pub fn handle_message(&mut self, bytes: &[u8], target: &mut dyn DrillTarget) -> Result<(), TransportError> {
        let header = match MsgHeader::decode(bytes) {
            Ok(h) => h,
            Err(_) => return Ok(()),
        };
        let body = &bytes[HEADER_LEN..];
        let now = self.clock.now_us();

        match header.msg_type {
            TYPE_BEACON => self.upsert_peer(header.sender_mac, now),
            TYPE_PING => {
                self.upsert_peer(header.sender_mac, now);
                self.send(TYPE_PONG, header.sender_mac, &[])?;
            }
            TYPE_PONG => {
                if self.outstanding_ping_mac == Some(header.sender_mac) {
                    if let Some(peer) = self.peers.iter_mut().find(|p| p.mac == header.sender_mac) {
                        peer.last_rtt_us = Some(now.saturating_sub(peer.ping_sent_at_us));
                    }
                }
            }
            TYPE_JOIN_GAME => target.enter_game_mode(),
            TYPE_ARM_TOUCH => {
                if let Ok(arm) = ArmTouchBody::decode(body) {
                    self.slave_master_mac = Some(header.sender_mac);
                    target.arm(ArmConfig { timeout_ms: arm.timeout_ms, feedback_mode: arm.feedback_mode });
                }
            }
            TYPE_SET_COLOR => {
                if let Ok(color) = SetColorBody::decode(body) {
                    target.set_color(color.r, color.g, color.b);
                }
            }
            TYPE_STOP_ALL => {
                target.disarm();
                target.enter_connected_mode();
            }
            TYPE_TOUCH_EVENT => {
                if self.awaiting_round.as_ref().is_some_and(|a| a.peer_mac == header.sender_mac) {
                    if let Ok(evt) = TouchEventBody::decode(body) {
                        self.round_outcome =
                            Some(RoundOutcome::Hit { reaction_time_us: evt.reaction_time_us, pad_index: evt.pad_index });
                    }
                }
            }
            TYPE_TIMEOUT_EVENT => {
                if self.awaiting_round.as_ref().is_some_and(|a| a.peer_mac == header.sender_mac) {
                    self.round_outcome = Some(RoundOutcome::Timeout);
                }
            }
            other => tracing::debug!(msg_type = other, "unknown peer-service message, dropped"),
        }
        Ok(())
    }

    /// Master side: arm a peer pod for one round (spec.md §4.5 phase 3a,
    /// steps 1-3). The 5s envelope is added on top of the arm timeout.
    pub fn start_round_on_peer(
        &mut self,
        peer_mac: [u8; 6],
        color: (u8, u8, u8),
        config: ArmConfig,
    ) -> Result<(), TransportError> {
        self.send(TYPE_SET_COLOR, peer_mac, &SetColorBody { r: color.0, g: color.1, b: color.2 }.encode())?;
        self.send(TYPE_ARM_TOUCH, peer_mac, &ArmTouchBody { timeout_ms: config.timeout_ms, feedback_mode: config.feedback_mode }.encode())?;
        let now = self.clock.now_us();
        self.awaiting_round =
            Some(AwaitingRound { peer_mac, deadline_us: now + config.timeout_ms as u64 * 1000 + DRILL_WAIT_SLACK_US });
        self.round_outcome = None;
        Ok(())
    }

    /// Non-blocking poll for the outcome of the round started with
    /// [`Self::start_round_on_peer`]. Returns `None` until a `TouchEvent`,
    /// `TimeoutEvent`, or the local deadline arrives.
    pub fn poll_round(&mut self) -> Option<RoundOutcome> {
        let outcome = self.round_outcome.take()?;
        self.awaiting_round = None;
        Some(outcome)
    }

    pub fn broadcast_join_game(&mut self) -> Result<(), TransportError> {
        self.send(TYPE_JOIN_GAME, BROADCAST_MAC, &[])
    }

    pub fn broadcast_stop_all(&mut self) -> Result<(), TransportError> {
        self.send(TYPE_STOP_ALL, BROADCAST_MAC, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SharedMockClock;
    use crate::transport::mock_pair;

    struct NoopTarget;
    impl DrillTarget for NoopTarget {
        fn arm(&mut self, _config: ArmConfig) {}
        fn disarm(&mut self) {}
        fn set_color(&mut self, _r: u8, _g: u8, _b: u8) {}
        fn enter_game_mode(&mut self) {}
        fn enter_connected_mode(&mut self) {}
    }

    #[test]
    fn role_election_matches_scenario_7() {
        let (transport_a, transport_b) = mock_pair();
        let clock = SharedMockClock::new(0);

        struct Shared<'a>(&'a SharedMockClock);
        impl<'a> Clock for Shared<'a> {
            fn now_us(&self) -> u64 {
                self.0.now_us()
            }
        }

        let mac_a = [0x02, 0x01, 0, 0, 0, 0];
        let mac_b = [0x02, 0x02, 0, 0, 0, 0];
        let mut svc_a = PeerService::new(mac_a, transport_a, Shared(&clock));
        let mut svc_b = PeerService::new(mac_b, transport_b, Shared(&clock));
        let mut target = NoopTarget;
        let zero = std::time::Duration::ZERO;
        let mut buf = [0u8; 64];

        // Both broadcast a Beacon; deliver A's to B and B's to A.
        svc_a.tick().unwrap();
        svc_b.tick().unwrap();
        let n = svc_b.transport.receive(&mut buf, zero).unwrap();
        svc_b.handle_message(&buf[..n], &mut target).unwrap();
        let n = svc_a.transport.receive(&mut buf, zero).unwrap();
        svc_a.handle_message(&buf[..n], &mut target).unwrap();

        // After the ping delay, A pings B; B auto-replies with Pong.
        clock.advance(PING_DELAY_US);
        svc_a.tick().unwrap();
        let n = svc_b.transport.receive(&mut buf, zero).unwrap();
        svc_b.handle_message(&buf[..n], &mut target).unwrap();
        let n = svc_a.transport.receive(&mut buf, zero).unwrap();
        svc_a.handle_message(&buf[..n], &mut target).unwrap();

        let outcome = svc_a.tick().unwrap();
        assert_eq!(outcome, DiscoveryOutcome::RoleAssigned(Role::Master));
        assert_eq!(svc_a.role(), Role::Master);
        assert_eq!(svc_b.role(), Role::Slave);
    }

    #[test]
    fn discovery_times_out_with_no_peer() {
        let (transport_a, _transport_b) = mock_pair();
        let clock = crate::clock::MockClock::new(DISCOVERY_TIMEOUT_US + 1);
        let mut svc = PeerService::new([1, 2, 3, 4, 5, 6], transport_a, clock);
        assert_eq!(svc.tick().unwrap(), DiscoveryOutcome::NoPeer);
    }

    #[test]
    fn slave_handoff_publishes_touch_event() {
        let (transport, mut peer_side) = mock_pair();
        let clock = crate::clock::MockClock::new(0);
        let mut svc = PeerService::new([9, 9, 9, 9, 9, 9], transport, clock);
        svc.role = Role::Slave;
        svc.slave_master_mac = Some([1, 1, 1, 1, 1, 1]);
        let handoff = Arc::new(SlaveHandoff::new());
        svc.set_handoff(handoff.clone());

        handoff.publish_hit(150_000, 2);
        svc.tick().unwrap();

        let mut buf = [0u8; 64];
        let n = peer_side.receive(&mut buf, std::time::Duration::ZERO).unwrap();
        let header = MsgHeader::decode(&buf[..n]).unwrap();
        assert_eq!(header.msg_type, TYPE_TOUCH_EVENT);
        let body = TouchEventBody::decode(&buf[HEADER_LEN..n]).unwrap();
        assert_eq!(body.reaction_time_us, 150_000);
        assert_eq!(body.pad_index, 2);
    }
}
