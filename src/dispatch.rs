//! Routes complete frames to the OTA / config / trace handlers by type
//! range, drives the actual state each handler owns, and writes its reply
//! back over the same transport (spec.md §4.6, §7).

use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, ConfigStatus, Feature, FeatureMask, FeatureRsp, GetFeatureReq, ListFeaturesRsp, SetFeatureReq};
use crate::diagnostics::Diagnostics;
use crate::frame::{Frame, FrameDecoder};
use crate::ota::{self, BeginMsg, DataMsg, OtaOutcome, OtaReceiver, PartitionWriter};
use crate::trace::{self, TraceBuffer, TraceExporter};
use crate::transport::{Transport, TransportError};

const IO_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// What the dispatch loop should do after one `poll()` call.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No frame was ready; keep looping.
    Idle,
    /// A frame was decoded and routed.
    FrameRouted,
    /// A frame was dropped (CRC/protocol error); diagnostics were counted
    /// and the decoder was reset.
    FrameDropped,
    /// The transport disconnected; the loop should exit cleanly.
    Disconnected,
}

/// The dispatch target for one complete frame, keyed by spec.md §4.6's
/// numeric type ranges. Unknown ranges are logged and dropped.
pub enum Routed {
    Ota(Frame),
    Config(Frame),
    Trace(Frame),
    Unknown(Frame),
}

fn route(frame: Frame) -> Routed {
    if ota::is_ota_message(frame.type_id) {
        Routed::Ota(frame)
    } else if trace::is_trace_message(frame.type_id) {
        Routed::Trace(frame)
    } else if config::is_config_message(frame.type_id) {
        Routed::Config(frame)
    } else {
        Routed::Unknown(frame)
    }
}

/// One dispatch loop bound to a single transport: decode, route, mutate the
/// owned subsystem state, reply, repeat.
pub struct Dispatcher<T: Transport, W: PartitionWriter> {
    transport: T,
    decoder: FrameDecoder,
    diagnostics: Diagnostics,
    read_buf: [u8; 256],
    ota: OtaReceiver<W>,
    mask: Arc<FeatureMask>,
    trace: TraceBuffer,
}

impl<T: Transport, W: PartitionWriter> Dispatcher<T, W> {
    pub fn new(transport: T, partitions: W) -> Self {
        Self::with_feature_mask(transport, partitions, Arc::new(FeatureMask::default()))
    }

    /// Like [`Self::new`], but shares `mask` with whatever else observes it
    /// (e.g. a [`crate::config::ModeManager`] driving the same pod), per
    /// spec.md §4.6's atomics-shared feature mask.
    pub fn with_feature_mask(transport: T, partitions: W, mask: Arc<FeatureMask>) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(),
            diagnostics: Diagnostics::new(),
            read_buf: [0u8; 256],
            ota: OtaReceiver::new(partitions),
            mask,
            trace: TraceBuffer::with_default_capacity(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn feature_mask(&self) -> &Arc<FeatureMask> {
        &self.mask
    }

    pub fn ota(&self) -> &OtaReceiver<W> {
        &self.ota
    }

    pub fn trace_buffer(&self) -> &TraceBuffer {
        &self.trace
    }

    /// One iteration: read whatever's available (up to `timeout`), feed the
    /// decoder byte-by-byte, and on a terminal state act per spec.md §7's
    /// propagation policy.
    pub fn poll(&mut self, timeout: Duration) -> DispatchOutcome {
        match self.transport.receive(&mut self.read_buf, timeout) {
            Ok(0) => DispatchOutcome::Idle,
            Ok(n) => self.feed_and_route(n),
            Err(TransportError::Timeout) | Err(TransportError::BufferEmpty) => DispatchOutcome::Idle,
            Err(TransportError::Disconnected) => {
                self.ota.handle_transport_loss();
                DispatchOutcome::Disconnected
            }
            Err(TransportError::IoError(msg)) => {
                tracing::warn!(error = %msg, "transport I/O error, backing off");
                self.diagnostics.record_io_error();
                std::thread::sleep(IO_ERROR_BACKOFF);
                DispatchOutcome::Idle
            }
            Err(other) => {
                tracing::warn!(error = %other, "unexpected transport error");
                DispatchOutcome::Idle
            }
        }
    }

    fn feed_and_route(&mut self, n: usize) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::Idle;
        for i in 0..n {
            let byte = self.read_buf[i];
            if self.decoder.is_complete() || self.decoder.is_error() {
                self.decoder.reset();
            }
            self.decoder.feed_byte(byte);

            if self.decoder.is_complete() {
                if let Some(frame) = self.decoder.take_frame() {
                    self.dispatch_frame(frame);
                    outcome = DispatchOutcome::FrameRouted;
                }
                self.decoder.reset();
            } else if self.decoder.is_error() {
                self.diagnostics.record_crc_error();
                tracing::debug!(error = ?self.decoder.last_error(), "frame dropped");
                self.decoder.reset();
                outcome = DispatchOutcome::FrameDropped;
            }
        }
        outcome
    }

    fn dispatch_frame(&mut self, frame: Frame) {
        match route(frame) {
            Routed::Ota(f) => self.dispatch_ota(f),
            Routed::Config(f) => self.dispatch_config(f),
            Routed::Trace(f) => self.dispatch_trace(f),
            Routed::Unknown(f) => {
                self.diagnostics.record_protocol_error();
                tracing::warn!(type_id = f.type_id, "unknown frame type, dropped");
            }
        }
    }

    fn send_frame(&mut self, type_id: u8, payload: Vec<u8>) {
        match Frame::new(type_id, payload) {
            Ok(frame) => {
                if let Err(error) = self.transport.send(&frame.encode()) {
                    tracing::warn!(%error, type_id, "failed to send reply frame");
                }
            }
            Err(error) => tracing::warn!(%error, type_id, "failed to build reply frame"),
        }
    }

    fn dispatch_ota(&mut self, frame: Frame) {
        let outcome = match frame.type_id {
            ota::TYPE_BEGIN => match BeginMsg::decode(&frame.payload) {
                Ok(msg) => self.ota.handle_begin(msg),
                Err(error) => {
                    tracing::warn!(%error, "malformed OTA Begin");
                    self.diagnostics.record_protocol_error();
                    return;
                }
            },
            ota::TYPE_DATA => match DataMsg::decode(&frame.payload) {
                Ok(msg) => self.ota.handle_data(msg),
                Err(error) => {
                    tracing::warn!(%error, "malformed OTA Data");
                    self.diagnostics.record_protocol_error();
                    return;
                }
            },
            ota::TYPE_END => self.ota.handle_end(),
            ota::TYPE_ABORT => self.ota.handle_abort(),
            other => {
                tracing::warn!(type_id = other, "unexpected OTA frame type from host");
                self.diagnostics.record_protocol_error();
                return;
            }
        };
        self.send_ota_outcome(outcome);
    }

    fn send_ota_outcome(&mut self, outcome: OtaOutcome) {
        match outcome {
            OtaOutcome::Ack(ack) => self.send_frame(ota::TYPE_ACK, ack.encode()),
            OtaOutcome::AbortReply(abort) => self.send_frame(ota::TYPE_ABORT, abort.encode()),
            OtaOutcome::RebootScheduled(ack) => {
                self.send_frame(ota::TYPE_ACK, ack.encode());
                self.ota.schedule_reboot();
            }
            OtaOutcome::None => {}
        }
    }

    fn dispatch_config(&mut self, frame: Frame) {
        match frame.type_id {
            config::TYPE_LIST_FEATURES_REQ => {
                let entries = self.mask.get_all().into_iter().map(|(feature, enabled)| (feature.index(), enabled)).collect();
                let rsp = ListFeaturesRsp { status: ConfigStatus::Ok, entries };
                self.send_frame(config::TYPE_LIST_FEATURES_RSP, rsp.encode());
            }
            config::TYPE_SET_FEATURE_REQ => match SetFeatureReq::decode(&frame.payload) {
                Ok(req) => self.apply_set_feature(req),
                Err(error) => {
                    tracing::warn!(%error, "malformed SetFeatureReq");
                    self.diagnostics.record_protocol_error();
                }
            },
            config::TYPE_GET_FEATURE_REQ => match GetFeatureReq::decode(&frame.payload) {
                Ok(req) => self.reply_get_feature(req),
                Err(error) => {
                    tracing::warn!(%error, "malformed GetFeatureReq");
                    self.diagnostics.record_protocol_error();
                }
            },
            other => {
                tracing::warn!(type_id = other, "unexpected config frame type from host");
                self.diagnostics.record_protocol_error();
            }
        }
    }

    fn apply_set_feature(&mut self, req: SetFeatureReq) {
        let rsp = match Feature::from_index(req.feature) {
            Some(feature) => {
                self.mask.set_enabled(feature, req.enabled);
                FeatureRsp { status: ConfigStatus::Ok, feature: req.feature, enabled: req.enabled }
            }
            None => FeatureRsp { status: ConfigStatus::InvalidFeature, feature: req.feature, enabled: false },
        };
        self.send_frame(config::TYPE_SET_FEATURE_RSP, rsp.encode());
    }

    fn reply_get_feature(&mut self, req: GetFeatureReq) {
        let rsp = match Feature::from_index(req.feature) {
            Some(feature) => FeatureRsp { status: ConfigStatus::Ok, feature: req.feature, enabled: self.mask.is_enabled(feature) },
            None => FeatureRsp { status: ConfigStatus::InvalidFeature, feature: req.feature, enabled: false },
        };
        self.send_frame(config::TYPE_GET_FEATURE_RSP, rsp.encode());
    }

    fn dispatch_trace(&mut self, frame: Frame) {
        match frame.type_id {
            trace::TYPE_START => {
                self.trace.set_enabled(true);
                self.send_frame(trace::TYPE_ACK, vec![]);
            }
            trace::TYPE_STOP => {
                self.trace.set_enabled(false);
                self.send_frame(trace::TYPE_ACK, vec![]);
            }
            trace::TYPE_CLEAR => {
                self.trace.drain_all();
                self.trace.clear_dropped_count();
                self.send_frame(trace::TYPE_ACK, vec![]);
            }
            trace::TYPE_DUMP => {
                let (metadata, data_frames, end) = TraceExporter::export(&self.trace);
                self.send_frame(trace::TYPE_STATUS, metadata.encode());
                for chunk in data_frames {
                    self.send_frame(trace::TYPE_DATA, chunk.encode());
                }
                self.send_frame(trace::TYPE_END, end.encode());
            }
            other => {
                tracing::warn!(type_id = other, "unexpected trace frame type from host");
                self.diagnostics.record_protocol_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::ota::{PartitionId, PartitionWriterError, WriterHandle};
    use crate::transport::mock_pair;

    /// A partition writer that refuses everything; enough for tests that
    /// only care about frame routing, not OTA state changes.
    struct NoPartitions;
    impl PartitionWriter for NoPartitions {
        fn begin_writer(&mut self, _partition: PartitionId, _size: u32) -> Result<WriterHandle, PartitionWriterError> {
            Err(PartitionWriterError::NoAlternatePartition)
        }
        fn write(&mut self, _handle: &WriterHandle, _bytes: &[u8]) -> Result<(), PartitionWriterError> {
            Ok(())
        }
        fn abort(&mut self, _handle: WriterHandle) {}
        fn commit(&mut self, _handle: WriterHandle) -> Result<[u8; 32], PartitionWriterError> {
            Err(PartitionWriterError::FlashError)
        }
        fn set_boot(&mut self, _partition: PartitionId) -> Result<(), PartitionWriterError> {
            Ok(())
        }
        fn get_alternate(&self) -> Option<PartitionId> {
            None
        }
        fn reboot(&mut self) {}
    }

    #[test]
    fn routes_by_type_range() {
        assert!(matches!(route(Frame::new(ota::TYPE_BEGIN, vec![]).unwrap()), Routed::Ota(_)));
        assert!(matches!(route(Frame::new(trace::TYPE_DUMP, vec![]).unwrap()), Routed::Trace(_)));
        assert!(matches!(route(Frame::new(config::TYPE_GET_FEATURE_REQ, vec![]).unwrap()), Routed::Config(_)));
        assert!(matches!(route(Frame::new(0x99, vec![]).unwrap()), Routed::Unknown(_)));
    }

    #[test]
    fn unknown_type_increments_protocol_errors() {
        let (mut a, b) = mock_pair();
        let frame = Frame::new(0x99, vec![1, 2, 3]).unwrap();
        a.send(&frame.encode()).unwrap();
        let mut dispatcher = Dispatcher::new(b, NoPartitions);
        let outcome = dispatcher.poll(Duration::ZERO);
        assert_eq!(outcome, DispatchOutcome::FrameRouted);
        assert_eq!(dispatcher.diagnostics().protocol_errors(), 1);
    }

    #[test]
    fn corrupted_frame_increments_crc_errors_and_resets() {
        let (mut a, b) = mock_pair();
        let frame = Frame::new(ota::TYPE_BEGIN, vec![1, 2, 3]).unwrap();
        let mut wire = frame.encode();
        *wire.last_mut().unwrap() ^= 0xFF;
        a.send(&wire).unwrap();
        let mut dispatcher = Dispatcher::new(b, NoPartitions);
        let outcome = dispatcher.poll(Duration::ZERO);
        assert_eq!(outcome, DispatchOutcome::FrameDropped);
        assert_eq!(dispatcher.diagnostics().crc_errors(), 1);
    }

    #[test]
    fn disconnect_is_reported() {
        let (mut a, b) = mock_pair();
        a.disconnect();
        let mut dispatcher = Dispatcher::new(b, NoPartitions);
        assert_eq!(dispatcher.poll(Duration::ZERO), DispatchOutcome::Disconnected);
    }

    #[test]
    fn set_feature_request_flips_the_mask_and_replies() {
        let (mut host, pod) = mock_pair();
        let req = SetFeatureReq { feature: Feature::TOUCH.index(), enabled: true };
        host.send(&Frame::new(config::TYPE_SET_FEATURE_REQ, req.encode()).unwrap().encode()).unwrap();

        let mut dispatcher = Dispatcher::new(pod, NoPartitions);
        assert_eq!(dispatcher.poll(Duration::ZERO), DispatchOutcome::FrameRouted);
        assert!(dispatcher.feature_mask().is_enabled(Feature::TOUCH));

        let mut buf = [0u8; 64];
        let n = host.receive(&mut buf, Duration::ZERO).unwrap();
        let reply = crate::frame::decode_one(&buf[..n]).unwrap();
        assert_eq!(reply.type_id, config::TYPE_SET_FEATURE_RSP);
        assert_eq!(reply.payload, vec![ConfigStatus::Ok as u8, Feature::TOUCH.index(), 1]);
    }

    #[test]
    fn ota_begin_over_the_wire_drives_the_real_session_and_acks() {
        let (mut host, pod) = mock_pair();
        let begin = crate::ota::BeginMsg { size: 100, sha256: [0; 32], version: "v1".into() };
        host.send(&Frame::new(ota::TYPE_BEGIN, begin.encode()).unwrap().encode()).unwrap();

        struct AcceptingPartitions;
        impl PartitionWriter for AcceptingPartitions {
            fn begin_writer(&mut self, _partition: PartitionId, _size: u32) -> Result<WriterHandle, PartitionWriterError> {
                Ok(WriterHandle(0))
            }
            fn write(&mut self, _handle: &WriterHandle, _bytes: &[u8]) -> Result<(), PartitionWriterError> {
                Ok(())
            }
            fn abort(&mut self, _handle: WriterHandle) {}
            fn commit(&mut self, _handle: WriterHandle) -> Result<[u8; 32], PartitionWriterError> {
                Ok([0; 32])
            }
            fn set_boot(&mut self, _partition: PartitionId) -> Result<(), PartitionWriterError> {
                Ok(())
            }
            fn get_alternate(&self) -> Option<PartitionId> {
                Some(PartitionId(1))
            }
            fn reboot(&mut self) {}
        }

        let mut dispatcher = Dispatcher::new(pod, AcceptingPartitions);
        assert_eq!(dispatcher.poll(Duration::ZERO), DispatchOutcome::FrameRouted);
        assert!(dispatcher.ota().session().is_some());

        let mut buf = [0u8; 64];
        let n = host.receive(&mut buf, Duration::ZERO).unwrap();
        let reply = crate::frame::decode_one(&buf[..n]).unwrap();
        assert_eq!(reply.type_id, ota::TYPE_ACK);
    }

    #[test]
    fn trace_dump_over_the_wire_sends_metadata_data_and_end() {
        let (mut host, pod) = mock_pair();
        host.send(&Frame::new(trace::TYPE_DUMP, vec![]).unwrap().encode()).unwrap();

        let mut dispatcher = Dispatcher::new(pod, NoPartitions);
        dispatcher.trace_buffer().set_enabled(true);
        dispatcher.trace_buffer().record(crate::trace::TraceEvent {
            timestamp_us: 0,
            task_id: 0,
            event_type: crate::trace::EventType::Instant,
            category: crate::trace::Category::Kernel,
            arg1: 7,
            arg2: 0,
        });
        assert_eq!(dispatcher.poll(Duration::ZERO), DispatchOutcome::FrameRouted);

        let mut buf = [0u8; 256];
        let mut types = Vec::new();
        while let Ok(n) = host.receive(&mut buf, Duration::ZERO) {
            if n == 0 {
                break;
            }
            types.push(crate::frame::decode_one(&buf[..n]).unwrap().type_id);
        }
        assert_eq!(types, vec![trace::TYPE_STATUS, trace::TYPE_DATA, trace::TYPE_END]);
    }
}
