//! Record a burst of trace events and export them, checking the chunking
//! and checksum contract a host-side dump tool would depend on.

use domes::trace::{Category, EventType, TraceBuffer, TraceEvent, TraceExporter};

#[test]
fn export_after_heavy_recording_accounts_for_every_byte() {
    let buffer = TraceBuffer::with_default_capacity();
    buffer.set_enabled(true);
    buffer.register_task(1, "game");
    buffer.register_task(2, "peer");

    for i in 0..37u32 {
        buffer.record(TraceEvent {
            timestamp_us: i * 1000,
            task_id: (i % 2 + 1) as u16,
            event_type: EventType::Instant,
            category: Category::Game,
            arg1: i,
            arg2: 0,
        });
    }

    let (metadata, data_frames, end) = TraceExporter::export(&buffer);
    assert_eq!(metadata.event_count, 37);
    assert_eq!(metadata.task_entries.len(), 2);
    assert_eq!(end.total_events, 37);
    assert_eq!(data_frames.iter().map(|f| f.events.len()).sum::<usize>(), 37);
    assert!(data_frames.iter().all(|f| f.events.len() <= domes::trace::MAX_EVENTS_PER_DATA_FRAME));

    let recomputed: u32 = data_frames
        .iter()
        .flat_map(|f| f.events.iter())
        .flat_map(|e| e.encode())
        .fold(0u32, |acc, b| acc.wrapping_add(b as u32));
    assert_eq!(end.checksum, recomputed);

    assert!(buffer.is_empty());
    assert!(buffer.is_enabled(), "recording should resume after export");
}

#[test]
fn a_full_ring_still_exports_what_it_kept_and_reports_the_drop_count() {
    let buffer = TraceBuffer::init(4);
    buffer.set_enabled(true);
    for i in 0..10u32 {
        buffer.record(TraceEvent { timestamp_us: i, task_id: 0, event_type: EventType::Counter, category: Category::Kernel, arg1: i, arg2: 0 });
    }
    assert_eq!(buffer.dropped_count(), 6);

    let (metadata, _data, end) = TraceExporter::export(&buffer);
    assert_eq!(metadata.event_count, 4);
    assert_eq!(metadata.dropped_count, 6);
    assert_eq!(end.total_events, 4);
    assert_eq!(buffer.dropped_count(), 0, "export clears the dropped counter");
}
