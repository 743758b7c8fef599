//! Chunked trace-dump export protocol (spec.md §4.7).

use super::buffer::TraceBuffer;
use super::event::{EVENT_LEN, TASK_NAME_LEN, TraceEvent};

pub const MAX_EVENTS_PER_DATA_FRAME: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskEntry {
    pub task_id: u16,
    pub name: [u8; TASK_NAME_LEN],
}

/// Frame 1 of the export sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFrame {
    pub event_count: u32,
    pub dropped_count: u32,
    pub start_ts: u32,
    pub end_ts: u32,
    pub task_entries: Vec<TaskEntry>,
}

impl MetadataFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(14 + self.task_entries.len() * 18);
        buf.extend_from_slice(&self.event_count.to_le_bytes());
        buf.extend_from_slice(&self.dropped_count.to_le_bytes());
        buf.extend_from_slice(&self.start_ts.to_le_bytes());
        buf.extend_from_slice(&self.end_ts.to_le_bytes());
        buf.push(self.task_entries.len() as u8);
        for entry in &self.task_entries {
            buf.extend_from_slice(&entry.task_id.to_le_bytes());
            buf.extend_from_slice(&entry.name);
        }
        buf
    }
}

/// One `Data` frame: `offset:u32 | count:u16 | events[count]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub offset: u32,
    pub events: Vec<TraceEvent>,
}

impl DataFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6 + self.events.len() * EVENT_LEN);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&(self.events.len() as u16).to_le_bytes());
        for event in &self.events {
            buf.extend_from_slice(&event.encode());
        }
        buf
    }
}

/// `End` frame: `totalEvents:u32 | checksum:u32` — checksum is the
/// unsigned byte-sum of all event bytes, wrapping at 2^32 (spec.md §9:
/// deliberately not a CRC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndFrame {
    pub total_events: u32,
    pub checksum: u32,
}

impl EndFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.total_events.to_le_bytes().to_vec();
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }
}

/// Drives the pause → drain → `Metadata`/`Data*`/`End` → resume sequence.
pub struct TraceExporter;

impl TraceExporter {
    /// Export everything currently in `buffer`. Pauses recording for the
    /// duration of the drain to guarantee a consistent snapshot, then
    /// resumes if it was enabled beforehand, and clears the dropped
    /// counter as the original dump protocol does.
    pub fn export(buffer: &TraceBuffer) -> (MetadataFrame, Vec<DataFrame>, EndFrame) {
        let was_enabled = buffer.is_enabled();
        buffer.set_paused(true);
        let events = buffer.drain_all();
        let dropped = buffer.dropped_count();

        let start_ts = events.first().map(|e| e.timestamp_us).unwrap_or(0);
        let end_ts = events.last().map(|e| e.timestamp_us).unwrap_or(0);
        let task_entries = buffer
            .task_entries()
            .into_iter()
            .map(|(task_id, name)| TaskEntry { task_id, name })
            .collect();

        let metadata = MetadataFrame { event_count: events.len() as u32, dropped_count: dropped, start_ts, end_ts, task_entries };

        let data_frames: Vec<DataFrame> = events
            .chunks(MAX_EVENTS_PER_DATA_FRAME)
            .enumerate()
            .map(|(i, chunk)| DataFrame { offset: (i * MAX_EVENTS_PER_DATA_FRAME) as u32, events: chunk.to_vec() })
            .collect();

        let mut checksum: u32 = 0;
        for event in &events {
            for byte in event.encode() {
                checksum = checksum.wrapping_add(byte as u32);
            }
        }
        let end = EndFrame { total_events: events.len() as u32, checksum };

        buffer.clear_dropped_count();
        buffer.set_paused(false);
        buffer.set_enabled(was_enabled);

        (metadata, data_frames, end)
    }
}
