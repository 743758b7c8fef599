//! The 16-byte wire-canonical trace event (spec.md §3).

pub const TASK_NAME_LEN: usize = 16;
pub const EVENT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    TaskSwitchIn = 0,
    TaskSwitchOut = 1,
    IsrEnter = 2,
    IsrExit = 3,
    TaskCreate = 4,
    TaskDelete = 5,
    QueueSend = 6,
    QueueReceive = 7,
    SpanBegin = 8,
    SpanEnd = 9,
    Instant = 10,
    Counter = 11,
}

impl EventType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::TaskSwitchIn,
            1 => Self::TaskSwitchOut,
            2 => Self::IsrEnter,
            3 => Self::IsrExit,
            4 => Self::TaskCreate,
            5 => Self::TaskDelete,
            6 => Self::QueueSend,
            7 => Self::QueueReceive,
            8 => Self::SpanBegin,
            9 => Self::SpanEnd,
            10 => Self::Instant,
            11 => Self::Counter,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Category {
    Kernel = 0,
    Transport = 1,
    Ota = 2,
    Wifi = 3,
    Led = 4,
    Audio = 5,
    Touch = 6,
    Game = 7,
    User = 8,
    Haptic = 9,
    Ble = 10,
    Nvs = 11,
}

impl Category {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Kernel,
            1 => Self::Transport,
            2 => Self::Ota,
            3 => Self::Wifi,
            4 => Self::Led,
            5 => Self::Audio,
            6 => Self::Touch,
            7 => Self::Game,
            8 => Self::User,
            9 => Self::Haptic,
            10 => Self::Ble,
            11 => Self::Nvs,
            _ => return None,
        })
    }
}

/// `timestamp_us:u32 | taskId:u16 | eventType:u8 | flags:u8 | arg1:u32 | arg2:u32`.
///
/// `flags`'s upper nibble carries the [`Category`]; the lower nibble is
/// reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    pub timestamp_us: u32,
    pub task_id: u16,
    pub event_type: EventType,
    pub category: Category,
    pub arg1: u32,
    pub arg2: u32,
}

impl TraceEvent {
    pub fn encode(&self) -> [u8; EVENT_LEN] {
        let mut buf = [0u8; EVENT_LEN];
        buf[0..4].copy_from_slice(&self.timestamp_us.to_le_bytes());
        buf[4..6].copy_from_slice(&self.task_id.to_le_bytes());
        buf[6] = self.event_type as u8;
        buf[7] = (self.category as u8) << 4;
        buf[8..12].copy_from_slice(&self.arg1.to_le_bytes());
        buf[12..16].copy_from_slice(&self.arg2.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8; EVENT_LEN]) -> Option<Self> {
        Some(Self {
            timestamp_us: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            task_id: u16::from_le_bytes(bytes[4..6].try_into().unwrap()),
            event_type: EventType::from_u8(bytes[6])?,
            category: Category::from_u8(bytes[7] >> 4)?,
            arg1: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            arg2: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_round_trip() {
        let event = TraceEvent {
            timestamp_us: 123_456,
            task_id: 7,
            event_type: EventType::Counter,
            category: Category::Game,
            arg1: 0x01020304,
            arg2: 0x05060708,
        };
        let encoded = event.encode();
        assert_eq!(encoded.len(), EVENT_LEN);
        let decoded = TraceEvent::decode(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn category_occupies_upper_nibble() {
        let event = TraceEvent {
            timestamp_us: 0,
            task_id: 0,
            event_type: EventType::Instant,
            category: Category::Nvs,
            arg1: 0,
            arg2: 0,
        };
        assert_eq!(event.encode()[7], 0xB0);
    }
}
