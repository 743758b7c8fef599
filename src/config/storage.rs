//! Persisted key-value store collaborator (spec.md §6), out of scope to
//! implement. Namespaces and keys the core actually consumes are named as
//! constants so callers don't restring them.

pub mod namespace {
    pub const CONFIG: &str = "config";
    pub const WIFI: &str = "wifi";
    pub const STATS: &str = "stats";
}

pub mod key {
    pub const BRIGHTNESS: &str = "brightness";
    pub const VOLUME: &str = "volume";
    pub const TOUCH_THRESH: &str = "touch_thresh";
    pub const POD_ID: &str = "pod_id";
    pub const SSID: &str = "ssid";
    pub const PASS: &str = "pass";
    pub const BOOT_COUNT: &str = "boot_count";
    pub const RUNTIME_S: &str = "runtime_s";
    pub const TOUCH_EVENTS: &str = "touch_events";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStorageError {
    NotInitialized,
    NamespaceNotOpen,
    KeyNotFound,
    IoError,
}

/// Key-value store surface the core depends on (spec.md §6). Concrete
/// backing (flash NVS, a file, an in-memory map for tests) is a
/// collaborator's concern.
pub trait ConfigStorage {
    fn open(&mut self, namespace: &str) -> Result<(), ConfigStorageError>;
    fn close(&mut self);

    fn get_u8(&self, key: &str) -> Result<u8, ConfigStorageError>;
    fn get_u16(&self, key: &str) -> Result<u16, ConfigStorageError>;
    fn get_u32(&self, key: &str) -> Result<u32, ConfigStorageError>;
    fn get_i32(&self, key: &str) -> Result<i32, ConfigStorageError>;
    fn get_blob(&self, key: &str) -> Result<Vec<u8>, ConfigStorageError>;

    fn set_u8(&mut self, key: &str, value: u8) -> Result<(), ConfigStorageError>;
    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), ConfigStorageError>;
    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), ConfigStorageError>;
    fn set_i32(&mut self, key: &str, value: i32) -> Result<(), ConfigStorageError>;
    fn set_blob(&mut self, key: &str, value: &[u8]) -> Result<(), ConfigStorageError>;

    /// Durably persist all pending writes in the open namespace.
    fn commit(&mut self) -> Result<(), ConfigStorageError>;
    fn erase_all(&mut self) -> Result<(), ConfigStorageError>;
    fn erase_key(&mut self, key: &str) -> Result<(), ConfigStorageError>;
}
