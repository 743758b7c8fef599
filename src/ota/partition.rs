//! Partition layer collaborator (spec.md §6), out of scope to implement.
//!
//! Grounded on `original_source/firmware/domes/main/transport/serialOtaReceiver.cpp`'s
//! use of `esp_ota_begin/write/end/set_boot_partition` — this trait is the
//! Rust-idiomatic shape of that ESP-IDF surface.

/// Opaque handle to an in-progress partition write.
pub struct WriterHandle(pub u32);

/// Identifies an OTA-update-able flash partition slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionId(pub u8);

pub trait PartitionWriter {
    /// Begin writing `size` bytes to `partition`. Fails if the partition is
    /// smaller than `size` or a writer is already open.
    fn begin_writer(&mut self, partition: PartitionId, size: u32) -> Result<WriterHandle, PartitionWriterError>;

    fn write(&mut self, handle: &WriterHandle, bytes: &[u8]) -> Result<(), PartitionWriterError>;

    /// Discard the in-progress write without committing anything.
    fn abort(&mut self, handle: WriterHandle);

    /// Finalize the write: verifies the image's own SHA-256 (if the
    /// underlying flash layer computes one) and returns the hash it
    /// observed for the caller to compare against the declared hash.
    fn commit(&mut self, handle: WriterHandle) -> Result<[u8; 32], PartitionWriterError>;

    fn set_boot(&mut self, partition: PartitionId) -> Result<(), PartitionWriterError>;

    /// The partition slot that should receive the next update.
    fn get_alternate(&self) -> Option<PartitionId>;

    /// Reboot the device. Never returns on real hardware; a host-side mock
    /// may return to let tests observe that it was called.
    fn reboot(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionWriterError {
    NoAlternatePartition,
    TooLarge,
    FlashError,
    AlreadyOpen,
}
