//! Atomic feature bitmask (spec.md §3, §4.3).

use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Bit N corresponds to feature enum value N. Bit 0 is reserved
    /// "unknown" and is never set by `setMask`/per-mode masks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Feature: u32 {
        const UNKNOWN        = 1 << 0;
        const LED            = 1 << 1;
        const BLE            = 1 << 2;
        const WIFI           = 1 << 3;
        const RADIO_DATAGRAM = 1 << 4;
        const TOUCH          = 1 << 5;
        const HAPTIC         = 1 << 6;
        const AUDIO          = 1 << 7;
    }
}

/// Atomic word wrapping a [`Feature`] set, with acquire/release ordering
/// on every read and write so callers never observe a torn value.
#[derive(Default)]
pub struct FeatureMask {
    bits: AtomicU32,
}

impl FeatureMask {
    pub fn new(initial: Feature) -> Self {
        Self { bits: AtomicU32::new(initial.bits()) }
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        let current = Feature::from_bits_truncate(self.bits.load(Ordering::Acquire));
        current.contains(feature)
    }

    pub fn set_enabled(&self, feature: Feature, on: bool) {
        if on {
            self.bits.fetch_or(feature.bits(), Ordering::Release);
        } else {
            self.bits.fetch_and(!feature.bits(), Ordering::Release);
        }
    }

    /// Snapshots the mask and materialises every known feature's membership.
    pub fn get_all(&self) -> Vec<(Feature, bool)> {
        let current = Feature::from_bits_truncate(self.bits.load(Ordering::Acquire));
        Feature::all()
            .iter()
            .filter(|f| *f != Feature::UNKNOWN)
            .map(|f| (f, current.contains(f)))
            .collect()
    }

    pub fn set_mask(&self, mask: Feature) {
        self.bits.store(mask.bits(), Ordering::Release);
    }

    pub fn snapshot(&self) -> Feature {
        Feature::from_bits_truncate(self.bits.load(Ordering::Acquire))
    }
}

impl Feature {
    /// Maps a wire `feature:u8` index (spec.md §6) to its single-bit flag.
    /// Index 0 is the reserved "unknown" bit and is never addressable here.
    pub fn from_index(idx: u8) -> Option<Feature> {
        if idx == 0 || idx >= 32 {
            return None;
        }
        Feature::from_bits(1u32 << idx)
    }

    /// The wire index for a single-bit flag, the inverse of [`Self::from_index`].
    pub fn index(self) -> u8 {
        self.bits().trailing_zeros() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_is_enabled_in_program_order() {
        let mask = FeatureMask::new(Feature::empty());
        mask.set_enabled(Feature::LED, true);
        assert!(mask.is_enabled(Feature::LED));
        mask.set_enabled(Feature::LED, false);
        assert!(!mask.is_enabled(Feature::LED));
    }

    #[test]
    fn set_mask_replaces_whole_word() {
        let mask = FeatureMask::new(Feature::LED | Feature::BLE);
        mask.set_mask(Feature::WIFI);
        assert!(!mask.is_enabled(Feature::LED));
        assert!(mask.is_enabled(Feature::WIFI));
    }

    #[test]
    fn get_all_reports_every_feature() {
        let mask = FeatureMask::new(Feature::LED | Feature::TOUCH);
        let all = mask.get_all();
        assert!(all.contains(&(Feature::LED, true)));
        assert!(all.contains(&(Feature::BLE, false)));
        assert!(all.contains(&(Feature::TOUCH, true)));
    }

    #[test]
    fn index_round_trips_through_from_index() {
        for feature in [Feature::LED, Feature::BLE, Feature::WIFI, Feature::RADIO_DATAGRAM, Feature::TOUCH, Feature::HAPTIC, Feature::AUDIO] {
            assert_eq!(Feature::from_index(feature.index()), Some(feature));
        }
        assert_eq!(Feature::from_index(0), None, "bit 0 is the reserved unknown flag");
        assert_eq!(Feature::from_index(9), None, "no feature defined at this index");
    }
}
