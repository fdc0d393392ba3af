//! First-seen configuration identity assignment.
//!
//! PD0 frames carry no native per-configuration identifier, so one is
//! derived: the tuple of acquisition parameters below is mapped to a small
//! integer the first time it is observed, and every structurally identical
//! tuple seen later maps to the same integer.

use serde::{Deserialize, Serialize};

use crate::ensemble::{Ensemble, SUBSYSTEM_UNKNOWN};

pub const DEFAULT_NUM_BEAMS: u16 = 4;
pub const DEFAULT_NUM_BINS: u16 = 30;
pub const DEFAULT_BIN_SIZE: f32 = 1.0;
pub const DEFAULT_BLANK: f32 = 0.0;
pub const DEFAULT_PING_COUNT: u16 = 1;

/// A subsystem configuration tuple.
///
/// Equality is exact, field for field, including exact floating-point
/// equality: two configurations differing by floating-point noise are
/// distinct identities. For that reason the key is deliberately not
/// hashable and lookup is a linear scan.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SubsystemKey {
    pub code: u8,
    pub num_beams: u16,
    pub num_bins: u16,
    pub bin_size: f32,
    pub blank: f32,
    pub ping_count: u16,
}

impl SubsystemKey {
    /// Derive the configuration tuple for `ensemble`, substituting defaults
    /// for each section that is unavailable. Availability is checked per
    /// section; a present section's values are used as-is.
    #[must_use]
    pub fn for_ensemble(ensemble: &Ensemble) -> Self {
        let (code, num_beams, num_bins, ping_count) = match &ensemble.ensemble_data {
            Some(data) => (
                data.subsystem_code,
                data.num_beams,
                data.num_bins,
                data.actual_ping_count,
            ),
            None => (
                SUBSYSTEM_UNKNOWN,
                DEFAULT_NUM_BEAMS,
                DEFAULT_NUM_BINS,
                DEFAULT_PING_COUNT,
            ),
        };
        let (bin_size, blank) = match &ensemble.ancillary {
            Some(ancillary) => (ancillary.bin_size, ancillary.first_bin_range),
            None => (DEFAULT_BIN_SIZE, DEFAULT_BLANK),
        };

        SubsystemKey {
            code,
            num_beams,
            num_bins,
            bin_size,
            blank,
            ping_count,
        }
    }
}

/// Append-only mapping from [SubsystemKey] to a zero-based index.
///
/// Indices are assigned in first-seen order and never reassigned or
/// evicted. One instance is expected to span one decoding session; it is
/// not internally synchronized, so sharing across threads requires external
/// mutual exclusion.
#[derive(Debug, Default)]
pub struct SubsystemRegistry {
    keys: Vec<SubsystemKey>,
}

impl SubsystemRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for `key`, assigning the next sequential index if
    /// this is the first time the key has been observed.
    pub fn assign(&mut self, key: SubsystemKey) -> usize {
        if let Some(idx) = self.keys.iter().position(|k| *k == key) {
            return idx;
        }
        self.keys.push(key);
        self.keys.len() - 1
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::{AncillaryData, EnsembleData};

    fn key() -> SubsystemKey {
        SubsystemKey {
            code: b'3',
            num_beams: 4,
            num_bins: 30,
            bin_size: 1.0,
            blank: 0.5,
            ping_count: 1,
        }
    }

    #[test]
    fn identical_keys_share_an_index() {
        let mut registry = SubsystemRegistry::new();

        assert_eq!(registry.assign(key()), 0);
        assert_eq!(registry.assign(key()), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn one_field_difference_is_a_new_identity() {
        let mut registry = SubsystemRegistry::new();
        let first = registry.assign(key());

        let mut other = key();
        other.bin_size = 2.0;
        let second = registry.assign(other);

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        // Prior assignment is unchanged.
        assert_eq!(registry.assign(key()), 0);
    }

    #[test]
    fn float_noise_is_a_distinct_identity() {
        let mut registry = SubsystemRegistry::new();
        let first = registry.assign(key());

        let mut noisy = key();
        noisy.blank = 0.5 + f32::EPSILON;
        assert_ne!(registry.assign(noisy), first);
    }

    #[test]
    fn defaults_substituted_per_missing_section() {
        let ensemble = Ensemble::default();
        let derived = SubsystemKey::for_ensemble(&ensemble);

        assert_eq!(derived.code, SUBSYSTEM_UNKNOWN);
        assert_eq!(derived.num_beams, DEFAULT_NUM_BEAMS);
        assert_eq!(derived.num_bins, DEFAULT_NUM_BINS);
        assert_eq!(derived.bin_size, DEFAULT_BIN_SIZE);
        assert_eq!(derived.blank, DEFAULT_BLANK);
        assert_eq!(derived.ping_count, DEFAULT_PING_COUNT);
    }

    #[test]
    fn present_sections_are_used_as_is() {
        let ensemble = Ensemble {
            ensemble_data: Some(EnsembleData {
                subsystem_code: b'4',
                num_beams: 5,
                num_bins: 20,
                actual_ping_count: 2,
                ..Default::default()
            }),
            ancillary: Some(AncillaryData {
                bin_size: 4.0,
                first_bin_range: 0.9,
                ..Default::default()
            }),
            ..Default::default()
        };

        let derived = SubsystemKey::for_ensemble(&ensemble);
        assert_eq!(derived.code, b'4');
        assert_eq!(derived.num_beams, 5);
        assert_eq!(derived.num_bins, 20);
        assert_eq!(derived.bin_size, 4.0);
        assert_eq!(derived.blank, 0.9);
        assert_eq!(derived.ping_count, 2);
    }
}
