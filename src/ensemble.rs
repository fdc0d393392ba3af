//! The canonical ensemble model shared by all three wire formats.
//!
//! An [Ensemble] owns independently-populated sub-sections. Each sub-section
//! is optional: `None` means the source frame did not carry that section,
//! never that its values are zero. Consumers must check availability before
//! reading.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Placeholder subsystem code used until a format supplies the real one.
pub const SUBSYSTEM_UNKNOWN: u8 = b'?';

/// The wire format a package was decoded from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Binary,
    Dvl,
    Pd0,
}

/// One complete multi-beam measurement snapshot.
///
/// Created fresh per frame or sentence group and never mutated after
/// packaging.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Ensemble {
    pub ensemble_data: Option<EnsembleData>,
    pub ancillary: Option<AncillaryData>,
    pub bottom_track: Option<BottomTrack>,
    pub instrument_water_mass: Option<WaterMass>,
    pub ship_water_mass: Option<WaterMass>,
    pub earth_water_mass: Option<WaterMass>,
    pub nmea: Option<NmeaData>,
    pub dvl: Option<DvlData>,
}

/// A decoded [Ensemble] together with the raw frame bytes it came from and
/// the format that produced it. Immutable once constructed; the unit
/// returned to callers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnsemblePackage {
    pub ensemble: Ensemble,
    pub raw: Vec<u8>,
    pub format: Format,
}

/// Ensemble metadata: identity, geometry and acquisition configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnsembleData {
    pub ensemble_number: u32,
    pub num_bins: u16,
    pub num_beams: u16,
    pub desired_ping_count: u16,
    pub actual_ping_count: u16,
    pub status: u32,
    /// Instrument RTC time for this ensemble, when the format carries one.
    pub datetime: Option<NaiveDateTime>,
    pub serial_number: String,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub firmware_revision: u8,
    /// ASCII subsystem code; [SUBSYSTEM_UNKNOWN] until the format supplies
    /// the real one.
    pub subsystem_code: u8,
    /// First-seen configuration index assigned by the
    /// [SubsystemRegistry](crate::subsystem::SubsystemRegistry); only set
    /// for formats without a native configuration identifier.
    pub subsystem_config_index: Option<u32>,
}

impl Default for EnsembleData {
    fn default() -> Self {
        EnsembleData {
            ensemble_number: 0,
            num_bins: 0,
            num_beams: 0,
            desired_ping_count: 0,
            actual_ping_count: 0,
            status: 0,
            datetime: None,
            serial_number: String::new(),
            firmware_major: 0,
            firmware_minor: 0,
            firmware_revision: 0,
            subsystem_code: SUBSYSTEM_UNKNOWN,
            subsystem_config_index: None,
        }
    }
}

/// Ancillary readings sampled alongside the profile.
///
/// Distances are meters, angles degrees, temperatures degrees C, pressure
/// Pascal, speed of sound m/s.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct AncillaryData {
    pub first_bin_range: f32,
    pub bin_size: f32,
    pub first_ping_time: f32,
    pub last_ping_time: f32,
    pub heading: f32,
    pub pitch: f32,
    pub roll: f32,
    pub water_temp: f32,
    pub system_temp: f32,
    pub salinity: f32,
    pub pressure: f32,
    pub transducer_depth: f32,
    pub speed_of_sound: f32,
}

/// Bottom track section. Per-beam vectors are indexed by beam; velocities
/// are m/s, ranges meters.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct BottomTrack {
    pub first_ping_time: f32,
    pub last_ping_time: f32,
    pub heading: f32,
    pub pitch: f32,
    pub roll: f32,
    pub water_temp: f32,
    pub system_temp: f32,
    pub salinity: f32,
    pub pressure: f32,
    pub transducer_depth: f32,
    pub speed_of_sound: f32,
    pub status: u32,
    pub num_beams: u16,
    pub actual_ping_count: u16,
    pub range: Vec<f32>,
    pub snr: Vec<f32>,
    pub amplitude: Vec<f32>,
    pub beam_velocity: Vec<f32>,
    pub instrument_velocity: Vec<f32>,
    pub earth_velocity: Vec<f32>,
}

/// Water-mass layer velocity in one frame of reference (m/s), with the
/// center depth of the layer (m).
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct WaterMass {
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub velocity_z: f32,
    pub depth_layer: f32,
}

/// GPS/NMEA text embedded in the ensemble, verbatim, one sentence per line.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct NmeaData {
    pub text: String,
}

/// Fields specific to the DVL summary output.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct DvlData {
    pub sample_number: u32,
    /// Seconds since the instrument started pinging.
    pub sample_time: f32,
    pub status: u32,
}
