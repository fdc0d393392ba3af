//! The PD0 binary format.
//!
//! Frames start with `0x7f 0x7f` and declare a 16-bit payload length that
//! counts every byte except the 2-byte sum checksum trailer. A header
//! offset table locates typed data sections at fixed offsets within the
//! frame. PD0 carries no native per-configuration identifier, so decoded
//! ensembles get one assigned from the
//! [SubsystemRegistry](crate::subsystem::SubsystemRegistry).

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::ensemble::{
    AncillaryData, BottomTrack, Ensemble, EnsembleData, EnsemblePackage, Format, SUBSYSTEM_UNKNOWN,
};
use crate::locator::SyncLocator;
use crate::monitor::MonitorSet;
use crate::subsystem::{SubsystemKey, SubsystemRegistry};
use crate::wire;
use crate::{Error, Result, MAX_FRAME_LEN};

/// Frame synchronization marker.
pub const SYNC_MARKER: [u8; 2] = [0x7f, 0x7f];

/// Data section identifiers.
pub const FIXED_LEADER_ID: u16 = 0x0000;
pub const VARIABLE_LEADER_ID: u16 = 0x0080;
pub const BOTTOM_TRACK_ID: u16 = 0x0600;

/// The fixed-size frame header.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct Pd0Header {
    /// Number of bytes in the frame, checksum excluded.
    pub payload_len: u16,
    /// Number of entries in the offset table that follows the header.
    pub num_data_types: u8,
}

impl Pd0Header {
    pub const LEN: usize = 6;
    /// Width of the trailing checksum field.
    pub const CHECKSUM_LEN: usize = 2;

    /// Construct from the provided bytes, or `None` if there are not enough
    /// bytes.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }
        Some(Pd0Header {
            payload_len: wire::u16_le(dat, 2)?,
            num_data_types: dat[5],
        })
    }

    /// Total frame size: declared payload plus the checksum trailer.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.payload_len as usize + Self::CHECKSUM_LEN
    }
}

/// Fixed leader: acquisition geometry and configuration. Constant for the
/// lifetime of one deployment configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct FixedLeader {
    pub firmware_version: u8,
    pub firmware_revision: u8,
    pub system_config: u16,
    pub num_beams: u8,
    pub num_cells: u8,
    pub pings_per_ensemble: u16,
    /// Depth cell length, cm.
    pub cell_length: u16,
    /// Blank after transmit, cm.
    pub blank: u16,
}

impl FixedLeader {
    pub const LEN: usize = 16;

    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }
        Some(FixedLeader {
            firmware_version: dat[2],
            firmware_revision: dat[3],
            system_config: wire::u16_le(dat, 4)?,
            num_beams: dat[8],
            num_cells: dat[9],
            pings_per_ensemble: wire::u16_le(dat, 10)?,
            cell_length: wire::u16_le(dat, 12)?,
            blank: wire::u16_le(dat, 14)?,
        })
    }

    /// Base subsystem code derived from the system-configuration frequency
    /// bits; the format has no native code.
    #[must_use]
    pub fn subsystem_code(&self) -> u8 {
        match self.system_config & 0x7 {
            0 => b'2', // 75 kHz
            1 => b'3', // 150 kHz
            2 => b'4', // 300 kHz
            3 => b'6', // 600 kHz
            4 => b'7', // 1200 kHz
            5 => b'8', // 2400 kHz
            _ => SUBSYSTEM_UNKNOWN,
        }
    }
}

/// Variable leader: per-ensemble identity, clock and environment readings.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct VariableLeader {
    pub ensemble_number: u32,
    pub rtc: [u8; 7],
    pub bit_result: u16,
    /// m/s.
    pub speed_of_sound: u16,
    /// Decimeters.
    pub transducer_depth: u16,
    /// Hundredths of a degree.
    pub heading: u16,
    /// Hundredths of a degree, signed.
    pub pitch: i16,
    /// Hundredths of a degree, signed.
    pub roll: i16,
    /// Parts per thousand.
    pub salinity: u16,
    /// Hundredths of a degree C, signed.
    pub temperature: i16,
}

impl VariableLeader {
    pub const LEN: usize = 28;

    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }
        let lsb = wire::u16_le(dat, 2)?;
        let msb = dat[11];
        let mut rtc = [0u8; 7];
        rtc.copy_from_slice(&dat[4..11]);
        Some(VariableLeader {
            ensemble_number: u32::from(lsb) + (u32::from(msb) << 16),
            rtc,
            bit_result: wire::u16_le(dat, 12)?,
            speed_of_sound: wire::u16_le(dat, 14)?,
            transducer_depth: wire::u16_le(dat, 16)?,
            heading: wire::u16_le(dat, 18)?,
            pitch: wire::i16_le(dat, 20)?,
            roll: wire::i16_le(dat, 22)?,
            salinity: wire::u16_le(dat, 24)?,
            temperature: wire::i16_le(dat, 26)?,
        })
    }

    /// RTC fields as a timestamp; the year is two-digit windowed at 1980.
    #[must_use]
    pub fn datetime(&self) -> Option<chrono::NaiveDateTime> {
        let [year, month, day, hour, minute, second, hundredths] = self.rtc;
        let year = if year < 80 {
            2000 + i32::from(year)
        } else {
            1900 + i32::from(year)
        };
        chrono::NaiveDate::from_ymd_opt(year, u32::from(month), u32::from(day))?
            .and_hms_milli_opt(
                u32::from(hour),
                u32::from(minute),
                u32::from(second),
                u32::from(hundredths) * 10,
            )
    }
}

/// Bottom track: per-beam range to bottom and velocity.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct BottomTrackData {
    pub pings_per_ensemble: u16,
    /// Range to bottom per beam, cm.
    pub range: [u16; 4],
    /// Velocity per beam, mm/s, signed.
    pub velocity: [i16; 4],
}

impl BottomTrackData {
    pub const LEN: usize = 32;

    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }
        let mut range = [0u16; 4];
        let mut velocity = [0i16; 4];
        for beam in 0..4 {
            range[beam] = wire::u16_le(dat, 16 + beam * 2)?;
            velocity[beam] = wire::i16_le(dat, 24 + beam * 2)?;
        }
        Some(BottomTrackData {
            pings_per_ensemble: wire::u16_le(dat, 2)?,
            range,
            velocity,
        })
    }
}

/// Decode a validated frame into an [Ensemble] and assign its
/// configuration index from `registry`.
///
/// The header's offset table locates each typed section; unrecognized
/// section ids are skipped.
///
/// # Errors
/// [Error] if the offset table or a recognized section is truncated.
pub fn decode_frame(frame: &[u8], registry: &mut SubsystemRegistry) -> Result<Ensemble> {
    let header = Pd0Header::decode(frame).ok_or(Error::NotEnoughData {
        actual: frame.len(),
        minimum: Pd0Header::LEN,
    })?;

    let mut fixed: Option<FixedLeader> = None;
    let mut variable: Option<VariableLeader> = None;
    let mut bottom: Option<BottomTrackData> = None;

    for entry in 0..header.num_data_types as usize {
        let offset = wire::u16_le(frame, Pd0Header::LEN + entry * 2)
            .ok_or(Error::Field("offset table"))? as usize;
        let Some(section) = frame.get(offset..) else {
            warn!(entry, offset, "section offset past end of frame, skipping");
            continue;
        };
        let Some(id) = wire::u16_le(section, 0) else {
            warn!(entry, offset, "section id truncated, skipping");
            continue;
        };
        match id {
            FIXED_LEADER_ID => {
                fixed = Some(FixedLeader::decode(section).ok_or(Error::Field("fixed leader"))?);
            }
            VARIABLE_LEADER_ID => {
                variable =
                    Some(VariableLeader::decode(section).ok_or(Error::Field("variable leader"))?);
            }
            BOTTOM_TRACK_ID => {
                bottom =
                    Some(BottomTrackData::decode(section).ok_or(Error::Field("bottom track"))?);
            }
            other => trace!(id = other, "skipping unrecognized section"),
        }
    }

    let mut ensemble = Ensemble::default();

    if fixed.is_some() || variable.is_some() {
        let mut data = EnsembleData::default();
        if let Some(fixed) = &fixed {
            data.num_beams = u16::from(fixed.num_beams);
            data.num_bins = u16::from(fixed.num_cells);
            data.desired_ping_count = fixed.pings_per_ensemble;
            data.actual_ping_count = fixed.pings_per_ensemble;
            data.firmware_major = fixed.firmware_version;
            data.firmware_minor = fixed.firmware_revision;
            data.subsystem_code = fixed.subsystem_code();
        }
        if let Some(variable) = &variable {
            data.ensemble_number = variable.ensemble_number;
            data.datetime = variable.datetime();
            data.status = u32::from(variable.bit_result);
        }
        ensemble.ensemble_data = Some(data);
    }

    if fixed.is_some() || variable.is_some() {
        let mut ancillary = AncillaryData::default();
        if let Some(fixed) = &fixed {
            ancillary.bin_size = f32::from(fixed.cell_length) / 100.0;
            ancillary.first_bin_range = f32::from(fixed.blank) / 100.0;
        }
        if let Some(variable) = &variable {
            ancillary.speed_of_sound = f32::from(variable.speed_of_sound);
            ancillary.transducer_depth = f32::from(variable.transducer_depth) / 10.0;
            ancillary.heading = f32::from(variable.heading) / 100.0;
            ancillary.pitch = f32::from(variable.pitch) / 100.0;
            ancillary.roll = f32::from(variable.roll) / 100.0;
            ancillary.salinity = f32::from(variable.salinity);
            ancillary.water_temp = f32::from(variable.temperature) / 100.0;
        }
        ensemble.ancillary = Some(ancillary);
    }

    if let Some(bottom) = &bottom {
        ensemble.bottom_track = Some(BottomTrack {
            num_beams: 4,
            actual_ping_count: bottom.pings_per_ensemble,
            range: bottom.range.iter().map(|&r| f32::from(r) / 100.0).collect(),
            beam_velocity: bottom
                .velocity
                .iter()
                .map(|&v| f32::from(v) / 1000.0)
                .collect(),
            ..Default::default()
        });
    }

    if ensemble.ensemble_data.is_some() {
        let key = SubsystemKey::for_ensemble(&ensemble);
        let index = registry.assign(key);
        if let Some(data) = ensemble.ensemble_data.as_mut() {
            data.subsystem_config_index = Some(index as u32);
        }
    }

    Ok(ensemble)
}

/// Scan `dat` for PD0 frames, validate each candidate and decode the
/// survivors. Notifications fire in scan order; a bad candidate only costs
/// that candidate.
pub fn decode_stream(
    dat: &[u8],
    monitors: &mut MonitorSet,
    registry: &mut SubsystemRegistry,
) -> Vec<EnsemblePackage> {
    let locator = SyncLocator::new(&SYNC_MARKER);
    let mut packages = Vec::new();

    for offset in locator.locate(dat) {
        let Some(header) = Pd0Header::decode(&dat[offset..]) else {
            trace!(offset, "header truncated, skipping candidate");
            continue;
        };
        let total = header.frame_len();
        if total <= Pd0Header::LEN || total >= MAX_FRAME_LEN {
            debug!(offset, total, "frame size out of range, skipping candidate");
            continue;
        }
        let Some(frame) = dat.get(offset..offset + total) else {
            trace!(offset, total, "frame runs past end of source, skipping candidate");
            continue;
        };

        let (body, trailer) = frame.split_at(total - Pd0Header::CHECKSUM_LEN);
        let stored = u16::from_le_bytes([trailer[0], trailer[1]]);
        let computed = wire::sum_u16(body);
        if computed != stored {
            debug!(offset, stored, computed, "checksum mismatch, discarding frame");
            monitors.bad_frame();
            continue;
        }
        monitors.good_frame();

        match decode_frame(frame, registry) {
            Ok(ensemble) => {
                let package = EnsemblePackage {
                    ensemble,
                    raw: frame.to_vec(),
                    format: Format::Pd0,
                };
                monitors.ensemble(&package);
                packages.push(package);
            }
            Err(err) => warn!(offset, %err, "failed to decode validated frame, dropping"),
        }
    }

    packages
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::monitor::{DecodeEvent, EventCollector};

    #[test]
    fn decode_header() {
        let frame = build_default_frame(99);
        let header = Pd0Header::decode(&frame).unwrap();

        assert_eq!(header.num_data_types, 3);
        assert_eq!(header.frame_len(), frame.len());
    }

    #[test]
    fn decode_frame_populates_sections() {
        let frame = build_default_frame(70000);
        let mut registry = SubsystemRegistry::new();
        let ensemble = decode_frame(&frame, &mut registry).unwrap();

        let data = ensemble.ensemble_data.expect("ensemble data");
        assert_eq!(data.ensemble_number, 70000, "MSB extends the counter");
        assert_eq!(data.num_beams, 4);
        assert_eq!(data.num_bins, 30);
        assert_eq!(data.subsystem_code, b'4'); // 300 kHz
        assert_eq!(data.subsystem_config_index, Some(0));
        let dt = data.datetime.expect("datetime");
        assert_eq!(dt.to_string(), "2024-03-15 12:30:45.500");

        let ancillary = ensemble.ancillary.expect("ancillary");
        assert_eq!(ancillary.bin_size, 4.0);
        assert_eq!(ancillary.first_bin_range, 0.88);
        assert_eq!(ancillary.heading, 123.4);
        assert_eq!(ancillary.pitch, 1.5);
        assert_eq!(ancillary.roll, -2.5);
        assert_eq!(ancillary.water_temp, 10.25);
        assert_eq!(ancillary.transducer_depth, 5.2);

        let bt = ensemble.bottom_track.expect("bottom track");
        assert_eq!(bt.range[0], 79.0);
        assert_eq!(bt.beam_velocity[0], -1.2);
    }

    #[test]
    fn same_configuration_shares_an_index_across_frames() {
        let mut registry = SubsystemRegistry::new();

        let first = decode_frame(&build_default_frame(1), &mut registry).unwrap();
        let second = decode_frame(&build_default_frame(2), &mut registry).unwrap();
        let other = decode_frame(
            &build_frame(&[fixed_leader(0b011, 60, 200), variable_leader(3)]),
            &mut registry,
        )
        .unwrap();

        assert_eq!(
            first.ensemble_data.unwrap().subsystem_config_index,
            Some(0)
        );
        assert_eq!(
            second.ensemble_data.unwrap().subsystem_config_index,
            Some(0)
        );
        assert_eq!(
            other.ensemble_data.unwrap().subsystem_config_index,
            Some(1)
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn decode_stream_accepts_good_and_reports_bad() {
        let good = build_default_frame(1);
        let mut bad = build_default_frame(2);
        let len = bad.len();
        bad[len - 5] ^= 0x40;

        let mut dat = good.clone();
        dat.extend_from_slice(&bad);

        let (collector, events) = EventCollector::new();
        let mut monitors = MonitorSet::default();
        monitors.push(Box::new(collector));
        let mut registry = SubsystemRegistry::new();

        let packages = decode_stream(&dat, &mut monitors, &mut registry);
        drop(monitors);

        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].format, Format::Pd0);

        let got: Vec<DecodeEvent> = events.try_iter().collect();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0], DecodeEvent::GoodFrame);
        assert!(matches!(got[1], DecodeEvent::Ensemble(_)));
        assert_eq!(got[2], DecodeEvent::BadFrame);
    }

    #[test]
    fn short_declared_length_is_skipped() {
        // Payload length of 4 gives a total of 6, equal to the header
        // length, which must be rejected.
        let mut dat = vec![0x7f, 0x7f, 4, 0, 0, 0];
        dat.extend_from_slice(&[0u8; 8]);

        let mut monitors = MonitorSet::default();
        let mut registry = SubsystemRegistry::new();
        assert!(decode_stream(&dat, &mut monitors, &mut registry).is_empty());
    }
}
