//! The native Binary ensemble format.
//!
//! Frames start with 16 bytes of `0x80`. The 32-byte frame header declares
//! the payload length twice, the second copy bitwise complemented; the
//! frame ends with a 32-bit sum checksum over everything before it. The
//! payload is a sequence of self-describing data sets, each naming the
//! canonical section it populates.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::ensemble::{
    AncillaryData, BottomTrack, Ensemble, EnsembleData, EnsemblePackage, Format, NmeaData,
};
use crate::locator::SyncLocator;
use crate::monitor::MonitorSet;
use crate::wire;
use crate::{Error, Result, MAX_FRAME_LEN};

/// Frame synchronization marker.
pub const SYNC_MARKER: [u8; 16] = [0x80; 16];

/// Data set names recognized by the decoder.
pub const ENSEMBLE_DATA_SET: &str = "E000008";
pub const ANCILLARY_SET: &str = "E000009";
pub const BOTTOM_TRACK_SET: &str = "E000010";
pub const NMEA_SET: &str = "E000011";

/// The fixed-size frame header.
///
/// Both the ensemble number and the payload length are stored together with
/// their bitwise complement; the payload complement is the structural check
/// that gates all further processing of a candidate.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct BinaryHeader {
    pub ensemble_number: u32,
    pub ensemble_number_inverse: u32,
    pub payload_len: u32,
    pub payload_len_inverse: u32,
}

impl BinaryHeader {
    /// Header length in bytes, including the sync marker.
    pub const LEN: usize = 32;
    /// Width of the trailing checksum field.
    pub const CHECKSUM_LEN: usize = 4;

    /// Construct from the provided bytes, or `None` if there are not enough
    /// bytes.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }
        Some(BinaryHeader {
            ensemble_number: wire::u32_le(dat, 16)?,
            ensemble_number_inverse: wire::u32_le(dat, 20)?,
            payload_len: wire::u32_le(dat, 24)?,
            payload_len_inverse: wire::u32_le(dat, 28)?,
        })
    }

    /// True when the declared payload length equals the bitwise complement
    /// of its redundancy field.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        !self.payload_len_inverse == self.payload_len
    }

    /// Total frame size: header, payload and checksum trailer.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        Self::LEN + self.payload_len as usize + Self::CHECKSUM_LEN
    }
}

/// Data set value types.
pub const VALUE_TYPE_F32: u32 = 10;
pub const VALUE_TYPE_I32: u32 = 20;
pub const VALUE_TYPE_U8: u32 = 50;

/// Header of one self-describing data set within the payload.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SetHeader {
    pub value_type: u32,
    pub num_elements: u32,
    pub element_multiplier: u32,
    pub image: u32,
    /// ASCII set name, trailing padding trimmed.
    pub name: String,
}

impl SetHeader {
    pub const LEN: usize = 28;

    /// Construct from the provided bytes, or `None` if there are not enough
    /// bytes.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }
        let name_len = wire::u32_le(dat, 16)?.min(8) as usize;
        let name = String::from_utf8_lossy(&dat[20..20 + name_len])
            .trim_end_matches(['\0', ' '])
            .to_string();
        Some(SetHeader {
            value_type: wire::u32_le(dat, 0)?,
            num_elements: wire::u32_le(dat, 4)?,
            element_multiplier: wire::u32_le(dat, 8)?,
            image: wire::u32_le(dat, 12)?,
            name,
        })
    }

    /// Size of the set's data in bytes, or `None` for an unknown value
    /// type.
    #[must_use]
    pub fn data_len(&self) -> Option<usize> {
        let per_value = match self.value_type {
            VALUE_TYPE_F32 | VALUE_TYPE_I32 => 4,
            VALUE_TYPE_U8 => 1,
            _ => return None,
        };
        Some(self.num_elements as usize * self.element_multiplier as usize * per_value)
    }
}

fn f32_at(body: &[u8], idx: usize, what: &'static str) -> Result<f32> {
    wire::f32_le(body, idx * 4).ok_or(Error::Field(what))
}

fn u32_at(body: &[u8], idx: usize, what: &'static str) -> Result<u32> {
    wire::u32_le(body, idx * 4).ok_or(Error::Field(what))
}

fn decode_ensemble_data(body: &[u8]) -> Result<EnsembleData> {
    let year = u32_at(body, 6, "year")?;
    let month = u32_at(body, 7, "month")?;
    let day = u32_at(body, 8, "day")?;
    let hour = u32_at(body, 9, "hour")?;
    let minute = u32_at(body, 10, "minute")?;
    let second = u32_at(body, 11, "second")?;
    let hsec = u32_at(body, 12, "hsec")?;

    // An instrument with an unset RTC reports an impossible date; the
    // section is still available, only the timestamp is not.
    let datetime = chrono::NaiveDate::from_ymd_opt(year as i32, month, day)
        .and_then(|d| d.and_hms_milli_opt(hour, minute, second, hsec * 10));

    let mut serial = Vec::with_capacity(32);
    for word in 13..21 {
        serial.extend_from_slice(&u32_at(body, word, "serial number")?.to_le_bytes());
    }
    let serial_number = String::from_utf8_lossy(&serial)
        .trim_end_matches(['\0', ' '])
        .to_string();

    let firmware = u32_at(body, 21, "firmware")?.to_le_bytes();

    Ok(EnsembleData {
        ensemble_number: u32_at(body, 0, "ensemble number")?,
        num_bins: u32_at(body, 1, "num bins")? as u16,
        num_beams: u32_at(body, 2, "num beams")? as u16,
        desired_ping_count: u32_at(body, 3, "desired pings")? as u16,
        actual_ping_count: u32_at(body, 4, "actual pings")? as u16,
        status: u32_at(body, 5, "status")?,
        datetime,
        serial_number,
        firmware_revision: firmware[0],
        firmware_minor: firmware[1],
        firmware_major: firmware[2],
        subsystem_code: firmware[3],
        subsystem_config_index: None,
    })
}

fn decode_ancillary(body: &[u8]) -> Result<AncillaryData> {
    Ok(AncillaryData {
        first_bin_range: f32_at(body, 0, "first bin range")?,
        bin_size: f32_at(body, 1, "bin size")?,
        first_ping_time: f32_at(body, 2, "first ping time")?,
        last_ping_time: f32_at(body, 3, "last ping time")?,
        heading: f32_at(body, 4, "heading")?,
        pitch: f32_at(body, 5, "pitch")?,
        roll: f32_at(body, 6, "roll")?,
        water_temp: f32_at(body, 7, "water temp")?,
        system_temp: f32_at(body, 8, "system temp")?,
        salinity: f32_at(body, 9, "salinity")?,
        pressure: f32_at(body, 10, "pressure")?,
        transducer_depth: f32_at(body, 11, "transducer depth")?,
        speed_of_sound: f32_at(body, 12, "speed of sound")?,
    })
}

fn decode_bottom_track(body: &[u8]) -> Result<BottomTrack> {
    let num_beams = f32_at(body, 12, "num beams")? as usize;
    let available = body.len() / 4;
    if available < 14 + 6 * num_beams {
        return Err(Error::NotEnoughData {
            actual: available,
            minimum: 14 + 6 * num_beams,
        });
    }

    let mut bt = BottomTrack {
        first_ping_time: f32_at(body, 0, "first ping time")?,
        last_ping_time: f32_at(body, 1, "last ping time")?,
        heading: f32_at(body, 2, "heading")?,
        pitch: f32_at(body, 3, "pitch")?,
        roll: f32_at(body, 4, "roll")?,
        water_temp: f32_at(body, 5, "water temp")?,
        system_temp: f32_at(body, 6, "system temp")?,
        salinity: f32_at(body, 7, "salinity")?,
        pressure: f32_at(body, 8, "pressure")?,
        transducer_depth: f32_at(body, 9, "transducer depth")?,
        speed_of_sound: f32_at(body, 10, "speed of sound")?,
        status: f32_at(body, 11, "status")? as u32,
        num_beams: num_beams as u16,
        actual_ping_count: f32_at(body, 13, "ping count")? as u16,
        ..Default::default()
    };

    let arrays: [&mut Vec<f32>; 6] = [
        &mut bt.range,
        &mut bt.snr,
        &mut bt.amplitude,
        &mut bt.beam_velocity,
        &mut bt.instrument_velocity,
        &mut bt.earth_velocity,
    ];
    for (i, array) in arrays.into_iter().enumerate() {
        for beam in 0..num_beams {
            array.push(f32_at(body, 14 + i * num_beams + beam, "beam array")?);
        }
    }

    Ok(bt)
}

fn decode_nmea(body: &[u8]) -> NmeaData {
    NmeaData {
        text: String::from_utf8_lossy(body)
            .trim_end_matches('\0')
            .to_string(),
    }
}

/// Decode a validated frame into an [Ensemble].
///
/// Walks the payload's data sets and populates the canonical section each
/// recognized set names. Unrecognized sets are skipped by length; a set
/// that would run past the payload ends the walk.
///
/// # Errors
/// [Error] if a recognized set is too short for its fields.
pub fn decode_frame(frame: &[u8]) -> Result<Ensemble> {
    let header = BinaryHeader::decode(frame).ok_or(Error::NotEnoughData {
        actual: frame.len(),
        minimum: BinaryHeader::LEN,
    })?;
    let end = frame
        .len()
        .min(BinaryHeader::LEN + header.payload_len as usize);
    let payload = &frame[BinaryHeader::LEN..end];

    let mut ensemble = Ensemble::default();
    let mut pos = 0;
    while pos < payload.len() {
        let Some(set) = SetHeader::decode(&payload[pos..]) else {
            warn!(pos, "data set header truncated, ending walk");
            break;
        };
        let Some(data_len) = set.data_len() else {
            warn!(value_type = set.value_type, "unknown data set value type, ending walk");
            break;
        };
        let start = pos + SetHeader::LEN;
        let Some(body) = payload.get(start..start + data_len) else {
            warn!(name = %set.name, "data set runs past payload, ending walk");
            break;
        };

        match set.name.as_str() {
            ENSEMBLE_DATA_SET => ensemble.ensemble_data = Some(decode_ensemble_data(body)?),
            ANCILLARY_SET => ensemble.ancillary = Some(decode_ancillary(body)?),
            BOTTOM_TRACK_SET => ensemble.bottom_track = Some(decode_bottom_track(body)?),
            NMEA_SET => ensemble.nmea = Some(decode_nmea(body)),
            other => trace!(name = other, "skipping unrecognized data set"),
        }
        pos = start + data_len;
    }

    Ok(ensemble)
}

/// Scan `dat` for Binary frames, validate each candidate and decode the
/// survivors. Notifications fire in scan order; a bad candidate only costs
/// that candidate.
pub fn decode_stream(dat: &[u8], monitors: &mut MonitorSet) -> Vec<EnsemblePackage> {
    let locator = SyncLocator::new(&SYNC_MARKER);
    let mut packages = Vec::new();

    for offset in locator.locate(dat) {
        let Some(header) = BinaryHeader::decode(&dat[offset..]) else {
            trace!(offset, "header truncated, skipping candidate");
            continue;
        };
        if !header.is_consistent() {
            trace!(offset, "payload length fails complement check, skipping candidate");
            continue;
        }
        let total = header.frame_len();
        if total <= BinaryHeader::LEN || total >= MAX_FRAME_LEN {
            debug!(offset, total, "frame size out of range, skipping candidate");
            continue;
        }
        let Some(frame) = dat.get(offset..offset + total) else {
            trace!(offset, total, "frame runs past end of source, skipping candidate");
            continue;
        };

        let (body, trailer) = frame.split_at(total - BinaryHeader::CHECKSUM_LEN);
        let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let computed = wire::sum_u32(body);
        if computed != stored {
            debug!(offset, stored, computed, "checksum mismatch, discarding frame");
            monitors.bad_frame();
            continue;
        }
        monitors.good_frame();

        match decode_frame(frame) {
            Ok(ensemble) => {
                let package = EnsemblePackage {
                    ensemble,
                    raw: frame.to_vec(),
                    format: Format::Binary,
                };
                monitors.ensemble(&package);
                packages.push(package);
            }
            Err(err) => warn!(offset, %err, "failed to decode validated frame, dropping"),
        }
    }

    packages
}
