//! The DVL summary format: NMEA 0183 style text.
//!
//! Sentences look like `$PRTI01,word,word,...*HH` where `HH` is the
//! exclusive-or of every byte between `$` and `*`. Sentences are grouped
//! into ensembles by the `PRTI01` group-start sentence: its arrival flushes
//! the group accumulated so far and opens the next one.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ensemble::{
    AncillaryData, BottomTrack, DvlData, Ensemble, EnsembleData, EnsemblePackage, Format, NmeaData,
    WaterMass,
};
use crate::monitor::MonitorSet;
use crate::wire;

/// Sentence delimiter.
pub const SENTENCE_START: char = '$';
/// Separates the sentence body from its checksum.
pub const CHECKSUM_SEPARATOR: char = '*';

/// Command word that opens a new sentence group.
pub const GROUP_START: &str = "PRTI01";
/// Earth-referenced counterpart of the group-start sentence.
pub const EARTH_DATA: &str = "PRTI02";
/// Extended instrument-referenced sentence; carries the subsystem code.
pub const INSTRUMENT_DATA_EXT: &str = "PRTI30";
/// Extended earth-referenced sentence; carries the subsystem code.
pub const EARTH_DATA_EXT: &str = "PRTI31";

/// One framed and checksum-checked sentence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NmeaSentence {
    /// The sentence text, line ending trimmed.
    pub raw: String,
    /// Command word without the leading `$`.
    pub command: String,
    /// Comma-separated data words, in order. Empty words are kept: an
    /// empty word means that value is unavailable.
    pub words: Vec<String>,
    /// Checksum stored in the sentence trailer.
    pub checksum: u8,
    /// Whether the stored checksum matches the recomputed one.
    pub valid: bool,
}

impl NmeaSentence {
    /// Parse one candidate sentence, or `None` if it is not structured as
    /// `$COMMAND[,words]*HH`.
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        let trimmed = raw.trim_end_matches(['\r', '\n']);
        let rest = trimmed.strip_prefix(SENTENCE_START)?;
        let (body, checksum_text) = rest.rsplit_once(CHECKSUM_SEPARATOR)?;
        if checksum_text.len() != 2 {
            return None;
        }
        let checksum = u8::from_str_radix(checksum_text, 16).ok()?;

        let mut fields = body.split(',');
        let command = fields.next()?.to_string();
        if command.is_empty() {
            return None;
        }
        let words = fields.map(str::to_string).collect();
        let valid = wire::xor_u8(body.as_bytes()) == checksum;

        Some(NmeaSentence {
            raw: trimmed.to_string(),
            command,
            words,
            checksum,
            valid,
        })
    }

    fn word_f32(&self, idx: usize) -> Option<f32> {
        let word = self.words.get(idx)?;
        if word.is_empty() {
            return None;
        }
        word.parse().ok()
    }

    fn word_u32(&self, idx: usize) -> Option<u32> {
        let word = self.words.get(idx)?;
        if word.is_empty() {
            return None;
        }
        word.parse().ok()
    }
}

/// Split `text` into candidate sentences.
///
/// Everything before the first delimiter is preamble and discarded. Each
/// candidate starts at a delimiter and runs to the next one; the pending
/// buffer at end of input is the final candidate.
#[must_use]
pub fn frame_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut pending: Option<String> = None;

    for ch in text.chars() {
        if ch == SENTENCE_START {
            if let Some(done) = pending.take() {
                sentences.push(done);
            }
            pending = Some(String::new());
        }
        if let Some(buf) = pending.as_mut() {
            buf.push(ch);
        }
    }
    if let Some(done) = pending {
        sentences.push(done);
    }

    sentences
}

// PRTI data word positions, shared by all four recognized kinds.
const WORD_START_TIME: usize = 0;
const WORD_SAMPLE_NUMBER: usize = 1;
const WORD_TEMPERATURE: usize = 2;
const WORD_BT_VEL: usize = 3; // x, y, z
const WORD_DEPTH: usize = 6;
const WORD_WM_VEL: usize = 7; // x, y, z
const WORD_WM_DEPTH: usize = 10;
const WORD_STATUS: usize = 11;
const WORD_SUBSYSTEM: usize = 12;

/// Populate the base ensemble from an instrument-referenced sentence.
fn apply_instrument(ensemble: &mut Ensemble, sentence: &NmeaSentence) {
    let sample_time = sentence
        .word_f32(WORD_START_TIME)
        .map(|hundredths| hundredths / 100.0);
    let status = sentence.word_u32(WORD_STATUS).unwrap_or(0);

    let data = ensemble.ensemble_data.get_or_insert_with(EnsembleData::default);
    if let Some(number) = sentence.word_u32(WORD_SAMPLE_NUMBER) {
        data.ensemble_number = number;
    }

    let dvl = ensemble.dvl.get_or_insert_with(DvlData::default);
    dvl.sample_number = sentence.word_u32(WORD_SAMPLE_NUMBER).unwrap_or(0);
    dvl.sample_time = sample_time.unwrap_or(0.0);
    dvl.status = status;

    if let Some(temp) = sentence.word_f32(WORD_TEMPERATURE) {
        let ancillary = ensemble.ancillary.get_or_insert_with(AncillaryData::default);
        ancillary.water_temp = temp / 100.0;
        if let Some(time) = sample_time {
            ancillary.first_ping_time = time;
            ancillary.last_ping_time = time;
        }
    }

    let velocity = instrument_velocity(sentence, WORD_BT_VEL);
    let depth = sentence.word_f32(WORD_DEPTH).map(|mm| mm / 1000.0);
    if velocity.is_some() || depth.is_some() {
        let bt = ensemble.bottom_track.get_or_insert_with(BottomTrack::default);
        bt.status = status;
        if let Some(temp) = sentence.word_f32(WORD_TEMPERATURE) {
            bt.water_temp = temp / 100.0;
        }
        if let Some([x, y, z]) = velocity {
            bt.instrument_velocity = vec![x, y, z];
        }
        if let Some(depth) = depth {
            bt.range = vec![depth];
        }
    }

    if let Some([x, y, z]) = instrument_velocity(sentence, WORD_WM_VEL) {
        ensemble.instrument_water_mass = Some(WaterMass {
            velocity_x: x,
            velocity_y: y,
            velocity_z: z,
            depth_layer: sentence
                .word_f32(WORD_WM_DEPTH)
                .map_or(0.0, |mm| mm / 1000.0),
        });
    }
}

/// Augment with the earth-referenced counterpart sentence.
fn apply_earth(ensemble: &mut Ensemble, sentence: &NmeaSentence) {
    if let Some([x, y, z]) = instrument_velocity(sentence, WORD_BT_VEL) {
        let bt = ensemble.bottom_track.get_or_insert_with(BottomTrack::default);
        bt.earth_velocity = vec![x, y, z];
    }

    if let Some([x, y, z]) = instrument_velocity(sentence, WORD_WM_VEL) {
        ensemble.earth_water_mass = Some(WaterMass {
            velocity_x: x,
            velocity_y: y,
            velocity_z: z,
            depth_layer: sentence
                .word_f32(WORD_WM_DEPTH)
                .map_or(0.0, |mm| mm / 1000.0),
        });
    }
}

/// A velocity triple in m/s, or `None` unless all three words are present.
fn instrument_velocity(sentence: &NmeaSentence, first_word: usize) -> Option<[f32; 3]> {
    Some([
        sentence.word_f32(first_word)? / 1000.0,
        sentence.word_f32(first_word + 1)? / 1000.0,
        sentence.word_f32(first_word + 2)? / 1000.0,
    ])
}

/// Replace the placeholder subsystem tag with the code an extended
/// sentence carries.
fn apply_subsystem(ensemble: &mut Ensemble, sentence: &NmeaSentence) {
    let Some(word) = sentence.words.get(WORD_SUBSYSTEM) else {
        return;
    };
    if let Some(&code) = word.as_bytes().first() {
        let data = ensemble.ensemble_data.get_or_insert_with(EnsembleData::default);
        data.subsystem_code = code;
    }
}

/// Decode one flushed group into a package, or `None` if the group lacks
/// the mandatory group-start sentence.
fn decode_group(group: &[NmeaSentence]) -> Option<EnsemblePackage> {
    let mut instrument: Option<&NmeaSentence> = None;
    let mut earth: Option<&NmeaSentence> = None;
    let mut instrument_ext: Option<&NmeaSentence> = None;
    let mut earth_ext: Option<&NmeaSentence> = None;
    let mut gps_text = String::new();

    // Later duplicates of a recognized kind overwrite earlier ones.
    for sentence in group {
        match sentence.command.as_str() {
            GROUP_START => instrument = Some(sentence),
            EARTH_DATA => earth = Some(sentence),
            INSTRUMENT_DATA_EXT => instrument_ext = Some(sentence),
            EARTH_DATA_EXT => earth_ext = Some(sentence),
            _ => {
                gps_text.push_str(&sentence.raw);
                gps_text.push('\n');
            }
        }
    }

    let mut ensemble = Ensemble::default();
    apply_instrument(&mut ensemble, instrument?);
    if let Some(sentence) = earth {
        apply_earth(&mut ensemble, sentence);
    }
    if let Some(sentence) = instrument_ext {
        apply_instrument(&mut ensemble, sentence);
        apply_subsystem(&mut ensemble, sentence);
    }
    if let Some(sentence) = earth_ext {
        apply_earth(&mut ensemble, sentence);
        apply_subsystem(&mut ensemble, sentence);
    }
    if !gps_text.is_empty() {
        ensemble.nmea = Some(NmeaData { text: gps_text });
    }

    // The group's own text is the ensemble's byte representation, for
    // symmetry with the binary formats.
    let mut raw = String::new();
    for sentence in group {
        raw.push_str(&sentence.raw);
        raw.push_str("\r\n");
    }

    Some(EnsemblePackage {
        ensemble,
        raw: raw.into_bytes(),
        format: Format::Dvl,
    })
}

/// Accumulates validated sentences and flushes a group each time the
/// group-start sentence arrives.
///
/// The flush happens before the triggering sentence is added: the start
/// sentence becomes the first member of the next group. Sentences seen
/// before the first group start are never attributed to an ensemble, and
/// the trailing group at end of input is never flushed.
#[derive(Default)]
pub struct GroupDecoder {
    group: Vec<NmeaSentence>,
}

impl GroupDecoder {
    /// Add a validated sentence, returning a package if its arrival
    /// flushed a complete group.
    pub fn push(&mut self, sentence: NmeaSentence) -> Option<EnsemblePackage> {
        let flushed = if sentence.command == GROUP_START {
            self.flush()
        } else {
            None
        };
        self.group.push(sentence);
        flushed
    }

    fn flush(&mut self) -> Option<EnsemblePackage> {
        let group = std::mem::take(&mut self.group);
        if group.is_empty() {
            return None;
        }
        if !group.iter().any(|s| s.command == GROUP_START) {
            debug!(
                dropped = group.len(),
                "discarding sentences before first group start"
            );
            return None;
        }
        decode_group(&group)
    }
}

/// Frame, validate and group `text`, decoding each flushed group.
/// Notifications fire per flushed group, in document order; invalid
/// sentences are silently dropped.
pub fn decode_stream(text: &str, monitors: &mut MonitorSet) -> Vec<EnsemblePackage> {
    let mut packages = Vec::new();
    let mut groups = GroupDecoder::default();

    for candidate in frame_sentences(text) {
        let Some(sentence) = NmeaSentence::decode(&candidate) else {
            debug!("malformed sentence, dropping");
            continue;
        };
        if !sentence.valid {
            debug!(command = %sentence.command, "sentence checksum mismatch, dropping");
            continue;
        }
        if let Some(package) = groups.push(sentence) {
            monitors.good_frame();
            monitors.ensemble(&package);
            packages.push(package);
        }
    }

    packages
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::wire;

    /// Wrap `body` in `$...*HH` with a correct checksum.
    pub fn sentence(body: &str) -> String {
        format!("${}*{:02X}", body, wire::xor_u8(body.as_bytes()))
    }

    pub fn prti01(sample_number: u32) -> String {
        sentence(&format!(
            "PRTI01,380250,{sample_number},1464,-1205,-24,-347,79380,150,-200,60,4000,9"
        ))
    }

    pub fn prti02(sample_number: u32) -> String {
        sentence(&format!(
            "PRTI02,380250,{sample_number},1464,310,-1180,-25,79380,120,330,-55,4000,9"
        ))
    }
}
