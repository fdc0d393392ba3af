//! Synthetic recording builders shared by the integration tests.

use std::io::Write;

use adcp::wire;
use tempfile::NamedTempFile;

/// Write `dat` to a temp file and return its handle.
pub fn write_recording(dat: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp recording");
    file.write_all(dat).expect("write temp recording");
    file
}

// ---- Binary format ----------------------------------------------------

const VALUE_TYPE_F32: u32 = 10;
const VALUE_TYPE_I32: u32 = 20;

fn data_set(name: &str, value_type: u32, num_elements: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&value_type.to_le_bytes());
    out.extend_from_slice(&num_elements.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
    let mut padded = [0u8; 8];
    padded[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&padded);
    out.extend_from_slice(data);
    out
}

fn int_set(name: &str, values: &[u32]) -> Vec<u8> {
    let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    data_set(name, VALUE_TYPE_I32, values.len() as u32, &data)
}

fn float_set(name: &str, values: &[f32]) -> Vec<u8> {
    let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    data_set(name, VALUE_TYPE_F32, values.len() as u32, &data)
}

/// A complete Binary frame holding ensemble metadata and ancillary
/// sections, with consistent complement fields and checksum.
pub fn binary_frame(ensemble_number: u32) -> Vec<u8> {
    let mut values = vec![
        ensemble_number,
        30, // bins
        4,  // beams
        1,
        1,
        0,
        2024,
        6,
        1,
        8,
        15,
        30,
        0,
    ];
    // 32 chars of serial number
    for _ in 0..8 {
        values.push(u32::from_le_bytes(*b"0300"));
    }
    values.push(u32::from_le_bytes([1, 0, 1, b'3'])); // firmware + code

    let mut payload = int_set("E000008", &values);
    payload.extend_from_slice(&float_set(
        "E000009",
        &[
            0.45, 2.0, 0.0, 0.0, 10.0, 0.5, -0.5, 12.0, 13.0, 35.0, 0.0, 2.0, 1490.0,
        ],
    ));

    let mut frame = Vec::new();
    frame.extend_from_slice(&[0x80u8; 16]);
    frame.extend_from_slice(&ensemble_number.to_le_bytes());
    frame.extend_from_slice(&(!ensemble_number).to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&(!(payload.len() as u32)).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&wire::sum_u32(&frame).to_le_bytes());
    frame
}

// ---- PD0 format -------------------------------------------------------

fn pd0_fixed_leader(system_config: u16, cells: u8, cell_length: u16) -> Vec<u8> {
    let mut out = vec![0u8; 16];
    out[2] = 51;
    out[3] = 40;
    out[4..6].copy_from_slice(&system_config.to_le_bytes());
    out[8] = 4;
    out[9] = cells;
    out[10..12].copy_from_slice(&1u16.to_le_bytes());
    out[12..14].copy_from_slice(&cell_length.to_le_bytes());
    out[14..16].copy_from_slice(&88u16.to_le_bytes());
    out
}

fn pd0_variable_leader(ensemble_number: u16) -> Vec<u8> {
    let mut out = vec![0u8; 28];
    out[..2].copy_from_slice(&0x0080u16.to_le_bytes());
    out[2..4].copy_from_slice(&ensemble_number.to_le_bytes());
    out[4..11].copy_from_slice(&[24, 6, 1, 8, 15, 30, 0]);
    out[14..16].copy_from_slice(&1490u16.to_le_bytes());
    out[26..28].copy_from_slice(&1200i16.to_le_bytes());
    out
}

/// A complete PD0 frame for the given acquisition configuration.
pub fn pd0_frame(ensemble_number: u16, system_config: u16, cells: u8, cell_length: u16) -> Vec<u8> {
    let sections = [
        pd0_fixed_leader(system_config, cells, cell_length),
        pd0_variable_leader(ensemble_number),
    ];

    let mut pos = 6 + sections.len() * 2;
    let mut offsets = Vec::new();
    for section in &sections {
        offsets.push(pos as u16);
        pos += section.len();
    }

    let mut frame = Vec::new();
    frame.extend_from_slice(&[0x7f, 0x7f]);
    frame.extend_from_slice(&(pos as u16).to_le_bytes());
    frame.push(0);
    frame.push(sections.len() as u8);
    for offset in offsets {
        frame.extend_from_slice(&offset.to_le_bytes());
    }
    for section in &sections {
        frame.extend_from_slice(section);
    }
    frame.extend_from_slice(&wire::sum_u16(&frame).to_le_bytes());
    frame
}

// ---- DVL format -------------------------------------------------------

/// Wrap `body` in `$...*HH` with a correct checksum.
pub fn dvl_sentence(body: &str) -> String {
    format!("${}*{:02X}", body, wire::xor_u8(body.as_bytes()))
}

pub fn prti01(sample_number: u32) -> String {
    dvl_sentence(&format!(
        "PRTI01,12050,{sample_number},1200,-1205,-24,-347,79380,150,-200,60,4000,9"
    ))
}

pub fn prti02(sample_number: u32) -> String {
    dvl_sentence(&format!(
        "PRTI02,12050,{sample_number},1200,310,-1180,-25,79380,120,330,-55,4000,9"
    ))
}
