#![doc = include_str!("../README.md")]

mod error;

pub mod binary;
pub mod decode;
pub mod dvl;
pub mod ensemble;
pub mod locator;
pub mod monitor;
pub mod pd0;
pub mod subsystem;
pub mod wire;

pub use decode::FileDecoder;
pub use ensemble::{Ensemble, EnsemblePackage, Format};
pub use error::{Error, Result};
pub use monitor::{DecodeEvent, DecodeMonitor, EventCollector};
pub use subsystem::{SubsystemKey, SubsystemRegistry};

/// Sanity ceiling on a single frame's total size. A declared length that
/// would exceed it is a corrupt length field, not a frame.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;
