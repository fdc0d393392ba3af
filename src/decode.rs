//! Top-level decode driver.

use std::fs;
use std::path::Path;

use tracing::trace;
use typed_builder::TypedBuilder;

use crate::ensemble::{EnsemblePackage, Format};
use crate::monitor::{DecodeMonitor, MonitorSet};
use crate::subsystem::SubsystemRegistry;
use crate::{binary, dvl, pd0, Result};

/// Decodes recorded ADCP files of one [Format] into [EnsemblePackage]s.
///
/// A decode call scans and processes the entire source on the caller's
/// thread before returning; there is no internal parallelism, and
/// notifications are delivered synchronously in scan order. The decoder
/// holds the session's [SubsystemRegistry], so decoding several files
/// through one `FileDecoder` keeps one configuration-identity space across
/// all of them.
///
/// # Example
/// ```no_run
/// use adcp::{FileDecoder, Format};
///
/// let mut decoder = FileDecoder::builder().format(Format::Pd0).build();
/// let packages = decoder.decode_file("deployment.pd0").unwrap();
/// ```
#[derive(TypedBuilder)]
pub struct FileDecoder {
    format: Format,
    #[builder(default)]
    monitors: MonitorSet,
    #[builder(default)]
    subsystems: SubsystemRegistry,
}

impl FileDecoder {
    /// Register a monitor; notifications fire in registration order.
    pub fn add_monitor(&mut self, monitor: Box<dyn DecodeMonitor>) {
        self.monitors.push(monitor);
    }

    /// The configuration identities assigned so far this session.
    #[must_use]
    pub fn subsystems(&self) -> &SubsystemRegistry {
        &self.subsystems
    }

    /// Decode a whole file.
    ///
    /// The file is read fully into memory; usable file size is bounded by
    /// available memory.
    ///
    /// # Errors
    /// [Error](crate::Error) only when the file cannot be read, in which
    /// case no notifications are fired. Corrupt frames never fail the
    /// call; they are skipped and the scan continues.
    pub fn decode_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<EnsemblePackage>> {
        let path = path.as_ref();
        trace!(?path, format = ?self.format, "decoding file");
        let dat = fs::read(path)?;
        Ok(self.decode(&dat))
    }

    /// Decode an already-buffered source.
    ///
    /// Fires per-frame notifications while scanning and a single
    /// completion notification after the whole source has been processed.
    pub fn decode(&mut self, dat: &[u8]) -> Vec<EnsemblePackage> {
        let packages = match self.format {
            Format::Binary => binary::decode_stream(dat, &mut self.monitors),
            Format::Pd0 => pd0::decode_stream(dat, &mut self.monitors, &mut self.subsystems),
            Format::Dvl => {
                dvl::decode_stream(&String::from_utf8_lossy(dat), &mut self.monitors)
            }
        };
        self.monitors.complete();
        packages
    }
}
