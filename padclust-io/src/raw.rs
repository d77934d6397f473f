//! Raw-stream files.
//!
//! Layout: the 8-byte magic `PADRAW01`, then fixed 14-byte little-endian
//! records `module, link, row, pad, time bin, amplitude, reserved`, all
//! `u16`, in front-end arrival order.

use crate::{Error, Result};
use log::debug;
use memmap2::Mmap;
use padclust_core::{RawEvent, RawSample};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File magic.
pub const RAW_MAGIC: &[u8; 8] = b"PADRAW01";

/// Size of one record in bytes.
pub const RAW_RECORD_SIZE: usize = 14;

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Returns the path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One decoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord {
    pub module: u16,
    pub link: u16,
    pub sample: RawSample,
}

impl RawRecord {
    fn decode(bytes: &[u8]) -> Self {
        let word = |i: usize| u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        Self {
            module: word(0),
            link: word(1),
            sample: RawSample::new(word(2), word(3), word(4), word(5)),
        }
    }

    fn encode(&self) -> [u8; RAW_RECORD_SIZE] {
        let mut out = [0u8; RAW_RECORD_SIZE];
        let words = [
            self.module,
            self.link,
            self.sample.row,
            self.sample.pad,
            self.sample.time_bin,
            self.sample.amplitude,
            0,
        ];
        for (chunk, w) in out.chunks_exact_mut(2).zip(words) {
            chunk.copy_from_slice(&w.to_le_bytes());
        }
        out
    }
}

/// Per-module content of a raw file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSummary {
    pub samples: usize,
    pub links: usize,
    pub rows: usize,
    pub max_amplitude: u16,
}

/// Content overview of a raw file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSummary {
    pub records: usize,
    pub modules: BTreeMap<u16, ModuleSummary>,
}

/// Reader for raw-stream files.
pub struct RawFileReader {
    reader: MappedFileReader,
}

impl RawFileReader {
    /// Opens and validates a raw-stream file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped, lacks the magic, or
    /// ends inside a record.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        let data = reader.as_bytes();
        if data.len() < RAW_MAGIC.len() || &data[..RAW_MAGIC.len()] != RAW_MAGIC {
            return Err(Error::InvalidFormat(format!(
                "missing PADRAW01 header (file: {})",
                reader.path().display()
            )));
        }
        let body = data.len() - RAW_MAGIC.len();
        if body % RAW_RECORD_SIZE != 0 {
            return Err(Error::InvalidFormat(format!(
                "body size {body} is not a multiple of {RAW_RECORD_SIZE} (file: {})",
                reader.path().display()
            )));
        }
        Ok(Self { reader })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Number of records in the file.
    #[must_use]
    pub fn n_records(&self) -> usize {
        (self.reader.len() - RAW_MAGIC.len()) / RAW_RECORD_SIZE
    }

    fn body(&self) -> &[u8] {
        &self.reader.as_bytes()[RAW_MAGIC.len()..]
    }

    /// Iterates over the records in file order.
    pub fn records(&self) -> impl Iterator<Item = RawRecord> + '_ {
        self.body()
            .chunks_exact(RAW_RECORD_SIZE)
            .map(RawRecord::decode)
    }

    /// Decodes the whole file into an event, keeping arrival order per link.
    #[must_use]
    pub fn read_event(&self) -> RawEvent {
        let records: Vec<RawRecord> = self
            .body()
            .par_chunks_exact(RAW_RECORD_SIZE)
            .map(RawRecord::decode)
            .collect();
        let mut event = RawEvent::new();
        for r in records {
            event.push(r.module, r.link, r.sample);
        }
        debug!(
            "read {} raw samples from {}",
            event.len(),
            self.reader.path().display()
        );
        event
    }

    /// Counts samples, links and rows per module.
    #[must_use]
    pub fn summary(&self) -> RawSummary {
        let mut links: BTreeMap<u16, (Vec<u16>, Vec<u16>)> = BTreeMap::new();
        let mut summary = RawSummary::default();
        for r in self.records() {
            summary.records += 1;
            let module = summary.modules.entry(r.module).or_default();
            module.samples += 1;
            module.max_amplitude = module.max_amplitude.max(r.sample.amplitude);
            let (l, rows) = links.entry(r.module).or_default();
            l.push(r.link);
            rows.push(r.sample.row);
        }
        for (module, (mut l, mut rows)) in links {
            l.sort_unstable();
            l.dedup();
            rows.sort_unstable();
            rows.dedup();
            if let Some(m) = summary.modules.get_mut(&module) {
                m.links = l.len();
                m.rows = rows.len();
            }
        }
        summary
    }
}

/// Writer for raw-stream files.
pub struct RawFileWriter {
    writer: BufWriter<File>,
    records: usize,
}

impl RawFileWriter {
    /// Creates a file and writes the header.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(RAW_MAGIC)?;
        Ok(Self { writer, records: 0 })
    }

    /// Appends one sample.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_sample(&mut self, module: u16, link: u16, sample: &RawSample) -> Result<()> {
        let record = RawRecord {
            module,
            link,
            sample: *sample,
        };
        self.writer.write_all(&record.encode())?;
        self.records += 1;
        Ok(())
    }

    /// Appends every sample of an event.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_event(&mut self, event: &RawEvent) -> Result<()> {
        for (module, link, sample) in event.iter() {
            self.write_sample(module, link, sample)?;
        }
        Ok(())
    }

    /// Number of records written so far.
    #[must_use]
    pub fn records(&self) -> usize {
        self.records
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
