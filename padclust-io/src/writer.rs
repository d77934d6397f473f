//! Cluster file writers.

use crate::Result;
use padclust_core::{Cluster, ClusterSink};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Size of one binary cluster record in bytes.
///
/// Layout: u16 module, u16 row, f32 pad, f32 time bin, f32 q, f32 q_max,
/// f32 sigma_y2, f32 sigma_z2, i16 type code, f32 x, f32 y, f32 z,
/// 3 × i32 labels. Missing coordinates are written as NaN.
pub const BINARY_CLUSTER_SIZE: usize = 54;

const CSV_HEADER: &str =
    "module,row,pad,time_bin,q,q_max,sigma_y2,sigma_z2,type,x,y,z,label0,label1,label2";

/// Cluster output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    Binary,
}

impl OutputFormat {
    /// Picks the format from the file extension: `.bin` is binary,
    /// anything else CSV.
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bin") => Self::Binary,
            _ => Self::Csv,
        }
    }
}

/// Streams clusters to a file as rows are flushed.
pub struct ClusterFileWriter {
    writer: BufWriter<File>,
    format: OutputFormat,
    written: usize,
}

impl ClusterFileWriter {
    /// Creates the output file; CSV output starts with a header line.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, format: OutputFormat) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        if format == OutputFormat::Csv {
            writeln!(writer, "{CSV_HEADER}")?;
        }
        Ok(Self {
            writer,
            format,
            written: 0,
        })
    }

    /// Number of clusters written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Writes one cluster.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_cluster(&mut self, c: &Cluster) -> Result<()> {
        match self.format {
            OutputFormat::Csv => self.write_csv(c)?,
            OutputFormat::Binary => self.write_binary(c)?,
        }
        self.written += 1;
        Ok(())
    }

    fn write_csv(&mut self, c: &Cluster) -> std::io::Result<()> {
        write!(
            self.writer,
            "{},{},{},{},{},{},{},{},{},",
            c.module,
            c.row,
            c.pad,
            c.time_bin,
            c.q,
            c.q_max,
            c.sigma_y2,
            c.sigma_z2,
            c.type_code()
        )?;
        match c.position {
            Some(p) => write!(self.writer, "{},{},{},", p.x, p.y, p.z)?,
            None => write!(self.writer, ",,,")?,
        }
        writeln!(
            self.writer,
            "{},{},{}",
            c.labels[0], c.labels[1], c.labels[2]
        )
    }

    fn write_binary(&mut self, c: &Cluster) -> std::io::Result<()> {
        let mut record = Vec::with_capacity(BINARY_CLUSTER_SIZE);
        record.extend_from_slice(&c.module.to_le_bytes());
        record.extend_from_slice(&c.row.to_le_bytes());
        for v in [c.pad, c.time_bin, c.q, c.q_max, c.sigma_y2, c.sigma_z2] {
            record.extend_from_slice(&v.to_le_bytes());
        }
        record.extend_from_slice(&c.type_code().to_le_bytes());
        let (x, y, z) = c.position.map_or((f32::NAN, f32::NAN, f32::NAN), |p| (p.x, p.y, p.z));
        for v in [x, y, z] {
            record.extend_from_slice(&v.to_le_bytes());
        }
        for label in c.labels {
            record.extend_from_slice(&label.to_le_bytes());
        }
        self.writer.write_all(&record)
    }

    /// Flushes buffered output and returns the cluster count.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

impl ClusterSink for ClusterFileWriter {
    fn flush_row(
        &mut self,
        _module: u16,
        _row: u16,
        clusters: &mut Vec<Cluster>,
    ) -> padclust_core::Result<()> {
        for c in clusters.drain(..) {
            self.write_cluster(&c).map_err(padclust_core::Error::from)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use padclust_core::{ClusterType, SpacePoint, NO_LABEL};
    use tempfile::NamedTempFile;

    fn clusters() -> Vec<Cluster> {
        let mut unfolded = Cluster::new(1, 2, 10.5, 100.25, 80.0, 30.0)
            .with_shape(0.1, 0.05)
            .with_kind(ClusterType::Unfolded { overlap: 12 });
        unfolded.position = Some(SpacePoint {
            x: 85.0,
            y: -3.5,
            z: 200.0,
        });
        unfolded.labels = [7, NO_LABEL, NO_LABEL];
        let mut edge = Cluster::new(1, 2, 0.2, 40.0, 20.0, 10.0);
        edge.edge = true;
        vec![unfolded, edge]
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(OutputFormat::from_path("out.bin"), OutputFormat::Binary);
        assert_eq!(OutputFormat::from_path("out.BIN"), OutputFormat::Binary);
        assert_eq!(OutputFormat::from_path("out.csv"), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path("out"), OutputFormat::Csv);
    }

    #[test]
    fn test_write_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = ClusterFileWriter::create(file.path(), OutputFormat::Csv).unwrap();
        writer.flush_row(1, 2, &mut clusters()).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "1,2,10.5,100.25,80,30,0.1,0.05,16,85,-3.5,200,7,-1,-1"
        );
        assert_eq!(lines[2], "1,2,0.2,40,20,10,0,0,-3,,,,-1,-1,-1");
    }

    #[test]
    fn test_write_binary() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = ClusterFileWriter::create(file.path(), OutputFormat::Binary).unwrap();
        writer.flush_row(1, 2, &mut clusters()).unwrap();
        writer.finish().unwrap();

        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(data.len(), 2 * BINARY_CLUSTER_SIZE);
        let code = i16::from_le_bytes([data[28], data[29]]);
        assert_eq!(code, 16);
        let second = &data[BINARY_CLUSTER_SIZE..];
        assert_eq!(i16::from_le_bytes([second[28], second[29]]), -3);
        let x = f32::from_le_bytes([second[30], second[31], second[32], second[33]]);
        assert!(x.is_nan());
    }
}
