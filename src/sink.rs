//! Output sinks for completed sample batches.
//!
//! The poller hands every flushed batch to an [`OutputSink`]. Two sinks are
//! provided:
//!
//! - [`ConsoleSink`] prints samples to a terminal (or any writer)
//! - [`CsvLogSink`] appends samples to a CSV log file, optionally one file
//!   per day
//!
//! # CSV layout
//!
//! A new log file starts with a preamble describing what was polled:
//!
//! ```text
//! "address","type","format","description","unit"
//! "30775","S32","FIX0","AC power","W"
//! --------------------------------------------------
//! time,AC power (W)
//! 2016-06-04 12:00:00,1830
//! ```
//!
//! Files that already hold data are appended to without a new preamble. A
//! null value is written as an empty field.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::{QuoteStyle, WriterBuilder};
use tracing::{debug, info, warn};

use crate::descriptor::DescriptorTable;
use crate::error::{MonitorError, Result};
use crate::sample::SampleVector;

/// Separator line between the descriptor block and the data in a CSV log.
const PREAMBLE_SEPARATOR: &str = "--------------------------------------------------";

/// Destination of flushed sample batches.
pub trait OutputSink {
    /// Writes a batch of samples in order.
    ///
    /// # Errors
    ///
    /// Returns an error of class [`Write`](crate::ErrorClass::Write) if the
    /// batch could not be stored; the caller keeps the batch for a retry.
    fn write(&mut self, batch: &[SampleVector]) -> Result<()>;
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn write(&mut self, batch: &[SampleVector]) -> Result<()> {
        (**self).write(batch)
    }
}

/// Prints samples as comma-separated lines.
///
/// A table with a single descriptor prints `time description value unit`
/// instead, which reads better when watching one register.
pub struct ConsoleSink<W: Write = io::Stdout> {
    writer: W,
    single: Option<(String, String)>,
}

impl ConsoleSink<io::Stdout> {
    /// Creates a sink printing to standard output.
    pub fn stdout(table: &DescriptorTable) -> Self {
        Self::new(io::stdout(), table)
    }
}

impl<W: Write> ConsoleSink<W> {
    /// Creates a sink printing to `writer`.
    pub fn new(writer: W, table: &DescriptorTable) -> Self {
        let single = match table.len() {
            1 => table
                .get(0)
                .map(|d| (d.description.clone(), d.unit.clone())),
            _ => None,
        };
        Self { writer, single }
    }

    /// Consumes the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, sample: &SampleVector) -> io::Result<()> {
        match (&self.single, sample.values()) {
            (Some((description, unit)), [value]) => {
                let line = [
                    sample.timestamp_string(),
                    description.clone(),
                    value.to_string(),
                    unit.clone(),
                ]
                .iter()
                .filter(|part| !part.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
                writeln!(self.writer, "{}", line)
            }
            _ => writeln!(self.writer, "{}", sample.to_record().join(", ")),
        }
    }
}

impl<W: Write> OutputSink for ConsoleSink<W> {
    fn write(&mut self, batch: &[SampleVector]) -> Result<()> {
        let to_error = |e: io::Error| MonitorError::write("console", e.to_string());
        for (written, sample) in batch.iter().enumerate() {
            self.write_line(sample)
                .map_err(|e| MonitorError::partial_write(written, to_error(e)))?;
        }
        self.writer.flush().map_err(to_error)
    }
}

impl<W: Write> std::fmt::Debug for ConsoleSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink")
            .field("single", &self.single)
            .finish()
    }
}

/// Appends samples to a CSV log file.
#[derive(Debug, Clone)]
pub struct CsvLogSink {
    path: PathBuf,
    daily: bool,
    table: DescriptorTable,
}

impl CsvLogSink {
    /// Creates a sink appending to `path`.
    ///
    /// The table is used for the preamble of new files.
    pub fn new(path: impl Into<PathBuf>, table: DescriptorTable) -> Self {
        Self {
            path: path.into(),
            daily: false,
            table,
        }
    }

    /// Starts a new file for every calendar day.
    ///
    /// The sample date is inserted before the extension:
    /// `log.csv` becomes `log_2016-06-04.csv`.
    pub fn with_daily_files(mut self, daily: bool) -> Self {
        self.daily = daily;
        self
    }

    /// Returns the configured base path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file samples taken on `date` are written to.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use modbus_monitor::{CsvLogSink, DescriptorTable};
    /// use std::path::Path;
    ///
    /// let date = NaiveDate::from_ymd_opt(2016, 6, 4).unwrap();
    /// let sink = CsvLogSink::new("logs/pv.csv", DescriptorTable::default());
    /// assert_eq!(sink.path_for(date), Path::new("logs/pv.csv"));
    ///
    /// let sink = sink.with_daily_files(true);
    /// assert_eq!(sink.path_for(date), Path::new("logs/pv_2016-06-04.csv"));
    /// ```
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        if !self.daily {
            return self.path.clone();
        }

        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{}_{}.{}", stem, date, ext.to_string_lossy()),
            None => format!("{}_{}", stem, date),
        };
        self.path.with_file_name(name)
    }

    /// Opens (creating if needed) today's log file and writes the preamble
    /// if it is empty, so a bad path is reported before polling starts.
    pub fn probe(&self) -> Result<PathBuf> {
        let path = self.path_for(chrono::Local::now().date_naive());
        self.open(&path)?;
        Ok(path)
    }

    /// Opens `path` for appending, writing the preamble into an empty file.
    fn open(&self, path: &Path) -> Result<File> {
        let to_error =
            |e: io::Error| MonitorError::write(path.display().to_string(), e.to_string());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(to_error)?;

        if file.metadata().map_err(to_error)?.len() == 0 {
            self.write_preamble(&mut file).map_err(|e| match e {
                MonitorError::Io(e) => to_error(e),
                other => other,
            })?;
            info!(path = %path.display(), "started new log file");
        }
        Ok(file)
    }

    /// Writes the preamble into an empty file. A failed write leaves the
    /// file empty again, so the next open starts over.
    fn write_preamble<F: LogFile>(&self, file: &mut F) -> Result<()> {
        let preamble = self.render_preamble()?;
        write_all_or_rollback(file, &preamble)?;
        Ok(())
    }

    fn render_preamble(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();

        let mut table_writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(&mut buf);
        table_writer.write_record(["address", "type", "format", "description", "unit"])?;
        for descriptor in &self.table {
            table_writer.write_record([
                descriptor.address.to_string(),
                descriptor.element_type.to_string(),
                descriptor.format.to_string(),
                descriptor.description.clone(),
                descriptor.unit.clone(),
            ])?;
        }
        table_writer.flush()?;
        drop(table_writer);

        writeln!(buf, "{}", PREAMBLE_SEPARATOR)?;

        let mut header_writer = WriterBuilder::new().from_writer(&mut buf);
        let header = std::iter::once("time".to_string()).chain(self.table.column_headers());
        header_writer.write_record(header)?;
        header_writer.flush()?;
        drop(header_writer);

        Ok(buf)
    }

    /// Appends all samples to `path`, or none of them.
    fn append(&self, path: &Path, samples: &[SampleVector]) -> Result<()> {
        let rows = render_rows(samples)?;
        let mut file = self.open(path)?;
        write_all_or_rollback(&mut file, &rows)
            .map_err(|e| MonitorError::write(path.display().to_string(), e.to_string()))?;
        debug!(path = %path.display(), samples = samples.len(), "appended samples");
        Ok(())
    }
}

fn render_rows(samples: &[SampleVector]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut writer = WriterBuilder::new().flexible(true).from_writer(&mut buf);
    for sample in samples {
        writer.write_record(sample.to_record())?;
    }
    writer.flush()?;
    drop(writer);
    Ok(buf)
}

/// Log file that can be cut back to an earlier length.
trait LogFile: Write {
    fn size(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Writes `bytes` at the end of `file`. On failure the file is cut back to
/// its previous length so no partial row or preamble is left behind.
fn write_all_or_rollback<F: LogFile>(file: &mut F, bytes: &[u8]) -> io::Result<()> {
    let start = file.size()?;
    if let Err(e) = file.write_all(bytes).and_then(|()| file.flush()) {
        if let Err(rollback) = file.truncate_to(start) {
            warn!(error = %rollback, len = start, "could not remove partial write");
        }
        return Err(e);
    }
    Ok(())
}

impl OutputSink for CsvLogSink {
    fn write(&mut self, batch: &[SampleVector]) -> Result<()> {
        // Consecutive samples of the same day go to the same file.
        let mut start = 0;
        while start < batch.len() {
            let date = batch[start].timestamp().date();
            let end = batch[start..]
                .iter()
                .position(|s| s.timestamp().date() != date)
                .map_or(batch.len(), |offset| start + offset);
            // Days before this one are already stored.
            self.append(&self.path_for(date), &batch[start..end])
                .map_err(|e| MonitorError::partial_write(start, e))?;
            start = end;
        }
        Ok(())
    }
}
