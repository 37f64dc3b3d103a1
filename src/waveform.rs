//! Per-channel waveform files consumed by the plotting step.
//!
//! Each file starts with a fixed header (title line, brightness line, blank line, column line) followed by one
//! `timestamp,level` line per transition. The title line is what the plot uses as the series title, so it must stay a single line.

use crate::channel::{ChannelConfig, ChannelId};
use crate::device::Level;
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One sample of a channel's trace: the level held from `timestamp_ms` until the next record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformRecord {
    pub timestamp_ms: u64,
    pub level: Level,
}

#[derive(Error, Debug)]
pub enum LogWriteError {
    #[error("failed to open waveform log of {channel} channel")]
    Open {
        channel: ChannelId,
        #[source]
        source: io::Error,
    },
    #[error("failed to append to waveform log of {channel} channel")]
    Append {
        channel: ChannelId,
        #[source]
        source: io::Error,
    },
}

impl LogWriteError {
    pub fn channel(&self) -> ChannelId {
        match self {
            LogWriteError::Open { channel, .. } | LogWriteError::Append { channel, .. } => *channel,
        }
    }
}

pub fn title_line(channel: ChannelId, config: &ChannelConfig) -> String {
    format!(
        "Frequency of {name} LED is: {}Hz & Duty Cycle of {name} LED is: {}%",
        config.frequency_hz(),
        config.duty_cycle_percent(),
        name = channel.name()
    )
}

pub fn header(channel: ChannelId, config: &ChannelConfig) -> String {
    format!(
        "{}\nBrightness of {name} LED is: {}%\n\n\
         The timestamp in Millisecond | The state of the {name} LED\n",
        title_line(channel, config),
        config.brightness_percent(),
        name = channel.name()
    )
}

/// Data line layout. The padding keeps the file readable in a spreadsheet and is ignored by gnuplot.
pub fn record_line(record: &WaveformRecord) -> String {
    format!(
        "              {}          ,             {}\n",
        record.timestamp_ms, record.level
    )
}

/// Where waveform logs are written to.
///
/// `open` is called once per channel per run and must return a writer positioned at the start of an empty log.
pub trait LogSink {
    type Writer: Write;

    fn open(&mut self, channel: ChannelId) -> io::Result<Self::Writer>;
}

/// Writes logs as `<color>_waveform_data.csv` files inside a directory, truncating any previous run.
#[derive(Debug, Clone)]
pub struct LogDirectory {
    dir: PathBuf,
}

impl LogDirectory {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_of(&self, channel: ChannelId) -> PathBuf {
        self.dir.join(channel.waveform_file_name())
    }
}

impl LogSink for LogDirectory {
    type Writer = LineWriter<File>;

    fn open(&mut self, channel: ChannelId) -> io::Result<Self::Writer> {
        File::create(self.path_of(channel)).map(LineWriter::new)
    }
}

/// Append-only waveform log of a single channel for the duration of one run.
///
/// The log degrades instead of failing: the first open or append error is kept, reported once,
/// and every later write for this channel is skipped.
pub struct WaveformLog<W: Write> {
    channel: ChannelId,
    writer: Option<W>,
    error: Option<LogWriteError>,
    records: usize,
}

impl<W: Write> WaveformLog<W> {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            writer: None,
            error: None,
            records: 0,
        }
    }

    /// Opens the channel's log through the sink, truncating it, and writes the header.
    ///
    /// Records appended before this call are dropped.
    pub fn write_header<S>(&mut self, sink: &mut S, config: &ChannelConfig)
    where
        S: LogSink<Writer = W>,
    {
        let channel = self.channel;

        match retry_transient(|| sink.open(channel)) {
            Ok(writer) => {
                self.writer = Some(writer);
                self.write(header(channel, config).as_bytes());
            }
            Err(source) => self.degrade(LogWriteError::Open { channel, source }),
        }
    }

    pub fn append(&mut self, record: &WaveformRecord) {
        if self.write(record_line(record).as_bytes()) {
            self.records += 1;
        }
    }

    /// Flushes and closes the log, handing back the degradation error if there was one.
    pub fn finish(mut self) -> Option<LogWriteError> {
        if let Some(mut writer) = self.writer.take() {
            if let Err(source) = retry_transient(|| writer.flush()) {
                self.degrade(LogWriteError::Append {
                    channel: self.channel,
                    source,
                });
            }
        }
        self.error
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => return false,
        };

        match retry_transient(|| writer.write_all(bytes)) {
            Ok(()) => true,
            Err(source) => {
                let channel = self.channel;
                self.degrade(LogWriteError::Append { channel, source });
                false
            }
        }
    }

    fn degrade(&mut self, err: LogWriteError) {
        self.writer = None;
        if self.error.is_none() {
            log::warn!(
                "{}; continuing without its waveform: {}",
                err,
                error_source(&err)
            );
            self.error = Some(err);
        }
    }
}

fn error_source(err: &LogWriteError) -> &io::Error {
    match err {
        LogWriteError::Open { source, .. } | LogWriteError::Append { source, .. } => source,
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Runs `op` and retries it once if the first attempt failed with a transient error.
fn retry_transient<T, F>(mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    match op() {
        Err(err) if is_transient(&err) => {
            log::debug!("retrying waveform write after transient error: {}", err);
            op()
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Buffer(Rc<RefCell<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BufferSink(Buffer);

    impl LogSink for BufferSink {
        type Writer = Buffer;

        fn open(&mut self, _channel: ChannelId) -> io::Result<Buffer> {
            Ok(self.0.clone())
        }
    }

    /// Fails every write with the given kind, up to `failures` times.
    struct Flaky {
        kind: io::ErrorKind,
        failures: usize,
        inner: Buffer,
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::new(self.kind, "disk hiccup"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FlakySink(Option<Flaky>);

    impl LogSink for FlakySink {
        type Writer = Flaky;

        fn open(&mut self, _channel: ChannelId) -> io::Result<Flaky> {
            self.0
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }
    }

    fn config() -> ChannelConfig {
        ChannelConfig::new(5, 50, 80).unwrap()
    }

    fn record(timestamp_ms: u64, level: Level) -> WaveformRecord {
        WaveformRecord {
            timestamp_ms,
            level,
        }
    }

    fn text(buffer: &Buffer) -> String {
        String::from_utf8(buffer.0.borrow().clone()).unwrap()
    }

    #[test]
    fn file_layout_matches_plot_input() {
        let buffer = Buffer::default();
        let mut log = WaveformLog::new(ChannelId::Green);
        log.write_header(&mut BufferSink(buffer.clone()), &config());
        log.append(&record(10_000, Level::Low));
        log.append(&record(10_100, Level::High));
        assert!(log.finish().is_none());

        assert_eq!(
            text(&buffer),
            "Frequency of Green LED is: 5Hz & Duty Cycle of Green LED is: 50%\n\
             Brightness of Green LED is: 80%\n\
             \n\
             The timestamp in Millisecond | The state of the Green LED\n\
             \x20             10000          ,             0\n\
             \x20             10100          ,             1\n"
        );
    }

    #[test]
    fn header_is_written_once() {
        let buffer = Buffer::default();
        let mut log = WaveformLog::new(ChannelId::Red);
        log.write_header(&mut BufferSink(buffer.clone()), &config());
        for step in 0..50 {
            log.append(&record(10_000 + step * 100, Level::Low));
        }
        assert_eq!(log.records(), 50);
        log.finish();

        let text = text(&buffer);
        assert_eq!(text.matches("Frequency of Red LED").count(), 1);
        assert!(text.starts_with("Frequency of Red LED"));
    }

    #[test]
    fn transient_write_error_is_retried_once() {
        let inner = Buffer::default();
        let mut sink = FlakySink(Some(Flaky {
            kind: io::ErrorKind::WouldBlock,
            failures: 1,
            inner: inner.clone(),
        }));

        let mut log = WaveformLog::new(ChannelId::Green);
        log.write_header(&mut sink, &config());
        assert!(!log.is_degraded());
        assert!(log.finish().is_none());
        assert!(text(&inner).starts_with("Frequency of Green LED"));
    }

    #[test]
    fn persistent_write_error_degrades_log() {
        let inner = Buffer::default();
        let mut sink = FlakySink(Some(Flaky {
            kind: io::ErrorKind::Other,
            failures: 1,
            inner: inner.clone(),
        }));

        let mut log = WaveformLog::new(ChannelId::Green);
        log.write_header(&mut sink, &config());
        assert!(log.is_degraded());
        log.append(&record(10_000, Level::Low));
        assert_eq!(log.records(), 0);

        let err = log.finish().unwrap();
        assert_eq!(err.channel(), ChannelId::Green);
        assert!(matches!(err, LogWriteError::Append { .. }));
        assert!(text(&inner).is_empty());
    }

    #[test]
    fn open_failure_is_reported_as_open_error() {
        let mut sink = FlakySink(None);
        let mut log = WaveformLog::new(ChannelId::Red);
        log.write_header(&mut sink, &config());
        log.append(&record(10_000, Level::Low));

        let err = log.finish().unwrap();
        assert_eq!(err.channel(), ChannelId::Red);
        assert!(matches!(err, LogWriteError::Open { .. }));
    }

    #[test]
    fn log_directory_truncates_previous_run() {
        let dir = std::env::temp_dir().join(format!("blink-trace-waveform-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut sink = LogDirectory::new(&dir);

        for run in 0..2 {
            let mut log = WaveformLog::new(ChannelId::Green);
            log.write_header(&mut sink, &config());
            log.append(&record(10_000 + run, Level::Low));
            assert!(log.finish().is_none());
        }

        let text = std::fs::read_to_string(sink.path_of(ChannelId::Green)).unwrap();
        assert_eq!(text.matches("Frequency of Green LED").count(), 1);
        assert!(text.ends_with("              10001          ,             0\n"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
