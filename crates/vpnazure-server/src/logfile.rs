//! Reopenable log file writer.
//!
//! External rotation moves the active log file aside and signals the broker,
//! which reopens the configured path through this handle. The writer hands
//! out clones that all funnel into the currently open file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// A log file that can be reopened in place.
#[derive(Clone)]
pub struct LogFile {
    file: Arc<Mutex<File>>,
    path: PathBuf,
}

impl LogFile {
    /// Open the log file for appending, creating it when absent.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_path_buf(),
        })
    }

    /// Reopen the path non-appending. Called after an external rotation has
    /// moved the old file aside.
    pub fn reopen(&self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        *self.file.lock() = file;
        Ok(())
    }
}

/// Writer handle vended to the tracing subscriber.
pub struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter {
            file: self.file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_survive_reopen() {
        let path = std::env::temp_dir().join(format!("vpnazure-logfile-{}", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let log = LogFile::open(&path).unwrap();
        let mut w = log.make_writer();
        w.write_all(b"before rotation\n").unwrap();
        w.flush().unwrap();

        log.reopen().unwrap();
        let mut w = log.make_writer();
        w.write_all(b"after rotation\n").unwrap();
        w.flush().unwrap();

        // Reopening truncates: only post-rotation content remains.
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "after rotation\n");
        let _ = std::fs::remove_file(&path);
    }
}
