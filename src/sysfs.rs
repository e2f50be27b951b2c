/*
 * This file is part of hwmond.
 *
 * Copyright (C) 2025 hwmond contributors
 *
 * hwmond is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * hwmond is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with hwmond. If not, see <https://www.gnu.org/licenses/>.
 */

//! Sysfs attribute paths and retrying attribute I/O.
//!
//! Hwmon device drivers can be unbound at any time, so every read and
//! write treats ENOENT/ENODEV as "the device is gone" and exits the
//! process cleanly rather than propagating an error nobody can act on.
//! Everything else is retried on a per-call budget before a typed
//! failure carrying the errno and the failing path is returned.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use crate::logger;

/// Default retry budget, from driver-quiescence observations on running
/// systems.
pub const RETRIES: usize = 10;
pub const DELAY: Duration = Duration::from_millis(100);

/// Compose `<root>/<type><id>_<entry>`. Pure string assembly, no I/O.
pub fn attribute_path(root: &Path, hwmon_type: &str, id: &str, entry: &str) -> PathBuf {
    root.join(format!("{}{}_{}", hwmon_type, id, entry))
}

/// Compose `<root>/<type><id>`, the entry-less form used by pwm files.
pub fn instance_path(root: &Path, hwmon_type: &str, id: &str) -> PathBuf {
    root.join(format!("{}{}", hwmon_type, id))
}

fn io_path(root: &Path, hwmon_type: &str, id: &str, entry: &str) -> PathBuf {
    if entry.is_empty() {
        instance_path(root, hwmon_type, id)
    } else {
        attribute_path(root, hwmon_type, id, entry)
    }
}

#[derive(Error, Debug)]
pub enum SysfsError {
    #[error("read of {path} failed: errno {errno}")]
    ReadFailure { errno: i32, path: String },
    #[error("write of {path} failed: errno {errno}")]
    WriteFailure { errno: i32, path: String },
}

impl SysfsError {
    pub fn errno(&self) -> i32 {
        match self {
            SysfsError::ReadFailure { errno, .. } => *errno,
            SysfsError::WriteFailure { errno, .. } => *errno,
        }
    }
}

fn errno_of(err: &io::Error) -> i32 {
    // Parse failures carry no OS errno; report them as I/O errors.
    err.raw_os_error().unwrap_or(libc::EIO)
}

pub fn is_device_gone(errno: i32) -> bool {
    errno == libc::ENOENT || errno == libc::ENODEV
}

/// The driver was unbound underneath us. The daemon has nothing left to
/// monitor, so a clean exit is the correct outcome.
fn exit_device_gone(path: &Path, errno: i32) -> ! {
    logger::log_event(
        "device_gone",
        json!({ "file": path.display().to_string(), "errno": errno }),
    );
    std::process::exit(0);
}

/// Attribute I/O seam; mocked in tests of the factory and target writers.
#[cfg_attr(test, mockall::automock)]
pub trait SysfsIo {
    /// Read and parse one attribute as a signed decimal integer.
    fn read(
        &self,
        hwmon_type: &str,
        id: &str,
        entry: &str,
        retries: usize,
        delay: Duration,
    ) -> Result<i64, SysfsError>;

    /// Write one attribute as decimal text.
    fn write(
        &self,
        value: u64,
        hwmon_type: &str,
        id: &str,
        entry: &str,
        retries: usize,
        delay: Duration,
    ) -> Result<(), SysfsError>;

    /// The hwmon instance root this handle operates on.
    fn instance(&self) -> PathBuf;
}

/// Attribute I/O against one hwmon instance directory.
#[derive(Debug, Clone)]
pub struct HwmonIO {
    path: PathBuf,
}

impl HwmonIO {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        HwmonIO { path: path.into() }
    }
}

fn read_i64(path: &Path) -> io::Result<i64> {
    let raw = fs::read_to_string(path)?;
    raw.trim()
        .parse::<i64>()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "not a decimal integer"))
}

impl SysfsIo for HwmonIO {
    fn read(
        &self,
        hwmon_type: &str,
        id: &str,
        entry: &str,
        retries: usize,
        delay: Duration,
    ) -> Result<i64, SysfsError> {
        let path = io_path(&self.path, hwmon_type, id, entry);
        let mut attempt = 0;
        loop {
            match read_i64(&path) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let errno = errno_of(&e);
                    if is_device_gone(errno) {
                        exit_device_gone(&path, errno);
                    }
                    if attempt >= retries {
                        return Err(SysfsError::ReadFailure {
                            errno,
                            path: path.display().to_string(),
                        });
                    }
                }
            }
            attempt += 1;
            thread::sleep(delay);
        }
    }

    fn write(
        &self,
        value: u64,
        hwmon_type: &str,
        id: &str,
        entry: &str,
        retries: usize,
        delay: Duration,
    ) -> Result<(), SysfsError> {
        let path = io_path(&self.path, hwmon_type, id, entry);
        let mut attempt = 0;
        loop {
            match fs::write(&path, value.to_string()) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let errno = errno_of(&e);
                    if is_device_gone(errno) {
                        exit_device_gone(&path, errno);
                    }
                    if attempt >= retries {
                        return Err(SysfsError::WriteFailure {
                            errno,
                            path: path.display().to_string(),
                        });
                    }
                }
            }
            attempt += 1;
            thread::sleep(delay);
        }
    }

    fn instance(&self) -> PathBuf {
        self.path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_attribute_path_form() {
        let p = attribute_path(Path::new("/sys/class/hwmon/hwmon0"), "temp", "1", "input");
        assert_eq!(p, PathBuf::from("/sys/class/hwmon/hwmon0/temp1_input"));
    }

    #[test]
    fn test_instance_path_form() {
        let p = instance_path(Path::new("/sys/class/hwmon/hwmon0"), "pwm", "3");
        assert_eq!(p, PathBuf::from("/sys/class/hwmon/hwmon0/pwm3"));
    }

    #[test]
    fn test_paths_are_distinct_per_component() {
        // Distinct inputs must give distinct paths when no component
        // contains '/' or '_'.
        let root = Path::new("/r");
        let a = attribute_path(root, "temp", "1", "input");
        let b = attribute_path(root, "temp", "11", "input");
        let c = attribute_path(root, "temp", "1", "min");
        let d = attribute_path(root, "fan", "1", "input");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_read_parses_decimal_with_newline() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("temp1_input"), "42000\n").unwrap();
        let io = HwmonIO::new(dir.path());
        let v = io
            .read("temp", "1", "input", 0, Duration::from_millis(0))
            .unwrap();
        assert_eq!(v, 42000);
    }

    #[test]
    fn test_read_parses_signed_and_padded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("temp2_input"), "  -1250 \n").unwrap();
        let io = HwmonIO::new(dir.path());
        let v = io
            .read("temp", "2", "input", 0, Duration::from_millis(0))
            .unwrap();
        assert_eq!(v, -1250);
    }

    #[test]
    fn test_read_entryless_pwm_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pwm1"), "128").unwrap();
        let io = HwmonIO::new(dir.path());
        let v = io.read("pwm", "1", "", 0, Duration::from_millis(0)).unwrap();
        assert_eq!(v, 128);
    }

    #[test]
    fn test_read_failure_reports_errno_and_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("temp1_input"), "garbage").unwrap();
        let io = HwmonIO::new(dir.path());
        let err = io
            .read("temp", "1", "input", 1, Duration::from_millis(1))
            .unwrap_err();
        match err {
            SysfsError::ReadFailure { errno, path } => {
                assert_eq!(errno, libc::EIO);
                assert!(path.ends_with("temp1_input"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("fan1_target"), "0").unwrap();
        let io = HwmonIO::new(dir.path());
        io.write(3000, "fan", "1", "target", 0, Duration::from_millis(0))
            .unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("fan1_target")).unwrap(),
            "3000"
        );
    }

    #[test]
    fn test_write_failure_on_unwritable_dir() {
        let dir = TempDir::new().unwrap();
        // Target is a directory, so the write fails with EISDIR.
        fs::create_dir(dir.path().join("pwm1")).unwrap();
        let io = HwmonIO::new(dir.path());
        let err = io
            .write(1, "pwm", "1", "", 0, Duration::from_millis(0))
            .unwrap_err();
        match err {
            SysfsError::WriteFailure { path, .. } => assert!(path.ends_with("pwm1")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_device_gone_classification() {
        assert!(is_device_gone(libc::ENOENT));
        assert!(is_device_gone(libc::ENODEV));
        assert!(!is_device_gone(libc::EIO));
        assert!(!is_device_gone(libc::EAGAIN));
    }

    #[test]
    fn test_sysfs_error_errno_accessor() {
        let e = SysfsError::ReadFailure {
            errno: libc::EAGAIN,
            path: "/x".into(),
        };
        assert_eq!(e.errno(), libc::EAGAIN);
    }
}
