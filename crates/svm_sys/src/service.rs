//! Clients of the privileged register service.

use log::{debug, error};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use svm_common::Address;
use svm_common::protocol::{Command, DRIVER_PATH, RegisterSnapshot, SNAPSHOT_LEN};
use svm_core::SvmError;
use svm_core::service::RegisterService;
use svm_driver::{Coprocessor, RegisterFile};

/// Register service reached through the driver's sysfs attribute.
///
/// The file is opened afresh for every read and every command, as sysfs
/// attributes are meant to be used.
#[derive(Debug, Clone)]
pub struct SysfsService {
    path: PathBuf,
}

impl Default for SysfsService {
    fn default() -> Self {
        Self::new(DRIVER_PATH)
    }
}

impl SysfsService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the driver's attribute exists.
    pub fn is_available(&self) -> bool {
        self.path.exists()
    }

    fn fail(&self, e: io::Error) -> SvmError {
        match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                error!("SVM driver not loaded ({}: {e})", self.path.display());
                SvmError::ServiceUnavailable
            }
            _ => {
                error!("SVM driver i/o failed ({}: {e})", self.path.display());
                SvmError::Io
            }
        }
    }
}

impl RegisterService for SysfsService {
    fn snapshot(&mut self) -> Result<RegisterSnapshot, SvmError> {
        let mut file = File::open(&self.path).map_err(|e| self.fail(e))?;
        let mut buf = [0u8; SNAPSHOT_LEN];
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(e)),
            }
        }
        RegisterSnapshot::from_bytes(&buf[..filled]).ok_or_else(|| {
            error!(
                "short read from {}: {filled} of {SNAPSHOT_LEN} bytes",
                self.path.display()
            );
            SvmError::ShortRead
        })
    }

    fn command(&mut self, command: Command, payload: Address) -> Result<(), SvmError> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| self.fail(e))?;
        let (buf, len) = command.encode(payload);
        file.write_all(&buf[..len]).map_err(|e| self.fail(e))?;
        debug!("{command:?}({payload:#010x}) sent to {}", self.path.display());
        Ok(())
    }
}

/// Register service answered by an in-process `RegisterFile`.
///
/// Requests still travel as the raw bytes of the sysfs protocol, so this
/// exercises the same encoding as the real driver.
pub struct LoopbackService<C> {
    file: RegisterFile<C>,
}

impl<C: Coprocessor> LoopbackService<C> {
    pub fn new(cpu: C) -> Self {
        Self {
            file: RegisterFile::new(cpu),
        }
    }

    pub fn register_file(&self) -> &RegisterFile<C> {
        &self.file
    }
}

impl<C: Coprocessor> RegisterService for LoopbackService<C> {
    fn snapshot(&mut self) -> Result<RegisterSnapshot, SvmError> {
        // sysfs hands `show` a full page.
        let mut page = [0u8; 4096];
        let len = self.file.show(&mut page);
        RegisterSnapshot::from_bytes(&page[..len]).ok_or(SvmError::ShortRead)
    }

    fn command(&mut self, command: Command, payload: Address) -> Result<(), SvmError> {
        let (buf, len) = command.encode(payload);
        if self.file.store(&buf[..len]) != len {
            return Err(SvmError::Io);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svm_core::service::translation_base;
    use svm_driver::{CoprocessorOp, SimulatedCoprocessor};

    #[test]
    fn missing_attribute_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = SysfsService::new(dir.path().join("svm_driver"));
        assert!(!service.is_available());
        assert_eq!(service.snapshot(), Err(SvmError::ServiceUnavailable));
        assert_eq!(
            service.command(Command::InvalidateTlb, 0),
            Err(SvmError::ServiceUnavailable)
        );
        assert_eq!(translation_base(&mut service), 0);
    }

    #[test]
    fn reads_snapshot_and_writes_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svm_driver");
        let snapshot = RegisterSnapshot {
            ttbcr: 0,
            ttbr0: 0x0010_404A,
            diagnostic: 0x12,
        };
        std::fs::write(&path, snapshot.to_bytes()).unwrap();

        let mut service = SysfsService::new(&path);
        assert_eq!(service.snapshot(), Ok(snapshot));

        service.command(Command::EnableCoherency, 0).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes[0], 0x01);
        // A one-byte command overwrites only the first byte.
        assert_eq!(&bytes[1..], &snapshot.to_bytes()[1..]);
    }

    #[test]
    fn short_attribute_is_a_short_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svm_driver");
        std::fs::write(&path, [1, 2, 3]).unwrap();
        assert_eq!(
            SysfsService::new(&path).snapshot(),
            Err(SvmError::ShortRead)
        );
    }

    #[test]
    fn loopback_drives_register_file() {
        let mut service = LoopbackService::new(SimulatedCoprocessor::new(0, 0x0020_0000));
        assert_eq!(translation_base(&mut service), 0x0020_0000);

        service.command(Command::InvalidateTlb, 0).unwrap();
        assert_eq!(service.snapshot().unwrap().diagnostic, 0x12);
        assert_eq!(
            service.register_file().coprocessor().ops(),
            &[CoprocessorOp::InvalidateTlb]
        );
    }
}
