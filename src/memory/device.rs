//! Live physical memory through a character device such as /dev/mem
use crate::error::ScanError;
use crate::memory::{frame_address, Page, PhysicalMemory, PAGE_SIZE};
use crate::paging::PagingRoot;
use log::{debug, info};
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// A session on a physical memory device.
///
/// The device handle is opened once and closed when the value is dropped,
/// including on early error returns.
pub struct DeviceMemory {
    path: PathBuf,
    file: File,
    root: PagingRoot,
}

impl DeviceMemory {
    pub fn open(path: &Path, root: PagingRoot) -> Result<Self, ScanError> {
        let file = File::open(path).map_err(|source| ScanError::DriverUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Opened physical memory device {}", path.display());
        Ok(DeviceMemory {
            path: path.to_path_buf(),
            file,
            root,
        })
    }
}

impl PhysicalMemory for DeviceMemory {
    fn paging_root(&self) -> PagingRoot {
        self.root
    }

    fn read_physical_page(&self, frame: u64) -> Result<Page, ScanError> {
        let address = frame_address(frame).ok_or_else(|| ScanError::PhysicalRead {
            frame,
            reason: "frame number out of range".to_string(),
        })?;
        let mut page = [0u8; PAGE_SIZE];
        self.file
            .read_exact_at(&mut page, address)
            .map_err(|e| ScanError::PhysicalRead {
                frame,
                reason: e.to_string(),
            })?;
        Ok(page)
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        debug!("Closing physical memory device {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_positioned_reads() -> Result<(), Box<dyn std::error::Error>> {
        let mut temp_file = NamedTempFile::new()?;
        let mut data = vec![0u8; PAGE_SIZE * 3];
        data[PAGE_SIZE * 2] = 0x7f;
        temp_file.write_all(&data)?;
        temp_file.flush()?;

        let device = DeviceMemory::open(temp_file.path(), PagingRoot::new(0x2000))?;
        assert_eq!(device.paging_root().frame(), 2);
        assert_eq!(device.read_physical_page(2)?[0], 0x7f);
        // Past the end of the backing file
        assert!(matches!(
            device.read_physical_page(3),
            Err(ScanError::PhysicalRead { frame: 3, .. })
        ));
        Ok(())
    }
}
