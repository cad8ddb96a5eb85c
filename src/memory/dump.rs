//! Physical memory images (raw or LiME format) mapped from disk
use crate::error::ScanError;
use crate::memory::{frame_address, MemoryRegion, Page, PhysicalMemory, PAGE_SIZE};
use crate::paging::PagingRoot;
use log::{debug, info, warn};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

// Bytes [0x45, 0x4D, 0x69, 0x4C] ("EMiL") read as little-endian u32
const LIME_MAGIC: u32 = 0x4C694D45;
const LIME_HEADER_SIZE: usize = 32;

/// A memory-mapped physical memory image.
///
/// Raw images are addressed directly (file offset == physical address).
/// LiME images carry a 32-byte header before each captured range.
pub struct DumpMemory {
    mapped: Mmap,
    regions: Vec<MemoryRegion>,
    root: PagingRoot,
    _file: File,
}

impl DumpMemory {
    /// Map the image at `path`. Failure to open or map is fatal for the run.
    pub fn open(path: &Path, root: PagingRoot) -> Result<Self, ScanError> {
        let unavailable = |source| ScanError::DriverUnavailable {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(unavailable)?;
        // The image is opened read-only and is not expected to change while mapped.
        let mapped = unsafe { Mmap::map(&file) }.map_err(unavailable)?;

        let regions = if is_lime(&mapped) {
            match parse_lime_header(&mapped) {
                Some(regions) => {
                    info!("LiME image with {} region(s)", regions.len());
                    for (i, region) in regions.iter().enumerate() {
                        debug!(
                            "Region {}: Start: 0x{:x}, End: 0x{:x}, FileOffset: {}",
                            i, region.start, region.end, region.file_offset
                        );
                    }
                    regions
                }
                None => {
                    warn!("LiME magic found but no regions parsed; treating image as raw");
                    raw_regions(mapped.len())
                }
            }
        } else {
            info!("No LiME header found; assuming raw physical image");
            raw_regions(mapped.len())
        };

        Ok(DumpMemory {
            mapped,
            regions,
            root,
            _file: file,
        })
    }

    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    fn page_offset(&self, address: u64) -> Option<usize> {
        let last = address.checked_add(PAGE_SIZE as u64 - 1)?;
        let region = self
            .regions
            .iter()
            .find(|region| region.contains(address) && region.contains(last))?;
        let offset = usize::try_from(region.file_offset_of(address)?).ok()?;
        if offset.checked_add(PAGE_SIZE)? <= self.mapped.len() {
            Some(offset)
        } else {
            None
        }
    }
}

impl PhysicalMemory for DumpMemory {
    fn paging_root(&self) -> PagingRoot {
        self.root
    }

    fn read_physical_page(&self, frame: u64) -> Result<Page, ScanError> {
        let offset = frame_address(frame)
            .and_then(|address| self.page_offset(address))
            .ok_or_else(|| ScanError::PhysicalRead {
                frame,
                reason: "frame not captured in image".to_string(),
            })?;

        let mut page = [0u8; PAGE_SIZE];
        page.copy_from_slice(&self.mapped[offset..offset + PAGE_SIZE]);
        Ok(page)
    }
}

fn raw_regions(len: usize) -> Vec<MemoryRegion> {
    if len == 0 {
        return Vec::new();
    }
    vec![MemoryRegion {
        start: 0,
        end: len as u64 - 1,
        file_offset: 0,
    }]
}

fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u64_le(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

/// Check if the beginning of the image is the LiME signature.
pub fn is_lime(data: &[u8]) -> bool {
    read_u32_le(data, 0) == Some(LIME_MAGIC)
}

/// Parse the chain of LiME segment headers.
///
/// Each header is 32 bytes: magic (u32), version (u32), start (u64),
/// end (u64, inclusive), reserved (u64). The captured bytes follow directly.
pub fn parse_lime_header(data: &[u8]) -> Option<Vec<MemoryRegion>> {
    let mut regions = Vec::new();
    let mut offset = 0usize;

    while offset
        .checked_add(LIME_HEADER_SIZE)
        .is_some_and(|header_end| header_end <= data.len())
    {
        if read_u32_le(data, offset) != Some(LIME_MAGIC) {
            break;
        }
        let start = read_u64_le(data, offset + 8)?;
        let end = read_u64_le(data, offset + 16)?;
        let Some(size) = end.checked_sub(start).and_then(|len| len.checked_add(1)) else {
            warn!("Malformed LiME segment at offset {}: end before start", offset);
            break;
        };

        let file_offset = (offset + LIME_HEADER_SIZE) as u64;
        regions.push(MemoryRegion {
            start,
            end,
            file_offset,
        });

        let Some(next) = usize::try_from(size)
            .ok()
            .and_then(|size| LIME_HEADER_SIZE.checked_add(size))
            .and_then(|span| offset.checked_add(span))
        else {
            break;
        };
        offset = next;
    }

    if regions.is_empty() {
        None
    } else {
        Some(regions)
    }
}
