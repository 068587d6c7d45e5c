//! OS-assisted translation through `/proc/self/pagemap` and the process
//! memory layout report.
//!
//! The pagemap holds one 64-bit entry per virtual page: bit 63 is "present"
//! and bits 54..0 are the page frame number. Frame numbers are only visible
//! to privileged processes.

use crate::error::{SysError, SysResult};
use log::warn;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use svm_common::Address;
use svm_common::geometry::{PAGE_OFFSET_MASK, PAGE_SIZE};
use svm_core::SvmError;
use svm_core::translate::FrameLookup;

pub const SELF_PAGEMAP: &str = "/proc/self/pagemap";
pub const SELF_MAPS: &str = "/proc/self/maps";

const ENTRY_BYTES: u64 = 8;
const PFN_MASK: u64 = 0x7F_FFFF_FFFF_FFFF;
const PRESENT: u64 = 1 << 63;

/// Reader of a pagemap file.
pub struct Pagemap {
    file: File,
}

impl Pagemap {
    pub fn open(path: impl AsRef<Path>) -> SysResult<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }

    pub fn open_self() -> SysResult<Self> {
        Self::open(SELF_PAGEMAP)
    }

    /// Raw entry for the page holding `va`.
    pub fn entry(&mut self, va: u64) -> SysResult<u64> {
        let page = va / PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(page * ENTRY_BYTES))?;
        let mut raw = [0u8; ENTRY_BYTES as usize];
        self.file.read_exact(&mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    /// Physical address of `va`, or `None` if the page is not present.
    pub fn resolve(&mut self, va: u64) -> SysResult<Option<u64>> {
        let entry = self.entry(va)?;
        if entry & PRESENT == 0 {
            return Ok(None);
        }
        let pfn = entry & PFN_MASK;
        Ok(Some(pfn * PAGE_SIZE as u64 + (va & PAGE_OFFSET_MASK as u64)))
    }
}

impl FrameLookup for Pagemap {
    fn physical_address(&mut self, va: Address) -> Result<Address, SvmError> {
        match self.resolve(va as u64) {
            Ok(Some(pa)) => Address::try_from(pa).map_err(|_| SvmError::UnsupportedFormat),
            Ok(None) => Err(SvmError::TranslationFault {
                level: 0,
                address: va,
            }),
            Err(e) => {
                warn!("pagemap lookup of {va:#010x} failed: {e}");
                Err(SvmError::Io)
            }
        }
    }
}

/// One line of the process memory map with its physical endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRegion {
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub name: String,
    pub first_pa: Option<u64>,
    pub last_pa: Option<u64>,
}

impl MappedRegion {
    pub fn pages(&self) -> u64 {
        (self.end - self.start) / PAGE_SIZE as u64
    }
}

/// Parses one `/proc/<pid>/maps` line into `(start, end, perms, name)`.
pub fn parse_maps_line(line: &str) -> SysResult<(u64, u64, String, String)> {
    let malformed = || SysError::Malformed {
        what: "maps line",
        line: line.to_string(),
    };

    let mut fields = line.split_whitespace();
    let range = fields.next().ok_or_else(malformed)?;
    let perms = fields.next().ok_or_else(malformed)?;
    let (start, end) = range.split_once('-').ok_or_else(malformed)?;
    let start = u64::from_str_radix(start, 16).map_err(|_| malformed())?;
    let end = u64::from_str_radix(end, 16).map_err(|_| malformed())?;
    if end < start {
        return Err(malformed());
    }

    // offset, device, inode, then the optional path
    let name = fields.skip(3).collect::<Vec<_>>().join(" ");
    Ok((start, end, perms.to_string(), name))
}

/// Reports every mapping in `maps` with the physical address of its first
/// and last page, looked up through `pagemap`.
///
/// Pages that are not present, or whose frame is hidden, report `None`.
pub fn memory_layout(maps: impl AsRef<Path>, pagemap: &mut Pagemap) -> SysResult<Vec<MappedRegion>> {
    let reader = BufReader::new(File::open(maps)?);
    let mut regions = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (start, end, perms, name) = parse_maps_line(&line)?;
        let last = end.saturating_sub(PAGE_SIZE as u64).max(start);
        regions.push(MappedRegion {
            start,
            end,
            perms,
            name,
            first_pa: pagemap.resolve(start).ok().flatten(),
            last_pa: pagemap.resolve(last).ok().flatten(),
        });
    }
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pagemap_with(entries: &[(u64, u64)]) -> tempfile::NamedTempFile {
        let pages = entries.iter().map(|(p, _)| *p).max().unwrap_or(0) + 1;
        let mut raw = vec![0u8; (pages * ENTRY_BYTES) as usize];
        for &(page, entry) in entries {
            let at = (page * ENTRY_BYTES) as usize;
            raw[at..at + 8].copy_from_slice(&entry.to_le_bytes());
        }
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&raw).unwrap();
        file
    }

    #[test]
    fn resolves_present_pages() {
        let file = pagemap_with(&[(0x10, PRESENT | 0x3F123), (0x11, 0x99)]);
        let mut map = Pagemap::open(file.path()).unwrap();

        assert_eq!(map.resolve(0x10ABC).unwrap(), Some(0x3F12_3ABC));
        assert_eq!(map.resolve(0x11000).unwrap(), None);
        assert_eq!(map.physical_address(0x10004), Ok(0x3F12_3004));
        assert!(matches!(
            map.physical_address(0x11004),
            Err(SvmError::TranslationFault { level: 0, .. })
        ));
        assert_eq!(map.physical_address(0x5000_0000), Err(SvmError::Io));
    }

    #[test]
    fn parses_maps_lines() {
        let (start, end, perms, name) =
            parse_maps_line("00010000-00012000 r-xp 00000000 b3:02 1234       /usr/bin/svm host")
                .unwrap();
        assert_eq!((start, end), (0x10000, 0x12000));
        assert_eq!(perms, "r-xp");
        assert_eq!(name, "/usr/bin/svm host");

        let (_, _, _, anon) = parse_maps_line("b6f00000-b6f21000 rw-p 00000000 00:00 0").unwrap();
        assert_eq!(anon, "");
        assert!(parse_maps_line("garbage").is_err());
    }

    #[test]
    fn layout_reports_endpoints() {
        let pagemap = pagemap_with(&[(0x10, PRESENT | 0x100), (0x11, PRESENT | 0x200)]);
        let mut maps = tempfile::NamedTempFile::new().unwrap();
        writeln!(maps, "00010000-00012000 r-xp 00000000 b3:02 1234 /bin/x").unwrap();
        writeln!(maps, "00020000-00021000 rw-p 00000000 00:00 0 [heap]").unwrap();

        let mut lookup = Pagemap::open(pagemap.path()).unwrap();
        let regions = memory_layout(maps.path(), &mut lookup).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].pages(), 2);
        assert_eq!(regions[0].first_pa, Some(0x10_0000));
        assert_eq!(regions[0].last_pa, Some(0x20_0000));
        assert_eq!(regions[1].first_pa, None);
        assert_eq!(regions[1].name, "[heap]");
    }
}
