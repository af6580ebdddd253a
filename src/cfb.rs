//! Microsoft Compound File Binary (MS-CFB / OLE2) reader (§4.1).
//!
//! Loads a whole `.SchDoc`-shaped container into memory, reconstructs the
//! FAT, DIFAT, and mini-FAT chains, walks the directory, and exposes named
//! streams by case-insensitive lookup. There is no partial recovery: any
//! header inconsistency or malformed chain is a fatal decode error.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const BYTE_ORDER_MARK: u16 = 0xFFFE;
const HEADER_LEN: usize = 512;

const FREESECT: u32 = 0xFFFFFFFF;
const ENDOFCHAIN: u32 = 0xFFFFFFFE;
const FATSECT: u32 = 0xFFFFFFFD;
const DIFSECT: u32 = 0xFFFFFFFC;
const MAXREGSECT: u32 = 0xFFFFFFFA;

/// Safety cap on sector-chain length so a corrupt or adversarial file cannot
/// spin the reader indefinitely (§5).
const MAX_CHAIN_SECTORS: usize = 1_000_000;

const DIR_ENTRY_LEN: usize = 128;
const STORAGE_TYPE: u8 = 1;
const STREAM_TYPE: u8 = 2;
const ROOT_TYPE: u8 = 5;

#[derive(Debug)]
pub enum CfbError {
    Io(io::Error),
    BadMagic,
    BadByteOrder,
    Truncated(&'static str),
    MalformedChain(String),
    StreamNotFound(String),
}

impl fmt::Display for CfbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfbError::Io(e) => write!(f, "I/O error reading compound file: {e}"),
            CfbError::BadMagic => write!(f, "not a compound file: missing OLE/CFB magic bytes"),
            CfbError::BadByteOrder => write!(f, "not a compound file: unexpected byte-order marker"),
            CfbError::Truncated(what) => write!(f, "compound file truncated: missing {what}"),
            CfbError::MalformedChain(reason) => write!(f, "malformed sector chain: {reason}"),
            CfbError::StreamNotFound(name) => write!(f, "no stream named {name:?} in compound file"),
        }
    }
}

impl std::error::Error for CfbError {}

impl From<io::Error> for CfbError {
    fn from(e: io::Error) -> Self {
        CfbError::Io(e)
    }
}

pub type CfbResult<T> = Result<T, CfbError>;

struct DirEntry {
    name: String,
    entry_type: u8,
    start_sector: u32,
    size: u64,
}

/// A parsed compound file, holding the whole input in memory.
pub struct CompoundFile {
    data: Vec<u8>,
    sector_size: usize,
    mini_sector_size: usize,
    mini_stream_cutoff: u64,
    fat: Vec<u32>,
    mini_fat: Vec<u32>,
    mini_stream: Vec<u8>,
    directory: Vec<DirEntry>,
}

fn read_u16(bytes: &[u8], offset: usize) -> CfbResult<u16> {
    bytes
        .get(offset..offset + 2)
        .map(|s| u16::from_le_bytes([s[0], s[1]]))
        .ok_or(CfbError::Truncated("header field"))
}

fn read_u32(bytes: &[u8], offset: usize) -> CfbResult<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|s| u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or(CfbError::Truncated("header field"))
}

fn read_u64(bytes: &[u8], offset: usize) -> CfbResult<u64> {
    bytes
        .get(offset..offset + 8)
        .map(|s| u64::from_le_bytes(s.try_into().unwrap()))
        .ok_or(CfbError::Truncated("directory entry field"))
}

impl CompoundFile {
    /// Load and parse the compound file at `path`.
    pub fn open(path: &Path) -> CfbResult<Self> {
        let data = fs::read(path)?;
        Self::from_bytes(data)
    }

    /// Parse a compound file already loaded into memory.
    pub fn from_bytes(data: Vec<u8>) -> CfbResult<Self> {
        if data.len() < HEADER_LEN || data[0..8] != SIGNATURE {
            return Err(CfbError::BadMagic);
        }
        if read_u16(&data, 28)? != BYTE_ORDER_MARK {
            return Err(CfbError::BadByteOrder);
        }

        let sector_shift = read_u16(&data, 30)?;
        let mini_sector_shift = read_u16(&data, 32)?;
        let mini_stream_cutoff = read_u32(&data, 56)? as u64;
        let first_dir_sector = read_u32(&data, 48)?;
        let first_minifat_sector = read_u32(&data, 60)?;
        let first_difat_sector = read_u32(&data, 68)?;
        let num_difat_sectors = read_u32(&data, 72)?;

        let sector_size = 1usize << sector_shift;
        let mini_sector_size = 1usize << mini_sector_shift;
        let header_region = sector_size.max(HEADER_LEN);

        if data.len() < header_region {
            return Err(CfbError::Truncated("header sector"));
        }

        let mut difat_entries: Vec<u32> = Vec::with_capacity(109);
        for i in 0..109 {
            difat_entries.push(read_u32(&data, 76 + i * 4)?);
        }

        if num_difat_sectors > 0 {
            let entries_per_sector = sector_size / 4 - 1;
            let mut current = first_difat_sector;
            let mut seen = 0usize;
            while current != ENDOFCHAIN && current != FREESECT {
                if seen >= MAX_CHAIN_SECTORS {
                    return Err(CfbError::MalformedChain("DIFAT chain exceeds safety cap".into()));
                }
                let offset = header_region + current as usize * sector_size;
                let sector = data
                    .get(offset..offset + sector_size)
                    .ok_or(CfbError::Truncated("DIFAT sector"))?;
                for i in 0..entries_per_sector {
                    difat_entries.push(read_u32(sector, i * 4)?);
                }
                current = read_u32(sector, entries_per_sector * 4)?;
                seen += 1;
            }
        }

        let entries_per_fat_sector = sector_size / 4;
        let mut fat: Vec<u32> = Vec::new();
        for &fat_sector in &difat_entries {
            if fat_sector == FREESECT {
                continue;
            }
            let offset = header_region + fat_sector as usize * sector_size;
            let sector = data
                .get(offset..offset + sector_size)
                .ok_or(CfbError::Truncated("FAT sector"))?;
            for i in 0..entries_per_fat_sector {
                fat.push(read_u32(sector, i * 4)?);
            }
        }

        let get_sector = |sector: u32| -> CfbResult<&[u8]> {
            let offset = header_region + sector as usize * sector_size;
            data.get(offset..offset + sector_size)
                .ok_or(CfbError::Truncated("data sector"))
        };

        let follow_fat_chain = |fat: &[u32], start: u32| -> CfbResult<Vec<u8>> {
            let mut out = Vec::new();
            let mut current = start;
            let mut seen = 0usize;
            while current <= MAXREGSECT {
                if seen >= MAX_CHAIN_SECTORS {
                    return Err(CfbError::MalformedChain("sector chain exceeds safety cap".into()));
                }
                out.extend_from_slice(get_sector(current)?);
                current = *fat
                    .get(current as usize)
                    .ok_or_else(|| CfbError::MalformedChain("chain entry out of FAT bounds".into()))?;
                seen += 1;
            }
            Ok(out)
        };

        let mini_fat = if first_minifat_sector <= MAXREGSECT {
            let raw = follow_fat_chain(&fat, first_minifat_sector)?;
            raw.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        } else {
            Vec::new()
        };

        let directory_bytes = follow_fat_chain(&fat, first_dir_sector)?;
        let mut directory = Vec::new();
        for chunk in directory_bytes.chunks_exact(DIR_ENTRY_LEN) {
            let name_len_bytes = read_u16(chunk, 64)? as usize;
            let entry_type = chunk[66];
            if entry_type == 0 {
                continue; // unused entry
            }
            let name_len_chars = name_len_bytes.saturating_sub(2) / 2; // drop trailing NUL
            let name_utf16: Vec<u16> = chunk[0..name_len_bytes.min(64)]
                .chunks_exact(2)
                .take(name_len_chars)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            let name = String::from_utf16_lossy(&name_utf16);
            let start_sector = read_u32(chunk, 116)?;
            let size = read_u64(chunk, 120)?;
            directory.push(DirEntry {
                name,
                entry_type,
                start_sector,
                size,
            });
        }

        if directory.is_empty() {
            return Err(CfbError::Truncated("root directory entry"));
        }

        let mini_stream = if directory[0].entry_type == ROOT_TYPE && directory[0].start_sector <= MAXREGSECT {
            let mut raw = follow_fat_chain(&fat, directory[0].start_sector)?;
            raw.truncate(directory[0].size as usize);
            raw
        } else {
            Vec::new()
        };

        Ok(CompoundFile {
            data,
            sector_size,
            mini_sector_size,
            mini_stream_cutoff,
            fat,
            mini_fat,
            mini_stream,
            directory,
        })
    }

    fn follow_mini_chain(&self, start: u32, total_len: u64) -> CfbResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut current = start;
        let mut seen = 0usize;
        while current <= MAXREGSECT {
            if seen >= MAX_CHAIN_SECTORS {
                return Err(CfbError::MalformedChain("mini-FAT chain exceeds safety cap".into()));
            }
            let offset = current as usize * self.mini_sector_size;
            let chunk = self
                .mini_stream
                .get(offset..offset + self.mini_sector_size)
                .ok_or(CfbError::Truncated("mini-stream sector"))?;
            out.extend_from_slice(chunk);
            current = *self
                .mini_fat
                .get(current as usize)
                .ok_or_else(|| CfbError::MalformedChain("mini-FAT entry out of bounds".into()))?;
            seen += 1;
        }
        out.truncate(total_len as usize);
        Ok(out)
    }

    fn follow_main_chain(&self, start: u32, total_len: u64) -> CfbResult<Vec<u8>> {
        let header_region = self.sector_size.max(HEADER_LEN);
        let mut out = Vec::new();
        let mut current = start;
        let mut seen = 0usize;
        while current <= MAXREGSECT {
            if seen >= MAX_CHAIN_SECTORS {
                return Err(CfbError::MalformedChain("sector chain exceeds safety cap".into()));
            }
            let offset = header_region + current as usize * self.sector_size;
            let chunk = self
                .data
                .get(offset..offset + self.sector_size)
                .ok_or(CfbError::Truncated("data sector"))?;
            out.extend_from_slice(chunk);
            current = *self
                .fat
                .get(current as usize)
                .ok_or_else(|| CfbError::MalformedChain("FAT entry out of bounds".into()))?;
            seen += 1;
        }
        out.truncate(total_len as usize);
        Ok(out)
    }

    /// Return the raw bytes of the named stream. Name comparison is
    /// case-insensitive.
    pub fn read_stream(&self, name: &str) -> CfbResult<Vec<u8>> {
        let entry = self
            .directory
            .iter()
            .find(|e| e.entry_type == STREAM_TYPE && e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CfbError::StreamNotFound(name.to_string()))?;

        if entry.size < self.mini_stream_cutoff {
            self.follow_mini_chain(entry.start_sector, entry.size)
        } else {
            self.follow_main_chain(entry.start_sector, entry.size)
        }
    }

    /// All stream names in the container (storages excluded).
    pub fn list_streams(&self) -> Vec<String> {
        self.directory
            .iter()
            .filter(|e| e.entry_type == STREAM_TYPE)
            .map(|e| e.name.clone())
            .collect()
    }
}

/// Test-only CFB byte-layout builder, shared with `altium.rs`'s tests so the
/// full import path can be exercised against real compound-file bytes
/// without a captured Altium fixture.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Builds a minimal single-sector (512-byte sector) CFB container with
    /// one stream small enough to be stored in the mini-stream, for
    /// exercising header parsing, directory walking, and mini-FAT chains
    /// without a real Altium fixture.
    pub(crate) fn build_minimal_cfb(stream_name: &str, stream_data: &[u8]) -> Vec<u8> {
        const SECTOR: usize = 512;
        const MINI_SECTOR: usize = 64;

        // Layout: header (sector -1), sector 0 = mini stream data (root
        // stream), sector 1 = mini-FAT, sector 2 = FAT, sector 3 = directory.
        let mut file = vec![0u8; SECTOR * 5];

        file[0..8].copy_from_slice(&SIGNATURE);
        file[26..28].copy_from_slice(&3u16.to_le_bytes()); // major version
        file[28..30].copy_from_slice(&BYTE_ORDER_MARK.to_le_bytes());
        file[30..32].copy_from_slice(&9u16.to_le_bytes()); // sector shift: 512
        file[32..34].copy_from_slice(&6u16.to_le_bytes()); // mini sector shift: 64
        file[48..52].copy_from_slice(&3u32.to_le_bytes()); // first dir sector
        file[56..60].copy_from_slice(&4096u32.to_le_bytes()); // mini stream cutoff
        file[60..64].copy_from_slice(&1u32.to_le_bytes()); // first mini-FAT sector
        file[68..72].copy_from_slice(&ENDOFCHAIN.to_le_bytes()); // no DIFAT sectors
        file[72..76].copy_from_slice(&0u32.to_le_bytes());

        // Embedded DIFAT: slot 0 -> FAT lives in sector 2, rest unused.
        file[76..80].copy_from_slice(&2u32.to_le_bytes());
        for i in 1..109 {
            let off = 76 + i * 4;
            file[off..off + 4].copy_from_slice(&FREESECT.to_le_bytes());
        }

        // FAT sector (sector 2): sector 0 (mini stream) ends the chain,
        // sector 1 (mini-FAT) ends the chain, sector 2 (FAT) is FATSECT,
        // sector 3 (directory) ends the chain.
        let fat_off = HEADER_LEN + 5 * SECTOR - 3 * SECTOR; // placeholder, fixed below
        let _ = fat_off;
        let header_region = SECTOR; // == sector_size since sector_shift gives 512
        let fat_sector_off = header_region + 2 * SECTOR;
        file[fat_sector_off..fat_sector_off + 4].copy_from_slice(&ENDOFCHAIN.to_le_bytes());
        file[fat_sector_off + 4..fat_sector_off + 8].copy_from_slice(&ENDOFCHAIN.to_le_bytes());
        file[fat_sector_off + 8..fat_sector_off + 12].copy_from_slice(&FATSECT.to_le_bytes());
        file[fat_sector_off + 12..fat_sector_off + 16].copy_from_slice(&ENDOFCHAIN.to_le_bytes());

        // Mini-FAT sector (sector 1): mini-sector 0 ends the chain.
        let minifat_off = header_region + 1 * SECTOR;
        file[minifat_off..minifat_off + 4].copy_from_slice(&ENDOFCHAIN.to_le_bytes());

        // Mini-stream data (sector 0): the stream's bytes, mini-sector aligned.
        let ministream_off = header_region;
        file[ministream_off..ministream_off + stream_data.len()].copy_from_slice(stream_data);

        // Directory sector (sector 3): root entry + one stream entry.
        let dir_off = header_region + 3 * SECTOR;
        // Root entry
        let root_name: Vec<u16> = "Root Entry".encode_utf16().collect();
        for (i, u) in root_name.iter().enumerate() {
            file[dir_off + i * 2..dir_off + i * 2 + 2].copy_from_slice(&u.to_le_bytes());
        }
        file[dir_off + 64..dir_off + 66].copy_from_slice(&(((root_name.len() + 1) * 2) as u16).to_le_bytes());
        file[dir_off + 66] = ROOT_TYPE;
        file[dir_off + 116..dir_off + 120].copy_from_slice(&0u32.to_le_bytes()); // ministream starts at sector 0
        file[dir_off + 120..dir_off + 128].copy_from_slice(&(stream_data.len() as u64).to_le_bytes());

        // Stream entry
        let entry_off = dir_off + DIR_ENTRY_LEN;
        let stream_name_u16: Vec<u16> = stream_name.encode_utf16().collect();
        for (i, u) in stream_name_u16.iter().enumerate() {
            file[entry_off + i * 2..entry_off + i * 2 + 2].copy_from_slice(&u.to_le_bytes());
        }
        file[entry_off + 64..entry_off + 66]
            .copy_from_slice(&(((stream_name_u16.len() + 1) * 2) as u16).to_le_bytes());
        file[entry_off + 66] = STREAM_TYPE;
        file[entry_off + 116..entry_off + 120].copy_from_slice(&0u32.to_le_bytes()); // mini-sector 0
        file[entry_off + 120..entry_off + 128].copy_from_slice(&(stream_data.len() as u64).to_le_bytes());

        let _ = MINI_SECTOR;
        file
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::build_minimal_cfb;
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let data = vec![0u8; 512];
        assert!(matches!(
            CompoundFile::from_bytes(data),
            Err(CfbError::BadMagic)
        ));
    }

    #[test]
    fn rejects_bad_byte_order() {
        let mut data = vec![0u8; 512];
        data[0..8].copy_from_slice(&SIGNATURE);
        data[28..30].copy_from_slice(&0x1234u16.to_le_bytes());
        assert!(matches!(
            CompoundFile::from_bytes(data),
            Err(CfbError::BadByteOrder)
        ));
    }

    #[test]
    fn reads_mini_stream_resident_stream() {
        let payload = b"HEADER=1|RECORD=2|";
        let file = build_minimal_cfb("FileHeader", payload);
        let cfb = CompoundFile::from_bytes(file).expect("valid minimal cfb");
        assert_eq!(cfb.read_stream("fileheader").unwrap(), payload);
        assert_eq!(cfb.list_streams(), vec!["FileHeader".to_string()]);
    }

    #[test]
    fn missing_stream_is_an_error() {
        let file = build_minimal_cfb("FileHeader", b"x");
        let cfb = CompoundFile::from_bytes(file).unwrap();
        assert!(matches!(
            cfb.read_stream("NoSuchStream"),
            Err(CfbError::StreamNotFound(_))
        ));
    }
}
