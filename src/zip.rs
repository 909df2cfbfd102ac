//! Streaming ZIP reader for OCF containers
//!
//! Parses the central directory into a fixed-capacity cache and streams entry
//! data on demand (stored or DEFLATE via miniz_oxide, CRC-checked with
//! crc32fast). Besides reading, it exposes what the structural OCF checks need:
//! the first physical record of the archive, per-entry general-purpose flags
//! and DOS timestamps, and whether the directory cache was truncated.

use heapless::Vec as HeaplessVec;
use miniz_oxide::{DataFormat, MZFlush, MZStatus};
use std::io::{Read, Seek, SeekFrom, Write};

/// Maximum number of central directory entries to cache
pub const MAX_CD_ENTRIES: usize = 1024;

/// Maximum filename length kept from an entry
const MAX_FILENAME_LEN: usize = 1024;

/// Runtime-configurable ZIP safety limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZipLimits {
    /// Maximum compressed or uncompressed entry size allowed for reads.
    pub max_file_read_size: usize,
    /// Maximum size accepted for the `mimetype` entry before its content is
    /// considered wrong without reading it.
    pub max_mimetype_size: usize,
    /// Fail instead of truncating when the directory is larger than the cache
    /// or inconsistent with the end record.
    pub strict: bool,
    /// Maximum bytes scanned from file tail while searching for EOCD.
    pub max_eocd_scan: usize,
}

impl Default for ZipLimits {
    fn default() -> Self {
        Self {
            max_file_read_size: 64 * 1024 * 1024,
            max_mimetype_size: 1024,
            strict: false,
            max_eocd_scan: MAX_EOCD_SCAN,
        }
    }
}

impl ZipLimits {
    /// Create explicit ZIP limits.
    pub fn new(max_file_read_size: usize, max_mimetype_size: usize) -> Self {
        Self {
            max_file_read_size,
            max_mimetype_size,
            ..Self::default()
        }
    }

    /// Enable or disable strict ZIP parsing behavior.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set a cap for EOCD tail scan bytes.
    pub fn with_max_eocd_scan(mut self, max_eocd_scan: usize) -> Self {
        self.max_eocd_scan = max_eocd_scan.max(EOCD_MIN_SIZE);
        self
    }
}

/// Local file header signature (little-endian)
pub const SIG_LOCAL_FILE_HEADER: u32 = 0x04034b50;
/// Central directory entry signature (little-endian)
const SIG_CD_ENTRY: u32 = 0x02014b50;
/// End of central directory signature (little-endian)
const SIG_EOCD: u32 = 0x06054b50;
/// ZIP64 end of central directory locator signature (little-endian)
const SIG_ZIP64_EOCD_LOCATOR: u32 = 0x07064b50;
/// Minimum EOCD record size in bytes
const EOCD_MIN_SIZE: usize = 22;
/// Maximum EOCD search window (EOCD + max comment length)
const MAX_EOCD_SCAN: usize = EOCD_MIN_SIZE + u16::MAX as usize;

/// Stored (uncompressed) entry
pub const METHOD_STORED: u16 = 0;
/// DEFLATE-compressed entry
pub const METHOD_DEFLATED: u16 = 8;

/// General-purpose flag bit 0: entry data is encrypted at the zip level
const FLAG_ENCRYPTED: u16 = 0x0001;

const SCRATCH_LEN: usize = 8 * 1024;

pub use crate::error::ZipError;

#[derive(Clone, Copy, Debug)]
struct EocdInfo {
    cd_offset: u64,
    cd_size: u32,
    num_entries: u16,
    uses_zip64: bool,
}

/// MS-DOS date/time pair as stored in zip headers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DosDateTime {
    /// Packed date: bits 9-15 year since 1980, 5-8 month, 0-4 day.
    pub date: u16,
    /// Packed time: bits 11-15 hour, 5-10 minute, 0-4 seconds / 2.
    pub time: u16,
}

impl DosDateTime {
    /// Pack calendar fields. Years before 1980 clamp to 1980.
    pub fn from_parts(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let year = year.clamp(1980, 1980 + 127) - 1980;
        Self {
            date: (year << 9) | (u16::from(month & 0x0F) << 5) | u16::from(day & 0x1F),
            time: (u16::from(hour & 0x1F) << 11)
                | (u16::from(minute & 0x3F) << 5)
                | u16::from((second / 2) & 0x1F),
        }
    }

    /// Calendar year.
    pub fn year(&self) -> u16 {
        1980 + (self.date >> 9)
    }

    /// Month, 1-12.
    pub fn month(&self) -> u8 {
        ((self.date >> 5) & 0x0F) as u8
    }

    /// Day of month, 1-31.
    pub fn day(&self) -> u8 {
        (self.date & 0x1F) as u8
    }

    /// Hour, 0-23.
    pub fn hour(&self) -> u8 {
        (self.time >> 11) as u8
    }

    /// Minute, 0-59.
    pub fn minute(&self) -> u8 {
        ((self.time >> 5) & 0x3F) as u8
    }

    /// Seconds, even values only.
    pub fn second(&self) -> u8 {
        ((self.time & 0x1F) * 2) as u8
    }
}

/// Central directory entry metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdEntry {
    /// Compression method (0=stored, 8=deflated)
    pub method: u16,
    /// General-purpose bit flags
    pub flags: u16,
    /// Last modification time
    pub modified: DosDateTime,
    /// Compressed size in bytes
    pub compressed_size: u32,
    /// Uncompressed size in bytes
    pub uncompressed_size: u32,
    /// Offset to local file header
    pub local_header_offset: u32,
    /// CRC32 checksum
    pub crc32: u32,
    /// Entry name as stored in the archive
    pub filename: String,
}

impl CdEntry {
    /// Whether the zip-level encryption flag is set.
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Whether the entry names a directory rather than a file.
    pub fn is_directory(&self) -> bool {
        self.filename.ends_with('/')
    }
}

/// Fixed fields of the first local file header in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRecord {
    /// Entry name from the local header
    pub filename: String,
    /// Compression method
    pub method: u16,
    /// Length of the local extra field
    pub extra_len: u16,
    /// Compressed size from the local header
    pub compressed_size: u32,
}

/// Streaming ZIP file reader
pub struct StreamingZip<F: Read + Seek> {
    file: F,
    entries: HeaplessVec<CdEntry, MAX_CD_ENTRIES>,
    declared_entries: usize,
    limits: ZipLimits,
}

impl<F: Read + Seek> StreamingZip<F> {
    /// Open a ZIP file and parse the central directory with default limits
    pub fn new(file: F) -> Result<Self, ZipError> {
        Self::new_with_limits(file, ZipLimits::default())
    }

    /// Open a ZIP file with explicit runtime limits.
    pub fn new_with_limits(mut file: F, limits: ZipLimits) -> Result<Self, ZipError> {
        let eocd = Self::find_eocd(&mut file, limits.max_eocd_scan.min(MAX_EOCD_SCAN))?;
        if eocd.uses_zip64 {
            return Err(ZipError::UnsupportedZip64);
        }
        let declared_entries = eocd.num_entries as usize;
        if limits.strict && declared_entries > MAX_CD_ENTRIES {
            return Err(ZipError::CentralDirFull);
        }

        let mut entries: HeaplessVec<CdEntry, MAX_CD_ENTRIES> = HeaplessVec::new();
        file.seek(SeekFrom::Start(eocd.cd_offset))
            .map_err(|_| ZipError::IoError)?;
        let cd_end = eocd.cd_offset + eocd.cd_size as u64;

        for _ in 0..declared_entries.min(MAX_CD_ENTRIES) {
            let pos = file.stream_position().map_err(|_| ZipError::IoError)?;
            if pos >= cd_end {
                if limits.strict {
                    return Err(ZipError::InvalidFormat);
                }
                break;
            }
            match Self::read_cd_entry(&mut file)? {
                Some(entry) => entries.push(entry).map_err(|_| ZipError::CentralDirFull)?,
                None if limits.strict => return Err(ZipError::InvalidFormat),
                None => break,
            }
        }

        if declared_entries > entries.len() {
            log::warn!(
                "[ZIP] Archive declares {} entries but only {} were loaded (max: {})",
                declared_entries,
                entries.len(),
                MAX_CD_ENTRIES
            );
        }
        log::debug!(
            "[ZIP] Parsed {} central directory entries (offset {})",
            entries.len(),
            eocd.cd_offset
        );

        Ok(Self {
            file,
            entries,
            declared_entries,
            limits,
        })
    }

    fn find_eocd(file: &mut F, max_eocd_scan: usize) -> Result<EocdInfo, ZipError> {
        let file_size = file.seek(SeekFrom::End(0)).map_err(|_| ZipError::IoError)?;
        if file_size < EOCD_MIN_SIZE as u64 {
            return Err(ZipError::InvalidFormat);
        }

        let scan_range = file_size.min(max_eocd_scan.max(EOCD_MIN_SIZE) as u64) as usize;
        let mut buffer = vec![0u8; scan_range];
        file.seek(SeekFrom::Start(file_size - scan_range as u64))
            .map_err(|_| ZipError::IoError)?;
        file.read_exact(&mut buffer).map_err(|_| ZipError::IoError)?;
        let scan_base = file_size - scan_range as u64;

        for i in (0..=scan_range - EOCD_MIN_SIZE).rev() {
            if read_u32_le(&buffer, i) != SIG_EOCD {
                continue;
            }
            let num_entries = read_u16_le(&buffer, i + 10);
            let cd_size = read_u32_le(&buffer, i + 12);
            let cd_offset = read_u32_le(&buffer, i + 16) as u64;
            let comment_len = read_u16_le(&buffer, i + 20) as u64;
            let eocd_pos = scan_base + i as u64;
            if eocd_pos + EOCD_MIN_SIZE as u64 + comment_len != file_size {
                continue;
            }

            let cd_end = cd_offset
                .checked_add(cd_size as u64)
                .ok_or(ZipError::InvalidFormat)?;
            if cd_end > eocd_pos {
                return Err(ZipError::InvalidFormat);
            }

            let sentinel =
                num_entries == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX as u64;
            let locator = if eocd_pos >= 20 {
                file.seek(SeekFrom::Start(eocd_pos - 20))
                    .map_err(|_| ZipError::IoError)?;
                let mut sig = [0u8; 4];
                file.read_exact(&mut sig).map_err(|_| ZipError::IoError)?;
                u32::from_le_bytes(sig) == SIG_ZIP64_EOCD_LOCATOR
            } else {
                false
            };

            return Ok(EocdInfo {
                cd_offset,
                cd_size,
                num_entries,
                uses_zip64: sentinel || locator,
            });
        }

        Err(ZipError::InvalidFormat)
    }

    fn read_cd_entry(file: &mut F) -> Result<Option<CdEntry>, ZipError> {
        let mut sig = [0u8; 4];
        if file.read_exact(&mut sig).is_err() || u32::from_le_bytes(sig) != SIG_CD_ENTRY {
            return Ok(None);
        }

        // buf[N] is central directory offset N + 4
        let mut buf = [0u8; 42];
        file.read_exact(&mut buf).map_err(|_| ZipError::IoError)?;

        let name_len = read_u16_le(&buf, 24) as usize;
        let extra_len = read_u16_le(&buf, 26) as usize;
        let comment_len = read_u16_le(&buf, 28) as usize;

        let mut filename = String::new();
        if name_len > MAX_FILENAME_LEN {
            file.seek(SeekFrom::Current(name_len as i64))
                .map_err(|_| ZipError::IoError)?;
        } else if name_len > 0 {
            let mut name_buf = vec![0u8; name_len];
            file.read_exact(&mut name_buf)
                .map_err(|_| ZipError::IoError)?;
            filename = String::from_utf8_lossy(&name_buf).into_owned();
        }

        let skip = extra_len + comment_len;
        if skip > 0 {
            file.seek(SeekFrom::Current(skip as i64))
                .map_err(|_| ZipError::IoError)?;
        }

        Ok(Some(CdEntry {
            flags: read_u16_le(&buf, 4),
            method: read_u16_le(&buf, 6),
            modified: DosDateTime {
                time: read_u16_le(&buf, 8),
                date: read_u16_le(&buf, 10),
            },
            crc32: read_u32_le(&buf, 12),
            compressed_size: read_u32_le(&buf, 16),
            uncompressed_size: read_u32_le(&buf, 20),
            local_header_offset: read_u32_le(&buf, 38),
            filename,
        }))
    }

    /// Entry by exact name. A single leading `/` on either side is ignored.
    pub fn entry(&self, name: &str) -> Option<&CdEntry> {
        let name = name.strip_prefix('/').unwrap_or(name);
        self.entries
            .iter()
            .find(|e| e.filename.strip_prefix('/').unwrap_or(&e.filename) == name)
    }

    /// Iterate over all cached entries in central directory order
    pub fn entries(&self) -> impl Iterator<Item = &CdEntry> {
        self.entries.iter()
    }

    /// Number of cached entries.
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive declared more entries than were cached.
    pub fn is_truncated(&self) -> bool {
        self.declared_entries > self.entries.len()
    }

    /// Active limits.
    pub fn limits(&self) -> ZipLimits {
        self.limits
    }

    /// Inspect the first physical record of the archive.
    ///
    /// Returns `Ok(None)` when the archive does not begin with a local file
    /// header signature.
    pub fn first_local_record(&mut self) -> Result<Option<LocalRecord>, ZipError> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|_| ZipError::IoError)?;
        let mut header = [0u8; 30];
        if self.file.read_exact(&mut header).is_err() {
            return Ok(None);
        }
        if read_u32_le(&header, 0) != SIG_LOCAL_FILE_HEADER {
            return Ok(None);
        }
        let name_len = read_u16_le(&header, 26) as usize;
        let mut name = vec![0u8; name_len.min(MAX_FILENAME_LEN)];
        self.file
            .read_exact(&mut name)
            .map_err(|_| ZipError::IoError)?;
        Ok(Some(LocalRecord {
            filename: String::from_utf8_lossy(&name).into_owned(),
            method: read_u16_le(&header, 8),
            extra_len: read_u16_le(&header, 28),
            compressed_size: read_u32_le(&header, 18),
        }))
    }

    /// Read an entry's decompressed bytes into a new vector.
    pub fn read_to_vec(&mut self, entry: &CdEntry) -> Result<Vec<u8>, ZipError> {
        let mut out = Vec::with_capacity(
            (entry.uncompressed_size as usize).min(self.limits.max_file_read_size),
        );
        self.read_file_to_writer(entry, &mut out)?;
        Ok(out)
    }

    /// Stream an entry's decompressed bytes into a writer.
    ///
    /// Stored and DEFLATE entries are copied in fixed-size chunks; the CRC is
    /// verified once the stream ends.
    pub fn read_file_to_writer<W: Write>(
        &mut self,
        entry: &CdEntry,
        writer: &mut W,
    ) -> Result<usize, ZipError> {
        let max = self.limits.max_file_read_size;
        if entry.uncompressed_size as usize > max || entry.compressed_size as usize > max {
            return Err(ZipError::FileTooLarge);
        }

        let data_offset = self.calc_data_offset(entry)?;
        self.file
            .seek(SeekFrom::Start(data_offset))
            .map_err(|_| ZipError::IoError)?;

        let mut input_buf = vec![0u8; SCRATCH_LEN];
        let mut hasher = crc32fast::Hasher::new();
        let written = match entry.method {
            METHOD_STORED => {
                let mut remaining = entry.compressed_size as usize;
                let mut written = 0usize;
                while remaining > 0 {
                    let take = remaining.min(input_buf.len());
                    self.file
                        .read_exact(&mut input_buf[..take])
                        .map_err(|_| ZipError::IoError)?;
                    writer
                        .write_all(&input_buf[..take])
                        .map_err(|_| ZipError::IoError)?;
                    hasher.update(&input_buf[..take]);
                    written += take;
                    remaining -= take;
                }
                written
            }
            METHOD_DEFLATED => {
                self.inflate_to_writer(entry, writer, &mut input_buf, &mut hasher)?
            }
            _ => return Err(ZipError::UnsupportedCompression),
        };

        if written > max {
            return Err(ZipError::FileTooLarge);
        }
        if entry.crc32 != 0 && hasher.finalize() != entry.crc32 {
            return Err(ZipError::CrcMismatch);
        }
        Ok(written)
    }

    fn inflate_to_writer<W: Write>(
        &mut self,
        entry: &CdEntry,
        writer: &mut W,
        input_buf: &mut [u8],
        hasher: &mut crc32fast::Hasher,
    ) -> Result<usize, ZipError> {
        let mut state = Box::new(
            miniz_oxide::inflate::stream::InflateState::new(DataFormat::Raw),
        );
        let mut output_buf = vec![0u8; SCRATCH_LEN];
        let mut compressed_remaining = entry.compressed_size as usize;
        let mut pending_start = 0usize;
        let mut pending_end = 0usize;
        let mut written = 0usize;

        loop {
            if pending_start == pending_end && compressed_remaining > 0 {
                let take = compressed_remaining.min(input_buf.len());
                self.file
                    .read_exact(&mut input_buf[..take])
                    .map_err(|_| ZipError::IoError)?;
                pending_start = 0;
                pending_end = take;
                compressed_remaining -= take;
            }

            let flush = if compressed_remaining == 0 {
                MZFlush::Finish
            } else {
                MZFlush::None
            };
            let result = miniz_oxide::inflate::stream::inflate(
                &mut state,
                &input_buf[pending_start..pending_end],
                &mut output_buf,
                flush,
            );
            let consumed = result.bytes_consumed;
            let produced = result.bytes_written;
            pending_start += consumed;

            if produced > 0 {
                writer
                    .write_all(&output_buf[..produced])
                    .map_err(|_| ZipError::IoError)?;
                hasher.update(&output_buf[..produced]);
                written += produced;
                if written > self.limits.max_file_read_size {
                    return Err(ZipError::FileTooLarge);
                }
            }

            match result.status {
                Ok(MZStatus::StreamEnd) => {
                    if compressed_remaining != 0 || pending_start != pending_end {
                        return Err(ZipError::DecompressError);
                    }
                    return Ok(written);
                }
                Ok(MZStatus::Ok) => {
                    if consumed == 0 && produced == 0 {
                        return Err(ZipError::DecompressError);
                    }
                }
                Ok(MZStatus::NeedDict) | Err(_) => return Err(ZipError::DecompressError),
            }
        }
    }

    /// Offset of the entry data, past the local header.
    fn calc_data_offset(&mut self, entry: &CdEntry) -> Result<u64, ZipError> {
        let offset = entry.local_header_offset as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|_| ZipError::IoError)?;
        let mut header = [0u8; 30];
        self.file
            .read_exact(&mut header)
            .map_err(|_| ZipError::IoError)?;
        if read_u32_le(&header, 0) != SIG_LOCAL_FILE_HEADER {
            return Err(ZipError::InvalidFormat);
        }
        let name_len = read_u16_le(&header, 26) as u64;
        let extra_len = read_u16_le(&header, 28) as u64;
        Ok(offset + 30 + name_len + extra_len)
    }
}

fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
