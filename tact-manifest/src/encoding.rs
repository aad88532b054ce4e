//! ENCODING manifest parser.
//!
//! The ENCODING file maps content keys to encoded keys and carries the
//! decoded size of every file. Entries live in fixed-size, content-addressed
//! pages; each page is keyed in the page table by its first content key and
//! an MD5 checksum of the page bytes.
//!
//! The walk is callback-driven so that the storage layer can ingest records
//! straight into its catalog and poll for cancellation at page granularity
//! without an intermediate map.
//!
//! IMPORTANT: encoding files use BIG-ENDIAN byte order, unlike most other
//! CASC formats!

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use tracing::{debug, trace};

use crate::{Error, Result, MD5_LENGTH};

/// Magic bytes for encoding file: "EN"
const ENCODING_MAGIC: [u8; 2] = [0x45, 0x4E]; // 'E', 'N'

/// Size of the wire header in bytes.
pub const ENCODING_HEADER_SIZE: usize = 22;

/// Size of one page table entry: first key plus page checksum.
const PAGE_TABLE_ENTRY_SIZE: usize = MD5_LENGTH * 2;

/// Encoding file header.
///
/// Only 16-byte keys are supported; any other key length is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingHeader {
    /// Version (must be 1)
    pub version: u8,
    /// Hash size for CKeys (must be 16)
    pub ckey_length: u8,
    /// Hash size for EKeys (must be 16)
    pub ekey_length: u8,
    /// Number of CKey pages
    pub ckey_page_count: u32,
    /// Size of a CKey page in bytes
    pub ckey_page_size: u32,
    /// Number of EKey pages
    pub ekey_page_count: u32,
    /// Size of an EKey page in bytes
    pub ekey_page_size: u32,
    /// Size of the ESpec string block in bytes
    pub espec_block_size: u32,
}

impl EncodingHeader {
    /// Parse the wire header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ENCODING_HEADER_SIZE {
            return Err(Error::Truncated);
        }
        let mut cursor = Cursor::new(data);

        let mut magic = [0u8; 2];
        cursor.read_exact(&mut magic)?;
        if magic != ENCODING_MAGIC {
            return Err(Error::BadMagic);
        }

        let version = cursor.read_u8()?;
        let ckey_length = cursor.read_u8()?;
        let ekey_length = cursor.read_u8()?;
        let ckey_page_size_kb = cursor.read_u16::<BigEndian>()?;
        let ekey_page_size_kb = cursor.read_u16::<BigEndian>()?;
        let ckey_page_count = cursor.read_u32::<BigEndian>()?;
        let ekey_page_count = cursor.read_u32::<BigEndian>()?;
        let _unk = cursor.read_u8()?;
        let espec_block_size = cursor.read_u32::<BigEndian>()?;

        if version != 1 {
            return Err(Error::BadFormat);
        }
        if ckey_length as usize != MD5_LENGTH || ekey_length as usize != MD5_LENGTH {
            return Err(Error::BadFormat);
        }

        debug!(
            "Parsed encoding header: ckey_pages={ckey_page_count}, ekey_pages={ekey_page_count}, \
             page_size={}k/{}k, espec={espec_block_size}",
            ckey_page_size_kb, ekey_page_size_kb
        );

        Ok(EncodingHeader {
            version,
            ckey_length,
            ekey_length,
            ckey_page_count,
            ckey_page_size: u32::from(ckey_page_size_kb) * 1024,
            ekey_page_count,
            ekey_page_size: u32::from(ekey_page_size_kb) * 1024,
            espec_block_size,
        })
    }

    /// Emit the wire header. Inverse of [`EncodingHeader::parse`].
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ENCODING_MAGIC);
        out.push(self.version);
        out.push(self.ckey_length);
        out.push(self.ekey_length);
        out.extend_from_slice(&((self.ckey_page_size / 1024) as u16).to_be_bytes());
        out.extend_from_slice(&((self.ekey_page_size / 1024) as u16).to_be_bytes());
        out.extend_from_slice(&self.ckey_page_count.to_be_bytes());
        out.extend_from_slice(&self.ekey_page_count.to_be_bytes());
        out.push(0);
        out.extend_from_slice(&self.espec_block_size.to_be_bytes());
    }

    /// Offset of the CKey page table: header, then the ESpec block.
    fn ckey_page_table_offset(&self) -> usize {
        ENCODING_HEADER_SIZE + self.espec_block_size as usize
    }

    /// Offset of the first CKey data page.
    fn ckey_pages_offset(&self) -> usize {
        self.ckey_page_table_offset() + self.ckey_page_count as usize * PAGE_TABLE_ENTRY_SIZE
    }
}

/// One record of a CKey page: a content key, the decoded size, and one or
/// more encoded keys.
#[derive(Debug, Clone, Copy)]
pub struct EncodingRecord<'a> {
    /// The content key (16 bytes).
    pub ckey: &'a [u8],
    /// Decoded file size.
    pub content_size: u32,
    ekey_data: &'a [u8],
}

impl<'a> EncodingRecord<'a> {
    pub fn ekey_count(&self) -> usize {
        self.ekey_data.len() / MD5_LENGTH
    }

    /// The i-th encoded key (16 bytes).
    pub fn ekey(&self, i: usize) -> &'a [u8] {
        &self.ekey_data[i * MD5_LENGTH..(i + 1) * MD5_LENGTH]
    }

    /// The first encoded key, the one a storage resolves the file through.
    pub fn first_ekey(&self) -> &'a [u8] {
        self.ekey(0)
    }
}

/// Walk every record of every CKey page.
///
/// `before_page` runs before a page is parsed (page index as argument); an
/// error from it aborts the walk, which is how the storage layer wires up
/// cancellation. `on_record` receives each record in file order.
///
/// Consistency checks per page: the page must lie entirely within `data`,
/// and its first record's ckey must equal the page-table `first_ckey`.
/// When `verify_checksums` is set, the MD5 of each page must match the page
/// table as well; the check is off by default because it dominates load time
/// on large manifests.
pub fn visit_ckey_pages<E: From<Error>>(
    data: &[u8],
    header: &EncodingHeader,
    verify_checksums: bool,
    before_page: &mut dyn FnMut(u32) -> std::result::Result<(), E>,
    on_record: &mut dyn FnMut(EncodingRecord<'_>) -> std::result::Result<(), E>,
) -> std::result::Result<(), E> {
    let table_offset = header.ckey_page_table_offset();
    let page_size = header.ckey_page_size as usize;
    let mut page_offset = header.ckey_pages_offset();

    for page_index in 0..header.ckey_page_count {
        before_page(page_index)?;

        let table_entry = table_offset + page_index as usize * PAGE_TABLE_ENTRY_SIZE;
        let Some(table_entry) = data.get(table_entry..table_entry + PAGE_TABLE_ENTRY_SIZE)
        else {
            return Err(Error::Truncated.into());
        };
        let first_ckey = &table_entry[..MD5_LENGTH];
        let page_hash = &table_entry[MD5_LENGTH..];

        let Some(page) = data.get(page_offset..page_offset + page_size) else {
            return Err(Error::Truncated.into());
        };

        if verify_checksums && md5::compute(page).as_ref() != page_hash {
            return Err(Error::ChecksumMismatch.into());
        }

        visit_page_records(page, first_ckey, on_record)?;
        page_offset += page_size;
    }

    Ok(())
}

/// Parse the records of one page. A record with `ekey_count == 0` terminates
/// the page; whatever follows it is padding.
fn visit_page_records<E: From<Error>>(
    page: &[u8],
    first_ckey: &[u8],
    on_record: &mut dyn FnMut(EncodingRecord<'_>) -> std::result::Result<(), E>,
) -> std::result::Result<(), E> {
    let mut offset = 0;
    let mut first = true;

    // ekey_count[2] + content_size[4] + ckey[16]
    const RECORD_FIXED: usize = 2 + 4 + MD5_LENGTH;

    while offset + RECORD_FIXED <= page.len() {
        let ekey_count = u16::from_be_bytes([page[offset], page[offset + 1]]) as usize;
        if ekey_count == 0 {
            break;
        }

        let content_size = u32::from_be_bytes([
            page[offset + 2],
            page[offset + 3],
            page[offset + 4],
            page[offset + 5],
        ]);
        let ckey = &page[offset + 6..offset + RECORD_FIXED];

        let ekeys_end = offset + RECORD_FIXED + ekey_count * MD5_LENGTH;
        let Some(ekey_data) = page.get(offset + RECORD_FIXED..ekeys_end) else {
            return Err(Error::Truncated.into());
        };

        if first {
            if ckey != first_ckey {
                trace!(
                    "Page first key mismatch: expected {}, found {}",
                    hex::encode(first_ckey),
                    hex::encode(ckey)
                );
                return Err(Error::PageFirstKeyMismatch.into());
            }
            first = false;
        }

        on_record(EncodingRecord {
            ckey,
            content_size,
            ekey_data,
        })?;

        offset = ekeys_end;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_header_size() {
        // Header is exactly 22 bytes on the wire
        let header_size = 2 + 1 + 1 + 1 + 2 + 2 + 4 + 4 + 1 + 4;
        assert_eq!(header_size, ENCODING_HEADER_SIZE);
    }

    #[test]
    fn test_header_round_trip() {
        let header = EncodingHeader {
            version: 1,
            ckey_length: 16,
            ekey_length: 16,
            ckey_page_count: 3,
            ckey_page_size: 4096,
            ekey_page_count: 2,
            ekey_page_size: 1024,
            espec_block_size: 57,
        };

        let mut wire = Vec::new();
        header.write_to(&mut wire);
        assert_eq!(wire.len(), ENCODING_HEADER_SIZE);

        let reparsed = EncodingHeader::parse(&wire).unwrap();
        assert_eq!(reparsed, header);
    }

    #[test]
    fn test_invalid_magic() {
        let mut wire = Vec::new();
        EncodingHeader {
            version: 1,
            ckey_length: 16,
            ekey_length: 16,
            ckey_page_count: 0,
            ckey_page_size: 0,
            ekey_page_count: 0,
            ekey_page_size: 0,
            espec_block_size: 0,
        }
        .write_to(&mut wire);
        wire[0] = 0xFF;

        assert!(matches!(EncodingHeader::parse(&wire), Err(Error::BadMagic)));
    }

    #[test]
    fn test_rejects_other_key_lengths() {
        let mut wire = Vec::new();
        EncodingHeader {
            version: 1,
            ckey_length: 9,
            ekey_length: 16,
            ckey_page_count: 0,
            ckey_page_size: 0,
            ekey_page_count: 0,
            ekey_page_size: 0,
            espec_block_size: 0,
        }
        .write_to(&mut wire);

        assert!(matches!(EncodingHeader::parse(&wire), Err(Error::BadFormat)));
    }

    #[test]
    fn test_rejects_other_versions() {
        let mut wire = Vec::new();
        EncodingHeader {
            version: 2,
            ckey_length: 16,
            ekey_length: 16,
            ckey_page_count: 0,
            ckey_page_size: 0,
            ekey_page_count: 0,
            ekey_page_size: 0,
            espec_block_size: 0,
        }
        .write_to(&mut wire);

        assert!(matches!(EncodingHeader::parse(&wire), Err(Error::BadFormat)));
    }
}
