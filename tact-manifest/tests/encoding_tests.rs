use tact_manifest::encoding::{visit_ckey_pages, EncodingHeader, EncodingRecord};
use tact_manifest::Error;

const PAGE_SIZE: u32 = 1024;

struct Record {
    ckey: [u8; 16],
    content_size: u32,
    ekeys: Vec<[u8; 16]>,
}

impl Record {
    fn new(ckey: u8, content_size: u32, ekeys: &[u8]) -> Self {
        Record {
            ckey: [ckey; 16],
            content_size,
            ekeys: ekeys.iter().map(|&b| [b; 16]).collect(),
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.ekeys.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.content_size.to_be_bytes());
        out.extend_from_slice(&self.ckey);
        for ekey in &self.ekeys {
            out.extend_from_slice(ekey);
        }
    }
}

/// Assemble a complete encoding file: header, ESpec block, CKey page table,
/// CKey pages. Pages are padded with zeros to the page size.
fn build_encoding_file(espec: &[u8], pages: &[Vec<Record>]) -> Vec<u8> {
    let header = EncodingHeader {
        version: 1,
        ckey_length: 16,
        ekey_length: 16,
        ckey_page_count: pages.len() as u32,
        ckey_page_size: PAGE_SIZE,
        ekey_page_count: 0,
        ekey_page_size: 0,
        espec_block_size: espec.len() as u32,
    };

    let mut page_blobs = Vec::new();
    for records in pages {
        let mut page = Vec::new();
        for record in records {
            record.write_to(&mut page);
        }
        page.resize(PAGE_SIZE as usize, 0);
        page_blobs.push(page);
    }

    let mut data = Vec::new();
    header.write_to(&mut data);
    data.extend_from_slice(espec);
    for (records, page) in pages.iter().zip(&page_blobs) {
        data.extend_from_slice(&records[0].ckey); // first_ckey
        data.extend_from_slice(md5::compute(page).as_ref()); // page hash
    }
    for page in &page_blobs {
        data.extend_from_slice(page);
    }
    data
}

fn collect_records(data: &[u8]) -> Result<Vec<([u8; 16], u32, usize)>, Error> {
    let header = EncodingHeader::parse(data)?;
    let mut out = Vec::new();
    visit_ckey_pages::<Error>(
        data,
        &header,
        false,
        &mut |_| Ok(()),
        &mut |r: EncodingRecord| {
            out.push((r.ckey.try_into().unwrap(), r.content_size, r.ekey_count()));
            Ok(())
        },
    )?;
    Ok(out)
}

#[test]
fn test_walk_two_pages() {
    let data = build_encoding_file(
        b"z\nb:{16K*=z}",
        &[
            vec![
                Record::new(0x01, 100, &[0x11]),
                Record::new(0x02, 200, &[0x12, 0x13]),
            ],
            vec![Record::new(0x03, 300, &[0x14])],
        ],
    );

    let records = collect_records(&data).unwrap();
    assert_eq!(
        records,
        [
            ([0x01; 16], 100, 1),
            ([0x02; 16], 200, 2),
            ([0x03; 16], 300, 1),
        ]
    );
}

#[test]
fn test_multi_ekey_record_exposes_all_keys() {
    let data = build_encoding_file(&[], &[vec![Record::new(0x0E, 64, &[0xA1, 0xA2, 0xA3])]]);

    let header = EncodingHeader::parse(&data).unwrap();
    let mut seen = Vec::new();
    visit_ckey_pages::<Error>(&data, &header, true, &mut |_| Ok(()), &mut |r| {
        assert_eq!(r.first_ekey(), &[0xA1; 16]);
        for i in 0..r.ekey_count() {
            seen.push(r.ekey(i)[0]);
        }
        Ok(())
    })
    .unwrap();
    assert_eq!(seen, [0xA1, 0xA2, 0xA3]);
}

#[test]
fn test_terminator_stops_page_parse() {
    // A record, then a zero terminator, then junk that would be an invalid
    // record (huge ekey count) if anything tried to parse it.
    let mut data = build_encoding_file(&[], &[vec![Record::new(0x01, 1, &[0x11])]]);
    let junk_offset = data.len() - PAGE_SIZE as usize + 38 + 2;
    data[junk_offset..junk_offset + 4].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);

    let records = collect_records(&data).unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn test_first_key_mismatch_is_corrupt() {
    let mut data = build_encoding_file(&[], &[vec![Record::new(0xBB, 1, &[0x11])]]);
    // Doctor the page table to claim a different first key.
    let header = EncodingHeader::parse(&data).unwrap();
    let table_offset = 22 + header.espec_block_size as usize;
    data[table_offset..table_offset + 16].copy_from_slice(&[0xAA; 16]);

    assert!(matches!(
        collect_records(&data),
        Err(Error::PageFirstKeyMismatch)
    ));
}

#[test]
fn test_truncated_page_is_detected() {
    let mut data = build_encoding_file(&[], &[vec![Record::new(0x01, 1, &[0x11])]]);
    data.truncate(data.len() - 100);

    assert!(matches!(collect_records(&data), Err(Error::Truncated)));
}

#[test]
fn test_page_checksum_verification_is_optional() {
    let mut data = build_encoding_file(&[], &[vec![Record::new(0x01, 1, &[0x11])]]);
    // Flip a padding byte so the stored page hash no longer matches.
    let last = data.len() - 1;
    data[last] ^= 0xFF;

    // Off by default path: parses fine.
    assert_eq!(collect_records(&data).unwrap().len(), 1);

    // Opted in: rejected.
    let header = EncodingHeader::parse(&data).unwrap();
    let result = visit_ckey_pages(&data, &header, true, &mut |_| Ok(()), &mut |_| Ok(()));
    assert!(matches!(result, Err(Error::ChecksumMismatch)));
}

#[test]
fn test_before_page_error_aborts_walk() {
    let data = build_encoding_file(
        &[],
        &[
            vec![Record::new(0x01, 1, &[0x11])],
            vec![Record::new(0x02, 2, &[0x12])],
        ],
    );

    let header = EncodingHeader::parse(&data).unwrap();
    let mut records = 0;
    let result = visit_ckey_pages(
        &data,
        &header,
        false,
        &mut |page| {
            if page == 1 {
                Err(Error::Truncated)
            } else {
                Ok(())
            }
        },
        &mut |_| {
            records += 1;
            Ok(())
        },
    );
    assert!(result.is_err());
    assert_eq!(records, 1);
}
