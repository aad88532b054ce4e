//! Internal utility functions

use std::io::{Error, ErrorKind, Read};

/// Reads for the odd widths the wire formats use and `byteorder` does not
/// cover. Standard widths go through `byteorder::ReadBytesExt`.
pub trait ReadInt {
    /// Error type which can be returned on read failures.
    type Error;

    /// Read a big-endian 40-bit unsigned integer from the buffer.
    fn read_u40be(&mut self) -> Result<u64, Self::Error>;

    /// Read an `n`-byte big-endian unsigned integer, `n` in `0..=8`.
    fn read_uint_be(&mut self, n: usize) -> Result<u64, Self::Error>;

    /// Read a NUL-terminated string. The terminator must be present.
    fn read_cstring(&mut self) -> Result<String, Self::Error>;
}

impl<T: Read> ReadInt for T {
    type Error = Error;

    fn read_u40be(&mut self) -> Result<u64, Self::Error> {
        let mut b = [0; size_of::<u64>()];
        self.read_exact(&mut b[3..])?;
        Ok(u64::from_be_bytes(b))
    }

    fn read_uint_be(&mut self, n: usize) -> Result<u64, Self::Error> {
        debug_assert!(n <= 8);
        let mut b = [0; size_of::<u64>()];
        self.read_exact(&mut b[8 - n..])?;
        Ok(u64::from_be_bytes(b))
    }

    fn read_cstring(&mut self) -> Result<String, Self::Error> {
        let mut out = Vec::new();
        loop {
            let mut b = [0; 1];
            if self.read(&mut b)? == 0 {
                return Err(Error::new(
                    ErrorKind::UnexpectedEof,
                    "unterminated string",
                ));
            }
            if b[0] == 0 {
                break;
            }
            out.push(b[0]);
        }
        String::from_utf8(out).map_err(|e| Error::new(ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_u40be() {
        let data = [0x00, 0x00, 0x00, 0x00, 0x4D];
        assert_eq!(Cursor::new(data).read_u40be().unwrap(), 77);

        let data = [0x01, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(Cursor::new(data).read_u40be().unwrap(), 1 << 32);
    }

    #[test]
    fn test_read_uint_be_widths() {
        let data = [0xAB, 0xCD, 0xEF];
        assert_eq!(Cursor::new(data).read_uint_be(3).unwrap(), 0x00AB_CDEF);
        assert_eq!(Cursor::new([]).read_uint_be(0).unwrap(), 0);
    }

    #[test]
    fn test_read_cstring() {
        let mut c = Cursor::new(b"Windows\0rest".to_vec());
        assert_eq!(c.read_cstring().unwrap(), "Windows");

        let mut c = Cursor::new(b"noterm".to_vec());
        assert!(c.read_cstring().is_err());
    }
}
