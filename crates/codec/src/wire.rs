//! Length-prefixed primitives shared by the record and transaction layouts.

use crate::CodecError;
use vdr_types::{Address, Did, ADDRESS_BYTES};

pub(crate) fn put_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub(crate) fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_short_bytes(
    out: &mut Vec<u8>,
    field: &'static str,
    bytes: &[u8],
) -> Result<(), CodecError> {
    let len = u16::try_from(bytes.len()).map_err(|_| CodecError::TooLong {
        field,
        len: bytes.len(),
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

pub(crate) fn put_long_bytes(
    out: &mut Vec<u8>,
    field: &'static str,
    bytes: &[u8],
) -> Result<(), CodecError> {
    let len = u32::try_from(bytes.len()).map_err(|_| CodecError::TooLong {
        field,
        len: bytes.len(),
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

pub(crate) fn put_did(out: &mut Vec<u8>, did: &Did) -> Result<(), CodecError> {
    put_short_bytes(out, "id", did.as_str().as_bytes())
}

/// Forward-only cursor over an encoded value.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub(crate) fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .offset
            .checked_add(needed)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(CodecError::Truncated {
                offset: self.offset,
                needed,
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub(crate) fn fixed<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        self.array()
    }

    pub(crate) fn short_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    pub(crate) fn long_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    pub(crate) fn short_string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let bytes = self.short_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8(field))
    }

    pub(crate) fn long_string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let bytes = self.long_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8(field))
    }

    pub(crate) fn did(&mut self) -> Result<Did, CodecError> {
        let raw = self.short_string("id")?;
        Did::parse(raw).map_err(|err| CodecError::InvalidDid(err.to_string()))
    }

    pub(crate) fn address(&mut self) -> Result<Address, CodecError> {
        Ok(Address(self.fixed::<ADDRESS_BYTES>()?))
    }

    pub(crate) fn finish(self) -> Result<(), CodecError> {
        match self.bytes.len() - self.offset {
            0 => Ok(()),
            rest => Err(CodecError::TrailingBytes(rest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reports_truncation_offset() {
        let mut reader = Reader::new(&[0, 5, 1, 2]);
        assert_eq!(
            reader.short_bytes().unwrap_err(),
            CodecError::Truncated {
                offset: 2,
                needed: 5
            }
        );
    }

    #[test]
    fn reader_rejects_trailing_bytes() {
        let mut reader = Reader::new(&[1, 2, 3]);
        reader.u8().unwrap();
        assert_eq!(reader.finish().unwrap_err(), CodecError::TrailingBytes(2));
    }

    #[test]
    fn oversized_short_field_is_refused() {
        let mut out = Vec::new();
        let big = vec![0u8; u16::MAX as usize + 1];
        assert!(matches!(
            put_short_bytes(&mut out, "key", &big),
            Err(CodecError::TooLong { field: "key", .. })
        ));
    }
}
