use crate::wire::{put_did, put_long_bytes, put_short_bytes, put_u64, put_u8, Reader};
use crate::CodecError;
use std::collections::BTreeMap;
use vdr_types::{Record, RecordContent, RecordKind, RecordStatus};

/// Leading byte of every encoded record.
pub const RECORD_FORMAT: u8 = 0x01;

/// Encode a record into its canonical byte form.
///
/// Layout: `format | kind | status | version | owner | id | data | metadata`.
/// Metadata entries are written in key order.
pub fn encode_record(record: &Record) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(64 + record.content.data.len());
    put_u8(&mut out, RECORD_FORMAT);
    put_u8(&mut out, record.kind.tag());
    put_u8(&mut out, record.status.tag());
    put_u64(&mut out, record.version);
    out.extend_from_slice(record.owner.as_bytes());
    put_did(&mut out, &record.id)?;
    put_long_bytes(&mut out, "data", &record.content.data)?;

    let count =
        u16::try_from(record.content.metadata.len()).map_err(|_| CodecError::TooLong {
            field: "metadata",
            len: record.content.metadata.len(),
        })?;
    out.extend_from_slice(&count.to_be_bytes());
    for (key, value) in &record.content.metadata {
        put_short_bytes(&mut out, "metadata key", key.as_bytes())?;
        put_long_bytes(&mut out, "metadata value", value.as_bytes())?;
    }
    Ok(out)
}

/// Decode a record, rejecting anything that is not exactly one canonical
/// encoding.
pub fn decode_record(bytes: &[u8]) -> Result<Record, CodecError> {
    let mut reader = Reader::new(bytes);

    let format = reader.u8()?;
    if format != RECORD_FORMAT {
        return Err(CodecError::UnknownFormat(format));
    }
    let kind_tag = reader.u8()?;
    let kind = RecordKind::from_tag(kind_tag).ok_or(CodecError::UnknownTag {
        field: "kind",
        tag: kind_tag,
    })?;
    let status_tag = reader.u8()?;
    let status = RecordStatus::from_tag(status_tag).ok_or(CodecError::UnknownTag {
        field: "status",
        tag: status_tag,
    })?;
    let version = reader.u64()?;
    let owner = reader.address()?;
    let id = reader.did()?;
    let data = reader.long_bytes()?.to_vec();

    let count = reader.u16()?;
    let mut metadata = BTreeMap::new();
    for _ in 0..count {
        let key = reader.short_string("metadata key")?;
        let value = reader.long_string("metadata value")?;
        if metadata.contains_key(&key) {
            return Err(CodecError::DuplicateKey(key));
        }
        metadata.insert(key, value);
    }
    reader.finish()?;

    Ok(Record {
        id,
        kind,
        version,
        owner,
        content: RecordContent { data, metadata },
        status,
    })
}
