use thiserror::Error;
use vdr_types::VdrError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
    #[error("unsupported format tag {0:#04x}")]
    UnknownFormat(u8),
    #[error("unknown {field} tag {tag}")]
    UnknownTag { field: &'static str, tag: u8 },
    #[error("field `{0}` is not valid utf-8")]
    InvalidUtf8(&'static str),
    #[error("invalid identifier: {0}")]
    InvalidDid(String),
    #[error("field `{field}` is too long ({len} bytes)")]
    TooLong { field: &'static str, len: usize },
    #[error("duplicate metadata key `{0}`")]
    DuplicateKey(String),
}

impl From<CodecError> for VdrError {
    fn from(err: CodecError) -> Self {
        VdrError::MalformedRecord(err.to_string())
    }
}
