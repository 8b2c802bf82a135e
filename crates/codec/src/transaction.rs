use crate::wire::{put_did, put_long_bytes, put_u64, put_u8, Reader};
use crate::CodecError;
use vdr_types::{OperationKind, Signature, Transaction};

/// Leading byte of every encoded transaction.
pub const TRANSACTION_FORMAT: u8 = 0x02;

/// Domain separator prepended to the bytes a signer signs.
pub const SIGNING_DOMAIN: &[u8] = b"VDR_TX_V1";

fn encode_body(tx: &Transaction, out: &mut Vec<u8>) -> Result<(), CodecError> {
    put_u8(out, TRANSACTION_FORMAT);
    put_u8(out, tx.kind().tag());
    put_u64(out, tx.chain_id());
    put_u64(out, tx.nonce());
    out.extend_from_slice(tx.from().as_bytes());
    put_did(out, tx.target())?;
    put_long_bytes(out, "payload", tx.payload())
}

/// Bytes covered by the transaction signature.
pub fn signing_bytes(tx: &Transaction) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(SIGNING_DOMAIN.len() + 64 + tx.payload().len());
    out.extend_from_slice(SIGNING_DOMAIN);
    encode_body(tx, &mut out)?;
    Ok(out)
}

/// Encode a transaction for submission. Unsigned transactions encode with an
/// empty signature section.
pub fn encode_transaction(tx: &Transaction) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(64 + tx.payload().len() + 97);
    encode_body(tx, &mut out)?;
    match tx.signature() {
        Some(signature) => {
            put_u8(&mut out, 1);
            out.extend_from_slice(&signature.public_key);
            out.extend_from_slice(&signature.bytes);
        }
        None => put_u8(&mut out, 0),
    }
    Ok(out)
}

pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, CodecError> {
    let mut reader = Reader::new(bytes);

    let format = reader.u8()?;
    if format != TRANSACTION_FORMAT {
        return Err(CodecError::UnknownFormat(format));
    }
    let kind_tag = reader.u8()?;
    let kind = OperationKind::from_tag(kind_tag).ok_or(CodecError::UnknownTag {
        field: "operation",
        tag: kind_tag,
    })?;
    let chain_id = reader.u64()?;
    let nonce = reader.u64()?;
    let from = reader.address()?;
    let target = reader.did()?;
    let payload = reader.long_bytes()?.to_vec();

    let signature = match reader.u8()? {
        0 => None,
        1 => Some(Signature {
            public_key: reader.fixed::<32>()?,
            bytes: reader.fixed::<64>()?,
        }),
        tag => {
            return Err(CodecError::UnknownTag {
                field: "signature",
                tag,
            })
        }
    };
    reader.finish()?;

    Ok(Transaction::from_parts(
        kind, target, from, chain_id, nonce, payload, signature,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdr_types::{Address, Did, TransactionStatus};

    fn unsigned() -> Transaction {
        Transaction::new(
            OperationKind::Update,
            Did::parse("did:example:123").unwrap(),
            Address::from_public_key(&[7u8; 32]),
            1337,
            42,
            b"payload".to_vec(),
        )
    }

    #[test]
    fn signed_transaction_round_trips() {
        let mut tx = unsigned();
        tx.attach_signature(Signature {
            public_key: [7u8; 32],
            bytes: [3u8; 64],
        })
        .unwrap();

        let decoded = decode_transaction(&encode_transaction(&tx).unwrap()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.status(), TransactionStatus::Signed);
    }

    #[test]
    fn signing_bytes_exclude_signature() {
        let mut tx = unsigned();
        let before = signing_bytes(&tx).unwrap();
        assert!(before.starts_with(SIGNING_DOMAIN));

        tx.attach_signature(Signature {
            public_key: [7u8; 32],
            bytes: [1u8; 64],
        })
        .unwrap();
        assert_eq!(signing_bytes(&tx).unwrap(), before);
    }

    #[test]
    fn signing_bytes_cover_chain_and_nonce() {
        let a = unsigned();
        let b = Transaction::new(
            a.kind(),
            a.target().clone(),
            *a.from(),
            a.chain_id(),
            a.nonce() + 1,
            a.payload().to_vec(),
        );
        assert_ne!(signing_bytes(&a).unwrap(), signing_bytes(&b).unwrap());
    }

    #[test]
    fn bad_signature_flag_is_rejected() {
        let mut bytes = encode_transaction(&unsigned()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 2;
        assert!(matches!(
            decode_transaction(&bytes),
            Err(CodecError::UnknownTag { field: "signature", tag: 2 })
        ));
    }

    #[test]
    fn record_bytes_are_not_a_transaction() {
        let mut bytes = encode_transaction(&unsigned()).unwrap();
        bytes[0] = crate::RECORD_FORMAT;
        assert_eq!(
            decode_transaction(&bytes).unwrap_err(),
            CodecError::UnknownFormat(crate::RECORD_FORMAT)
        );
    }
}
