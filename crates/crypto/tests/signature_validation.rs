use vdr_crypto::{verify, Capabilities, KeyManager};
use vdr_types::{Address, VdrError};
use zeroize::Zeroizing;

const DETERMINISTIC_SEED: [u8; 32] = [42u8; 32];

#[test]
fn signature_roundtrip_succeeds() {
    let manager = KeyManager::new();
    let handle = manager.generate();
    let message = b"vdr::crypto::signature::roundtrip";

    let signature = manager.sign(&handle, message).unwrap();
    assert!(verify(&signature, message).is_ok());
}

#[test]
fn tampered_signature_is_rejected() {
    let manager = KeyManager::new();
    let handle = manager.generate();
    let message = b"vdr::crypto::signature::tamper-check";

    let mut signature = manager.sign(&handle, message).unwrap();
    signature.bytes[0] ^= 0xFF;
    assert!(matches!(
        verify(&signature, message),
        Err(VdrError::SigningError(_))
    ));
}

#[test]
fn address_is_derived_from_public_key() {
    let manager = KeyManager::new();
    let handle = manager.import_seed(Zeroizing::new(DETERMINISTIC_SEED));
    let public_key = manager.public_key(&handle).unwrap();
    assert_eq!(
        manager.address(&handle).unwrap(),
        Address::from_public_key(&public_key)
    );
}

#[test]
fn sign_only_handle_still_signs_after_sibling_restriction() {
    let manager = KeyManager::new();
    let owner = manager.import_seed(Zeroizing::new(DETERMINISTIC_SEED));
    let signer = manager.restrict(&owner, Capabilities::SIGN_ONLY).unwrap();

    let a = manager.sign(&owner, b"payload").unwrap();
    let b = manager.sign(&signer, b"payload").unwrap();
    assert_eq!(a, b);
}
