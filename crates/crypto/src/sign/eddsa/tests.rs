use super::*;
use crate::hash::sha256;

#[test]
fn seed_derivation_is_deterministic() {
    let a = SecretKey::from_seed(&sha256("genesis")).unwrap();
    let b = SecretKey::from_seed(&sha256("genesis")).unwrap();
    assert_eq!(a.public_key(), b.public_key());

    let c = SecretKey::from_seed(&sha256("alice")).unwrap();
    assert_ne!(a.public_key(), c.public_key());
}

#[test]
fn sign_and_verify_roundtrip() {
    let key = SecretKey::from_seed(&sha256("alice")).unwrap();
    let digest = sha256(b"message");

    let signature = key.sign(&digest).unwrap();
    assert!(key.public_key().verify(&signature, &digest));
}

#[test]
fn tampered_signature_fails() {
    let key = SecretKey::from_seed(&sha256("alice")).unwrap();
    let digest = sha256(b"message");
    let mut signature = key.sign(&digest).unwrap();

    signature[0] ^= 0x01;
    assert!(!key.public_key().verify(&signature, &digest));
}

#[test]
fn tampered_digest_fails() {
    let key = SecretKey::from_seed(&sha256("alice")).unwrap();
    let digest = sha256(b"message");
    let signature = key.sign(&digest).unwrap();

    let mut other = digest;
    other[31] ^= 0x80;
    assert!(!key.public_key().verify(&signature, &other));
}

#[test]
fn wrong_key_fails() {
    let alice = SecretKey::from_seed(&sha256("alice")).unwrap();
    let bob = SecretKey::from_seed(&sha256("bob")).unwrap();
    let digest = sha256(b"message");
    let signature = alice.sign(&digest).unwrap();

    assert!(!bob.public_key().verify(&signature, &digest));
}

#[test]
fn public_key_serialization_roundtrip() {
    let key = SecretKey::from_seed(&sha256("alice")).unwrap();
    let bytes = key.public_key().to_bytes();
    let parsed = PublicKey::from_bytes(&bytes).unwrap();
    assert_eq!(parsed, key.public_key());
}
