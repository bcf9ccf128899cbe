// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use crate::{Fingerprint, FINGERPRINT_HEX_LEN};

/// A minimal stand-in for an encoded body: a length-prefixed name header followed by
/// statement bytes, the same framing the real encoder uses.
fn encoded_body(name: &str, stmts: &[u8]) -> Vec<u8> {
    let mut encoding = Vec::new();
    encoding.extend_from_slice(&(name.len() as u64).to_le_bytes());
    encoding.extend_from_slice(name.as_bytes());
    encoding.extend_from_slice(stmts);
    encoding
}

#[test]
fn identical_encodings_share_a_fingerprint() {
    assert_eq!(
        Fingerprint::of_bytes(&encoded_body("saxpy", &[1, 2, 3])),
        Fingerprint::of_bytes(&encoded_body("saxpy", &[1, 2, 3]))
    );
}

#[test]
fn any_byte_change_changes_the_fingerprint() {
    let base = encoded_body("saxpy", &[1, 2, 3]);
    let base_fingerprint = Fingerprint::of_bytes(&base);
    for i in 0..base.len() {
        let mut flipped = base.clone();
        flipped[i] ^= 0x01;
        assert_ne!(Fingerprint::of_bytes(&flipped), base_fingerprint);
    }
}

#[test]
fn name_length_header_prevents_boundary_collisions() {
    // A body named "ab" with statement byte c must not collide with one named "a" whose
    // statements happen to start with b.
    assert_ne!(
        Fingerprint::of_bytes(&encoded_body("ab", b"c")),
        Fingerprint::of_bytes(&encoded_body("a", b"bc"))
    );
}

#[test]
fn known_digest() {
    // The standard SHA-256 test vector, rendered word by word.
    assert_eq!(
        Fingerprint::of_bytes(b"abc").to_hex(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn hex_round_trip() {
    let fingerprint = Fingerprint::of_bytes(&encoded_body("fill", &[7]));
    let hex = fingerprint.to_hex();
    assert_eq!(hex.len(), FINGERPRINT_HEX_LEN);
    assert_eq!(Fingerprint::parse(&hex).unwrap(), fingerprint);
    assert_eq!(hex.parse::<Fingerprint>().unwrap(), fingerprint);
}

#[test]
fn parse_accepts_uppercase() {
    let hex = Fingerprint::of_bytes(b"abc").to_hex().to_uppercase();
    assert_eq!(
        Fingerprint::parse(&hex).unwrap(),
        Fingerprint::of_bytes(b"abc")
    );
}

#[test]
fn parse_rejects_malformed_input() {
    Fingerprint::parse("abcd").expect_err("too short");

    let mut long = Fingerprint::of_bytes(b"abc").to_hex();
    long.push('0');
    Fingerprint::parse(&long).expect_err("too long");

    Fingerprint::parse(&"z".repeat(FINGERPRINT_HEX_LEN)).expect_err("not hex digits");
}

#[test]
fn prefix_is_the_leading_word() {
    let fingerprint = Fingerprint::of_bytes(b"abc");
    assert_eq!(fingerprint.prefix(), 0xba78_16bf_8f01_cfea);
    assert_eq!(fingerprint.prefix(), fingerprint.words()[0]);
}

#[test]
fn display_and_debug_render_hex() {
    let fingerprint = Fingerprint::of_bytes(b"abc");
    assert_eq!(format!("{fingerprint}"), fingerprint.to_hex());
    assert!(format!("{fingerprint:?}").contains(&fingerprint.to_hex()));
}
