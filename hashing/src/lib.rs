// Copyright 2025 Taskflow project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder};
use digest::consts::U32;
use generic_array::GenericArray;
use sha2::{Digest, Sha256};

pub const FINGERPRINT_WORDS: usize = 4;
pub const FINGERPRINT_HEX_LEN: usize = FINGERPRINT_WORDS * 16;

///
/// A 256-bit content address for an encoded task body.
///
/// Stored as big-endian words rather than raw bytes: equality, ordering, and prefix
/// extraction all work on word-sized units, and the hex rendering is the concatenation of
/// the words. Two bodies with equal fingerprints are interchangeable everywhere a body
/// handle is passed.
///
#[derive(Clone, Copy, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Fingerprint([u64; FINGERPRINT_WORDS]);

impl Fingerprint {
    ///
    /// Wraps a finished SHA-256 digest.
    ///
    pub fn from_digest(digest: GenericArray<u8, U32>) -> Fingerprint {
        let mut words = [0; FINGERPRINT_WORDS];
        BigEndian::read_u64_into(digest.as_slice(), &mut words);
        Fingerprint(words)
    }

    ///
    /// Fingerprints an encoding held in memory. Streamed encodings go through `BodyHasher`
    /// instead.
    ///
    pub fn of_bytes(bytes: &[u8]) -> Fingerprint {
        let mut digest = Sha256::default();
        digest.update(bytes);
        Fingerprint::from_digest(digest.finalize())
    }

    pub fn parse(hex: &str) -> Result<Fingerprint, String> {
        if hex.len() != FINGERPRINT_HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!(
                "Not a {FINGERPRINT_HEX_LEN}-digit hex string: {hex:?}"
            ));
        }
        let mut words = [0; FINGERPRINT_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            *word = u64::from_str_radix(&hex[i * 16..(i + 1) * 16], 16)
                .map_err(|e| format!("Not a hex string: {hex:?}: {e}"))?;
        }
        Ok(Fingerprint(words))
    }

    pub fn words(&self) -> &[u64; FINGERPRINT_WORDS] {
        &self.0
    }

    ///
    /// A short but still strong hash: the leading word. The underlying hash mixes the
    /// whole body, so the prefix is safe for sharding and cheap prefilters.
    ///
    pub fn prefix(&self) -> u64 {
        self.0[0]
    }

    pub fn to_hex(self) -> String {
        self.0.iter().map(|word| format!("{word:016x}")).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fingerprint::parse(s)
    }
}

///
/// An `io::Write` sink that fingerprints a body encoding as it streams through, so
/// interning never materializes the full encoding.
///
pub struct BodyHasher {
    digest: Sha256,
    bytes_hashed: usize,
}

impl BodyHasher {
    pub fn new() -> BodyHasher {
        BodyHasher {
            digest: Sha256::default(),
            bytes_hashed: 0,
        }
    }

    pub fn bytes_hashed(&self) -> usize {
        self.bytes_hashed
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint::from_digest(self.digest.finalize())
    }
}

impl Write for BodyHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.digest.update(buf);
        self.bytes_hashed += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod fingerprint_tests;
