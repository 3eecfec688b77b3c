//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::BytesMut;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

// Length of the authentication field in the OSPFv2 packet header.
pub const AUTH_FIELD_LENGTH: usize = 8;
// Length of the cryptographic authentication trailer (MD5).
pub const MD5_DIGEST_LENGTH: u8 = 16;

// A single cryptographic authentication key.
//
// The four timestamps delimit the key's rollover windows, expressed in
// seconds of engine elapsed time. An absent timestamp means "always".
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct AuthKey {
    pub id: u8,
    pub key: Vec<u8>,
    pub start_accept: Option<u32>,
    pub start_generate: Option<u32>,
    pub stop_generate: Option<u32>,
    pub stop_accept: Option<u32>,
}

// Authentication configured on an interface.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AuthMethod {
    // 8-byte simple password.
    Simple(Vec<u8>),
    // MD5 keys indexed by key ID.
    Cryptographic(Vec<AuthKey>),
}

// Context used when signing an outgoing packet.
#[derive(Clone, Copy, Debug)]
pub enum AuthEncodeCtx<'a> {
    Simple(&'a [u8]),
    Cryptographic { key: &'a AuthKey, seqno: u32 },
}

// Context used when validating a received packet.
#[derive(Clone, Copy, Debug)]
pub struct AuthDecodeCtx<'a> {
    pub method: &'a AuthMethod,
    // Engine elapsed time in seconds, for key acceptance windows.
    pub now: u32,
}

// ===== impl AuthKey =====

impl AuthKey {
    pub fn accept_valid(&self, now: u32) -> bool {
        self.start_accept.is_none_or(|start| now >= start)
            && self.stop_accept.is_none_or(|stop| now < stop)
    }

    pub fn generate_valid(&self, now: u32) -> bool {
        self.start_generate.is_none_or(|start| now >= start)
            && self.stop_generate.is_none_or(|stop| now < stop)
    }
}

// ===== impl AuthMethod =====

impl AuthMethod {
    // Selects the key used to sign outgoing packets: the valid key with the
    // highest ID, falling back to the most recently configured one so that
    // packets keep flowing even with a misconfigured rollover.
    pub fn generate_key(&self, now: u32) -> Option<&AuthKey> {
        match self {
            AuthMethod::Simple(_) => None,
            AuthMethod::Cryptographic(keys) => keys
                .iter()
                .filter(|key| key.generate_valid(now))
                .max_by_key(|key| key.id)
                .or(keys.last()),
        }
    }

    pub fn accept_key(&self, id: u8, now: u32) -> Option<&AuthKey> {
        match self {
            AuthMethod::Simple(_) => None,
            AuthMethod::Cryptographic(keys) => keys
                .iter()
                .find(|key| key.id == id)
                .filter(|key| key.accept_valid(now)),
        }
    }
}

// ===== global functions =====

// Computes the RFC 2328 Appendix D message digest: MD5 over the packet
// followed by the key padded to 16 bytes.
pub fn message_digest(data: &[u8], key: &[u8]) -> [u8; 16] {
    let mut padded_key = [0u8; 16];
    let len = key.len().min(16);
    padded_key[..len].copy_from_slice(&key[..len]);

    let mut ctx = Md5::new();
    ctx.update(data);
    ctx.update(padded_key);
    ctx.finalize().into()
}

// Appends the cryptographic authentication trailer.
pub(crate) fn encode_trailer(buf: &mut BytesMut, key: &AuthKey) {
    let digest = message_digest(buf, &key.key);
    buf.extend_from_slice(&digest);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: u8) -> AuthKey {
        AuthKey {
            id,
            key: b"secret".to_vec(),
            start_accept: None,
            start_generate: Some(100),
            stop_generate: Some(200),
            stop_accept: Some(300),
        }
    }

    #[test]
    fn key_windows() {
        let key = key(1);
        assert!(!key.generate_valid(99));
        assert!(key.generate_valid(100));
        assert!(!key.generate_valid(200));
        assert!(key.accept_valid(250));
        assert!(!key.accept_valid(300));
    }

    #[test]
    fn generate_key_selection() {
        let method = AuthMethod::Cryptographic(vec![key(1), key(2)]);
        // Both valid: the highest ID wins.
        assert_eq!(method.generate_key(150).unwrap().id, 2);
        // None valid: fall back to the last configured key.
        assert_eq!(method.generate_key(500).unwrap().id, 2);
    }

    #[test]
    fn digest_is_stable() {
        let a = message_digest(b"packet", b"key");
        let b = message_digest(b"packet", b"key");
        assert_eq!(a, b);
        assert_ne!(a, message_digest(b"packet", b"other"));
    }
}
