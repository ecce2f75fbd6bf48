//! Opaque byte transforms applied to data at rest and on the wire.
//!
//! The core never interprets the transform: upload bodies are run through [`Transform::encode`]
//! before sending, and cached data written by an earlier process is run through
//! [`Transform::decode`] when read back. Hosts plug in real encryption here; the default is a
//! pass-through.

use std::io;

use base64::prelude::{Engine, BASE64_STANDARD};

pub trait Transform: Send + Sync {
    fn encode(&self, input: &[u8]) -> Vec<u8>;

    /// Invert [`Transform::encode`]. Fails if the input was not produced by this transform.
    fn decode(&self, input: &[u8]) -> io::Result<Vec<u8>>;
}

/// Pass-through transform. The default.
pub struct NoopTransform;

impl Transform for NoopTransform {
    fn encode(&self, input: &[u8]) -> Vec<u8> {
        input.to_vec()
    }

    fn decode(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        Ok(input.to_vec())
    }
}

/// Base64 obfuscation. Not encryption; keeps payloads from being trivially greppable at rest.
pub struct Base64Transform;

impl Transform for Base64Transform {
    fn encode(&self, input: &[u8]) -> Vec<u8> {
        BASE64_STANDARD.encode(input).into_bytes()
    }

    fn decode(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        BASE64_STANDARD
            .decode(input)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}
