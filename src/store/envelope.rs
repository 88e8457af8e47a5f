// ABOUTME: Versioned envelope wrapping serialized payloads so on-disk rows tolerate schema evolution
// ABOUTME: Shared by the unified cache's persist/load path and the warmup controller's direct store writes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::errors::{CoreError, CoreResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const CURRENT_VERSION: u16 = 1;

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: u16,
    payload: &'a T,
}

/// Serialize `payload` into a versioned, self-describing byte envelope (§6).
///
/// # Errors
/// Returns an error if serialization fails.
pub fn wrap<T: Serialize>(payload: &T) -> CoreResult<Vec<u8>> {
    let envelope = Envelope {
        version: CURRENT_VERSION,
        payload,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Deserialize a versioned envelope previously produced by [`wrap`].
///
/// # Errors
/// Returns an error if the bytes are malformed or the envelope version is unsupported.
pub fn unwrap<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    #[derive(Deserialize)]
    struct Owned<T> {
        version: u16,
        payload: T,
    }
    let envelope: Owned<T> = serde_json::from_slice(bytes)?;
    if envelope.version != CURRENT_VERSION {
        return Err(CoreError::store(format!(
            "unsupported envelope version: {}",
            envelope.version
        )));
    }
    Ok(envelope.payload)
}
