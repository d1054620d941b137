//! Signed capability token binding a visitor session to its conversation thread.
//!
//! The token is the only durable record of the session-to-thread binding: the
//! server keeps no session table. Format: `base64url(json payload) "." hex hmac`,
//! where the HMAC-SHA256 digest covers the encoded portion and is keyed by the
//! deployment's signing secret.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::domain::{ChannelId, SessionId, ThreadId};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    #[serde(rename = "channelId")]
    pub channel_id: ChannelId,
    #[serde(rename = "threadId")]
    pub thread_id: ThreadId,
}

/// Produce a signed, URL-safe token for `payload`.
pub fn sign(payload: &TokenPayload, secret: &[u8]) -> String {
    let canonical = match serde_json::to_vec(payload) {
        Ok(bytes) => bytes,
        // TokenPayload is three strings; serialization cannot fail in practice,
        // but an empty encoding still yields a verifiable (if useless) token.
        Err(_) => Vec::new(),
    };
    let encoded = URL_SAFE_NO_PAD.encode(canonical);
    let digest = hmac_hex(secret, encoded.as_bytes());
    format!("{encoded}.{digest}")
}

/// Verify and decode a token.
///
/// Malformed input, truncation, a wrong secret, and payload-decode failures all
/// collapse to `None`: callers treat an invalid token as "no thread binding" and
/// must not be able to distinguish why verification failed.
pub fn verify(token: &str, secret: &[u8]) -> Option<TokenPayload> {
    let (encoded, digest) = token.split_once('.')?;
    if encoded.is_empty() || digest.is_empty() || digest.contains('.') {
        return None;
    }

    let expected = hmac_hex(secret, encoded.as_bytes());
    if expected.as_bytes() != digest.as_bytes() {
        return None;
    }

    let canonical = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    serde_json::from_slice(&canonical).ok()
}

fn hmac_hex(secret: &[u8], payload: &[u8]) -> String {
    // HMAC accepts keys of any length; new_from_slice only fails for
    // variable-output MACs, never for HMAC-SHA256.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    encode_hex(mac.finalize().into_bytes().as_slice())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{sign, verify, TokenPayload};
    use crate::domain::{ChannelId, SessionId, ThreadId};

    const SECRET: &[u8] = b"test-signing-secret";

    fn payload() -> TokenPayload {
        TokenPayload {
            session_id: SessionId("sess-4f2a".to_string()),
            channel_id: ChannelId("C0LEADS01".to_string()),
            thread_id: ThreadId("1730000000.000100".to_string()),
        }
    }

    #[test]
    fn sign_then_verify_round_trips_the_payload() {
        let token = sign(&payload(), SECRET);
        assert_eq!(verify(&token, SECRET), Some(payload()));
    }

    #[test]
    fn every_single_byte_mutation_fails_verification() {
        let token = sign(&payload(), SECRET);
        for index in 0..token.len() {
            let mut mutated = token.clone().into_bytes();
            mutated[index] = if mutated[index] == b'A' { b'B' } else { b'A' };
            let Ok(mutated) = String::from_utf8(mutated) else { continue };
            if mutated == token {
                continue;
            }
            assert_eq!(verify(&mutated, SECRET), None, "mutation at byte {index} was accepted");
        }
    }

    #[test]
    fn token_signed_with_one_secret_is_rejected_by_another() {
        let token = sign(&payload(), SECRET);
        assert_eq!(verify(&token, b"a-different-secret"), None);
    }

    #[test]
    fn malformed_tokens_are_rejected_without_panicking() {
        for garbage in ["", ".", "abc", "abc.", ".def", "a.b.c", "not base64!.deadbeef"] {
            assert_eq!(verify(garbage, SECRET), None, "accepted malformed token {garbage:?}");
        }
    }

    #[test]
    fn truncated_token_is_rejected() {
        let token = sign(&payload(), SECRET);
        let truncated = &token[..token.len() - 2];
        assert_eq!(verify(truncated, SECRET), None);
    }

    #[test]
    fn token_is_url_safe() {
        let token = sign(&payload(), SECRET);
        assert!(token.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')));
    }
}
