//! Resume tokens: `nonce_hex.mac_hex`.
//!
//! The MAC is HMAC-SHA256 over `session_id (BE bytes) || nonce_hex`,
//! keyed with the Gate's secret. A token proves possession of the exact
//! string the Gate issued for that session: verification checks the MAC
//! in constant time AND the Gate separately requires equality with the
//! session's stored token, so a stolen token without the server's session
//! record is useless.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;

/// Issues a fresh token bound to `session_id`.
pub fn sign(secret: &[u8], session_id: i64) -> String {
    let nonce: [u8; NONCE_LEN] = rand::rng().random();
    let nonce_hex = hex_encode(&nonce);

    let mac_hex = hex_encode(&mac_bytes(secret, session_id, &nonce_hex));
    format!("{nonce_hex}.{mac_hex}")
}

/// Checks a presented token against `session_id`. Constant-time on the
/// MAC comparison.
pub fn verify(secret: &[u8], session_id: i64, token: &str) -> bool {
    let Some((nonce_hex, mac_hex)) = token.split_once('.') else {
        return false;
    };
    let Some(presented_mac) = hex_decode(mac_hex) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key size");
    mac.update(&session_id.to_be_bytes());
    mac.update(nonce_hex.as_bytes());
    mac.verify_slice(&presented_mac).is_ok()
}

fn mac_bytes(secret: &[u8], session_id: i64, nonce_hex: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key size");
    mac.update(&session_id.to_be_bytes());
    mac.update(nonce_hex.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
