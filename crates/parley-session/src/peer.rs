//! Locally minted peer ids.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

static PROCESS_PEER_ID: OnceLock<String> = OnceLock::new();

/// A new peer id: a 32-bit unix timestamp followed by 12 random bytes, as
/// dash-separated hex (`xxxxxxxx-xxxx-xxxx-xxxx-xxxx-xxxxxxxx`).
pub fn generate_peer_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    let random: [u8; 12] = rand::rng().random();

    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&secs.to_be_bytes());
    bytes.extend_from_slice(&random);

    let mut id = String::with_capacity(37);
    for (i, b) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10 | 12) {
            id.push('-');
        }
        id.push_str(&format!("{b:02x}"));
    }
    id
}

/// The peer id for this process, minted on first use.
pub fn process_peer_id() -> &'static str {
    PROCESS_PEER_ID.get_or_init(generate_peer_id)
}
