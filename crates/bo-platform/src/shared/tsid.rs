//! TSID Generator
//!
//! Time-sorted identifiers rendered as 13-character Crockford Base32 strings.
//! Used for every opaque string key minted on the client side.
//!
//! Layout (64 bits): 42 bits of milliseconds since the Unix epoch, 10 random
//! bits, 12 bits of a process-wide counter.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::atomic::{AtomicU16, Ordering};

/// Crockford Base32 alphabet (excludes I, L, O, U)
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

const ENCODED_LEN: usize = 13;
const TIMESTAMP_SHIFT: u32 = 22;

static COUNTER: AtomicU16 = AtomicU16::new(0);

pub struct TsidGenerator;

impl TsidGenerator {
    /// Generate a new TSID, e.g. "0HZXEQ5Y8JY5Z"
    pub fn generate() -> String {
        Self::generate_at(Utc::now())
    }

    fn generate_at(now: DateTime<Utc>) -> String {
        let millis = now.timestamp_millis().max(0) as u64;
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed) as u64;
        let random: u64 = rand::thread_rng().gen_range(0..1024);

        let value = ((millis & 0x3FF_FFFF_FFFF) << TIMESTAMP_SHIFT) | (random << 12) | (counter & 0xFFF);
        encode(value)
    }

    /// Whether `value` is a well-formed TSID string
    pub fn is_valid(value: &str) -> bool {
        decode(value).is_some()
    }

    /// Creation instant encoded in the identifier
    pub fn timestamp(value: &str) -> Option<DateTime<Utc>> {
        let raw = decode(value)?;
        DateTime::from_timestamp_millis((raw >> TIMESTAMP_SHIFT) as i64)
    }
}

fn encode(mut value: u64) -> String {
    let mut out = [b'0'; ENCODED_LEN];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(value & 0x1F) as usize];
        value >>= 5;
    }
    out.iter().map(|&b| b as char).collect()
}

fn decode(value: &str) -> Option<u64> {
    if value.len() != ENCODED_LEN {
        return None;
    }

    value.chars().try_fold(0u64, |acc, c| {
        let digit = match c.to_ascii_uppercase() {
            c @ '0'..='9' => c as u64 - '0' as u64,
            c @ 'A'..='H' => c as u64 - 'A' as u64 + 10,
            c @ 'J'..='K' => c as u64 - 'J' as u64 + 18,
            c @ 'M'..='N' => c as u64 - 'M' as u64 + 20,
            c @ 'P'..='T' => c as u64 - 'P' as u64 + 22,
            c @ 'V'..='Z' => c as u64 - 'V' as u64 + 27,
            _ => return None,
        };
        Some((acc << 5) | digit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_tsid() {
        let id = TsidGenerator::generate();
        assert_eq!(id.len(), ENCODED_LEN);
        assert!(TsidGenerator::is_valid(&id));
    }

    #[test]
    fn test_uniqueness() {
        let ids: HashSet<String> = (0..2000).map(|_| TsidGenerator::generate()).collect();
        assert_eq!(ids.len(), 2000);
    }

    #[test]
    fn test_later_ids_sort_after_earlier_ones() {
        let earlier = TsidGenerator::generate_at(Utc::now() - chrono::Duration::seconds(5));
        let later = TsidGenerator::generate();
        assert!(earlier < later);
    }

    #[test]
    fn test_timestamp_is_recoverable() {
        let now = Utc::now();
        let id = TsidGenerator::generate_at(now);
        let ts = TsidGenerator::timestamp(&id).unwrap();
        assert_eq!(ts.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert!(!TsidGenerator::is_valid("short"));
        assert!(!TsidGenerator::is_valid("0HZXEQ5Y8JY5U"));
        assert!(!TsidGenerator::is_valid("0HZXEQ5Y8JY5!"));
    }
}
