//! Record key and content fingerprint.
//!
//! The key depends only on the identity fields, so two logs for the same
//! device run always land under the same key. The fingerprint covers the
//! exact bytes of the log, so any byte difference (whitespace included)
//! tells a replacement apart from a duplicate.

use crate::record::Identity;
use sha2::{Digest as _, Sha256};

/// Separator between the key components.
pub const KEY_SEPARATOR: char = '-';

/// Hash algorithm identifier stored alongside fingerprints in logs/events.
pub const HASH_ALGORITHM: &str = "SHA-256";

/// Build the persistence key: `{serial}-{YYYYMMDD}-{HHMMSS}`.
pub fn record_key(identity: &Identity) -> String {
    format!(
        "{serial}{sep}{date}{sep}{time}",
        serial = identity.device_serial,
        sep = KEY_SEPARATOR,
        date = identity.date.format("%Y%m%d"),
        time = identity.time.format("%H%M%S"),
    )
}

/// SHA-256 of `raw` as a lowercase hex string (64 chars).
///
/// Ingestion hashes the file bytes as read, before any Latin-1 decoding, so
/// the value matches `sha256sum` of the source file.
pub fn fingerprint(raw: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_ref());
    let hash = hasher.finalize();
    format!("{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn identity(serial: &str) -> Identity {
        Identity {
            device_serial: serial.to_owned(),
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            time: NaiveTime::from_hms_opt(14, 5, 9).unwrap(),
        }
    }

    #[test]
    fn test_record_key_format() {
        assert_eq!(record_key(&identity("SN123")), "SN123-20240315-140509");
    }

    #[test]
    fn test_record_key_zero_pads() {
        let id = Identity {
            device_serial: "X".to_owned(),
            date: NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
            time: NaiveTime::from_hms_opt(3, 4, 5).unwrap(),
        };
        assert_eq!(record_key(&id), "X-20230102-030405");
    }

    #[test]
    fn test_fingerprint_empty() {
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_known_value() {
        assert_eq!(
            fingerprint("hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_fingerprint_whitespace_sensitive() {
        let a = fingerprint("Time: 14:05:09\n");
        let b = fingerprint("Time:  14:05:09\n");
        let c = fingerprint("time: 14:05:09\n");
        assert_ne!(a, b, "Whitespace change must alter the fingerprint");
        assert_ne!(a, c, "Case change must alter the fingerprint");
        assert_eq!(a.len(), 64);
    }
}
