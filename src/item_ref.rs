use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A durable reference to a news item, derived from (feed link, guid).
///
/// Unlike an in-memory handle this survives the item being reloaded or
/// resolved independently elsewhere, so the result set and the mutation
/// stream agree on identity through it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ItemRef(u64);

impl ItemRef {
    /// Generate a stable reference from the feed link and the item's guid.
    ///
    /// The first eight bytes of a BLAKE3 digest over the length-prefixed
    /// feed link followed by the guid, read little-endian. The value is
    /// persisted, so it must not change across releases.
    pub fn new(feed: &str, guid: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(feed.len() as u64).to_le_bytes());
        hasher.update(feed.as_bytes());
        hasher.update(guid.as_bytes());
        let digest = hasher.finalize();

        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest.as_bytes()[..8]);
        Self(u64::from_le_bytes(raw))
    }

    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// The numeric key used in redb tables and the index.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Short hex string for human display (e.g. "a1b2c3").
    pub fn short(self) -> String {
        self.short_len(6)
    }

    /// A longer hex prefix, clamped to 6..=16 characters.
    pub fn short_len(self, len: usize) -> String {
        let len = len.clamp(6, 16);
        let full = format!("{:016x}", self.0);
        full[..len].to_string()
    }
}

impl std::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short())
    }
}

/// Parses the full 16-digit hex form, with or without the leading `#`.
impl FromStr for ItemRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 16 {
            return Err(format!(
                "item reference must be 16 hex digits, got '{s}'"
            ));
        }
        u64::from_str_radix(hex, 16)
            .map(Self)
            .map_err(|e| format!("invalid item reference '{s}': {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = ItemRef::new("https://blog.example/feed", "post-1");
        let b = ItemRef::new("https://blog.example/feed", "post-1");
        assert_eq!(a, b);
    }

    #[test]
    fn value_is_pinned() {
        let id = ItemRef::new("https://blog.example/feed", "post-1");
        assert_eq!(id.raw(), 0xd135_9331_009d_4024);
        assert_eq!(ItemRef::new("feed", "guid").to_string(), "#d7cc06");
    }

    #[test]
    fn feed_and_guid_boundary_matters() {
        assert_ne!(ItemRef::new("ab", "c"), ItemRef::new("a", "bc"));
    }

    #[test]
    fn different_inputs_differ() {
        let a = ItemRef::new("https://blog.example/feed", "post-1");
        let b = ItemRef::new("https://blog.example/feed", "post-2");
        assert_ne!(a.raw(), b.raw());
    }

    #[test]
    fn display_has_hash_prefix() {
        let id = ItemRef::new("feed", "guid");
        let s = id.to_string();
        assert!(s.starts_with('#'));
        assert_eq!(s.len(), 7);
    }

    #[test]
    fn short_len_clamps() {
        let id = ItemRef::new("feed", "guid");
        assert_eq!(id.short_len(2).len(), 6);
        assert_eq!(id.short_len(100).len(), 16);
        assert!(id.short_len(10).starts_with(&id.short()));
    }

    #[test]
    fn parses_full_hex() {
        let id = ItemRef::new("feed", "guid");
        let full = format!("#{}", id.short_len(16));
        assert_eq!(full.parse::<ItemRef>().unwrap(), id);
        assert_eq!(id.short_len(16).parse::<ItemRef>().unwrap(), id);
    }

    #[test]
    fn rejects_short_or_garbage() {
        assert!("#abc".parse::<ItemRef>().is_err());
        assert!("zzzzzzzzzzzzzzzz".parse::<ItemRef>().is_err());
    }
}
