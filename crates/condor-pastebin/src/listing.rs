//! Decoding of the scraping API's listing payload.
//!
//! The API reports numbers and epochs as quoted strings; everything is
//! mapped onto document fields here, with unparseable values degrading to
//! their empty defaults rather than failing the whole listing.

use condor_core::Document;
use jiff::Timestamp;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct PasteEntry {
    key: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    full_url: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    expire: String,
}

impl PasteEntry {
    pub(crate) fn into_document(self) -> Document {
        let mut document = Document::new(self.key);
        document.title = self.title;
        document.user = self.user;
        document.url = self.full_url;
        document.size = parse_number(&self.size).unwrap_or(0);
        document.created_at = parse_epoch(&self.date);
        document.expire_at = parse_epoch(&self.expire);
        document
    }
}

fn parse_number(value: &str) -> Option<u64> {
    value.trim_matches('"').parse().ok()
}

/// A zero epoch means "never" and maps to no timestamp at all.
fn parse_epoch(value: &str) -> Option<Timestamp> {
    let seconds: i64 = value.trim_matches('"').parse().ok()?;
    if seconds == 0 {
        return None;
    }
    Timestamp::from_second(seconds).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_entry_maps_onto_a_document() {
        let entry: PasteEntry = serde_json::from_value(serde_json::json!({
            "key": "a1b2c3",
            "title": "db dump",
            "user": "anon",
            "full_url": "https://pastebin.com/a1b2c3",
            "date": "1700000000",
            "size": "512",
            "expire": "0",
        }))
        .unwrap();

        let document = entry.into_document();
        assert_eq!(document.id, "a1b2c3");
        assert_eq!(document.title, "db dump");
        assert_eq!(document.user, "anon");
        assert_eq!(document.url, "https://pastebin.com/a1b2c3");
        assert_eq!(document.size, 512);
        assert_eq!(
            document.created_at,
            Some(Timestamp::from_second(1_700_000_000).unwrap())
        );
        assert_eq!(document.expire_at, None);
    }

    #[test]
    fn malformed_fields_degrade_to_defaults() {
        let entry: PasteEntry = serde_json::from_value(serde_json::json!({
            "key": "a1b2c3",
            "size": "not-a-number",
            "date": "",
        }))
        .unwrap();

        let document = entry.into_document();
        assert_eq!(document.size, 0);
        assert_eq!(document.created_at, None);
        assert!(document.title.is_empty());
    }
}
