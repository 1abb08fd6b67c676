//! Mapping of decoder info dictionaries onto canonical tags
//!
//! Recognized keys become [`TagEntry`] values, a fixed set of technical keys
//! is dropped silently, and anything else is dropped with a notice.

pub mod track_number;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::audio::types::{RawTagValue, RawTags};
pub use track_number::TrackNumberPair;

/// Well-known info dictionary keys
pub mod keys {
    pub const ALBUM: &str = "album";
    pub const ARTIST: &str = "artist";
    pub const COMMENTS: &str = "comments";
    pub const COMPOSER: &str = "composer";
    pub const COPYRIGHT: &str = "copyright";
    pub const GENRE: &str = "genre";
    pub const LYRICIST: &str = "lyricist";
    pub const RECORDED_DATE: &str = "recorded date";
    pub const TITLE: &str = "title";
    pub const TRACK_NUMBER: &str = "track number";
    pub const YEAR: &str = "year";
    pub const ISRC: &str = "ISRC";
    pub const SOURCE_ENCODER: &str = "source encoder";
    pub const CHANNEL_LAYOUT: &str = "channel layout";
    pub const ENCODING_APPLICATION: &str = "encoding application";
    pub const APPROXIMATE_DURATION: &str = "approximate duration in seconds";
}

/// Canonical tag identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Album,
    Artist,
    Comment,
    Composer,
    Copyright,
    Genre,
    Lyricist,
    ReleaseDate,
    Title,
    TrackNumber,
    Isrc,
    CoverArt,
}

/// Typed tag value
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Text(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
}

/// Single canonical tag
#[derive(Debug, Clone, PartialEq)]
pub struct TagEntry {
    pub kind: TagKind,
    pub value: TagValue,
}

impl TagEntry {
    pub fn new(kind: TagKind, value: TagValue) -> Self {
        Self { kind, value }
    }
}

/// Outcome of looking up a raw key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    Mapped(TagKind),
    Ignored,
    Unsupported,
}

/// Look up the canonical identifier for a raw info dictionary key
pub fn classify_key(key: &str) -> KeyDisposition {
    match key {
        keys::ALBUM => KeyDisposition::Mapped(TagKind::Album),
        keys::ARTIST => KeyDisposition::Mapped(TagKind::Artist),
        keys::COMMENTS => KeyDisposition::Mapped(TagKind::Comment),
        keys::COMPOSER => KeyDisposition::Mapped(TagKind::Composer),
        keys::COPYRIGHT => KeyDisposition::Mapped(TagKind::Copyright),
        keys::GENRE => KeyDisposition::Mapped(TagKind::Genre),
        keys::LYRICIST => KeyDisposition::Mapped(TagKind::Lyricist),
        keys::RECORDED_DATE | keys::YEAR => KeyDisposition::Mapped(TagKind::ReleaseDate),
        keys::TITLE => KeyDisposition::Mapped(TagKind::Title),
        keys::TRACK_NUMBER => KeyDisposition::Mapped(TagKind::TrackNumber),
        keys::ISRC => KeyDisposition::Mapped(TagKind::Isrc),
        keys::SOURCE_ENCODER
        | keys::CHANNEL_LAYOUT
        | keys::ENCODING_APPLICATION
        | keys::APPROXIMATE_DURATION => KeyDisposition::Ignored,
        _ => KeyDisposition::Unsupported,
    }
}

/// Translates raw tag dictionaries into canonical tag entries
#[derive(Debug, Default)]
pub struct MetadataMapper;

impl MetadataMapper {
    pub fn new() -> Self {
        Self
    }

    /// Map a raw dictionary and optional artwork to tag entries
    pub fn map(&self, raw_tags: &RawTags, artwork: Option<&[u8]>) -> Vec<TagEntry> {
        let mut entries = Vec::with_capacity(raw_tags.len() + 1);

        for (key, value) in raw_tags {
            let kind = match classify_key(key) {
                KeyDisposition::Mapped(kind) => kind,
                KeyDisposition::Ignored => continue,
                KeyDisposition::Unsupported => {
                    info!(key = %key, "Skipping unsupported metadata");
                    continue;
                }
            };

            if let Some(value) = format_value(kind, value) {
                entries.push(TagEntry::new(kind, value));
            }
        }

        if let Some(artwork) = artwork {
            entries.push(TagEntry::new(TagKind::CoverArt, TagValue::Binary(artwork.to_vec())));
        }

        entries
    }
}

/// Convert a raw value for a tag kind; `None` drops the tag
fn format_value(kind: TagKind, value: &RawTagValue) -> Option<TagValue> {
    if kind == TagKind::TrackNumber {
        let RawTagValue::Text(text) = value else {
            debug!(value = ?value, "Track number is not text, dropping");
            return None;
        };
        return match TrackNumberPair::parse(text) {
            Ok(pair) => Some(TagValue::Binary(pair.encode().to_vec())),
            Err(e) => {
                debug!("{}", e);
                None
            }
        };
    }

    Some(match value {
        RawTagValue::Text(text) => TagValue::Text(text.clone()),
        RawTagValue::Binary(data) => TagValue::Binary(data.clone()),
        RawTagValue::Date(date) => TagValue::Date(*date),
        RawTagValue::Integer(n) => TagValue::Text(n.to_string()),
        RawTagValue::Float(n) => TagValue::Text(n.to_string()),
    })
}
