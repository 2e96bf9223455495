//! Domain models for content entities and lineup entries
//!
//! Entities are opaque JSON blobs. The engine only reads ids, kinds,
//! timestamps and deletion flags from them.

use crate::error::{LibraryError, Result};
use bridge_traits::{EntityId, RawEntity};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Kind
// =============================================================================

/// Entity kind. Declaration order is the cache's iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    Tracks,
    Collections,
    Users,
}

impl Kind {
    pub const ALL: [Kind; 3] = [Kind::Tracks, Kind::Collections, Kind::Users];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Tracks => "TRACKS",
            Kind::Collections => "COLLECTIONS",
            Kind::Users => "USERS",
        }
    }

    /// Singular name used by the content API (`"track"`, `"collection"`, `"user"`).
    pub fn api_name(&self) -> &'static str {
        match self {
            Kind::Tracks => "track",
            Kind::Collections => "collection",
            Kind::Users => "user",
        }
    }

    /// Field carrying the id in a full entity blob.
    pub fn id_field(&self) -> &'static str {
        match self {
            Kind::Tracks => "track_id",
            Kind::Collections => "playlist_id",
            Kind::Users => "user_id",
        }
    }

    fn parse_loose(value: &str) -> Option<Kind> {
        match value.to_ascii_lowercase().as_str() {
            "track" | "tracks" => Some(Kind::Tracks),
            "collection" | "collections" | "playlist" | "playlists" | "album" => {
                Some(Kind::Collections)
            }
            "user" | "users" => Some(Kind::Users),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        Kind::parse_loose(s)
            .ok_or_else(|| LibraryError::InvalidEntity(format!("unknown kind '{}'", s)))
    }
}

// =============================================================================
// Entity
// =============================================================================

fn as_entity_id(value: &Value) -> Option<EntityId> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Parse the timestamp formats seen in entity blobs: RFC 3339, naive
/// `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS` (taken as UTC) and bare dates.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// A content entity held by the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: Kind,
    pub data: Value,
}

impl Entity {
    pub fn new(kind: Kind, id: EntityId, data: Value) -> Self {
        Self { id, kind, data }
    }

    /// Build an entity from a full blob. The kind comes from whichever of
    /// `track_id`, `playlist_id` or `user_id` is present, in that order.
    pub fn from_raw(raw: RawEntity) -> Result<Self> {
        if !raw.is_object() {
            return Err(LibraryError::InvalidEntity(
                "entity blob is not an object".to_string(),
            ));
        }

        for kind in Kind::ALL {
            if let Some(id) = raw.get(kind.id_field()).and_then(as_entity_id) {
                return Ok(Self::new(kind, id, raw));
            }
        }

        Err(LibraryError::InvalidEntity(
            "entity blob has no track_id, playlist_id or user_id".to_string(),
        ))
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.field(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.field(name).and_then(parse_timestamp)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp("updated_at")
    }

    /// Deleted server-side or marked deleted locally.
    pub fn is_deleted(&self) -> bool {
        self.flag("is_delete") || self.flag("_marked_deleted")
    }

    pub fn is_deactivated(&self) -> bool {
        self.flag("is_deactivated")
    }

    /// Owner of a track (`owner_id`) or collection (`playlist_owner_id`).
    pub fn owner_id(&self) -> Option<EntityId> {
        self.field("owner_id")
            .or_else(|| self.field("playlist_owner_id"))
            .and_then(as_entity_id)
    }

    /// User blob embedded under `user`, if any.
    pub fn embedded_user(&self) -> Option<Entity> {
        let user = self.field("user")?;
        let id = user.get("user_id").and_then(as_entity_id)?;
        Some(Entity::new(Kind::Users, id, user.clone()))
    }

    /// `kind:id` key used for lineup dedupe.
    pub fn entry_key(&self) -> (Kind, EntityId) {
        (self.kind, self.id)
    }
}

/// One item of a raw page, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum PageItem {
    Full(Entity),
    /// `{"kind": ..., "id": ...}` reference that must be hydrated by kind
    Reference { kind: Kind, id: EntityId },
    /// The server could not resolve this slot
    Null,
}

impl PageItem {
    pub fn classify(raw: RawEntity) -> Result<Self> {
        if raw.is_null() {
            return Ok(PageItem::Null);
        }

        let has_full_id = Kind::ALL
            .iter()
            .any(|kind| raw.get(kind.id_field()).is_some());

        if !has_full_id {
            if let (Some(kind), Some(id)) = (
                raw.get("kind").and_then(Value::as_str),
                raw.get("id").and_then(as_entity_id),
            ) {
                return Ok(PageItem::Reference {
                    kind: kind.parse()?,
                    id,
                });
            }
        }

        Entity::from_raw(raw).map(PageItem::Full)
    }
}

// =============================================================================
// Entity UID
// =============================================================================

/// Per-lineup unique id of one appearance of an entity.
///
/// Text form: `kind:TRACKS-id:5-source:feed`, with `-count:N` appended when
/// the same entity appears more than once in one lineup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityUid {
    pub kind: Kind,
    pub id: EntityId,
    pub source: String,
    pub count: Option<u32>,
}

impl EntityUid {
    pub fn new(kind: Kind, id: EntityId, source: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            source: source.into(),
            count: None,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Uid for a collection's track rows: the source is scoped to the collection.
    pub fn collection_source(source: &str, collection_id: EntityId) -> String {
        format!("{}:collection:{}", source, collection_id)
    }

    /// Smallest uid for `(kind, id, source)` not present in `taken`; the
    /// chosen uid is inserted into `taken`.
    pub fn allocate(
        kind: Kind,
        id: EntityId,
        source: &str,
        taken: &mut HashSet<String>,
    ) -> String {
        let base = EntityUid::new(kind, id, source);
        let mut candidate = base.to_string();
        let mut count = 1;
        while taken.contains(&candidate) {
            candidate = base.clone().with_count(count).to_string();
            count += 1;
        }
        taken.insert(candidate.clone());
        candidate
    }
}

impl fmt::Display for EntityUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind:{}-id:{}-source:{}", self.kind, self.id, self.source)?;
        if let Some(count) = self.count {
            write!(f, "-count:{}", count)?;
        }
        Ok(())
    }
}

impl FromStr for EntityUid {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: &str| LibraryError::InvalidUid {
            uid: s.to_string(),
            message: message.to_string(),
        };

        let rest = s.strip_prefix("kind:").ok_or_else(|| invalid("missing kind"))?;
        let (kind, rest) = rest.split_once("-id:").ok_or_else(|| invalid("missing id"))?;
        let (id, rest) = rest
            .split_once("-source:")
            .ok_or_else(|| invalid("missing source"))?;

        let (source, count) = match rest.rsplit_once("-count:") {
            Some((source, count)) => match count.parse::<u32>() {
                Ok(count) => (source, Some(count)),
                Err(_) => (rest, None),
            },
            None => (rest, None),
        };

        Ok(Self {
            kind: kind.parse().map_err(|_| invalid("unknown kind"))?,
            id: id.parse().map_err(|_| invalid("id is not numeric"))?,
            source: source.to_string(),
            count,
        })
    }
}

// =============================================================================
// Lineup Entry
// =============================================================================

/// Lightweight reference held by a lineup; the entity itself lives in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineupEntry {
    pub uid: String,
    pub id: EntityId,
    pub kind: Kind,
    pub activity_timestamp: Option<DateTime<Utc>>,
    pub source_key: Option<String>,
}

impl LineupEntry {
    pub fn entry_key(&self) -> (Kind, EntityId) {
        (self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_entity_kind_from_id_field() {
        let track = Entity::from_raw(json!({"track_id": 5, "title": "a"})).unwrap();
        assert_eq!(track.kind, Kind::Tracks);
        assert_eq!(track.id, 5);

        let playlist = Entity::from_raw(json!({"playlist_id": "7"})).unwrap();
        assert_eq!(playlist.kind, Kind::Collections);
        assert_eq!(playlist.id, 7);

        assert!(Entity::from_raw(json!({"title": "no id"})).is_err());
        assert!(Entity::from_raw(json!([1, 2])).is_err());
    }

    #[test]
    fn test_classify_page_items() {
        assert_eq!(PageItem::classify(Value::Null).unwrap(), PageItem::Null);
        assert_eq!(
            PageItem::classify(json!({"kind": "track", "id": 3})).unwrap(),
            PageItem::Reference {
                kind: Kind::Tracks,
                id: 3
            }
        );
        assert!(matches!(
            PageItem::classify(json!({"track_id": 3, "kind": "track", "id": 3})).unwrap(),
            PageItem::Full(_)
        ));
        assert!(PageItem::classify(json!({"kind": "podcast", "id": 3})).is_err());
    }

    #[test]
    fn test_deletion_and_owner_flags() {
        let entity = Entity::from_raw(json!({
            "track_id": 1,
            "is_delete": true,
            "owner_id": 9,
            "user": {"user_id": 9, "is_deactivated": true}
        }))
        .unwrap();

        assert!(entity.is_deleted());
        assert_eq!(entity.owner_id(), Some(9));
        assert!(entity.embedded_user().unwrap().is_deactivated());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        assert_eq!(parse_timestamp(&json!("2024-01-02")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-01-02 00:00:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-01-02T00:00:00Z")), Some(expected));
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(17)), None);
    }

    #[test]
    fn test_uid_text_form() {
        let uid = EntityUid::new(Kind::Tracks, 5, "feed");
        assert_eq!(uid.to_string(), "kind:TRACKS-id:5-source:feed");

        let counted = uid.clone().with_count(2);
        assert_eq!(counted.to_string(), "kind:TRACKS-id:5-source:feed-count:2");
        assert_eq!(counted.to_string().parse::<EntityUid>().unwrap(), counted);
    }

    #[test]
    fn test_uid_source_may_contain_separators() {
        let source = EntityUid::collection_source("feed", 42);
        let uid = EntityUid::new(Kind::Tracks, 1, source.clone());

        let parsed: EntityUid = uid.to_string().parse().unwrap();
        assert_eq!(parsed.source, source);
        assert_eq!(parsed.count, None);
    }

    #[test]
    fn test_invalid_uid() {
        assert!("TRACKS-5".parse::<EntityUid>().is_err());
        assert!("kind:TRACKS-id:x-source:feed".parse::<EntityUid>().is_err());
    }

    #[test]
    fn test_allocate_skips_taken_uids() {
        let mut taken = HashSet::new();

        let first = EntityUid::allocate(Kind::Tracks, 5, "feed", &mut taken);
        let second = EntityUid::allocate(Kind::Tracks, 5, "feed", &mut taken);
        let third = EntityUid::allocate(Kind::Tracks, 5, "feed", &mut taken);

        assert_eq!(first, "kind:TRACKS-id:5-source:feed");
        assert_eq!(second, "kind:TRACKS-id:5-source:feed-count:1");
        assert_eq!(third, "kind:TRACKS-id:5-source:feed-count:2");
    }
}
