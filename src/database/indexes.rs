use async_trait::async_trait;
use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use mongodb::{
    error::{Error as MongoError, ErrorKind},
    options::IndexOptions,
    Database as MongoDatabase, IndexModel,
};
use serde::Serialize;
use std::fmt;

use super::service::DatabaseRole;

/// Sort order (or index type) of one key in an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
    Sphere2d,
}

impl Direction {
    fn to_bson(self) -> Bson {
        match self {
            Direction::Ascending => Bson::Int32(1),
            Direction::Descending => Bson::Int32(-1),
            Direction::Sphere2d => Bson::String("2dsphere".to_string()),
        }
    }
}

use self::Direction::{Ascending as Asc, Descending as Desc, Sphere2d};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    /// A single ascending field path
    Field(&'static str),
    Compound(&'static [(&'static str, Direction)]),
}

/// One entry of the index catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub collection: &'static str,
    pub keys: KeySpec,
    pub unique: bool,
}

impl IndexSpec {
    pub const fn field(collection: &'static str, field: &'static str) -> Self {
        Self {
            collection,
            keys: KeySpec::Field(field),
            unique: false,
        }
    }

    pub const fn compound(
        collection: &'static str,
        keys: &'static [(&'static str, Direction)],
    ) -> Self {
        Self {
            collection,
            keys: KeySpec::Compound(keys),
            unique: false,
        }
    }

    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    /// Key pattern in the order the fields were declared.
    pub fn keys_document(&self) -> Document {
        match self.keys {
            KeySpec::Field(field) => {
                let mut keys = Document::new();
                keys.insert(field, 1);
                keys
            }
            KeySpec::Compound(keys) => keys
                .iter()
                .map(|(field, direction)| (field.to_string(), direction.to_bson()))
                .collect(),
        }
    }

    pub fn options(&self) -> Option<IndexOptions> {
        self.unique
            .then(|| IndexOptions::builder().unique(true).build())
    }

    pub fn to_model(&self) -> IndexModel {
        IndexModel::builder()
            .keys(self.keys_document())
            .options(self.options())
            .build()
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.collection, self.keys_document())?;
        if self.unique {
            write!(f, " (unique)")?;
        }
        Ok(())
    }
}

/// Secondary indexes every deployment is expected to carry.
pub const CATALOG: &[IndexSpec] = &[
    IndexSpec::field("following", "follower"),
    IndexSpec::field("following", "followee"),
    IndexSpec::field("groups", "name"),
    IndexSpec::field("groups", "sheets"),
    IndexSpec::field("groups", "slug").unique(),
    IndexSpec::field("groups", "privateSlug").unique(),
    IndexSpec::field("groups", "members"),
    IndexSpec::field("groups", "admins"),
    IndexSpec::field("history", "revision"),
    IndexSpec::field("history", "method"),
    IndexSpec::compound("history", &[("ref", Asc), ("version", Asc), ("language", Asc)]),
    IndexSpec::field("history", "date"),
    IndexSpec::field("history", "ref"),
    IndexSpec::field("history", "user"),
    IndexSpec::field("history", "rev_type"),
    IndexSpec::field("history", "version"),
    IndexSpec::field("history", "new.refs"),
    IndexSpec::field("history", "new.ref"),
    IndexSpec::field("history", "old.refs"),
    IndexSpec::field("history", "old.ref"),
    IndexSpec::field("history", "title"),
    IndexSpec::field("index", "title"),
    IndexSpec::compound("index_queue", &[("lang", Asc), ("version", Asc), ("ref", Asc)]).unique(),
    IndexSpec::field("index", "categories.0"),
    IndexSpec::field("index", "order.0"),
    IndexSpec::field("index", "order.1"),
    IndexSpec::compound("links", &[("refs", Asc), ("generated_by", Asc)]),
    IndexSpec::field("links", "refs.0"),
    IndexSpec::field("links", "refs.1"),
    IndexSpec::field("links", "expandedRefs0"),
    IndexSpec::field("links", "expandedRefs1"),
    IndexSpec::field("links", "source_text_oid"),
    IndexSpec::field("links", "is_first_comment"),
    IndexSpec::field("links", "inline_citation"),
    IndexSpec::field("metrics", "timestamp").unique(),
    IndexSpec::field("media", "ref.sefaria_ref"),
    IndexSpec::compound("notes", &[("owner", Asc), ("ref", Asc), ("public", Asc)]),
    IndexSpec::compound("notifications", &[("uid", Asc), ("read", Asc)]),
    IndexSpec::field("notifications", "uid"),
    IndexSpec::field("notifications", "content.sheet_id"),
    IndexSpec::field("parshiot", "date"),
    IndexSpec::compound("place", &[("point", Sphere2d)]),
    IndexSpec::compound("place", &[("area", Sphere2d)]),
    IndexSpec::field("person", "key"),
    IndexSpec::field("profiles", "slug"),
    IndexSpec::field("profiles", "id"),
    IndexSpec::field("sheets", "id"),
    IndexSpec::field("sheets", "dateModified"),
    IndexSpec::field("sheets", "sources.ref"),
    IndexSpec::field("sheets", "includedRefs"),
    IndexSpec::field("sheets", "expandedRefs"),
    IndexSpec::field("sheets", "tags"),
    IndexSpec::field("sheets", "owner"),
    IndexSpec::field("sheets", "assignment_id"),
    IndexSpec::field("sheets", "is_featured"),
    IndexSpec::field("sheets", "displayedCollection"),
    IndexSpec::field("sheets", "sheetLanguage"),
    IndexSpec::compound("sheets", &[("views", Desc)]),
    IndexSpec::field("sheets", "categories"),
    IndexSpec::compound("links", &[("owner", Asc), ("date_modified", Desc)]),
    IndexSpec::field("texts", "title"),
    IndexSpec::compound("texts", &[("priority", Desc), ("_id", Asc)]),
    // Field name matches the index already deployed in production
    IndexSpec::compound("texts", &[("versionTitle", Asc), ("langauge", Asc)]),
    IndexSpec::field("texts", "actualLanguage"),
    IndexSpec::field("topics", "titles.text"),
    IndexSpec::field("topic_links", "class"),
    IndexSpec::field("topic_links", "expandedRefs"),
    IndexSpec::field("topic_links", "toTopic"),
    IndexSpec::field("topic_links", "fromTopic"),
    IndexSpec::field("word_form", "form"),
    IndexSpec::field("word_form", "c_form"),
    IndexSpec::field("word_form", "refs"),
    IndexSpec::field("term", "titles.text").unique(),
    IndexSpec::field("term", "category"),
    IndexSpec::compound("lexicon_entry", &[("headword", Asc), ("parent_lexicon", Asc)]),
    IndexSpec::field("user_story", "uid"),
    IndexSpec::compound("user_story", &[("uid", Asc), ("timestamp", Desc)]),
    IndexSpec::compound("user_story", &[("timestamp", Desc)]),
    IndexSpec::field("passage", "ref_list"),
    IndexSpec::field("user_history", "uid"),
    IndexSpec::field("user_history", "sheet_id"),
    IndexSpec::field("user_history", "datetime"),
    IndexSpec::field("user_history", "ref"),
    IndexSpec::compound("user_history", &[("time_stamp", Desc)]),
    IndexSpec::compound("user_history", &[("uid", Asc), ("server_time_stamp", Asc)]),
    IndexSpec::compound("user_history", &[("uid", Asc), ("saved", Asc)]),
    IndexSpec::compound("user_history", &[("uid", Asc), ("ref", Asc)]),
    IndexSpec::compound("user_history", &[("uid", Asc), ("book", Asc), ("last_place", Asc)]),
    IndexSpec::compound(
        "user_history",
        &[("uid", Asc), ("secondary", Asc), ("last_place", Asc), ("time_stamp", Asc)],
    ),
    IndexSpec::compound("user_history", &[("uid", Asc), ("secondary", Asc), ("time_stamp", Asc)]),
    IndexSpec::field("trend", "name"),
    IndexSpec::field("trend", "uid"),
    IndexSpec::field("webpages", "refs"),
    IndexSpec::field("webpages", "expandedRefs"),
    IndexSpec::field("manuscript_pages", "expanded_refs"),
    IndexSpec::compound("manuscript_pages", &[("manuscript_slug", Asc), ("page_id", Asc)]).unique(),
    IndexSpec::field("manuscripts", "slug"),
    IndexSpec::field("manuscripts", "title"),
    IndexSpec::compound("messages", &[("room_id", Asc), ("timestamp", Desc)]),
    IndexSpec::field("vstate", "title"),
    IndexSpec::field("vstate", "flags.enComplete"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFailureKind {
    /// An index with the same name or keys exists with different options.
    Conflict,
    Unauthorized,
    Other,
}

// Server error codes
const UNAUTHORIZED: i32 = 13;
const INDEX_ALREADY_EXISTS: i32 = 68;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexFailure {
    pub kind: IndexFailureKind,
    pub code: Option<i32>,
    pub message: String,
}

impl IndexFailure {
    pub fn new(kind: IndexFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        let kind = match code {
            UNAUTHORIZED => IndexFailureKind::Unauthorized,
            INDEX_ALREADY_EXISTS | INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT => {
                IndexFailureKind::Conflict
            }
            _ => IndexFailureKind::Other,
        };

        Self {
            kind,
            code: Some(code),
            message: message.into(),
        }
    }
}

impl From<MongoError> for IndexFailure {
    fn from(error: MongoError) -> Self {
        match error.kind.as_ref() {
            ErrorKind::Command(command) => IndexFailure::from_code(command.code, error.to_string()),
            _ => IndexFailure::new(IndexFailureKind::Other, error.to_string()),
        }
    }
}

impl fmt::Display for IndexFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{:?} (code {}): {}", self.kind, code, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

/// Something indexes can be created on. `mongodb::Database` in production.
#[async_trait]
pub trait IndexTarget: Send + Sync {
    fn name(&self) -> &str;

    async fn create_index(&self, collection: &str, model: IndexModel) -> Result<(), IndexFailure>;
}

#[async_trait]
impl IndexTarget for MongoDatabase {
    fn name(&self) -> &str {
        MongoDatabase::name(self)
    }

    async fn create_index(&self, collection: &str, model: IndexModel) -> Result<(), IndexFailure> {
        self.collection::<Document>(collection)
            .create_index(model)
            .await
            .map(|result| debug!("Index {} ready on {}", result.index_name, collection))
            .map_err(IndexFailure::from)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedIndex {
    pub collection: String,
    pub keys: String,
    pub unique: bool,
    pub failure: IndexFailure,
}

/// Outcome of one assurance pass.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub database: Option<String>,
    /// Whether `database` is the main or the test database, when it is either.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<DatabaseRole>,
    pub skipped: bool,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<FailedIndex>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: i64,
}

impl IndexReport {
    fn start(database: Option<String>) -> Self {
        Self {
            database,
            role: None,
            skipped: false,
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
            started_at: Utc::now(),
            elapsed_ms: 0,
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.skipped && self.failures.is_empty()
    }
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return write!(f, "index assurance skipped: no database connection");
        }

        write!(f, "{}", self.database.as_deref().unwrap_or("<unknown>"))?;
        if let Some(role) = self.role {
            write!(f, " ({})", role)?;
        }
        write!(
            f,
            ": {}/{} indexes ensured, {} failed in {}ms",
            self.succeeded,
            self.attempted,
            self.failures.len(),
            self.elapsed_ms
        )
    }
}

/// Ensure every catalog entry exists on `target`, in catalog order.
///
/// Never fails: each rejected entry is logged and recorded in the report and
/// the pass moves on. With no target, nothing is issued and the report is
/// marked skipped.
pub async fn ensure_indices(target: Option<&dyn IndexTarget>, catalog: &[IndexSpec]) -> IndexReport {
    let Some(target) = target else {
        warn!("MongoDB client not available, skipping index creation");
        let mut report = IndexReport::start(None);
        report.skipped = true;
        return report;
    };

    info!(
        "Ensuring {} indexes on database {}",
        catalog.len(),
        target.name()
    );
    let mut report = IndexReport::start(Some(target.name().to_string()));

    for spec in catalog {
        report.attempted += 1;
        match target.create_index(spec.collection, spec.to_model()).await {
            Ok(()) => report.succeeded += 1,
            Err(failure) => {
                match failure.kind {
                    IndexFailureKind::Conflict | IndexFailureKind::Unauthorized => {
                        warn!("Could not create index {}: {}", spec, failure)
                    }
                    IndexFailureKind::Other => {
                        error!("Error creating index {}: {}", spec, failure)
                    }
                }
                report.failures.push(FailedIndex {
                    collection: spec.collection.to_string(),
                    keys: spec.keys_document().to_string(),
                    unique: spec.unique,
                    failure,
                });
            }
        }
    }

    report.elapsed_ms = (Utc::now() - report.started_at).num_milliseconds();
    info!("{}", report);
    report
}
