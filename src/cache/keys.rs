//! Cache key layout.
//!
//! All keys live under one namespace:
//!
//! - `{ns}:list:v1|field=value|...|`: a listing page, fields sorted by name
//! - `{ns}:lock:{digest}`: the populate lock for one listing key
//! - `{ns}:ref:{kind}:{id}:{digest}`: marks that a listing embeds an entity
//! - `{ns}:groups:{user}`: a user's active group ids
//!
//! Values are percent-encoded so no key ever contains glob metacharacters or the
//! `|` separator, which keeps the invalidation patterns exact.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::application::access::VisibilityPredicate;
use crate::application::planner::QueryDescriptor;

const LISTING_VERSION: &str = "v1";
const ABSENT: &str = "-";

/// An entity whose changes invalidate the listings that embed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    Item(Uuid),
    Series(Uuid),
    Author(Uuid),
}

impl EntityKey {
    pub fn kind(&self) -> &'static str {
        match self {
            EntityKey::Item(_) => "item",
            EntityKey::Series(_) => "series",
            EntityKey::Author(_) => "author",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            EntityKey::Item(id) | EntityKey::Series(id) | EntityKey::Author(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Canonical key for one listing page.
    pub fn listing(&self, descriptor: &QueryDescriptor) -> String {
        let fields = listing_fields(descriptor);
        let mut key = format!("{}:list:{LISTING_VERSION}|", self.namespace);
        for (name, value) in fields {
            let _ = write!(key, "{name}={value}|");
        }
        key
    }

    pub fn lock(&self, listing_key: &str) -> String {
        format!("{}:lock:{}", self.namespace, digest(listing_key))
    }

    pub fn reference(&self, entity: EntityKey, listing_key: &str) -> String {
        format!(
            "{}:ref:{}:{}:{}",
            self.namespace,
            entity.kind(),
            entity.id(),
            digest(listing_key)
        )
    }

    pub fn reference_pattern(&self, entity: EntityKey) -> String {
        format!("{}:ref:{}:{}:*", self.namespace, entity.kind(), entity.id())
    }

    /// Listings filtered to one author's items.
    pub fn author_listing_pattern(&self, author_id: Uuid) -> String {
        format!("{}:list:*|author={author_id}|*", self.namespace)
    }

    pub fn user_groups(&self, user_id: Uuid) -> String {
        format!("{}:groups:{user_id}", self.namespace)
    }

    pub fn namespace_pattern(&self) -> String {
        format!("{}:*", self.namespace)
    }

    /// Token rotated by every invalidation; populates that straddle one discard
    /// their write.
    pub fn epoch(&self) -> String {
        format!("{}:epoch", self.namespace)
    }
}

/// Every normalized field of the descriptor, keyed by name.
///
/// `BTreeMap` keeps the names sorted, so the key never depends on the order in
/// which a client sent its filter fields.
fn listing_fields(descriptor: &QueryDescriptor) -> BTreeMap<&'static str, String> {
    let mut fields = BTreeMap::new();
    fields.insert("page", descriptor.page.page.to_string());
    fields.insert("limit", descriptor.page.limit.to_string());
    fields.insert("sort", descriptor.sort.token().to_string());
    fields.insert("scope", scope_segment(&descriptor.visibility));
    fields.insert(
        "status",
        optional(descriptor.required_status.map(|status| status.as_str().to_string())),
    );
    fields.insert("lock", descriptor.lock.token().to_string());
    fields.insert(
        "genres",
        if descriptor.genres.is_empty() {
            ABSENT.to_string()
        } else {
            descriptor
                .genres
                .iter()
                .map(|genre| urlencoding::encode(genre).into_owned())
                .collect::<Vec<_>>()
                .join(",")
        },
    );
    fields.insert("yearMin", optional(descriptor.year.min.map(|v| v.to_string())));
    fields.insert("yearMax", optional(descriptor.year.max.map(|v| v.to_string())));
    fields.insert(
        "ratingMin",
        optional(descriptor.rating.min.map(|v| urlencoding::encode(&v.to_string()).into_owned())),
    );
    fields.insert(
        "ratingMax",
        optional(descriptor.rating.max.map(|v| urlencoding::encode(&v.to_string()).into_owned())),
    );
    fields.insert(
        "window",
        optional(
            descriptor
                .created
                .map(|bounds| format!("{}@{}", bounds.window.token(), bounds.anchor)),
        ),
    );
    fields.insert(
        "contentType",
        optional(
            descriptor
                .content_type
                .as_deref()
                .map(|content_type| urlencoding::encode(content_type).into_owned()),
        ),
    );
    fields.insert(
        "q",
        optional(descriptor.search.as_deref().map(|term| digest(&term.to_lowercase()))),
    );
    fields.insert("author", optional(descriptor.author_id.map(|id| id.to_string())));
    fields.insert("includePrivate", descriptor.include_private.to_string());
    fields
}

fn scope_segment(predicate: &VisibilityPredicate) -> String {
    match predicate {
        VisibilityPredicate::AllButPendingDeletion => "all".to_string(),
        VisibilityPredicate::OwnOrPublic { author_id } => format!("own:{author_id}"),
        VisibilityPredicate::PublicOrGroups { group_ids } => {
            let joined = group_ids
                .iter()
                .map(Uuid::to_string)
                .collect::<Vec<_>>()
                .join(",");
            format!("groups:{}", digest(&joined))
        }
        VisibilityPredicate::PublicOnly => "public".to_string(),
    }
}

fn optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| ABSENT.to_string())
}

/// Short, stable digest for values that are long or free-form.
pub fn digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..8])
}
