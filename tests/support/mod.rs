#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use curio::application::listing::{ListingConfig, ListingService};
use curio::application::planner::QueryDescriptor;
use curio::application::repos::{ContentPage, ContentRepo, MembershipRepo, RepoError};
use curio::cache::{CacheConfig, CacheCoordinator, GroupMembershipCache, KeySpace, MemoryStore};
use curio_api_types::{AuthorSummary, ContentItem, ContentStatus, ItemCounts, Visibility};
use uuid::Uuid;

/// Evaluates descriptors in memory and counts how often it is asked.
#[derive(Default)]
pub struct InMemoryContent {
    items: Mutex<Vec<ContentItem>>,
    fetches: AtomicUsize,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl InMemoryContent {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Default::default()
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = Some(delay);
    }

    pub fn update(&self, id: Uuid, edit: impl FnOnce(&mut ContentItem)) {
        let mut items = self.items.lock().expect("items lock");
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .expect("item exists");
        edit(item);
    }

    pub fn update_all(&self, mut edit: impl FnMut(&mut ContentItem)) {
        for item in self.items.lock().expect("items lock").iter_mut() {
            edit(item);
        }
    }
}

#[async_trait]
impl ContentRepo for InMemoryContent {
    async fn fetch_page(&self, query: &QueryDescriptor) -> Result<ContentPage, RepoError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        // Snapshot first, so a delayed read returns the data as it was when it started.
        let page = {
            let mut matching: Vec<ContentItem> = self
                .items
                .lock()
                .expect("items lock")
                .iter()
                .filter(|item| query.admits(item))
                .cloned()
                .collect();
            matching.sort_by(|a, b| query.compare(a, b));

            let total_count = matching.len() as u64;
            let items = matching
                .into_iter()
                .skip(query.page.offset() as usize)
                .take(query.page.limit as usize)
                .collect();
            ContentPage { items, total_count }
        };

        let delay = *self.delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("connection reset by peer"));
        }
        Ok(page)
    }
}

#[derive(Default)]
pub struct InMemoryMemberships {
    groups: Mutex<HashMap<Uuid, BTreeSet<Uuid>>>,
    lookups: AtomicUsize,
}

impl InMemoryMemberships {
    pub fn join(&self, user_id: Uuid, group_id: Uuid) {
        self.groups
            .lock()
            .expect("groups lock")
            .entry(user_id)
            .or_default()
            .insert(group_id);
    }

    pub fn leave(&self, user_id: Uuid, group_id: Uuid) {
        if let Some(groups) = self.groups.lock().expect("groups lock").get_mut(&user_id) {
            groups.remove(&group_id);
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MembershipRepo for InMemoryMemberships {
    async fn active_group_ids(&self, user_id: Uuid) -> Result<BTreeSet<Uuid>, RepoError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .groups
            .lock()
            .expect("groups lock")
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub struct Harness {
    pub service: ListingService,
    pub content: Arc<InMemoryContent>,
    pub memberships: Arc<InMemoryMemberships>,
    pub store: Arc<MemoryStore>,
}

pub fn harness(items: Vec<ContentItem>) -> Harness {
    harness_with(items, test_cache_config())
}

pub fn harness_with(items: Vec<ContentItem>, cache_config: CacheConfig) -> Harness {
    let content = Arc::new(InMemoryContent::new(items));
    let memberships = Arc::new(InMemoryMemberships::default());
    let store = Arc::new(MemoryStore::new());

    let membership_cache = Arc::new(GroupMembershipCache::new(
        store.clone(),
        memberships.clone(),
        KeySpace::new(cache_config.namespace.clone()),
        cache_config.membership_ttl(),
    ));
    let coordinator = Arc::new(CacheCoordinator::new(store.clone(), cache_config));
    let service = ListingService::new(
        content.clone(),
        membership_cache,
        coordinator,
        ListingConfig::default(),
    );

    Harness {
        service,
        content,
        memberships,
        store,
    }
}

pub fn test_cache_config() -> CacheConfig {
    CacheConfig {
        namespace: "test".to_string(),
        lock_wait_ms: 50,
        ..Default::default()
    }
}

/// A published, public, unlocked item by `author_id`.
pub fn item(title: &str, author_id: Uuid) -> ContentItem {
    ContentItem {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: format!("About {title}"),
        genres: vec!["drama".to_string()],
        content_type: "novel".to_string(),
        release_year: Some(2020),
        rating: Some(3.5),
        status: ContentStatus::Published,
        visibility: Visibility::Public,
        group_id: None,
        author_id,
        series_id: None,
        is_locked: false,
        created_at: "2026-10-01T09:00:00Z".to_string(),
        updated_at: "2026-10-01T09:00:00Z".to_string(),
        author: AuthorSummary {
            id: author_id,
            display_name: "Author".to_string(),
            avatar_url: None,
        },
        group: None,
        series: None,
        counts: ItemCounts::default(),
    }
}

pub fn with_status(mut item: ContentItem, status: ContentStatus) -> ContentItem {
    item.status = status;
    item
}

pub fn in_group(mut item: ContentItem, group_id: Uuid) -> ContentItem {
    item.visibility = Visibility::GroupOnly;
    item.group_id = Some(group_id);
    item
}

pub fn locked(mut item: ContentItem) -> ContentItem {
    item.is_locked = true;
    item
}

pub fn titles(items: &[ContentItem]) -> BTreeSet<String> {
    items.iter().map(|item| item.title.clone()).collect()
}
