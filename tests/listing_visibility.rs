mod support;

use std::collections::BTreeSet;

use curio::application::listing::ListingError;
use curio::domain::viewer::Viewer;
use curio_api_types::{ContentStatus, FilterSpec, Role};
use support::{harness, in_group, item, locked, titles, with_status};
use uuid::Uuid;

fn spec(json: &str) -> FilterSpec {
    serde_json::from_str(json).expect("filter json")
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

struct Library {
    author: Uuid,
    other_author: Uuid,
    group: Uuid,
    other_group: Uuid,
    items: Vec<curio_api_types::ContentItem>,
}

fn library() -> Library {
    let author = Uuid::new_v4();
    let other_author = Uuid::new_v4();
    let group = Uuid::new_v4();
    let other_group = Uuid::new_v4();
    let items = vec![
        item("public", other_author),
        locked(item("public-locked", other_author)),
        in_group(item("group", other_author), group),
        in_group(item("other-group", other_author), other_group),
        with_status(item("draft-own", author), ContentStatus::Draft),
        with_status(item("draft-other", other_author), ContentStatus::Draft),
        with_status(item("pending-own", author), ContentStatus::PendingApproval),
        with_status(item("deleting-own", author), ContentStatus::PendingDeletion),
    ];
    Library {
        author,
        other_author,
        group,
        other_group,
        items,
    }
}

#[tokio::test]
async fn guests_see_published_public_unlocked_items_only() {
    let lib = library();
    let h = harness(lib.items);

    let response = h
        .service
        .list(&Viewer::guest(), &FilterSpec::default())
        .await
        .expect("listing succeeds");

    assert_eq!(titles(&response.items), set(&["public"]));
    assert_eq!(response.total_count, 1);
}

#[tokio::test]
async fn guests_can_ask_for_locked_items_explicitly() {
    let lib = library();
    let h = harness(lib.items);

    let response = h
        .service
        .list(&Viewer::guest(), &spec(r#"{"lockStatus":"locked"}"#))
        .await
        .expect("listing succeeds");

    assert_eq!(titles(&response.items), set(&["public-locked"]));
}

#[tokio::test]
async fn members_see_their_groups_and_nothing_else() {
    let lib = library();
    let member = Uuid::new_v4();
    let h = harness(lib.items);
    h.memberships.join(member, lib.group);

    let response = h
        .service
        .list(&Viewer::new(Some(member), Role::Member), &FilterSpec::default())
        .await
        .expect("listing succeeds");

    assert_eq!(titles(&response.items), set(&["public", "group"]));
}

#[tokio::test]
async fn members_without_groups_or_identity_fall_back_to_public() {
    let lib = library();
    let h = harness(lib.items);

    let lonely = h
        .service
        .list(
            &Viewer::new(Some(Uuid::new_v4()), Role::Member),
            &FilterSpec::default(),
        )
        .await
        .expect("listing succeeds");
    assert_eq!(titles(&lonely.items), set(&["public"]));

    let anonymous = h
        .service
        .list(&Viewer::new(None, Role::Member), &FilterSpec::default())
        .await
        .expect("listing succeeds");
    assert_eq!(titles(&anonymous.items), set(&["public"]));
}

#[tokio::test]
async fn content_admins_see_own_work_and_public_items() {
    let lib = library();
    let h = harness(lib.items);

    let response = h
        .service
        .list(
            &Viewer::new(Some(lib.author), Role::ContentAdmin),
            &FilterSpec::default(),
        )
        .await
        .expect("listing succeeds");

    assert_eq!(
        titles(&response.items),
        set(&["public", "public-locked", "draft-own", "pending-own"])
    );
}

#[tokio::test]
async fn super_admins_see_everything_but_pending_deletion() {
    let lib = library();
    let h = harness(lib.items);

    let response = h
        .service
        .list(
            &Viewer::new(Some(Uuid::new_v4()), Role::SuperAdmin),
            &spec(r#"{"limit":50}"#),
        )
        .await
        .expect("listing succeeds");

    let seen = titles(&response.items);
    assert_eq!(seen.len(), 7);
    assert!(!seen.contains("deleting-own"));
}

#[tokio::test]
async fn cached_pages_never_cross_visibility_scopes() {
    let lib = library();
    let member = Uuid::new_v4();
    let h = harness(lib.items);
    h.memberships.join(member, lib.other_group);

    // Warm the cache as the most privileged viewer first.
    let admin = h
        .service
        .list(
            &Viewer::new(Some(Uuid::new_v4()), Role::SuperAdmin),
            &FilterSpec::default(),
        )
        .await
        .expect("listing succeeds");
    assert!(admin.items.len() > 1);

    let guest = h
        .service
        .list(&Viewer::guest(), &FilterSpec::default())
        .await
        .expect("listing succeeds");
    assert_eq!(titles(&guest.items), set(&["public"]));

    let member_view = h
        .service
        .list(&Viewer::new(Some(member), Role::Member), &FilterSpec::default())
        .await
        .expect("listing succeeds");
    assert_eq!(titles(&member_view.items), set(&["public", "other-group"]));
}

#[tokio::test]
async fn author_scope_hides_unpublished_work_unless_requested() {
    let lib = library();
    let h = harness(lib.items);
    let viewer = Viewer::new(Some(lib.author), Role::ContentAdmin);

    let shelf = h
        .service
        .list(&viewer, &spec(&format!(r#"{{"authorId":"{}"}}"#, lib.author)))
        .await
        .expect("listing succeeds");
    assert!(shelf.items.is_empty());

    let private = h
        .service
        .list(
            &viewer,
            &spec(&format!(
                r#"{{"authorId":"{}","includePrivate":true}}"#,
                lib.author
            )),
        )
        .await
        .expect("listing succeeds");
    assert_eq!(titles(&private.items), set(&["draft-own", "pending-own"]));

    let someone_else = h
        .service
        .list(
            &Viewer::guest(),
            &spec(&format!(r#"{{"authorId":"{}"}}"#, lib.other_author)),
        )
        .await
        .expect("listing succeeds");
    assert_eq!(titles(&someone_else.items), set(&["public"]));
}

#[tokio::test]
async fn pagination_reports_totals_and_clamps_limits() {
    let author = Uuid::new_v4();
    let items = (0..25)
        .map(|index| item(&format!("item-{index:02}"), author))
        .collect();
    let h = harness(items);

    let last = h
        .service
        .list(&Viewer::guest(), &spec(r#"{"page":3,"limit":10}"#))
        .await
        .expect("listing succeeds");
    assert_eq!(last.total_count, 25);
    assert_eq!(last.total_pages, 3);
    assert_eq!(last.items.len(), 5);
    assert_eq!(last.page, 3);

    let clamped = h
        .service
        .list(&Viewer::guest(), &spec(r#"{"limit":10000,"page":"junk"}"#))
        .await
        .expect("listing succeeds");
    assert_eq!(clamped.limit, 100);
    assert_eq!(clamped.page, 1);
    assert_eq!(clamped.items.len(), 25);

    let beyond = h
        .service
        .list(&Viewer::guest(), &spec(r#"{"page":9,"limit":10}"#))
        .await
        .expect("listing succeeds");
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total_count, 25);
}

#[tokio::test]
async fn rating_sort_puts_unrated_items_last_both_ways() {
    let author = Uuid::new_v4();
    let mut low = item("low", author);
    low.rating = Some(1.0);
    let mut high = item("high", author);
    high.rating = Some(4.5);
    let mut unrated = item("unrated", author);
    unrated.rating = None;
    let h = harness(vec![low, unrated, high]);

    let desc = h
        .service
        .list(&Viewer::guest(), &spec(r#"{"sortBy":"rating-desc"}"#))
        .await
        .expect("listing succeeds");
    let order: Vec<_> = desc.items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(order, ["high", "low", "unrated"]);

    let asc = h
        .service
        .list(&Viewer::guest(), &spec(r#"{"sortBy":"rating_asc"}"#))
        .await
        .expect("listing succeeds");
    let order: Vec<_> = asc.items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(order, ["low", "high", "unrated"]);
}

#[tokio::test]
async fn malformed_filters_fall_back_to_defaults() {
    let lib = library();
    let h = harness(lib.items);

    let response = h
        .service
        .list(
            &Viewer::guest(),
            &spec(r#"{"sortBy":"bogus","timeWindow":"decade","lockStatus":"maybe","yearMin":"x"}"#),
        )
        .await
        .expect("listing succeeds");
    assert_eq!(titles(&response.items), set(&["public"]));
}

#[tokio::test]
async fn repository_failures_are_errors_not_empty_pages() {
    let lib = library();
    let h = harness(lib.items);
    h.content.set_failing(true);

    let result = h.service.list(&Viewer::guest(), &FilterSpec::default()).await;
    assert!(matches!(result, Err(ListingError::Repo(_))));
}

#[tokio::test]
async fn membership_changes_apply_after_invalidation() {
    let lib = library();
    let member = Uuid::new_v4();
    let h = harness(lib.items);
    h.memberships.join(member, lib.group);
    let viewer = Viewer::new(Some(member), Role::Member);

    let before = h
        .service
        .list(&viewer, &FilterSpec::default())
        .await
        .expect("listing succeeds");
    assert!(titles(&before.items).contains("group"));

    h.memberships.leave(member, lib.group);
    let cached = h
        .service
        .list(&viewer, &FilterSpec::default())
        .await
        .expect("listing succeeds");
    assert!(titles(&cached.items).contains("group"));
    assert_eq!(h.memberships.lookups(), 1);

    assert!(h.service.invalidate_user_groups(member).await);
    let after = h
        .service
        .list(&viewer, &FilterSpec::default())
        .await
        .expect("listing succeeds");
    assert_eq!(titles(&after.items), set(&["public"]));
}

#[tokio::test]
async fn viewers_with_known_groups_skip_the_membership_lookup() {
    let lib = library();
    let member = Uuid::new_v4();
    let h = harness(lib.items);

    let response = h
        .service
        .list(
            &Viewer::new(Some(member), Role::Member).with_groups([lib.group]),
            &FilterSpec::default(),
        )
        .await
        .expect("listing succeeds");

    assert_eq!(titles(&response.items), set(&["public", "group"]));
    assert_eq!(h.memberships.lookups(), 0);
}

#[tokio::test]
async fn search_only_narrows_the_visible_set() {
    let author = Uuid::new_v4();
    let group = Uuid::new_v4();
    let h = harness(vec![
        item("comet", author),
        item("meadow", author),
        with_status(item("comet draft", author), ContentStatus::Draft),
        in_group(item("comet club", author), group),
        locked(item("comet vault", author)),
    ]);
    let outsider_id = Uuid::new_v4();
    h.memberships.join(outsider_id, Uuid::new_v4());
    let outsider = Viewer::new(Some(outsider_id), Role::Member);

    for viewer in [Viewer::guest(), outsider] {
        let response = h
            .service
            .list(&viewer, &spec(r#"{"search":"comet"}"#))
            .await
            .expect("listing succeeds");
        assert_eq!(titles(&response.items), set(&["comet"]));
        assert_eq!(response.total_count, 1);
    }
}

#[tokio::test]
async fn year_and_rating_bounds_include_their_endpoints() {
    let author = Uuid::new_v4();
    let dated = |title: &str, year: i32, rating: f64| {
        let mut entry = item(title, author);
        entry.release_year = Some(year);
        entry.rating = Some(rating);
        entry
    };
    let h = harness(vec![
        dated("1999", 1999, 2.0),
        dated("2000", 2000, 3.0),
        dated("2010", 2010, 4.0),
        dated("2011", 2011, 4.5),
    ]);

    let years = h
        .service
        .list(&Viewer::guest(), &spec(r#"{"yearMin":2000,"yearMax":2010}"#))
        .await
        .expect("listing succeeds");
    assert_eq!(titles(&years.items), set(&["2000", "2010"]));

    let ratings = h
        .service
        .list(&Viewer::guest(), &spec(r#"{"ratingMin":3,"ratingMax":4}"#))
        .await
        .expect("listing succeeds");
    assert_eq!(titles(&ratings.items), set(&["2000", "2010"]));
}
