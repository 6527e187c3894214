use practizio_core::{NewPractice, PracticePatch};
use practizio_storage::{
    PracticeStore, RecordKind, StoreError, StoreErrorKind, StorePaths, LOCK_FILE, PRACTICES_FILE,
    PROMPTS_FILE,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tempfile::{tempdir, TempDir};

fn open_store() -> (TempDir, PracticeStore) {
    let dir = tempdir().expect("tempdir");
    let store = PracticeStore::open_dir(dir.path()).expect("open store");
    (dir, store)
}

fn tell_me_about() -> NewPractice {
    NewPractice::new("Tell Me About", "Turn closed questions into openers", "Communication")
}

fn temp_path(path: &std::path::Path) -> PathBuf {
    let name = path.file_name().expect("file name").to_string_lossy();
    path.with_file_name(format!("{name}.tmp"))
}

#[test]
fn open_creates_empty_collections() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("nested/db");
    let store = PracticeStore::open(StorePaths::in_dir(&root)).expect("open store");

    for name in [PRACTICES_FILE, PROMPTS_FILE] {
        let content = fs::read_to_string(root.join(name)).expect("collection file");
        assert_eq!(content.trim(), "[]");
    }
    assert!(root.join(LOCK_FILE).exists());
    assert!(store.list_practices().expect("list").is_empty());
}

#[test]
fn open_keeps_existing_records() {
    let dir = tempdir().expect("tempdir");
    {
        let store = PracticeStore::open_dir(dir.path()).expect("open store");
        store.create_practice(tell_me_about()).expect("create");
    }
    let reopened = PracticeStore::open_dir(dir.path()).expect("reopen store");
    assert_eq!(reopened.list_practices().expect("list").len(), 1);
}

#[test]
fn create_then_get_returns_exact_fields_with_empty_tags() {
    let (_dir, store) = open_store();
    let created = store.create_practice(tell_me_about()).expect("create");
    let fetched = store.get_practice(created.id).expect("get");

    assert_eq!(fetched, created);
    assert_eq!(fetched.title, "Tell Me About");
    assert_eq!(fetched.description, "Turn closed questions into openers");
    assert_eq!(fetched.category, "Communication");
    assert!(fetched.tags.is_empty());
    assert_eq!(fetched.created_at, fetched.updated_at);
}

#[test]
fn create_rejects_blank_required_fields_without_writing() {
    let (dir, store) = open_store();
    let before = fs::read(dir.path().join(PRACTICES_FILE)).expect("read before");

    let err = store
        .create_practice(NewPractice::new("", "desc", "cat"))
        .expect_err("blank title");
    assert_eq!(err.kind(), StoreErrorKind::Validation);

    assert_eq!(
        fs::read(dir.path().join(PRACTICES_FILE)).expect("read after"),
        before
    );
}

#[test]
fn concrete_scenario_merges_prompt_into_practice() {
    let (_dir, store) = open_store();
    let practice = store.create_practice(tell_me_about()).expect("create");
    assert_eq!(practice.id, 1);

    let prompt = store
        .create_system_prompt(1, "You are a coach...")
        .expect("create prompt");
    assert_eq!(prompt.id, 1);
    assert_eq!(prompt.practice_id, 1);

    let merged = store.practice_with_prompt(1).expect("merged");
    assert_eq!(merged.practice, practice);
    assert_eq!(merged.system_prompt.as_deref(), Some("You are a coach..."));
    assert_eq!(merged.system_prompt_id, Some(1));
}

#[test]
fn practice_with_prompt_reports_absent_prompt_as_none() {
    let (_dir, store) = open_store();
    let practice = store.create_practice(tell_me_about()).expect("create");
    let merged = store.practice_with_prompt(practice.id).expect("merged");
    assert_eq!(merged.system_prompt, None);
    assert_eq!(merged.system_prompt_id, None);

    let err = store.practice_with_prompt(99).expect_err("missing");
    assert_eq!(err.kind(), StoreErrorKind::NotFound);
}

#[test]
fn update_changes_only_patched_fields_and_refreshes_updated_at() {
    let (_dir, store) = open_store();
    let before = store
        .create_practice(tell_me_about().with_tags(["beginner", "beginner"]))
        .expect("create");

    let after = store
        .update_practice(
            before.id,
            PracticePatch {
                title: Some("X".to_string()),
                ..Default::default()
            },
        )
        .expect("update");

    assert_eq!(after.title, "X");
    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.description, before.description);
    assert_eq!(after.tags, before.tags);
    assert_eq!(after.category, before.category);
    assert!(after.updated_at > before.updated_at);
    assert_eq!(store.get_practice(before.id).expect("get"), after);
}

#[test]
fn update_of_missing_or_with_blank_field_fails() {
    let (_dir, store) = open_store();
    let err = store
        .update_practice(42, PracticePatch::default())
        .expect_err("missing");
    assert!(matches!(
        err,
        StoreError::NotFound {
            kind: RecordKind::Practice,
            id: 42
        }
    ));

    let practice = store.create_practice(tell_me_about()).expect("create");
    let err = store
        .update_practice(
            practice.id,
            PracticePatch {
                description: Some("   ".to_string()),
                ..Default::default()
            },
        )
        .expect_err("blank description");
    assert_eq!(err.kind(), StoreErrorKind::Validation);
    assert_eq!(store.get_practice(practice.id).expect("get"), practice);
}

#[test]
fn delete_cascades_to_the_system_prompt() {
    let (_dir, store) = open_store();
    let keep = store.create_practice(tell_me_about()).expect("create keep");
    let doomed = store
        .create_practice(NewPractice::new("Experience Mapping", "Map it", "Advanced"))
        .expect("create doomed");
    store
        .create_system_prompt(keep.id, "keep me")
        .expect("prompt keep");
    store
        .create_system_prompt(doomed.id, "drop me")
        .expect("prompt doomed");

    store.delete_practice(doomed.id).expect("delete");

    let err = store.get_practice(doomed.id).expect_err("gone");
    assert_eq!(err.kind(), StoreErrorKind::NotFound);
    assert!(store
        .system_prompt_for_practice(doomed.id)
        .expect("lookup")
        .is_none());
    assert_eq!(
        store
            .system_prompt_for_practice(keep.id)
            .expect("lookup")
            .map(|prompt| prompt.content),
        Some("keep me".to_string())
    );
    assert_eq!(store.list_system_prompts().expect("prompts").len(), 1);
}

#[test]
fn delete_of_missing_practice_is_not_found() {
    let (_dir, store) = open_store();
    let err = store.delete_practice(5).expect_err("missing");
    assert_eq!(err.kind(), StoreErrorKind::NotFound);
}

#[test]
fn second_prompt_for_a_practice_conflicts_and_keeps_the_first() {
    let (_dir, store) = open_store();
    let practice = store.create_practice(tell_me_about()).expect("create");
    let first = store
        .create_system_prompt(practice.id, "first")
        .expect("first prompt");

    let err = store
        .create_system_prompt(practice.id, "second")
        .expect_err("conflict");
    assert!(matches!(err, StoreError::Conflict { practice_id } if practice_id == practice.id));

    let current = store
        .system_prompt_for_practice(practice.id)
        .expect("lookup")
        .expect("still present");
    assert_eq!(current, first);
}

#[test]
fn prompt_for_unknown_practice_is_not_found() {
    let (_dir, store) = open_store();
    let err = store.create_system_prompt(3, "orphan").expect_err("missing");
    assert!(matches!(
        err,
        StoreError::NotFound {
            kind: RecordKind::Practice,
            id: 3
        }
    ));
    let err = store.upsert_system_prompt(3, "orphan").expect_err("missing");
    assert_eq!(err.kind(), StoreErrorKind::NotFound);
    assert!(store.list_system_prompts().expect("prompts").is_empty());
}

#[test]
fn upsert_creates_then_updates_in_place() {
    let (_dir, store) = open_store();
    let practice = store.create_practice(tell_me_about()).expect("create");

    let created = store
        .upsert_system_prompt(practice.id, "v1")
        .expect("upsert create");
    let updated = store
        .upsert_system_prompt(practice.id, "v2")
        .expect("upsert update");

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.content, "v2");
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);
    assert_eq!(store.list_system_prompts().expect("prompts").len(), 1);
}

#[test]
fn prompt_records_can_be_addressed_by_their_own_id() {
    let (_dir, store) = open_store();
    let practice = store.create_practice(tell_me_about()).expect("create");
    let prompt = store
        .create_system_prompt(practice.id, "original")
        .expect("prompt");

    let updated = store
        .update_system_prompt(prompt.id, "revised")
        .expect("update prompt");
    assert_eq!(
        store.get_system_prompt(prompt.id).expect("get prompt"),
        updated
    );

    store.delete_system_prompt(prompt.id).expect("delete prompt");
    assert_eq!(
        store
            .get_system_prompt(prompt.id)
            .expect_err("gone")
            .kind(),
        StoreErrorKind::NotFound
    );
    assert!(!store
        .delete_system_prompt_for_practice(practice.id)
        .expect("idempotent delete"));
    store.get_practice(practice.id).expect("practice untouched");
}

#[test]
fn search_is_case_insensitive_substring_over_title_and_description() {
    let (_dir, store) = open_store();
    store
        .create_practice(NewPractice::new("Coral Reef Basics", "Under water", "Nature"))
        .expect("create coral");
    store
        .create_practice(NewPractice::new("Desert Trails", "Dry and hot", "Nature"))
        .expect("create desert");
    store
        .create_practice(NewPractice::new("Travel", "Ask about CORAL islands", "Travel"))
        .expect("create travel");

    let titles: Vec<String> = store
        .search_practices("coral")
        .expect("search")
        .into_iter()
        .map(|practice| practice.title)
        .collect();
    assert_eq!(titles, vec!["Coral Reef Basics", "Travel"]);

    assert!(store.search_practices("glacier").expect("search").is_empty());
    let padded = store.search_practices("  coral ").expect("padded search");
    assert_eq!(padded.len(), 2);
    assert_eq!(
        store.search_practices("  ").expect_err("blank").kind(),
        StoreErrorKind::Validation
    );
}

#[test]
fn category_listing_is_exact_and_categories_sort_bytewise() {
    let (_dir, store) = open_store();
    for (title, category) in [("one", "B"), ("two", "a"), ("three", "B")] {
        store
            .create_practice(NewPractice::new(title, "desc", category))
            .expect("create");
    }

    assert_eq!(
        store.list_categories().expect("categories"),
        vec!["B".to_string(), "a".to_string()]
    );
    let in_b: Vec<u64> = store
        .list_by_category("B")
        .expect("by category")
        .into_iter()
        .map(|practice| practice.id)
        .collect();
    assert_eq!(in_b, vec![1, 3]);
    assert!(store.list_by_category("b").expect("by category").is_empty());
}

#[test]
fn list_preserves_insertion_order() {
    let (_dir, store) = open_store();
    for title in ["first", "second", "third"] {
        store
            .create_practice(NewPractice::new(title, "desc", "cat"))
            .expect("create");
    }
    let titles: Vec<String> = store
        .list_practices()
        .expect("list")
        .into_iter()
        .map(|practice| practice.title)
        .collect();
    assert_eq!(titles, vec!["first", "second", "third"]);
}

#[test]
fn deleting_the_highest_id_frees_it_for_reuse_without_a_stale_prompt() {
    let (_dir, store) = open_store();
    store.create_practice(tell_me_about()).expect("create 1");
    let second = store.create_practice(tell_me_about()).expect("create 2");
    store
        .create_system_prompt(second.id, "belongs to the old record")
        .expect("prompt");

    store.delete_practice(second.id).expect("delete 2");
    let replacement = store.create_practice(tell_me_about()).expect("create again");

    assert_eq!(replacement.id, second.id);
    assert!(store
        .system_prompt_for_practice(replacement.id)
        .expect("lookup")
        .is_none());
}

#[test]
fn deleting_a_lower_id_does_not_cause_reuse() {
    let (_dir, store) = open_store();
    let first = store.create_practice(tell_me_about()).expect("create 1");
    store.create_practice(tell_me_about()).expect("create 2");
    store.delete_practice(first.id).expect("delete 1");

    let third = store.create_practice(tell_me_about()).expect("create 3");
    assert_eq!(third.id, 3);
}

#[test]
fn failed_write_leaves_previous_file_and_state_intact() {
    let (dir, store) = open_store();
    let practice = store.create_practice(tell_me_about()).expect("create");
    let practices_path = dir.path().join(PRACTICES_FILE);
    let before = fs::read(&practices_path).expect("read before");

    let blocker = temp_path(&practices_path);
    fs::create_dir(&blocker).expect("block temp path");

    let err = store
        .create_practice(NewPractice::new("Lost", "never saved", "cat"))
        .expect_err("write must fail");
    assert_eq!(err.kind(), StoreErrorKind::Storage);
    let err = store
        .update_practice(
            practice.id,
            PracticePatch {
                title: Some("changed".to_string()),
                ..Default::default()
            },
        )
        .expect_err("update must fail");
    assert_eq!(err.kind(), StoreErrorKind::Storage);

    assert_eq!(fs::read(&practices_path).expect("read after"), before);
    assert_eq!(store.list_practices().expect("list"), vec![practice.clone()]);

    fs::remove_dir(&blocker).expect("unblock");
    let next = store
        .create_practice(NewPractice::new("Saved", "after recovery", "cat"))
        .expect("create after recovery");
    assert_eq!(next.id, 2);
}

#[test]
fn failed_cascade_keeps_both_records() {
    let (dir, store) = open_store();
    let practice = store.create_practice(tell_me_about()).expect("create");
    store
        .create_system_prompt(practice.id, "coach")
        .expect("prompt");

    let blocker = temp_path(&dir.path().join(PROMPTS_FILE));
    fs::create_dir(&blocker).expect("block temp path");

    let err = store.delete_practice(practice.id).expect_err("must fail");
    assert_eq!(err.kind(), StoreErrorKind::Storage);
    store.get_practice(practice.id).expect("practice kept");
    assert!(store
        .system_prompt_for_practice(practice.id)
        .expect("lookup")
        .is_some());

    fs::remove_dir(&blocker).expect("unblock");
}

#[test]
fn failed_practice_write_restores_the_cascaded_prompt() {
    let (dir, store) = open_store();
    let practice = store.create_practice(tell_me_about()).expect("create");
    let prompt = store
        .create_system_prompt(practice.id, "coach")
        .expect("prompt");
    let prompts_path = dir.path().join(PROMPTS_FILE);
    let prompts_before = fs::read(&prompts_path).expect("read prompts");

    let blocker = temp_path(&dir.path().join(PRACTICES_FILE));
    fs::create_dir(&blocker).expect("block temp path");

    let err = store.delete_practice(practice.id).expect_err("must fail");
    assert_eq!(err.kind(), StoreErrorKind::Storage);
    assert_eq!(store.get_practice(practice.id).expect("practice kept"), practice);
    assert_eq!(
        store
            .system_prompt_for_practice(practice.id)
            .expect("lookup"),
        Some(prompt)
    );
    assert_eq!(fs::read(&prompts_path).expect("read prompts"), prompts_before);

    fs::remove_dir(&blocker).expect("unblock");
    store.delete_practice(practice.id).expect("delete after recovery");
    assert!(store.list_system_prompts().expect("prompts").is_empty());
}

#[test]
fn corrupt_collection_is_a_storage_error_and_is_left_alone() {
    let (dir, store) = open_store();
    let practices_path = dir.path().join(PRACTICES_FILE);
    fs::write(&practices_path, "{not json").expect("corrupt file");

    let err = store.list_practices().expect_err("corrupt");
    assert!(matches!(err, StoreError::Corrupt { .. }));
    assert_eq!(err.kind(), StoreErrorKind::Storage);
    let err = store
        .create_practice(tell_me_about())
        .expect_err("no write over corrupt file");
    assert_eq!(err.kind(), StoreErrorKind::Storage);

    assert_eq!(
        fs::read_to_string(&practices_path).expect("read"),
        "{not json"
    );
}

#[test]
fn reads_legacy_files_with_string_ids() {
    let dir = tempdir().expect("tempdir");
    fs::write(
        dir.path().join(PRACTICES_FILE),
        r#"[{"id":"2","title":"Conversation Basics","description":"Openers","tags":["beginner"],"category":"Communication Skills","created_at":"2025-01-01T00:00:00.000Z","updated_at":"2025-01-01T00:00:00.000Z"}]"#,
    )
    .expect("write practices");
    fs::write(
        dir.path().join(PROMPTS_FILE),
        r#"[{"id":1,"practice_id":2,"content":"coach","created_at":"2025-01-01T00:00:00.000Z","updated_at":"2025-01-01T00:00:00.000Z"}]"#,
    )
    .expect("write prompts");

    let store = PracticeStore::open_dir(dir.path()).expect("open");
    let merged = store.practice_with_prompt(2).expect("merged");
    assert_eq!(merged.practice.tags, vec!["beginner".to_string()]);
    assert_eq!(merged.system_prompt.as_deref(), Some("coach"));
    assert_eq!(store.create_practice(tell_me_about()).expect("create").id, 3);
}

#[test]
fn concurrent_creates_get_unique_ids() {
    let (_dir, store) = open_store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for n in 0..10 {
                    store
                        .create_practice(NewPractice::new(
                            format!("w{worker}-{n}"),
                            "desc",
                            "cat",
                        ))
                        .expect("create");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    let mut ids: Vec<u64> = store
        .list_practices()
        .expect("list")
        .into_iter()
        .map(|practice| practice.id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=80).collect::<Vec<u64>>());
}

#[test]
fn separate_store_instances_on_one_directory_serialize_through_the_file_lock() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().to_path_buf();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let root = root.clone();
            thread::spawn(move || {
                let store = PracticeStore::open_dir(&root).expect("open");
                for n in 0..10 {
                    store
                        .create_practice(NewPractice::new(
                            format!("s{worker}-{n}"),
                            "desc",
                            "cat",
                        ))
                        .expect("create");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    let store = PracticeStore::open_dir(&root).expect("open");
    let mut ids: Vec<u64> = store
        .list_practices()
        .expect("list")
        .into_iter()
        .map(|practice| practice.id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=40).collect::<Vec<u64>>());
}
