//! Backend contract tests — both [`GixStore`] and [`CipherStore`] must
//! satisfy the same `ObjectStore` semantics, and object ids must agree
//! between them so migration preserves history.

use dogma_git::{
    CipherStore, CommitRecord, Expectation, GixStore, Identity, Kek, KEY_LEN, NodeKind,
    ObjectStore, Oid, RefName, TreeEdit, migrate_store,
};
use tempfile::TempDir;

fn kek(version: u32) -> Kek {
    Kek::new(version, [0x42; KEY_LEN])
}

fn gix_store() -> (TempDir, GixStore) {
    let dir = TempDir::new().expect("temp dir");
    let store = GixStore::init(dir.path()).expect("init gix store");
    (dir, store)
}

fn cipher_store() -> (TempDir, CipherStore) {
    let dir = TempDir::new().expect("temp dir");
    let store = CipherStore::create(dir.path(), &kek(1)).expect("create cipher store");
    (dir, store)
}

fn identity(seconds: i64) -> Identity {
    Identity {
        name: "System".to_owned(),
        email: "system@localhost".to_owned(),
        seconds,
    }
}

fn sample_commit(store: &dyn ObjectStore) -> (Oid, Oid) {
    let blob = store.insert_blob(b"{\"a\":1}\n").expect("blob");
    let tree = store
        .insert_tree(
            None,
            &[TreeEdit::Upsert {
                path: "conf/a.json".to_owned(),
                oid: blob,
            }],
        )
        .expect("tree");
    let commit = store
        .insert_commit(&CommitRecord {
            tree,
            parents: vec![],
            author: identity(1_700_000_000),
            committer: identity(1_700_000_000),
            message: "initial".to_owned(),
        })
        .expect("commit");
    (tree, commit)
}

fn contract_blob_roundtrip(store: &dyn ObjectStore) {
    let oid = store.insert_blob(b"hello").expect("insert");
    let again = store.insert_blob(b"hello").expect("insert again");
    assert_eq!(oid, again, "inserts are idempotent on content");
    assert_eq!(store.read_blob(oid).expect("read"), b"hello");
}

fn contract_tree_edits(store: &dyn ObjectStore) {
    let a = store.insert_blob(b"a").expect("blob a");
    let b = store.insert_blob(b"b").expect("blob b");
    let tree = store
        .insert_tree(
            None,
            &[
                TreeEdit::Upsert {
                    path: "x/a.txt".to_owned(),
                    oid: a,
                },
                TreeEdit::Upsert {
                    path: "x/y/b.txt".to_owned(),
                    oid: b,
                },
            ],
        )
        .expect("tree");

    let entries = store.read_tree(tree).expect("read root");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "x");
    assert_eq!(entries[0].kind, NodeKind::Tree);

    // Removing the subtree drops the whole directory.
    let pruned = store
        .insert_tree(
            Some(tree),
            &[TreeEdit::Remove {
                path: "x/y".to_owned(),
            }],
        )
        .expect("pruned tree");
    let x_entries = store
        .read_tree(
            store
                .read_tree(pruned)
                .expect("read pruned root")
                .iter()
                .find(|e| e.name == "x")
                .expect("x survives")
                .oid,
        )
        .expect("read x");
    assert_eq!(x_entries.len(), 1);
    assert_eq!(x_entries[0].name, "a.txt");
}

fn contract_commit_roundtrip(store: &dyn ObjectStore) {
    let (tree, commit) = sample_commit(store);
    let record = store.read_commit(commit).expect("read commit");
    assert_eq!(record.tree, tree);
    assert_eq!(record.parents, vec![]);
    assert_eq!(record.message, "initial");
    assert_eq!(record.author.seconds, 1_700_000_000);
}

fn contract_ref_cas(store: &dyn ObjectStore) {
    let (_, commit) = sample_commit(store);
    let name = RefName::new("refs/heads/master").expect("ref name");

    store
        .update_ref(&name, commit, Expectation::MustNotExist)
        .expect("create ref");
    assert_eq!(store.read_ref(&name).expect("read"), Some(commit));

    // Creating again must conflict.
    let err = store
        .update_ref(&name, commit, Expectation::MustNotExist)
        .expect_err("second create conflicts");
    assert!(matches!(err, dogma_git::StoreError::RefConflict { .. }));

    // CAS with a stale expectation must conflict.
    let err = store
        .update_ref(&name, commit, Expectation::MustMatch(Oid::ZERO))
        .expect_err("stale CAS conflicts");
    assert!(matches!(err, dogma_git::StoreError::RefConflict { .. }));

    // CAS with the right expectation succeeds.
    store
        .update_ref(&name, commit, Expectation::MustMatch(commit))
        .expect("matching CAS");

    // HEAD peels through the symbolic ref to the branch tip.
    let head = RefName::new("HEAD").expect("head");
    assert_eq!(store.read_ref(&head).expect("read HEAD"), Some(commit));
}

fn contract_ref_rename_and_list(store: &dyn ObjectStore) {
    let (_, commit) = sample_commit(store);
    let a = RefName::new("refs/revisions/00/1").expect("a");
    let b = RefName::new("refs/revisions/00/2").expect("b");
    store
        .update_ref(&a, commit, Expectation::MustNotExist)
        .expect("create");

    store.rename_ref(&a, &b).expect("rename");
    assert_eq!(store.read_ref(&a).expect("read a"), None);
    assert_eq!(store.read_ref(&b).expect("read b"), Some(commit));

    let listed = store.list_refs("refs/revisions/").expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].0, b);

    store.delete_ref(&b).expect("delete");
    assert_eq!(store.read_ref(&b).expect("read deleted"), None);
    // Deleting again is a no-op.
    store.delete_ref(&b).expect("delete again");
}

macro_rules! backend_tests {
    ($name:ident, $maker:ident) => {
        mod $name {
            use super::*;

            #[test]
            fn blob_roundtrip() {
                let (_dir, store) = $maker();
                contract_blob_roundtrip(&store);
            }

            #[test]
            fn tree_edits() {
                let (_dir, store) = $maker();
                contract_tree_edits(&store);
            }

            #[test]
            fn commit_roundtrip() {
                let (_dir, store) = $maker();
                contract_commit_roundtrip(&store);
            }

            #[test]
            fn ref_cas() {
                let (_dir, store) = $maker();
                contract_ref_cas(&store);
            }

            #[test]
            fn ref_rename_and_list() {
                let (_dir, store) = $maker();
                contract_ref_rename_and_list(&store);
            }
        }
    };
}

backend_tests!(gix_backend, gix_store);
backend_tests!(cipher_backend, cipher_store);

#[test]
fn object_ids_roundtrip_through_refs_and_commit_records() {
    let (_dir, store) = cipher_store();
    let (tree, commit) = sample_commit(&store);

    let name = RefName::new("refs/revisions/00/1").expect("ref name");
    store
        .update_ref(&name, commit, Expectation::MustNotExist)
        .expect("create ref");

    // The id the ref listing reports, re-parsed from its text form, must
    // resolve to the same commit record the insert produced.
    let listed = store.list_refs("refs/revisions/").expect("list");
    let reparsed: Oid = listed[0].1.to_string().parse().expect("parse listed id");
    assert_eq!(reparsed, commit);
    let record = store.read_commit(reparsed).expect("read via reparsed id");
    assert_eq!(record.tree, tree);
}

#[test]
fn backends_agree_on_object_ids() {
    let (_g, gix) = gix_store();
    let (_c, cipher) = cipher_store();

    let (gix_tree, gix_commit) = sample_commit(&gix);
    let (cipher_tree, cipher_commit) = sample_commit(&cipher);

    assert_eq!(gix_tree, cipher_tree);
    assert_eq!(gix_commit, cipher_commit);
}

#[test]
fn dek_rotation_preserves_objects_and_ids() {
    let dir = TempDir::new().expect("temp dir");
    let store = CipherStore::create(dir.path(), &kek(1)).expect("create");

    let (_, commit) = sample_commit(&store);
    let name = RefName::new("refs/heads/master").expect("ref");
    store
        .update_ref(&name, commit, Expectation::MustNotExist)
        .expect("ref");
    let before = store.read_commit(commit).expect("read before");
    assert_eq!(store.object_key_version(commit).expect("version"), 1);

    store.rotate_dek(&kek(2)).expect("rotate");
    let resealed = store.reseal().expect("reseal");
    assert!(resealed >= 3, "blob + tree(s) + commit were re-sealed");

    // Content and ids are unchanged; only wrapping metadata advanced.
    let after = store.read_commit(commit).expect("read after");
    assert_eq!(before, after);
    assert_eq!(store.object_key_version(commit).expect("version"), 2);

    // Re-opening with the rotated KEK works; the old KEK is rejected.
    drop(store);
    let reopened = CipherStore::open(dir.path(), &kek(2)).expect("reopen");
    assert_eq!(reopened.read_commit(commit).expect("read"), before);
    assert!(CipherStore::open(dir.path(), &kek(1)).is_err());
}

#[test]
fn rotation_rejects_non_advancing_version() {
    let (_dir, store) = cipher_store();
    assert!(store.rotate_dek(&kek(1)).is_err());
}

#[test]
fn migration_preserves_history() {
    let (_g, gix) = gix_store();

    // Two commits on master.
    let (_, first) = sample_commit(&gix);
    let blob = gix.insert_blob(b"more\n").expect("blob");
    let first_record = gix.read_commit(first).expect("first");
    let tree = gix
        .insert_tree(
            Some(first_record.tree),
            &[TreeEdit::Upsert {
                path: "conf/b.txt".to_owned(),
                oid: blob,
            }],
        )
        .expect("tree");
    let second = gix
        .insert_commit(&CommitRecord {
            tree,
            parents: vec![first],
            author: identity(1_700_000_100),
            committer: identity(1_700_000_100),
            message: "second".to_owned(),
        })
        .expect("second commit");

    let master = RefName::new("refs/heads/master").expect("master");
    gix.update_ref(&master, second, Expectation::MustNotExist)
        .expect("ref");

    let cipher_dir = TempDir::new().expect("temp dir");
    let cipher = CipherStore::create(cipher_dir.path(), &kek(1)).expect("create");
    let copied = migrate_store(&gix, &cipher).expect("migrate");
    assert_eq!(copied, 2);

    assert_eq!(cipher.read_ref(&master).expect("ref"), Some(second));
    let migrated = cipher.read_commit(second).expect("commit");
    assert_eq!(migrated.tree, tree);
    assert_eq!(migrated.parents, vec![first]);
    assert_eq!(
        cipher.read_commit(first).expect("first"),
        gix.read_commit(first).expect("first again")
    );
}
