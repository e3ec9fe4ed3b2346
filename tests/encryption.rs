//! Encrypted repositories end-to-end: create, write, read, and in-place
//! migration from the plaintext backend.

mod common;

use common::TestServer;

use serde_json::json;

use dogma::{Command, CommandExecutor, CommandKind, CommandResult};
use dogma_core::{Author, Change, EntryContent, FilePath, Markup, PathPattern, Revision};

fn create_project(server: &TestServer) {
    server
        .executor
        .execute(Command::new(CommandKind::CreateProject {
            project: "p".to_owned(),
        }))
        .expect("create project");
}

fn push(server: &TestServer, repository: &str, base: i64, path: &str, value: serde_json::Value) {
    server
        .executor
        .execute(Command::by(
            Author::new("alice", "alice@example.com"),
            CommandKind::Push {
                project: "p".to_owned(),
                repository: repository.to_owned(),
                base_revision: Revision::new(base).unwrap(),
                summary: format!("edit {path}"),
                detail: String::new(),
                markup: Markup::Plaintext,
                changes: vec![Change::upsert_json(path, value).unwrap()],
            },
        ))
        .expect("push");
}

#[test]
fn encrypted_repository_behaves_like_plaintext() {
    let server = TestServer::start();
    create_project(&server);

    server
        .executor
        .execute(Command::new(CommandKind::CreateRepository {
            project: "p".to_owned(),
            repository: "sec".to_owned(),
            encrypted: true,
        }))
        .expect("create encrypted repository");

    push(&server, "sec", 1, "/secret.json", json!({"token": "t-1"}));

    let repository = server.manager.repository("p", "sec").expect("repository");
    let entry = repository
        .get(Revision::HEAD, &FilePath::new("/secret.json").unwrap())
        .expect("get");
    assert_eq!(
        entry.content,
        Some(EntryContent::Json(json!({"token": "t-1"})))
    );

    // The on-disk payloads must not contain the plaintext.
    let objects_dir = server._dir.path().join("p/sec.cipher/objects");
    let mut found_plaintext = false;
    for fan in std::fs::read_dir(&objects_dir).expect("objects dir") {
        let fan = fan.expect("entry");
        if !fan.file_type().expect("type").is_dir() {
            continue;
        }
        for file in std::fs::read_dir(fan.path()).expect("fan dir") {
            let bytes = std::fs::read(file.expect("entry").path()).expect("read record");
            if bytes.windows(3).any(|w| w == b"t-1") {
                found_plaintext = true;
            }
        }
    }
    assert!(!found_plaintext, "object records leak plaintext");
}

#[test]
fn migration_preserves_history_and_content() {
    let server = TestServer::start();
    create_project(&server);
    server
        .executor
        .execute(Command::new(CommandKind::CreateRepository {
            project: "p".to_owned(),
            repository: "r".to_owned(),
            encrypted: false,
        }))
        .expect("create plaintext repository");

    push(&server, "r", 1, "/a.json", json!({"v": 1}));
    push(&server, "r", 2, "/a.json", json!({"v": 2}));
    push(&server, "r", 3, "/b.json", json!([1, 2, 3]));

    let before = {
        let repository = server.manager.repository("p", "r").expect("repository");
        repository
            .history(Revision::INIT, Revision::HEAD, &PathPattern::all(), 100)
            .expect("history")
    };

    let result = server
        .executor
        .execute(Command::new(CommandKind::MigrateToEncryptedRepository {
            project: "p".to_owned(),
            repository: "r".to_owned(),
        }))
        .expect("migrate");
    assert_eq!(result, CommandResult::Done);

    // The git directory is gone, the cipher directory took its place.
    assert!(!server._dir.path().join("p/r.git").exists());
    assert!(server._dir.path().join("p/r.cipher").exists());

    let repository = server.manager.repository("p", "r").expect("reopen");
    assert_eq!(repository.head_revision(), Revision::new(4).unwrap());

    // Every revision reads back byte-identically.
    for (revision, expected) in [
        (2, json!({"v": 1})),
        (3, json!({"v": 2})),
    ] {
        let entry = repository
            .get(
                Revision::new(revision).unwrap(),
                &FilePath::new("/a.json").unwrap(),
            )
            .expect("get");
        assert_eq!(entry.content, Some(EntryContent::Json(expected)));
    }
    let after = repository
        .history(Revision::INIT, Revision::HEAD, &PathPattern::all(), 100)
        .expect("history");
    assert_eq!(before, after);

    // And the migrated repository keeps accepting writes.
    push(&server, "r", 4, "/a.json", json!({"v": 3}));
    assert_eq!(
        server
            .manager
            .repository("p", "r")
            .expect("repository")
            .head_revision(),
        Revision::new(5).unwrap()
    );
}
