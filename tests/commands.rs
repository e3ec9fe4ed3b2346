//! Command execution: pushes through the executor, server status
//! transitions, force-push, and sessions.

mod common;

use common::TestServer;

use serde_json::json;

use dogma::{Command, CommandExecutor, CommandKind, CommandResult, ServerError, ServerStatus};
use dogma_core::{Author, Change, EntryContent, FilePath, Markup, Revision};

fn setup_repo(server: &TestServer) {
    server
        .executor
        .execute(Command::new(CommandKind::CreateProject {
            project: "p".to_owned(),
        }))
        .expect("create project");
    server
        .executor
        .execute(Command::new(CommandKind::CreateRepository {
            project: "p".to_owned(),
            repository: "r".to_owned(),
            encrypted: false,
        }))
        .expect("create repository");
}

fn push_command(base: i64, path: &str, value: serde_json::Value) -> Command {
    Command::by(
        Author::new("alice", "alice@example.com"),
        CommandKind::Push {
            project: "p".to_owned(),
            repository: "r".to_owned(),
            base_revision: Revision::new(base).unwrap(),
            summary: format!("edit {path}"),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes: vec![Change::upsert_json(path, value).unwrap()],
        },
    )
}

#[test]
fn push_returns_the_new_revision_and_lands_content() {
    let server = TestServer::start();
    setup_repo(&server);

    let result = server
        .executor
        .execute(push_command(1, "/conf/a.json", json!({"k": 1})))
        .expect("push");
    assert_eq!(
        result,
        CommandResult::Pushed {
            revision: Revision::new(2).unwrap()
        }
    );

    let repository = server.manager.repository("p", "r").expect("repository");
    let entry = repository
        .get(Revision::HEAD, &FilePath::new("/conf/a.json").unwrap())
        .expect("get");
    assert_eq!(entry.content, Some(EntryContent::Json(json!({"k": 1}))));

    // The commit records the push author.
    let info = repository.commit_info(Revision::HEAD).expect("info");
    assert_eq!(info.author.name, "alice");
    assert_eq!(info.message.summary, "edit /conf/a.json");
}

#[test]
fn read_only_mode_rejects_writes_until_forced() {
    let server = TestServer::start();
    setup_repo(&server);

    server
        .executor
        .execute(Command::new(CommandKind::UpdateServerStatus {
            status: ServerStatus::ReadOnly,
        }))
        .expect("go read-only");
    assert_eq!(server.executor.status(), ServerStatus::ReadOnly);

    // Ordinary writes bounce.
    let refused = server
        .executor
        .execute(push_command(1, "/conf/a.json", json!(1)));
    assert!(matches!(refused, Err(ServerError::ReadOnly)));

    // A force-push goes through.
    let forced = server
        .executor
        .execute(Command::new(CommandKind::ForcePush {
            command: Box::new(CommandKind::UpdateServerStatus {
                status: ServerStatus::Writable,
            }),
        }))
        .expect("force status change");
    assert_eq!(forced, CommandResult::Done);
    assert_eq!(server.executor.status(), ServerStatus::Writable);

    server
        .executor
        .execute(push_command(1, "/conf/a.json", json!(1)))
        .expect("write after restore");
}

#[test]
fn session_commands_update_the_store() {
    let server = TestServer::start();

    server
        .executor
        .execute(Command::new(CommandKind::CreateSession {
            session_id: "s-1".to_owned(),
        }))
        .expect("create session");
    assert_eq!(server.sessions.get("s-1").expect("get").id, "s-1");

    server
        .executor
        .execute(Command::new(CommandKind::RemoveSession {
            session_id: "s-1".to_owned(),
        }))
        .expect("remove session");
    assert!(matches!(
        server.sessions.get("s-1"),
        Err(ServerError::SessionNotFound { .. })
    ));
}

#[test]
fn domain_errors_pass_through_the_executor() {
    let server = TestServer::start();
    setup_repo(&server);

    server
        .executor
        .execute(push_command(1, "/conf/a.json", json!({"k": "v"})))
        .expect("first push");

    // Stale base → conflict, surfaced verbatim.
    let stale = server
        .executor
        .execute(push_command(1, "/conf/a.json", json!({"k": "other"})));
    assert!(matches!(
        stale,
        Err(ServerError::Core(dogma_core::Error::ChangeConflict { .. }))
    ));

    // Identical content → redundant.
    let redundant = server
        .executor
        .execute(push_command(2, "/conf/a.json", json!({"k": "v"})));
    assert!(matches!(
        redundant,
        Err(ServerError::Core(dogma_core::Error::RedundantChange))
    ));
}
