//! Replicated execution: leader writes, follower replay, idempotent
//! re-application, and divergence handling.

mod common;

use std::time::Duration;

use common::{cluster, wait_until};

use serde_json::json;

use dogma::{Command, CommandExecutor, CommandKind, CommandResult, ServerError, ServerStatus};
use dogma_core::{Author, Change, EntryContent, FilePath, Markup, Revision};

fn push_command(base: i64, value: serde_json::Value) -> Command {
    Command::by(
        Author::new("alice", "alice@example.com"),
        CommandKind::Push {
            project: "p".to_owned(),
            repository: "r".to_owned(),
            base_revision: Revision::new(base).unwrap(),
            summary: "replicated edit".to_owned(),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes: vec![Change::upsert_json("/a.json", value).unwrap()],
        },
    )
}

#[test]
fn follower_replays_leader_writes_in_order() {
    let (_log, replicas) = cluster(2);
    let leader = &replicas[0];
    let follower = &replicas[1];

    leader
        .executor
        .execute(Command::new(CommandKind::CreateProject {
            project: "p".to_owned(),
        }))
        .expect("create project");
    leader
        .executor
        .execute(Command::new(CommandKind::CreateRepository {
            project: "p".to_owned(),
            repository: "r".to_owned(),
            encrypted: false,
        }))
        .expect("create repository");
    let pushed = leader
        .executor
        .execute(push_command(1, json!({"step": 1})))
        .expect("push 1");
    assert_eq!(
        pushed,
        CommandResult::Pushed {
            revision: Revision::new(2).unwrap()
        }
    );
    leader
        .executor
        .execute(push_command(2, json!({"step": 2})))
        .expect("push 2");

    // The follower's visible state converges to the log's total order.
    assert!(
        wait_until(Duration::from_secs(5), || {
            follower
                .manager
                .repository("p", "r")
                .map(|r| r.head_revision() == Revision::new(3).unwrap())
                .unwrap_or(false)
        }),
        "follower did not catch up"
    );

    let repository = follower.manager.repository("p", "r").expect("repository");
    let entry = repository
        .get(Revision::HEAD, &FilePath::new("/a.json").unwrap())
        .expect("get");
    assert_eq!(
        entry.content,
        Some(EntryContent::Json(json!({"step": 2})))
    );
    // Both replicas stay writable-healthy.
    assert_eq!(leader.executor.status(), ServerStatus::Writable);
    assert_eq!(follower.executor.status(), ServerStatus::Writable);
}

#[test]
fn non_leader_refuses_writes() {
    let (_log, replicas) = cluster(2);
    let follower = &replicas[1];

    let refused = follower
        .executor
        .execute(Command::new(CommandKind::CreateProject {
            project: "p".to_owned(),
        }));
    assert!(matches!(refused, Err(ServerError::ReadOnly)));
}

#[test]
fn leadership_handover_catches_up_first() {
    let (_log, replicas) = cluster(2);
    let first = &replicas[0];
    let second = &replicas[1];

    first
        .executor
        .execute(Command::new(CommandKind::CreateProject {
            project: "p".to_owned(),
        }))
        .expect("create project");
    first
        .executor
        .execute(Command::new(CommandKind::CreateRepository {
            project: "p".to_owned(),
            repository: "r".to_owned(),
            encrypted: false,
        }))
        .expect("create repository");

    // Hand leadership over; the new leader must already see the state the
    // old leader produced.
    first.executor.on_release_leadership();
    assert!(wait_until(Duration::from_secs(5), || {
        second.manager.repository("p", "r").is_ok()
    }));
    second.executor.on_take_leadership();

    let pushed = second
        .executor
        .execute(push_command(1, json!({"owner": "second"})))
        .expect("push on new leader");
    assert_eq!(
        pushed,
        CommandResult::Pushed {
            revision: Revision::new(2).unwrap()
        }
    );

    // The old leader, now a follower, replays the new leader's entry.
    assert!(wait_until(Duration::from_secs(5), || {
        first
            .manager
            .repository("p", "r")
            .map(|r| r.head_revision() == Revision::new(2).unwrap())
            .unwrap_or(false)
    }));
}

#[test]
fn divergent_entry_halts_the_replica_read_only() {
    let (log, replicas) = cluster(2);
    let leader = &replicas[0];
    let follower = &replicas[1];

    leader
        .executor
        .execute(Command::new(CommandKind::CreateProject {
            project: "p".to_owned(),
        }))
        .expect("create project");
    leader
        .executor
        .execute(Command::new(CommandKind::CreateRepository {
            project: "p".to_owned(),
            repository: "r".to_owned(),
            encrypted: false,
        }))
        .expect("create repository");
    assert!(wait_until(Duration::from_secs(5), || {
        follower.manager.repository("p", "r").is_ok()
    }));

    // A rogue entry expects the repository at revision 5 while every
    // replica is at 1: replay must halt rather than guess.
    use dogma::ReplicationLog as _;
    log.append("rogue", push_command(5, json!({"bad": true})))
        .expect("append rogue entry");

    assert!(
        wait_until(Duration::from_secs(5), || {
            follower.state.status() == ServerStatus::ReadOnly
        }),
        "follower did not halt on divergence"
    );
}
