//! Project and repository lifecycle: creation, the well-known repos,
//! soft deletion, unremove, and purge.

mod common;

use common::{TS, TestServer};

use dogma::{Command, CommandKind, CommandResult, ServerError};
use dogma_core::{Author, Error as CoreError, FilePath, EntryType, PathPattern, Revision};

fn create_project(server: &TestServer, name: &str) {
    use dogma::CommandExecutor as _;
    let result = server
        .executor
        .execute(Command::new(CommandKind::CreateProject {
            project: name.to_owned(),
        }))
        .expect("create project");
    assert_eq!(result, CommandResult::Done);
}

#[test]
fn create_project_then_repository_and_read_back() {
    use dogma::CommandExecutor as _;
    let server = TestServer::start();
    create_project(&server, "p");

    server
        .executor
        .execute(Command::new(CommandKind::CreateRepository {
            project: "p".to_owned(),
            repository: "r".to_owned(),
            encrypted: false,
        }))
        .expect("create repository");

    let repos = server.manager.list_repositories("p").expect("list");
    assert_eq!(repos, vec!["dogma", "meta", "r"]);

    let repository = server.manager.repository("p", "r").expect("repository");
    assert_eq!(repository.head_revision(), Revision::INIT);

    let root = repository
        .get(Revision::HEAD, &FilePath::root())
        .expect("get root");
    assert_eq!(root.kind, EntryType::Directory);

    let history = repository
        .history(Revision::INIT, Revision::HEAD, &PathPattern::all(), 10)
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message.summary, "Create a new repository");
}

#[test]
fn duplicate_names_collide() {
    let server = TestServer::start();
    create_project(&server, "p");

    assert!(matches!(
        server
            .manager
            .create_project("p", &Author::system(), TS),
        Err(ServerError::ProjectExists { .. })
    ));
    assert!(matches!(
        server
            .manager
            .create_repository("p", "meta", &Author::system(), TS, false),
        Err(ServerError::RepositoryExists { .. })
    ));
}

#[test]
fn removed_repository_is_invisible_until_unremoved() {
    let server = TestServer::start();
    create_project(&server, "p");
    server
        .manager
        .create_repository("p", "r", &Author::system(), TS, false)
        .expect("create");

    server.manager.remove_repository("p", "r").expect("remove");

    assert_eq!(
        server.manager.list_repositories("p").expect("list"),
        vec!["dogma", "meta"]
    );
    assert!(matches!(
        server.manager.repository("p", "r"),
        Err(ServerError::RepositoryNotFound { .. })
    ));
    assert_eq!(
        server
            .manager
            .list_removed_repositories("p")
            .expect("removed"),
        vec!["r"]
    );

    // A new repository cannot shadow the removed one.
    assert!(matches!(
        server
            .manager
            .create_repository("p", "r", &Author::system(), TS, false),
        Err(ServerError::RepositoryExists { .. })
    ));

    server
        .manager
        .unremove_repository("p", "r")
        .expect("unremove");
    let repository = server.manager.repository("p", "r").expect("repository");
    assert_eq!(repository.head_revision(), Revision::INIT);
}

#[test]
fn removing_a_repository_cancels_its_watchers() {
    use std::time::Duration;

    let server = TestServer::start();
    create_project(&server, "p");
    server
        .manager
        .create_repository("p", "r", &Author::system(), TS, false)
        .expect("create");

    let repository = server.manager.repository("p", "r").expect("repository");
    let handle = std::thread::spawn(move || {
        repository.watch(
            Revision::INIT,
            &PathPattern::all(),
            Duration::from_millis(3000),
        )
    });
    std::thread::sleep(Duration::from_millis(100));

    server.manager.remove_repository("p", "r").expect("remove");
    let result = handle.join().expect("join");
    assert!(matches!(result, Err(CoreError::ShuttingDown)));
}

#[test]
fn purge_requires_prior_removal() {
    let server = TestServer::start();
    create_project(&server, "p");
    server
        .manager
        .create_repository("p", "r", &Author::system(), TS, false)
        .expect("create");

    assert!(matches!(
        server.manager.purge_repository("p", "r"),
        Err(ServerError::RepositoryNotFound { .. })
    ));

    server.manager.remove_repository("p", "r").expect("remove");
    server.manager.purge_repository("p", "r").expect("purge");

    assert!(
        server
            .manager
            .list_removed_repositories("p")
            .expect("removed")
            .is_empty()
    );
    // Purged means gone for good: unremove has nothing to restore.
    assert!(matches!(
        server.manager.unremove_repository("p", "r"),
        Err(ServerError::RepositoryNotFound { .. })
    ));
}

#[test]
fn well_known_repositories_cannot_be_removed() {
    let server = TestServer::start();
    create_project(&server, "p");
    assert!(matches!(
        server.manager.remove_repository("p", "dogma"),
        Err(ServerError::InvalidName { .. })
    ));
    assert!(matches!(
        server.manager.remove_repository("p", "meta"),
        Err(ServerError::InvalidName { .. })
    ));
}

#[test]
fn project_soft_delete_roundtrip() {
    let server = TestServer::start();
    create_project(&server, "p");

    server.manager.remove_project("p").expect("remove");
    assert!(server.manager.list_projects().expect("list").is_empty());
    assert_eq!(
        server.manager.list_removed_projects().expect("removed"),
        vec!["p"]
    );

    server.manager.unremove_project("p").expect("unremove");
    assert_eq!(server.manager.list_projects().expect("list"), vec!["p"]);
    assert_eq!(server.manager.project("p").expect("project").name, "p");

    server.manager.remove_project("p").expect("remove again");
    server.manager.purge_project("p").expect("purge");
    assert!(server.manager.list_removed_projects().expect("removed").is_empty());
}

#[test]
fn purge_stale_respects_the_grace_period() {
    let server = TestServer::start();
    create_project(&server, "p");
    server.manager.remove_project("p").expect("remove");

    // Freshly removed: inside the grace window, nothing is purged.
    assert_eq!(server.manager.purge_stale().expect("sweep"), 0);
    assert_eq!(
        server.manager.list_removed_projects().expect("removed"),
        vec!["p"]
    );
}
