//! Shared helpers for the server-level integration tests.
//!
//! Every test gets its own temp-dir data root — no shared state between
//! tests, no leftovers on disk.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use dogma::executor::ServerState;
use dogma::{
    InMemoryLog, LockTable, ProjectManager, ReplicatedCommandExecutor, SessionStore,
    StandaloneCommandExecutor,
};
use dogma_git::{KEY_LEN, Kek};

/// A fixed timestamp for deterministic commits.
pub const TS: i64 = 1_700_000_000_000;

/// Grace period small enough for purge tests.
pub const GRACE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// The KEK used by all tests.
pub fn test_kek() -> Kek {
    Kek::new(1, [0x5a; KEY_LEN])
}

/// A standalone server: manager + sessions + state + executor.
pub struct TestServer {
    pub _dir: TempDir,
    pub manager: Arc<ProjectManager>,
    pub sessions: Arc<SessionStore>,
    pub state: Arc<ServerState>,
    pub executor: StandaloneCommandExecutor,
}

impl TestServer {
    pub fn start() -> Self {
        dogma::telemetry::init();
        let dir = TempDir::new().expect("temp dir");
        let manager = Arc::new(
            ProjectManager::open(dir.path(), Some(test_kek()), GRACE, 1024, None)
                .expect("manager"),
        );
        let sessions = Arc::new(SessionStore::new());
        let state = Arc::new(ServerState::new("standalone-1"));
        let executor = StandaloneCommandExecutor::new(
            Arc::clone(&manager),
            Arc::clone(&sessions),
            Arc::clone(&state),
        );
        Self {
            _dir: dir,
            manager,
            sessions,
            state,
            executor,
        }
    }
}

/// One replica in a replicated test cluster.
pub struct TestReplica {
    pub _dir: TempDir,
    pub manager: Arc<ProjectManager>,
    pub sessions: Arc<SessionStore>,
    pub state: Arc<ServerState>,
    pub executor: Arc<ReplicatedCommandExecutor>,
}

/// Build `n` replicas sharing one in-memory replication log. The first
/// replica is made leader. Replay loops are started.
pub fn cluster(n: usize) -> (Arc<InMemoryLog>, Vec<TestReplica>) {
    dogma::telemetry::init();
    let log = Arc::new(InMemoryLog::new());
    let mut replicas = Vec::new();
    for i in 0..n {
        let dir = TempDir::new().expect("temp dir");
        let manager = Arc::new(
            ProjectManager::open(dir.path(), Some(test_kek()), GRACE, 1024, None)
                .expect("manager"),
        );
        let sessions = Arc::new(SessionStore::new());
        let state = Arc::new(ServerState::new(format!("replica-{i}")));
        let executor = Arc::new(ReplicatedCommandExecutor::new(
            Arc::clone(&manager),
            Arc::clone(&sessions),
            Arc::clone(&state),
            Arc::clone(&log) as Arc<dyn dogma::ReplicationLog>,
            Arc::new(LockTable::new()),
            Duration::from_secs(5),
        ));
        executor.start();
        replicas.push(TestReplica {
            _dir: dir,
            manager,
            sessions,
            state,
            executor,
        });
    }
    replicas[0].executor.on_take_leadership();
    (log, replicas)
}

/// Poll `predicate` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    predicate()
}
