//! Shared test utilities.

use splitledger::{entity::user, Controller, Database};
use tempfile::TempDir;

/// A migrated ledger database living in its own temporary directory.
pub struct TestLedger {
    pub db: Database,
    _dir: TempDir,
}

impl TestLedger {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db = Database::new(&dir.path().join("ledger.sqlite"))
            .await
            .expect("failed to open database");
        db.apply_migrations().await.expect("failed to migrate");
        Self { db, _dir: dir }
    }

    pub fn ctl(&self) -> Controller<'_> {
        Controller::new(&self.db)
    }

    pub async fn user(&self, username: &str) -> user::Model {
        self.ctl()
            .create_user(username, &format!("{username}@example.com"))
            .await
            .expect("failed to create user")
    }
}
