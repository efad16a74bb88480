//! Shared fixtures for the core integration tests

#![allow(dead_code)]

use chatql_core::bus::NotificationBus;
use chatql_core::model::{Channel, User};
use chatql_core::store::{ChatStore, SqlChatStore};
use chatql_core::ChatEngine;
use std::sync::Arc;
use tempfile::TempDir;

/// Engine over a file database that lives as long as the harness
pub struct Harness {
    pub engine: ChatEngine,
    _dir: Option<TempDir>,
}

impl Harness {
    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.engine.store
    }

    pub async fn user(&self, email: &str) -> User {
        self.engine.users.get_or_create(email).await.unwrap()
    }

    pub async fn channel(&self, members: &[&User]) -> Channel {
        self.engine
            .channels
            .get_or_create(members.iter().map(|u| (*u).clone()).collect())
            .await
            .unwrap()
    }
}

pub fn file_harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqlChatStore::open_file(dir.path().join("chat.db")).expect("open store");
    Harness {
        engine: ChatEngine::new(Arc::new(store), Arc::new(NotificationBus::new())),
        _dir: Some(dir),
    }
}

/// Two independent engines, each with its own pool and bus, sharing one
/// database file. The first harness owns the directory.
pub fn shared_file_harnesses() -> (Harness, Harness) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("chat.db");
    let first = SqlChatStore::open_file(&path).expect("open first store");
    let second = SqlChatStore::open_file(&path).expect("open second store");
    (
        Harness {
            engine: ChatEngine::new(Arc::new(first), Arc::new(NotificationBus::new())),
            _dir: Some(dir),
        },
        Harness {
            engine: ChatEngine::new(Arc::new(second), Arc::new(NotificationBus::new())),
            _dir: None,
        },
    )
}

pub fn memory_harness() -> Harness {
    let store = SqlChatStore::memory().expect("memory store");
    Harness {
        engine: ChatEngine::new(Arc::new(store), Arc::new(NotificationBus::new())),
        _dir: None,
    }
}
