#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fraudguard::monitor::{NotificationSink, ProcessInventory};
use fraudguard::transport::{ApiRequest, ApiResponse, ApiTransport};
use fraudguard::{AppParts, Config, CredentialStore, Notification, Result};
use keyring::mock::MockCredential;
use keyring::Entry;
use tempfile::TempDir;

/// Transport that answers each path with a fixed response.
#[derive(Default)]
pub struct StubTransport {
    routes: Mutex<HashMap<String, ApiResponse>>,
    pub seen: Mutex<Vec<ApiRequest>>,
}

impl StubTransport {
    pub fn route(self, path: &str, response: ApiResponse) -> Self {
        self.routes.lock().unwrap().insert(path.to_string(), response);
        self
    }

    pub fn hits(&self, path: &str) -> usize {
        self.seen.lock().unwrap().iter().filter(|r| r.path == path).count()
    }
}

#[async_trait]
impl ApiTransport for StubTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = self
            .routes
            .lock()
            .unwrap()
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| ApiResponse::new(404, ""));
        self.seen.lock().unwrap().push(request);
        Ok(response)
    }
}

/// Replays process lists in order, repeating the last one.
pub struct ReplayInventory {
    lists: Mutex<VecDeque<Vec<String>>>,
    last: Mutex<Vec<String>>,
}

impl ReplayInventory {
    pub fn new(lists: &[&[&str]]) -> Self {
        Self {
            lists: Mutex::new(
                lists
                    .iter()
                    .map(|l| l.iter().map(|s| s.to_string()).collect())
                    .collect(),
            ),
            last: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProcessInventory for ReplayInventory {
    async fn running_processes(&self) -> Result<Vec<String>> {
        if let Some(next) = self.lists.lock().unwrap().pop_front() {
            *self.last.lock().unwrap() = next;
        }
        Ok(self.last.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub notifications: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }
}

pub fn mock_credentials() -> CredentialStore {
    CredentialStore::with_entry(Entry::new_with_credential(Box::new(MockCredential::default())))
}

pub fn config_in(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = Some(dir.path().to_path_buf());
    config
}

pub fn parts(
    auth: Arc<StubTransport>,
    api: Arc<StubTransport>,
    inventory: Arc<ReplayInventory>,
    sink: Arc<CollectingSink>,
) -> AppParts {
    AppParts {
        credentials: mock_credentials(),
        auth_transport: auth,
        api_transport: api,
        inventory,
        sink,
    }
}
