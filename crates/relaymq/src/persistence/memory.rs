use super::{Persistence, StoreFuture};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Keeps records in process memory. Nothing survives a restart, but a store
/// shared between client instances behaves like a durable one.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    records: Mutex<HashMap<String, Bytes>>,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Persistence for MemoryPersistence {
    fn open<'a>(&'a self, client_id: &'a str, _server_uri: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            tracing::debug!(client_id, "Opened in-memory store");
            Ok(())
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: Bytes) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.records.lock().insert(key.to_string(), value);
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Bytes>> {
        Box::pin(async move { Ok(self.records.lock().get(key).cloned()) })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.records.lock().remove(key);
            Ok(())
        })
    }

    fn contains_key<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.records.lock().contains_key(key)) })
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.records.lock().keys().cloned().collect()) })
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.records.lock().clear();
            Ok(())
        })
    }

    fn close(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }
}
