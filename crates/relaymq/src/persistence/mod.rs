//! Durable key/value storage behind the client session.
//!
//! The session stores complete wire encodings of in-flight packets under the
//! keys of [`relaymq_protocol::StoreKey`]. Adapters only move bytes.

mod file;
mod memory;

pub use file::FilePersistence;
pub use memory::MemoryPersistence;

use bytes::Bytes;
use relaymq_protocol::Result;
use std::future::Future;
use std::pin::Pin;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A key/value store opened once per client.
///
/// Implementations must be usable through `Arc<dyn Persistence>`; every
/// method returns a boxed future for that reason.
pub trait Persistence: Send + Sync {
    /// Prepares the store for `client_id`. Called once before any other method.
    fn open<'a>(&'a self, client_id: &'a str, server_uri: &'a str) -> StoreFuture<'a, ()>;

    /// Inserts or replaces `key`. The value must be durable once the future resolves.
    fn put<'a>(&'a self, key: &'a str, value: Bytes) -> StoreFuture<'a, ()>;

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Bytes>>;

    /// Removing a missing key succeeds.
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    fn contains_key<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    fn keys(&self) -> StoreFuture<'_, Vec<String>>;

    fn clear(&self) -> StoreFuture<'_, ()>;

    fn close(&self) -> StoreFuture<'_, ()>;
}
