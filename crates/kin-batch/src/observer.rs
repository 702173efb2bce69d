use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use kin_types::{Entity, Key};

/// Notified once per physical write that reached the store.
///
/// For transactional units the calls happen after commit.
pub trait WriteObserver: Send + Sync {
    fn on_put(&self, entity: &Entity);

    fn on_delete(&self, key: &Key);
}

/// Observer that counts writes and remembers their keys.
#[derive(Debug, Default)]
pub struct WriteCounter {
    puts: AtomicU64,
    deletes: AtomicU64,
    keys: Mutex<Vec<Key>>,
}

impl WriteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.puts() + self.deletes()
    }

    /// Keys written or deleted, in observation order.
    pub fn keys(&self) -> Vec<Key> {
        self.keys.lock().map(|k| k.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        self.puts.store(0, Ordering::SeqCst);
        self.deletes.store(0, Ordering::SeqCst);
        if let Ok(mut keys) = self.keys.lock() {
            keys.clear();
        }
    }

    fn record(&self, key: &Key) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.push(key.clone());
        }
    }
}

impl WriteObserver for WriteCounter {
    fn on_put(&self, entity: &Entity) {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.record(entity.key());
    }

    fn on_delete(&self, key: &Key) {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.record(key);
    }
}
