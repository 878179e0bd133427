// In-process lock keyed by table and resolved key. Held from lookup through
// write so that concurrent upserts for the same key in this process cannot
// both observe zero matches. It does not coordinate separate processes.
//
// The map only holds weak references: an entry lives exactly as long as some
// caller holds or waits on its mutex, so a held lock is never replaced.
use crate::key::ResolvedKey;
use crate::table::TableId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, table: TableId, key: &ResolvedKey) -> OwnedMutexGuard<()> {
        // Unit separators keep ("a b", "c") and ("a", "b c") apart
        let name = format!(
            "{}\u{1f}{}\u{1f}{}",
            table.name(),
            key.filter_field,
            key.filter_value
        );

        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, lock| lock.strong_count() > 0);

            match locks.get(&name).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(name, Arc::downgrade(&lock));
                    lock
                }
            }
        };

        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}
