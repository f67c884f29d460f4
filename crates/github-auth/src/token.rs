//! Access token store with change notification
//!
//! `TokenStore` is the single source of truth for the GitHub access token. It
//! persists one string under `TOKEN_KEY` and tells registered listeners when
//! the value actually changes, so a caller waiting on a token does not need
//! to know who supplied it (popup flow, UI surface, or anything else).
//!
//! Concurrent `set_token` calls are last-write-wins: whichever persistence
//! write completes last determines the stored value.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::constants::TOKEN_KEY;
use crate::error::Result;
use crate::storage::KeyValueStore;

type Listener = Arc<dyn Fn(&str) + Send + Sync>;

pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    listeners: Mutex<Vec<Listener>>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Persisted token, or `""` when none is stored.
    pub fn get_token(&self) -> String {
        self.storage.get(TOKEN_KEY).unwrap_or_default()
    }

    /// Persist `token` and notify listeners if it differs from the stored value.
    ///
    /// Listeners run after the write completes. A persistence failure is
    /// returned to the caller and no notification is sent.
    pub async fn set_token(&self, token: &str) -> Result<()> {
        let changed = self.get_token() != token;
        self.storage.update(TOKEN_KEY, token.to_owned()).await?;

        if changed {
            info!(cleared = token.is_empty(), "access token changed");
            self.notify(token);
        } else {
            debug!("access token unchanged");
        }
        Ok(())
    }

    /// Register a listener called with the new token on every effective change.
    pub fn on_did_change_token<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    fn notify(&self, token: &str) {
        // Snapshot so a listener may register further listeners without deadlocking
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::MemoryStore;
    use std::future::Future;
    use std::pin::Pin;

    fn recorder(store: &TokenStore) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.on_did_change_token(move |token| sink.lock().unwrap().push(token.to_owned()));
        seen
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }

        fn update<'a>(
            &'a self,
            _key: &'a str,
            _value: String,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async { Err(Error::Storage("disk full".into())) })
        }
    }

    #[tokio::test]
    async fn empty_store_reads_as_empty_string() {
        let store = TokenStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(store.get_token(), "");
    }

    #[tokio::test]
    async fn changed_value_notifies_once() {
        let store = TokenStore::new(Arc::new(MemoryStore::new()));
        let seen = recorder(&store);

        store.set_token("gho_a").await.unwrap();

        assert_eq!(store.get_token(), "gho_a");
        assert_eq!(*seen.lock().unwrap(), vec!["gho_a".to_string()]);
    }

    #[tokio::test]
    async fn same_value_does_not_notify() {
        let store = TokenStore::new(Arc::new(MemoryStore::new()));
        store.set_token("gho_a").await.unwrap();
        let seen = recorder(&store);

        store.set_token("gho_a").await.unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn setting_empty_on_empty_store_does_not_notify() {
        let store = TokenStore::new(Arc::new(MemoryStore::new()));
        let seen = recorder(&store);

        store.set_token("").await.unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn clearing_token_notifies_with_empty_string() {
        let store = TokenStore::new(Arc::new(MemoryStore::new()));
        store.set_token("gho_a").await.unwrap();
        let seen = recorder(&store);

        store.set_token("").await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![String::new()]);
    }

    #[tokio::test]
    async fn every_listener_sees_each_change_once() {
        let store = TokenStore::new(Arc::new(MemoryStore::new()));
        let first = recorder(&store);
        let second = recorder(&store);

        store.set_token("gho_a").await.unwrap();
        store.set_token("gho_b").await.unwrap();

        let expected = vec!["gho_a".to_string(), "gho_b".to_string()];
        assert_eq!(*first.lock().unwrap(), expected);
        assert_eq!(*second.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn persistence_failure_propagates_without_notifying() {
        let store = TokenStore::new(Arc::new(FailingStore));
        let seen = recorder(&store);

        let result = store.set_token("gho_a").await;

        assert!(matches!(result, Err(Error::Storage(_))));
        assert!(seen.lock().unwrap().is_empty());
    }
}
