//! Data-change subscription registry.
//!
//! Subscriptions are keyed by an explicit value, not listener object
//! identity, so registering "the same" listener twice is detectable and
//! collapses to a single store-side registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::path::{ListenScope, Partition, PathAddress};
use crate::store::{DataChangeListener, ListenerRegistration, Result, StoreService};

/// Identity of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub partition: Partition,
    pub path: PathAddress,
    pub scope: ListenScope,
    pub listener_id: String,
}

/// A recorded, live subscription.
pub struct Subscription {
    key: SubscriptionKey,
    listener: Arc<dyn DataChangeListener>,
    registration: Box<dyn ListenerRegistration>,
    listening: AtomicBool,
}

impl Subscription {
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn listener(&self) -> &Arc<dyn DataChangeListener> {
        &self.listener
    }

    /// True from the first successful store registration until unregistered.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

/// Registry of change-listener subscriptions.
///
/// The map lock is held across the store registration call, which gives the
/// single-writer discipline the idempotency invariant needs: two concurrent
/// registrations of the same key cannot both reach the store.
#[derive(Default)]
pub struct ChangeListenerRegistry {
    entries: Mutex<HashMap<SubscriptionKey, Arc<Subscription>>>,
}

impl ChangeListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for changes at its path. Idempotent per
    /// (partition, path, scope, listener id): a repeated call returns the
    /// existing subscription without touching the store. Atomic: on a store
    /// failure no entry is recorded.
    pub fn register(
        &self,
        store: &dyn StoreService,
        partition: Partition,
        scope: ListenScope,
        listener: Arc<dyn DataChangeListener>,
    ) -> Result<Arc<Subscription>> {
        let key = SubscriptionKey {
            partition,
            path: listener.path().clone(),
            scope,
            listener_id: listener.id().to_string(),
        };

        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(&key) {
            debug!(
                path = %key.path,
                listener = %key.listener_id,
                "listener already registered, returning existing subscription"
            );
            return Ok(Arc::clone(existing));
        }

        let registration =
            store.register_change_listener(partition, &key.path, scope, Arc::clone(&listener))?;

        info!(
            path = %key.path,
            partition = %partition,
            listener = %key.listener_id,
            "data change listener registered"
        );

        let subscription = Arc::new(Subscription {
            key: key.clone(),
            listener,
            registration,
            listening: AtomicBool::new(true),
        });
        entries.insert(key, Arc::clone(&subscription));
        Ok(subscription)
    }

    /// Remove a subscription and close its store registration. Returns
    /// whether an entry existed.
    pub fn unregister(&self, key: &SubscriptionKey) -> bool {
        let removed = self.entries.lock().unwrap().remove(key);
        match removed {
            Some(subscription) => {
                subscription.registration.close();
                subscription.listening.store(false, Ordering::SeqCst);
                info!(
                    path = %key.path,
                    listener = %key.listener_id,
                    "data change listener unregistered"
                );
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DataChangeEvent, StoreError, StoreTransactionHandle};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct TestListener {
        id: String,
        path: PathAddress,
    }

    #[async_trait]
    impl DataChangeListener for TestListener {
        fn id(&self) -> &str {
            &self.id
        }

        fn path(&self) -> &PathAddress {
            &self.path
        }

        async fn on_data_change(&self, _event: DataChangeEvent) {}
    }

    struct NoopRegistration;
    impl ListenerRegistration for NoopRegistration {
        fn close(&self) {}
    }

    /// Store fake that counts registration calls; transactions are out of
    /// scope for these tests.
    #[derive(Default)]
    struct CountingStore {
        registrations: AtomicUsize,
        fail: bool,
    }

    impl StoreService for CountingStore {
        fn new_read_only_transaction(&self) -> Box<dyn StoreTransactionHandle> {
            unimplemented!("not used by registry tests")
        }

        fn new_write_only_transaction(&self) -> Box<dyn StoreTransactionHandle> {
            unimplemented!("not used by registry tests")
        }

        fn new_read_write_transaction(&self) -> Box<dyn StoreTransactionHandle> {
            unimplemented!("not used by registry tests")
        }

        fn register_change_listener(
            &self,
            _partition: Partition,
            _path: &PathAddress,
            _scope: ListenScope,
            _listener: Arc<dyn DataChangeListener>,
        ) -> Result<Box<dyn ListenerRegistration>> {
            if self.fail {
                return Err(StoreError::RegistrationFailed("store said no".into()));
            }
            self.registrations.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NoopRegistration))
        }
    }

    fn listener(id: &str) -> Arc<dyn DataChangeListener> {
        Arc::new(TestListener {
            id: id.to_string(),
            path: "/interfaces".parse().unwrap(),
        })
    }

    #[test]
    fn repeated_registration_is_idempotent() {
        let store = CountingStore::default();
        let registry = ChangeListenerRegistry::new();
        let l = listener("stream-1");

        let first = registry
            .register(&store, Partition::Configuration, ListenScope::Base, l.clone())
            .unwrap();
        assert!(first.is_listening());

        let second = registry
            .register(&store, Partition::Configuration, ListenScope::Base, l.clone())
            .unwrap();
        let third = registry
            .register(&store, Partition::Configuration, ListenScope::Base, l)
            .unwrap();

        assert!(second.is_listening());
        assert!(third.is_listening());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_scopes_are_distinct_subscriptions() {
        let store = CountingStore::default();
        let registry = ChangeListenerRegistry::new();
        let l = listener("stream-1");

        registry
            .register(&store, Partition::Configuration, ListenScope::Base, l.clone())
            .unwrap();
        registry
            .register(&store, Partition::Configuration, ListenScope::Subtree, l)
            .unwrap();

        assert_eq!(store.registrations.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn failed_registration_records_nothing() {
        let store = CountingStore {
            fail: true,
            ..Default::default()
        };
        let registry = ChangeListenerRegistry::new();

        let result = registry.register(
            &store,
            Partition::Configuration,
            ListenScope::Base,
            listener("stream-1"),
        );
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_closes_and_removes() {
        let store = CountingStore::default();
        let registry = ChangeListenerRegistry::new();
        let subscription = registry
            .register(
                &store,
                Partition::Configuration,
                ListenScope::Base,
                listener("stream-1"),
            )
            .unwrap();

        assert!(registry.unregister(subscription.key()));
        assert!(!subscription.is_listening());
        assert!(registry.is_empty());
        // Second unregister finds nothing.
        assert!(!registry.unregister(subscription.key()));
    }

    #[test]
    fn concurrent_duplicate_registrations_reach_the_store_once() {
        let store = CountingStore::default();
        let registry = ChangeListenerRegistry::new();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    registry
                        .register(
                            &store,
                            Partition::Configuration,
                            ListenScope::OneLevel,
                            listener("stream-shared"),
                        )
                        .unwrap();
                });
            }
        });

        assert_eq!(store.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }
}
