//! Device registry: which devices are online for which account.
//!
//! Every mutation publishes exactly one presence snapshot for the account.
//! Snapshots are published while the account's entry is held, so two
//! concurrent mutations of the same account are observed in order.

use crate::presence::PresenceNotifier;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use orbit_types::{AccountId, ConnectionId, Device, DeviceId};
use std::collections::HashMap;
use std::sync::Arc;

/// Online devices per account.
pub struct DeviceRegistry {
    accounts: DashMap<AccountId, HashMap<DeviceId, Device>>,
    notifier: Arc<dyn PresenceNotifier>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("accounts", &self.accounts.len())
            .finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    /// Create an empty registry publishing through `notifier`.
    pub fn new(notifier: Arc<dyn PresenceNotifier>) -> Self {
        Self {
            accounts: DashMap::new(),
            notifier,
        }
    }

    /// Insert or replace `device` in the account's presence set, then broadcast.
    pub fn register(&self, account: &AccountId, device: Device) {
        let mut devices = self.accounts.entry(account.clone()).or_default();
        let replaced = devices.insert(device.device_id.clone(), device).is_some();

        tracing::debug!(
            "Registered device for {} (replaced: {}, online: {})",
            account,
            replaced,
            devices.len()
        );

        self.notifier.publish(account, devices.values().cloned().collect());
    }

    /// Remove a device from the account's presence set.
    ///
    /// Broadcasts unless the account had no presence set at all. The account
    /// entry is dropped once its last device is gone.
    pub fn unregister(&self, account: &AccountId, device_id: &DeviceId) {
        match self.accounts.entry(account.clone()) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(device_id).is_some();

                tracing::debug!(
                    "Unregistered {:?} from {} (removed: {}, online: {})",
                    device_id,
                    account,
                    removed,
                    entry.get().len()
                );

                self.notifier
                    .publish(account, entry.get().values().cloned().collect());

                if entry.get().is_empty() {
                    entry.remove();
                }
            }
            Entry::Vacant(_) => {
                tracing::debug!("Unregister for {} ignored, no devices online", account);
            }
        }
    }

    /// Remove a device only if its record still belongs to `connection_id`.
    ///
    /// Used on disconnect: if the device has re-registered from a newer
    /// connection in the meantime, its record is left untouched and nothing
    /// is broadcast. Returns whether the device was removed.
    pub fn unregister_connection(
        &self,
        account: &AccountId,
        device_id: &DeviceId,
        connection_id: ConnectionId,
    ) -> bool {
        let Entry::Occupied(mut entry) = self.accounts.entry(account.clone()) else {
            return false;
        };

        let owned = entry
            .get()
            .get(device_id)
            .is_some_and(|device| device.connection_id == connection_id);
        if !owned {
            tracing::debug!(
                "{:?} in {} is held by another connection, keeping it",
                device_id,
                account
            );
            return false;
        }

        entry.get_mut().remove(device_id);
        self.notifier
            .publish(account, entry.get().values().cloned().collect());

        if entry.get().is_empty() {
            entry.remove();
        }
        true
    }

    /// Current presence set of an account (empty if none).
    pub fn devices(&self, account: &AccountId) -> Vec<Device> {
        self.accounts
            .get(account)
            .map(|devices| devices.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the account currently has a presence entry.
    pub fn contains_account(&self, account: &AccountId) -> bool {
        self.accounts.contains_key(account)
    }

    /// Number of accounts with at least one online device.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Number of online devices across all accounts.
    pub fn device_count(&self) -> usize {
        self.accounts.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use orbit_types::{ConnectionId, DeviceKind};
    use std::sync::Mutex;

    /// Records every publish for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) published: Mutex<Vec<(AccountId, Vec<Device>)>>,
    }

    impl RecordingNotifier {
        pub(crate) fn count_for(&self, account: &AccountId) -> usize {
            self.published
                .lock()
                .unwrap()
                .iter()
                .filter(|(a, _)| a == account)
                .count()
        }

        pub(crate) fn last_for(&self, account: &AccountId) -> Option<Vec<Device>> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(a, _)| a == account)
                .map(|(_, d)| d.clone())
        }
    }

    impl PresenceNotifier for RecordingNotifier {
        fn publish(&self, account: &AccountId, devices: Vec<Device>) {
            self.published
                .lock()
                .unwrap()
                .push((account.clone(), devices));
        }
    }

    fn device(id: &str, name: &str) -> Device {
        Device {
            device_id: DeviceId::new(id),
            connection_id: ConnectionId::new(),
            display_name: name.to_string(),
            kind: DeviceKind::Laptop,
            battery_level: None,
            icon: None,
        }
    }

    fn registry() -> (DeviceRegistry, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (DeviceRegistry::new(notifier.clone()), notifier)
    }

    #[test]
    fn register_adds_device_and_broadcasts() {
        let (registry, notifier) = registry();
        let alice = AccountId::new("alice");

        registry.register(&alice, device("laptop-1", "Laptop"));

        let devices = registry.devices(&alice);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, DeviceId::new("laptop-1"));
        assert_eq!(notifier.count_for(&alice), 1);
        assert_eq!(notifier.last_for(&alice).unwrap(), devices);
    }

    #[test]
    fn same_key_replaces_rather_than_duplicates() {
        let (registry, notifier) = registry();
        let alice = AccountId::new("alice");

        registry.register(&alice, device("laptop-1", "Old name"));
        registry.register(&alice, device("laptop-1", "New name"));

        let devices = registry.devices(&alice);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].display_name, "New name");
        // Not deduplicated: both mutations broadcast.
        assert_eq!(notifier.count_for(&alice), 2);
    }

    #[test]
    fn identical_register_is_idempotent() {
        let (registry, _) = registry();
        let alice = AccountId::new("alice");
        let d = device("phone-1", "Phone");

        registry.register(&alice, d.clone());
        let first = registry.devices(&alice);
        registry.register(&alice, d);
        assert_eq!(registry.devices(&alice), first);
    }

    #[test]
    fn unregister_last_device_removes_account() {
        let (registry, notifier) = registry();
        let alice = AccountId::new("alice");

        registry.register(&alice, device("laptop-1", "Laptop"));
        registry.unregister(&alice, &DeviceId::new("laptop-1"));

        assert!(!registry.contains_account(&alice));
        assert!(registry.devices(&alice).is_empty());
        assert_eq!(registry.account_count(), 0);
        assert_eq!(notifier.count_for(&alice), 2);
        assert_eq!(notifier.last_for(&alice).unwrap(), Vec::new());
    }

    #[test]
    fn unregister_keeps_other_devices() {
        let (registry, notifier) = registry();
        let alice = AccountId::new("alice");

        registry.register(&alice, device("laptop-1", "Laptop"));
        registry.register(&alice, device("phone-1", "Phone"));
        registry.unregister(&alice, &DeviceId::new("laptop-1"));

        let devices = registry.devices(&alice);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, DeviceId::new("phone-1"));
        assert_eq!(notifier.last_for(&alice).unwrap(), devices);
    }

    #[test]
    fn unregister_absent_account_does_not_broadcast() {
        let (registry, notifier) = registry();
        let bob = AccountId::new("bob");

        registry.unregister(&bob, &DeviceId::new("ghost"));

        assert_eq!(notifier.count_for(&bob), 0);
        assert!(!registry.contains_account(&bob));
    }

    #[test]
    fn unregister_unknown_key_still_broadcasts() {
        let (registry, notifier) = registry();
        let alice = AccountId::new("alice");

        registry.register(&alice, device("laptop-1", "Laptop"));
        registry.unregister(&alice, &DeviceId::new("ghost"));

        assert_eq!(registry.devices(&alice).len(), 1);
        assert_eq!(notifier.count_for(&alice), 2);
    }

    #[test]
    fn unregister_connection_respects_newer_owner() {
        let (registry, notifier) = registry();
        let alice = AccountId::new("alice");
        let old = device("laptop-1", "Laptop");
        let old_conn = old.connection_id;
        let new = device("laptop-1", "Laptop");
        let new_conn = new.connection_id;

        registry.register(&alice, old);
        registry.register(&alice, new);

        assert!(!registry.unregister_connection(&alice, &DeviceId::new("laptop-1"), old_conn));
        assert_eq!(registry.devices(&alice).len(), 1);
        assert_eq!(notifier.count_for(&alice), 2);

        assert!(registry.unregister_connection(&alice, &DeviceId::new("laptop-1"), new_conn));
        assert!(!registry.contains_account(&alice));
        assert_eq!(notifier.count_for(&alice), 3);
    }

    #[test]
    fn counts_span_accounts() {
        let (registry, _) = registry();
        registry.register(&AccountId::new("a"), device("1", "one"));
        registry.register(&AccountId::new("a"), device("2", "two"));
        registry.register(&AccountId::new("b"), device("3", "three"));

        assert_eq!(registry.account_count(), 2);
        assert_eq!(registry.device_count(), 3);
    }
}
