use super::connection::ConnectionDescriptor;
use super::storage::PreferencesStore;

/// Known connections, most recent first, mirrored to a [`PreferencesStore`]
/// after every change.
///
/// The in-memory list is authoritative for the running session; a failed
/// write is logged and otherwise ignored.
pub struct ConnectionRegistry {
    entries: Vec<ConnectionDescriptor>,
    store: Box<dyn PreferencesStore>,
}

impl ConnectionRegistry {
    /// Empty registry that persists to `store`
    pub fn new(store: Box<dyn PreferencesStore>) -> Self {
        Self {
            entries: Vec::new(),
            store,
        }
    }

    /// Registry seeded from whatever `store` holds
    pub fn restore(store: Box<dyn PreferencesStore>) -> Self {
        let entries = match store.load() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to load saved connections: {:#}", e);
                Vec::new()
            }
        };
        tracing::debug!(count = entries.len(), "restored saved connections");
        Self { entries, store }
    }

    pub fn list(&self) -> &[ConnectionDescriptor] {
        &self.entries
    }

    pub fn get(&self, connection_id: &str) -> Option<&ConnectionDescriptor> {
        self.entries
            .iter()
            .find(|entry| entry.connection_id.as_deref() == Some(connection_id))
    }

    /// Record a descriptor. An entry with the same connection id, or the same
    /// engine and identifying fields, is replaced where it stands; anything
    /// else goes to the front.
    pub fn upsert(&mut self, descriptor: ConnectionDescriptor) -> &ConnectionDescriptor {
        self.upsert_reconnected(None, descriptor)
    }

    /// [`upsert`](Self::upsert) for a descriptor that was saved under
    /// `previous_id` before reconnecting. The entry holding `previous_id` is
    /// replaced even when the target has since been edited.
    ///
    /// Other entries matching the update are dropped, so ids stay unique.
    pub fn upsert_reconnected(
        &mut self,
        previous_id: Option<&str>,
        descriptor: ConnectionDescriptor,
    ) -> &ConnectionDescriptor {
        let matches = |entry: &ConnectionDescriptor| {
            previous_id.is_some_and(|id| entry.connection_id.as_deref() == Some(id))
                || Self::is_same_entry(entry, &descriptor)
        };

        let index = match self.entries.iter().position(|entry| matches(entry)) {
            Some(index) => {
                // Every other match sits after the first one
                let mut position = 0;
                self.entries.retain(|entry| {
                    let keep = position == index || !matches(entry);
                    position += 1;
                    keep
                });
                self.entries[index] = descriptor;
                index
            }
            None => {
                self.entries.insert(0, descriptor);
                0
            }
        };
        self.persist();
        &self.entries[index]
    }

    /// Delete the entry with `connection_id`; absent ids are ignored
    pub fn remove(&mut self, connection_id: &str) {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.connection_id.as_deref() != Some(connection_id));
        if self.entries.len() == before {
            tracing::debug!(connection_id, "no saved connection to remove");
        }
        self.persist();
    }

    fn is_same_entry(entry: &ConnectionDescriptor, candidate: &ConnectionDescriptor) -> bool {
        let same_id = matches!(
            (&entry.connection_id, &candidate.connection_id),
            (Some(a), Some(b)) if a == b
        );
        same_id || entry.same_target(candidate)
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.entries) {
            tracing::warn!("Failed to save connections: {:#}", e);
        }
    }
}
