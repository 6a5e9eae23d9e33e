use std::collections::BTreeMap;

use foundation::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subscription {
    /// Sent, acknowledgment not yet received.
    Starting,
    Running,
}

/// Ids with a repeating query started and not yet stopped.
///
/// An id is reserved before its start message goes out, so a second start
/// for it fails without waiting on the first. Sorted so bulk cleanup stops
/// ids in a stable order.
#[derive(Debug, Default, Clone)]
pub struct RepeatingRegistry {
    ids: BTreeMap<RequestId, Subscription>,
}

impl RepeatingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as starting. Returns `false` if it was already registered.
    pub fn reserve(&mut self, id: RequestId) -> bool {
        if self.ids.contains_key(&id) {
            return false;
        }
        self.ids.insert(id, Subscription::Starting);
        true
    }

    /// Promotes a reserved id once the peer acknowledged it. Returns `false`
    /// if the reservation was dropped meanwhile.
    pub fn confirm(&mut self, id: &RequestId) -> bool {
        match self.ids.get_mut(id) {
            Some(state) => {
                *state = Subscription::Running;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &RequestId) -> bool {
        self.ids.remove(id).is_some()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.ids.contains_key(id)
    }

    /// Every registered id, starting or running.
    pub fn ids(&self) -> Vec<RequestId> {
        self.ids.keys().cloned().collect()
    }

    /// Ids whose start was acknowledged.
    pub fn running(&self) -> Vec<RequestId> {
        self.ids
            .iter()
            .filter(|(_, state)| **state == Subscription::Running)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
