//! Login sessions

use dashmap::DashMap;

/// Session keys mapped to user ids
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, u64>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session for `user_id` and return its key
    pub fn create(&self, user_id: u64) -> String {
        let key = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.insert(key.clone(), user_id);
        key
    }

    pub fn user_id(&self, key: &str) -> Option<u64> {
        self.sessions.get(key).map(|entry| *entry.value())
    }

    pub fn remove(&self, key: &str) -> Option<u64> {
        self.sessions.remove(key).map(|(_, user_id)| user_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let store = SessionStore::new();
        let first = store.create(1);
        let second = store.create(1);

        assert_ne!(first, second);
        assert_eq!(first.len(), 32);
        assert_eq!(store.user_id(&first), Some(1));
        assert_eq!(store.len(), 2);

        assert_eq!(store.remove(&first), Some(1));
        assert_eq!(store.user_id(&first), None);
        assert_eq!(store.remove(&first), None);
        assert!(!store.is_empty());
    }
}
