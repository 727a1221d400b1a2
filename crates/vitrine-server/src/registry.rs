//! Live-session registry.

use std::sync::Arc;

use dashmap::DashMap;

use vitrine_core::ids::SessionId;

use crate::session::Session;

/// All live sessions, keyed by id. Sessions share nothing with each
/// other; the registry only tracks them for counting and shutdown.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id().clone(), session);
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every live session. Used at server shutdown; `close` is
    /// idempotent, so racing a concurrent disconnect is harmless.
    pub async fn close_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.sessions.clear();

        for session in &sessions {
            session.close().await;
        }
        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testutil::harness;
    use vitrine_core::state::SessionState;

    #[tokio::test]
    async fn insert_get_remove_roundtrip() {
        let registry = SessionRegistry::new();
        let h = harness().await;
        let id = h.session.id().clone();

        registry.insert(Arc::clone(&h.session));
        assert_eq!(registry.count(), 1);
        assert!(registry.get(&id).is_some());

        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.id(), &id);
        assert_eq!(registry.count(), 0);
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test]
    async fn close_all_closes_every_session() {
        let registry = SessionRegistry::new();
        let a = harness().await;
        let b = harness().await;
        registry.insert(Arc::clone(&a.session));
        registry.insert(Arc::clone(&b.session));

        let closed = registry.close_all().await;
        assert_eq!(closed, 2);
        assert_eq!(registry.count(), 0);
        assert_eq!(a.session.state(), SessionState::Closed);
        assert_eq!(b.session.state(), SessionState::Closed);
    }
}
