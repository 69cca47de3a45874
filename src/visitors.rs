//! Open visitor sessions and the owner's social reward for them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::config::VisitorConfig;
use crate::types::{IslandId, PlayerId};

/// Transient: lives from arrival to departure, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitorSession {
    pub island_id: IslandId,
    pub visitor_id: PlayerId,
    pub start_time: DateTime<Utc>,
}

/// A closed session with its reward already computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishedVisit {
    pub session: VisitorSession,
    pub seconds: u64,
    pub owner_xp: f64,
}

pub struct VisitorTracker {
    config: VisitorConfig,
    sessions: Mutex<HashMap<PlayerId, VisitorSession>>,
}

impl VisitorTracker {
    pub fn new(config: VisitorConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open a session. A visitor has at most one; moving to another island
    /// closes the previous one, which is returned.
    pub fn start(
        &self,
        island_id: IslandId,
        visitor_id: PlayerId,
        now: DateTime<Utc>,
    ) -> Option<VisitorSession> {
        let mut sessions = self.sessions.lock();
        if let Some(open) = sessions.get(&visitor_id) {
            if open.island_id == island_id {
                return None;
            }
        }
        sessions.insert(
            visitor_id,
            VisitorSession {
                island_id,
                visitor_id,
                start_time: now,
            },
        )
    }

    pub fn session(&self, visitor: &PlayerId) -> Option<VisitorSession> {
        self.sessions.lock().get(visitor).copied()
    }

    /// Visitors with an open session on `island`.
    pub fn visitors_on(&self, island: IslandId) -> Vec<PlayerId> {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.island_id == island)
            .map(|s| s.visitor_id)
            .collect()
    }

    pub fn end(&self, visitor: &PlayerId, now: DateTime<Utc>) -> Option<FinishedVisit> {
        let session = self.sessions.lock().remove(visitor)?;
        Some(self.finish(session, now))
    }

    /// Close every session on `island`.
    pub fn end_island(&self, island: IslandId, now: DateTime<Utc>) -> Vec<FinishedVisit> {
        let closed: Vec<VisitorSession> = {
            let mut sessions = self.sessions.lock();
            let ids: Vec<PlayerId> = sessions
                .values()
                .filter(|s| s.island_id == island)
                .map(|s| s.visitor_id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        closed.into_iter().map(|s| self.finish(s, now)).collect()
    }

    pub fn drain(&self, now: DateTime<Utc>) -> Vec<FinishedVisit> {
        let all: Vec<VisitorSession> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        all.into_iter().map(|s| self.finish(s, now)).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn finish(&self, session: VisitorSession, now: DateTime<Utc>) -> FinishedVisit {
        let seconds = (now - session.start_time).num_seconds().max(0) as u64;
        FinishedVisit {
            session,
            seconds,
            owner_xp: self.reward_for(seconds),
        }
    }

    /// Time-proportional, capped reward.
    pub fn reward_for(&self, seconds: u64) -> f64 {
        if seconds < self.config.min_visit_secs {
            return 0.0;
        }
        let xp = seconds as f64 / 60.0 * self.config.xp_per_minute;
        xp.min(self.config.max_xp_per_visit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tracker() -> VisitorTracker {
        VisitorTracker::new(VisitorConfig::default())
    }

    #[test]
    fn reward_is_proportional_and_capped() {
        let t = tracker();
        assert_eq!(t.reward_for(10), 0.0);
        assert_eq!(t.reward_for(300), 10.0);
        assert_eq!(t.reward_for(24 * 3600), 50.0);
    }

    #[test]
    fn end_computes_duration() {
        let t = tracker();
        let start = Utc::now();
        let island = IslandId::new();
        let v = PlayerId::new();
        assert!(t.start(island, v, start).is_none());

        let done = t.end(&v, start + Duration::minutes(10)).unwrap();
        assert_eq!(done.seconds, 600);
        assert_eq!(done.owner_xp, 20.0);
        assert!(t.end(&v, start).is_none());
    }

    #[test]
    fn restarting_on_same_island_keeps_original_start() {
        let t = tracker();
        let start = Utc::now();
        let island = IslandId::new();
        let v = PlayerId::new();
        t.start(island, v, start);
        assert!(t.start(island, v, start + Duration::minutes(1)).is_none());
        assert_eq!(t.session(&v).unwrap().start_time, start);

        let previous = t.start(IslandId::new(), v, start + Duration::minutes(2));
        assert_eq!(previous.unwrap().island_id, island);
    }

    #[test]
    fn end_island_closes_only_that_island() {
        let t = tracker();
        let now = Utc::now();
        let a = IslandId::new();
        t.start(a, PlayerId::new(), now);
        t.start(a, PlayerId::new(), now);
        t.start(IslandId::new(), PlayerId::new(), now);

        assert_eq!(t.visitors_on(a).len(), 2);
        assert_eq!(t.end_island(a, now).len(), 2);
        assert!(t.visitors_on(a).is_empty());
        assert_eq!(t.len(), 1);
        assert_eq!(t.drain(now).len(), 1);
        assert!(t.is_empty());
    }
}
