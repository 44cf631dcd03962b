/*
    session.rs - Sync sessions

    One session covers exactly one sync round against a set of targets.
    Status goes active -> completed once every target has been processed,
    even when some replicas failed. A session is failed only when the round
    itself could not run. Finished sessions are kept in a bounded history.
*/

use crate::core_sync::model::{Millis, ReplicaId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSession {
    pub id: SessionId,
    pub targets: Vec<ReplicaId>,
    pub started_at: Millis,
    pub ended_at: Option<Millis>,
    pub operations_synced: usize,
    pub conflicts_resolved: usize,
    pub synced_replicas: Vec<ReplicaId>,
    pub failed_replicas: Vec<ReplicaId>,
    pub status: SessionStatus,
}

impl SyncSession {
    pub fn open(targets: Vec<ReplicaId>, now: Millis) -> Self {
        SyncSession {
            id: SessionId::generate(),
            targets,
            started_at: now,
            ended_at: None,
            operations_synced: 0,
            conflicts_resolved: 0,
            synced_replicas: Vec::new(),
            failed_replicas: Vec::new(),
            status: SessionStatus::Active,
        }
    }

    pub fn record_success(&mut self, replica_id: &str, operations: usize, conflicts: usize) {
        self.synced_replicas.push(replica_id.to_string());
        self.operations_synced += operations;
        self.conflicts_resolved += conflicts;
    }

    pub fn record_failure(&mut self, replica_id: &str) {
        self.failed_replicas.push(replica_id.to_string());
    }

    /// Close the session after every target was processed
    pub fn finish(&mut self, now: Millis) -> SessionStatus {
        self.ended_at = Some(now);
        self.status = SessionStatus::Completed;
        self.status
    }

    /// Close the session without running the round
    pub fn abort(&mut self, now: Millis) -> SessionStatus {
        self.ended_at = Some(now);
        self.status = SessionStatus::Failed;
        self.status
    }

    pub fn duration_ms(&self) -> Millis {
        self.ended_at
            .map(|end| end.saturating_sub(self.started_at))
            .unwrap_or(0)
    }
}

/// Result of one sync round, returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub session_id: SessionId,
    pub replicas_synced: usize,
    pub failed_replicas: Vec<ReplicaId>,
    pub operations_synced: usize,
    pub conflicts_resolved: usize,
    pub duration_ms: Millis,
    pub status: SessionStatus,
}

impl From<&SyncSession> for SyncSummary {
    fn from(session: &SyncSession) -> Self {
        SyncSummary {
            session_id: session.id.clone(),
            replicas_synced: session.synced_replicas.len(),
            failed_replicas: session.failed_replicas.clone(),
            operations_synced: session.operations_synced,
            conflicts_resolved: session.conflicts_resolved,
            duration_ms: session.duration_ms(),
            status: session.status,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionManager {
    history: VecDeque<SyncSession>,
    max_history: usize,
}

impl SessionManager {
    pub fn new(max_history: usize) -> Self {
        SessionManager {
            history: VecDeque::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn record(&mut self, session: SyncSession) {
        self.history.push_back(session);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SyncSession> {
        self.history.iter()
    }

    pub fn last(&self) -> Option<&SyncSession> {
        self.history.back()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn restore(&mut self, sessions: Vec<SyncSession>) {
        for session in sessions {
            self.record(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_failure_still_completes() {
        let mut session = SyncSession::open(vec!["b".into(), "c".into()], 100);
        session.record_success("b", 4, 1);
        session.record_failure("c");

        assert_eq!(session.finish(160), SessionStatus::Completed);
        let summary = SyncSummary::from(&session);
        assert_eq!(summary.replicas_synced, 1);
        assert_eq!(summary.failed_replicas, vec!["c".to_string()]);
        assert_eq!(summary.operations_synced, 4);
        assert_eq!(summary.duration_ms, 60);
    }

    #[test]
    fn test_every_target_failing_still_completes() {
        let mut session = SyncSession::open(vec!["b".into(), "c".into()], 0);
        session.record_failure("b");
        session.record_failure("c");
        assert_eq!(session.finish(1), SessionStatus::Completed);
        assert_eq!(SyncSummary::from(&session).failed_replicas.len(), 2);
    }

    #[test]
    fn test_aborted_session_fails() {
        let mut session = SyncSession::open(Vec::new(), 10);
        assert_eq!(session.abort(15), SessionStatus::Failed);
        assert_eq!(session.duration_ms(), 5);
        assert!(session.synced_replicas.is_empty());
    }

    #[test]
    fn test_empty_round_completes() {
        let mut session = SyncSession::open(Vec::new(), 0);
        assert_eq!(session.finish(0), SessionStatus::Completed);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut manager = SessionManager::new(2);
        for i in 0..3 {
            manager.record(SyncSession::open(Vec::new(), i));
        }
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.last().unwrap().started_at, 2);
    }
}
