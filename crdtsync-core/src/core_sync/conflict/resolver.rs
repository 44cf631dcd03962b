/*
    resolver.rs - Pluggable conflict resolution strategies

    Strategies:
    - automatic (default): defer to the CRDT's own merge and record the
      merged value
    - last-writer-wins: the operation with the greatest WriteStamp wins
    - replica-priority: the operation from the highest-ranked replica wins,
      WriteStamp breaks ties

    CRDT data is already convergent, so strategies only decide what goes into
    the audit record; none of them mutates CRDT state.
*/

use super::record::{ConflictResolution, ConflictSet};
use crate::core_sync::model::{CrdtOperation, Millis, OperationId, ReplicaId, ResolutionId};
use crate::core_sync::store::errors::{SyncError, SyncResult};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

pub const AUTOMATIC_STRATEGY: &str = "automatic";
pub const LAST_WRITER_WINS_STRATEGY: &str = "last-writer-wins";
pub const REPLICA_PRIORITY_STRATEGY: &str = "replica-priority";

/// Strategy output for one conflict set
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub winner: Option<OperationId>,
    pub payload: Value,
}

pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `merged_value` is the CRDT's current value when the CRDT is known locally
    fn resolve(&self, conflict: &ConflictSet, merged_value: Option<&Value>) -> StrategyOutcome;
}

fn winner_payload(winner: &CrdtOperation) -> Value {
    json!({
        "winner": winner.id,
        "replica_id": winner.replica_id,
        "timestamp": winner.timestamp,
        "opcode": winner.opcode(),
    })
}

#[derive(Debug, Default)]
pub struct AutomaticMerge;

impl ResolutionStrategy for AutomaticMerge {
    fn name(&self) -> &'static str {
        AUTOMATIC_STRATEGY
    }

    fn resolve(&self, _conflict: &ConflictSet, merged_value: Option<&Value>) -> StrategyOutcome {
        StrategyOutcome {
            winner: None,
            payload: json!({ "merged_value": merged_value.cloned().unwrap_or(Value::Null) }),
        }
    }
}

#[derive(Debug, Default)]
pub struct LastWriterWins;

impl ResolutionStrategy for LastWriterWins {
    fn name(&self) -> &'static str {
        LAST_WRITER_WINS_STRATEGY
    }

    fn resolve(&self, conflict: &ConflictSet, _merged_value: Option<&Value>) -> StrategyOutcome {
        match conflict.operations.iter().max_by_key(|op| op.stamp()) {
            Some(winner) => StrategyOutcome {
                winner: Some(winner.id.clone()),
                payload: winner_payload(winner),
            },
            None => StrategyOutcome {
                winner: None,
                payload: Value::Null,
            },
        }
    }
}

/// Ranks replicas by position in a priority list, highest first.
/// Replicas not on the list rank below every listed one.
#[derive(Debug, Default)]
pub struct ReplicaPriority {
    priorities: Vec<ReplicaId>,
}

impl ReplicaPriority {
    pub fn new(priorities: Vec<ReplicaId>) -> Self {
        ReplicaPriority { priorities }
    }

    fn rank(&self, replica_id: &str) -> usize {
        let listed = self.priorities.len();
        self.priorities
            .iter()
            .position(|r| r == replica_id)
            .map(|pos| listed - pos)
            .unwrap_or(0)
    }
}

impl ResolutionStrategy for ReplicaPriority {
    fn name(&self) -> &'static str {
        REPLICA_PRIORITY_STRATEGY
    }

    fn resolve(&self, conflict: &ConflictSet, _merged_value: Option<&Value>) -> StrategyOutcome {
        match conflict
            .operations
            .iter()
            .max_by_key(|op| (self.rank(&op.replica_id), op.stamp()))
        {
            Some(winner) => StrategyOutcome {
                winner: Some(winner.id.clone()),
                payload: winner_payload(winner),
            },
            None => StrategyOutcome {
                winner: None,
                payload: Value::Null,
            },
        }
    }
}

/// Strategy registry plus the bounded audit trail
pub struct ConflictResolver {
    strategies: BTreeMap<&'static str, Box<dyn ResolutionStrategy>>,
    trail: VecDeque<ConflictResolution>,
    max_history: usize,
}

impl ConflictResolver {
    pub fn new(priorities: Vec<ReplicaId>, max_history: usize) -> Self {
        let mut resolver = ConflictResolver {
            strategies: BTreeMap::new(),
            trail: VecDeque::new(),
            max_history: max_history.max(1),
        };
        resolver.register(Box::new(AutomaticMerge));
        resolver.register(Box::new(LastWriterWins));
        resolver.register(Box::new(ReplicaPriority::new(priorities)));
        resolver
    }

    /// Add or replace a strategy under its name
    pub fn register(&mut self, strategy: Box<dyn ResolutionStrategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    pub fn has_strategy(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.keys().copied().collect()
    }

    /// Resolve every set with the named strategy and append the records
    pub fn resolve<F>(
        &mut self,
        conflicts: Vec<ConflictSet>,
        strategy: &str,
        automatic: bool,
        now: Millis,
        merged_value: F,
    ) -> SyncResult<Vec<ConflictResolution>>
    where
        F: Fn(&str) -> Option<Value>,
    {
        let strategy_impl = self
            .strategies
            .get(strategy)
            .ok_or_else(|| SyncError::UnknownStrategy(strategy.to_string()))?;

        let records: Vec<ConflictResolution> = conflicts
            .into_iter()
            .map(|conflict| {
                let value = merged_value(&conflict.crdt_id);
                let outcome = strategy_impl.resolve(&conflict, value.as_ref());
                ConflictResolution {
                    id: ResolutionId::generate(),
                    kind: conflict.kind,
                    crdt_id: conflict.crdt_id,
                    operations: conflict.operations,
                    resolution: outcome.payload,
                    winner: outcome.winner,
                    strategy: strategy_impl.name().to_string(),
                    automatic,
                    timestamp: now,
                }
            })
            .collect();

        for record in &records {
            debug!(crdt_id = %record.crdt_id, resolution = %record.summary(), "Conflict resolved");
            self.trail.push_back(record.clone());
        }
        while self.trail.len() > self.max_history {
            self.trail.pop_front();
        }
        Ok(records)
    }

    pub fn history(&self) -> impl Iterator<Item = &ConflictResolution> {
        self.trail.iter()
    }

    pub fn history_len(&self) -> usize {
        self.trail.len()
    }

    /// Restore a persisted trail
    pub fn restore(&mut self, records: Vec<ConflictResolution>) {
        self.trail = records.into_iter().collect();
        while self.trail.len() > self.max_history {
            self.trail.pop_front();
        }
    }
}
