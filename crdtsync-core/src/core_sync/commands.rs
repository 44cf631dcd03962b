//! Command surface
//!
//! The six externally triggered commands, as serde enums so hosts can feed
//! them in as JSON. `execute` dispatches a command and persists the replica
//! afterwards when a store is given.

use crate::core_sync::conflict::AUTOMATIC_STRATEGY;
use crate::core_sync::crdt::CrdtKind;
use crate::core_sync::model::{CrdtId, CrdtOperation, CrdtState, ReplicaId};
use crate::core_sync::store::errors::SyncResult;
use crate::core_sync::store::kv::KeyValueStore;
use crate::core_sync::sync::{ReplicaTransport, SyncSummary};
use crate::core_sync::synchronizer::{ApplyResult, CreateResult, CrdtSynchronizer, MergeResult, ResolveResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

fn default_strategy() -> String {
    AUTOMATIC_STRATEGY.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum SyncCommand {
    CreateCrdt {
        crdt_type: CrdtKind,
        crdt_id: CrdtId,
        #[serde(default)]
        seed: Option<Value>,
    },

    ApplyOperation {
        crdt_id: CrdtId,
        opcode: String,
        #[serde(default)]
        payload: Value,
    },

    /// Defaults to every known replica
    SyncReplicas {
        #[serde(default)]
        targets: Option<Vec<ReplicaId>>,
    },

    MergeStates {
        crdt_id: CrdtId,
        remote_state: CrdtState,
    },

    ResolveConflicts {
        operations: Vec<CrdtOperation>,
        #[serde(default = "default_strategy")]
        strategy: String,
    },

    CompactOperations,
}

impl SyncCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SyncCommand::CreateCrdt { .. } => "create-crdt",
            SyncCommand::ApplyOperation { .. } => "apply-operation",
            SyncCommand::SyncReplicas { .. } => "sync-replicas",
            SyncCommand::MergeStates { .. } => "merge-states",
            SyncCommand::ResolveConflicts { .. } => "resolve-conflicts",
            SyncCommand::CompactOperations => "compact-operations",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "kebab-case")]
pub enum CommandResponse {
    Created(CreateResult),
    Applied(ApplyResult),
    Synced(SyncSummary),
    Merged(MergeResult),
    Resolved(ResolveResult),
    Compacted { operations_compacted: usize },
}

impl CrdtSynchronizer {
    /// Run one command; with a store, the replica is persisted afterwards.
    /// A failed write is logged and does not fail the command.
    pub async fn execute(
        &mut self,
        command: SyncCommand,
        transport: &dyn ReplicaTransport,
        store: Option<&dyn KeyValueStore>,
    ) -> SyncResult<CommandResponse> {
        let name = command.name();
        let response = match command {
            SyncCommand::CreateCrdt {
                crdt_type,
                crdt_id,
                seed,
            } => CommandResponse::Created(self.create(crdt_type, &crdt_id, seed.as_ref())?),
            SyncCommand::ApplyOperation {
                crdt_id,
                opcode,
                payload,
            } => CommandResponse::Applied(self.apply(&crdt_id, &opcode, &payload)?),
            SyncCommand::SyncReplicas { targets } => {
                CommandResponse::Synced(self.sync_replicas(transport, targets).await?)
            }
            SyncCommand::MergeStates {
                crdt_id,
                remote_state,
            } => CommandResponse::Merged(self.merge(&crdt_id, remote_state)?),
            SyncCommand::ResolveConflicts { operations, strategy } => {
                CommandResponse::Resolved(self.resolve_conflicts(&operations, &strategy)?)
            }
            SyncCommand::CompactOperations => CommandResponse::Compacted {
                operations_compacted: self.compact_operations(),
            },
        };

        if let Some(store) = store {
            if let Err(e) = self.persist(store).await {
                error!(command = %name, error = %e, "Failed to persist replica");
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::core_sync::store::errors::SyncError;
    use crate::core_sync::store::kv::MemoryStore;
    use crate::core_sync::sync::InMemoryNetwork;
    use serde_json::json;

    #[test]
    fn test_command_json_shape() {
        let command: SyncCommand = serde_json::from_value(json!({
            "command": "create-crdt",
            "crdt_type": "pn-counter",
            "crdt_id": "votes",
            "seed": 4
        }))
        .unwrap();
        assert_eq!(
            command,
            SyncCommand::CreateCrdt {
                crdt_type: CrdtKind::PnCounter,
                crdt_id: "votes".to_string(),
                seed: Some(json!(4)),
            }
        );

        let compact: SyncCommand = serde_json::from_value(json!({"command": "compact-operations"})).unwrap();
        assert_eq!(compact.name(), "compact-operations");

        let resolve: SyncCommand =
            serde_json::from_value(json!({"command": "resolve-conflicts", "operations": []})).unwrap();
        assert!(matches!(resolve, SyncCommand::ResolveConflicts { strategy, .. } if strategy == "automatic"));
    }

    #[tokio::test]
    async fn test_execute_persists_after_mutation() {
        let store = MemoryStore::new();
        let network = InMemoryNetwork::new();
        let mut a = CrdtSynchronizer::new(SyncConfig::for_replica("A"));

        a.execute(
            SyncCommand::CreateCrdt {
                crdt_type: CrdtKind::GCounter,
                crdt_id: "hits".to_string(),
                seed: None,
            },
            &network,
            Some(&store),
        )
        .await
        .unwrap();

        let response = a
            .execute(
                SyncCommand::ApplyOperation {
                    crdt_id: "hits".to_string(),
                    opcode: "increment".to_string(),
                    payload: json!({"amount": 5}),
                },
                &network,
                Some(&store),
            )
            .await
            .unwrap();
        assert!(matches!(response, CommandResponse::Applied(ApplyResult { version: 2, .. })));

        let restored = CrdtSynchronizer::load(SyncConfig::for_replica("A"), &store).await.unwrap();
        assert_eq!(restored.value("hits"), Some(json!(5)));
    }

    #[tokio::test]
    async fn test_execute_surfaces_caller_errors() {
        let network = InMemoryNetwork::new();
        let mut a = CrdtSynchronizer::new(SyncConfig::for_replica("A"));

        let err = a
            .execute(
                SyncCommand::ApplyOperation {
                    crdt_id: "missing".to_string(),
                    opcode: "add".to_string(),
                    payload: json!({"element": "x"}),
                },
                &network,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
        assert!(err.is_caller_error());
    }

    #[tokio::test]
    async fn test_sync_command_without_replicas() {
        let network = InMemoryNetwork::new();
        let mut a = CrdtSynchronizer::new(SyncConfig::for_replica("A"));

        let response = a
            .execute(SyncCommand::SyncReplicas { targets: None }, &network, None)
            .await
            .unwrap();
        match response {
            CommandResponse::Synced(summary) => {
                assert_eq!(summary.replicas_synced, 0);
                assert!(summary.failed_replicas.is_empty());
            }
            other => panic!("unexpected response {:?}", other),
        }
    }
}
