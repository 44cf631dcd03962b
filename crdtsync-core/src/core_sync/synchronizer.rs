/*
    synchronizer.rs - Replica-local CRDT synchronizer

    Owns every CRDT instance of one replica and is the only place they are
    mutated. Composes the type library, conflict detection and resolution,
    the replica registry, sync sessions and the propagation buffer.

    Clocks:
    - the replica clock counts local events (create, apply) in its own
      component and absorbs every merged object clock
    - each CRDT carries an object clock; a CRDT's data always contains the
      effect of every operation its object clock covers

    Merge (per CRDT):
    1. replay remote operations missing locally, in canonical order, with
       conflict detection
    2. join the remote data state-based (repairs gaps left by compaction)
    3. join clocks, union and sort histories, bump version
*/

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::core_sync::conflict::{ConflictDetector, ConflictResolution, ConflictResolver, ConflictSet, ResolutionStrategy};
use crate::core_sync::crdt::{ApplyOutcome, CrdtData, CrdtKind, VectorClock, WriteStamp};
use crate::core_sync::events::{EventSink, SyncEvent, TracingEventSink};
use crate::core_sync::model::{sort_history, CrdtId, CrdtOperation, CrdtState, OperationId, ReplicaId};
use crate::core_sync::store::errors::{CrdtError, SyncError, SyncResult};
use crate::core_sync::store::kv::KeyValueStore;
use crate::core_sync::store::propagation::{PropagationBuffer, PropagationEntry};
use crate::core_sync::store::snapshot::{self, RegistrySnapshot, ReplicaSnapshot, SnapshotMetadata, SNAPSHOT_FORMAT};
use crate::core_sync::sync::{
    ConsistencyLevel, Digest, ExchangeReport, ReplicaInfo, ReplicaRegistry, ReplicaStatus, ReplicaTransport,
    SessionManager, SessionStatus, SyncRequest, SyncResponse, SyncSession, SyncSummary,
};
use crate::metrics::{self, Timer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Result of `create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResult {
    pub id: CrdtId,
    pub kind: CrdtKind,
    pub version: u64,
    pub data: Value,
    pub vector_clock: VectorClock,
}

/// Result of `apply`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub operation_id: OperationId,
    pub result: ApplyOutcome,
    /// Clock snapshot of the new operation
    pub vector_clock: VectorClock,
    pub version: u64,
}

/// Result of `merge`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub operations_applied: usize,
    pub new_version: u64,
    pub vector_clock: VectorClock,
    pub conflicts_resolved: usize,
    /// The CRDT was unknown locally and adopted verbatim
    pub adopted: bool,
}

/// Result of `resolve_conflicts`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolveResult {
    pub conflicts_resolved: usize,
    pub resolutions: Vec<String>,
    #[serde(default)]
    pub records: Vec<ConflictResolution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub replica_id: ReplicaId,
    pub crdt_count: usize,
    pub operation_count: usize,
    pub pending_propagation: usize,
    pub dropped_propagation: u64,
    pub replica_count: usize,
    pub online_replicas: usize,
    pub session_count: usize,
    pub resolution_count: usize,
    pub consistency: ConsistencyLevel,
    pub clock: VectorClock,
}

pub struct CrdtSynchronizer {
    replica_id: ReplicaId,
    config: SyncConfig,
    clock: VectorClock,
    crdts: BTreeMap<CrdtId, CrdtState>,
    propagation: PropagationBuffer,
    registry: ReplicaRegistry,
    sessions: SessionManager,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    time: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    snapshot_ttl: Option<Duration>,
}

impl CrdtSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        CrdtSynchronizer {
            replica_id: config.replica_id.clone(),
            clock: VectorClock::new(),
            crdts: BTreeMap::new(),
            propagation: PropagationBuffer::new(config.max_pending_operations),
            registry: ReplicaRegistry::new(),
            sessions: SessionManager::new(config.max_session_history),
            detector: ConflictDetector::new(),
            resolver: ConflictResolver::new(config.replica_priorities.clone(), config.max_resolution_history),
            time: Arc::new(SystemClock),
            events: Arc::new(TracingEventSink),
            snapshot_ttl: None,
            config,
        }
    }

    pub fn with_clock(mut self, time: Arc<dyn Clock>) -> Self {
        self.time = time;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// TTL applied to persisted snapshots
    pub fn with_snapshot_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    /// Create a synchronizer and restore its snapshot, if any
    pub async fn load(config: SyncConfig, store: &dyn KeyValueStore) -> SyncResult<Self> {
        let mut synchronizer = CrdtSynchronizer::new(config);
        synchronizer.restore(store).await?;
        Ok(synchronizer)
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Add or replace a conflict resolution strategy
    pub fn register_strategy(&mut self, strategy: Box<dyn ResolutionStrategy>) {
        self.resolver.register(strategy);
    }

    /// Make a peer known so sync rounds target it
    pub fn register_replica(&mut self, replica_id: &str) {
        if replica_id != self.replica_id {
            self.registry.register(replica_id);
        }
    }

    // =========================================================================
    // Local mutation
    // =========================================================================

    /// Create a new CRDT instance owned by this replica
    pub fn create(&mut self, kind: CrdtKind, crdt_id: &str, seed: Option<&Value>) -> SyncResult<CreateResult> {
        if self.crdts.contains_key(crdt_id) {
            return Err(SyncError::AlreadyExists(crdt_id.to_string()));
        }

        let now = self.time.now_millis();
        let origin = WriteStamp::new(now, self.replica_id.clone(), OperationId::generate());
        let data = CrdtData::initialize(kind, seed, &origin)?;

        let counter = self.clock.increment(&self.replica_id);
        let mut object_clock = VectorClock::new();
        object_clock.set(&self.replica_id, counter);

        let state = CrdtState {
            id: crdt_id.to_string(),
            kind,
            owner: self.replica_id.clone(),
            vector_clock: object_clock.clone(),
            data,
            operations: Vec::new(),
            version: 1,
            last_modified: now,
        };
        let result = CreateResult {
            id: state.id.clone(),
            kind,
            version: state.version,
            data: state.value(),
            vector_clock: object_clock,
        };
        self.crdts.insert(state.id.clone(), state);

        self.propagation.push(PropagationEntry {
            crdt_id: crdt_id.to_string(),
            operation_id: None,
            counter,
            queued_at: now,
        });

        info!(crdt_id = %crdt_id, kind = %kind, "CRDT created");
        self.events.emit(SyncEvent::Created {
            crdt_id: crdt_id.to_string(),
            kind,
            replica_id: self.replica_id.clone(),
            version: 1,
        });
        Ok(result)
    }

    /// Issue a local operation against an existing CRDT
    ///
    /// Rejected operations (unsupported opcode, malformed payload, removal of
    /// an absent element) leave the CRDT, the clock and the buffer untouched.
    pub fn apply(&mut self, crdt_id: &str, opcode: &str, payload: &Value) -> SyncResult<ApplyResult> {
        let state = self
            .crdts
            .get_mut(crdt_id)
            .ok_or_else(|| SyncError::NotFound(crdt_id.to_string()))?;

        let now = self.time.now_millis();
        let operation_id = OperationId::generate();
        let stamp = WriteStamp::new(now, self.replica_id.clone(), operation_id.clone());
        let prepared = state.data.prepare(opcode, payload, &stamp)?;
        let outcome = state.data.apply(&prepared)?;

        let counter = self.clock.increment(&self.replica_id);
        let mut op_clock = state.vector_clock.clone();
        op_clock.set(&self.replica_id, counter);

        let dependencies = state.heads().into_iter().map(|op| op.id.clone()).collect();
        let operation = CrdtOperation {
            id: operation_id.clone(),
            crdt_id: crdt_id.to_string(),
            replica_id: self.replica_id.clone(),
            timestamp: now,
            vector_clock: op_clock.clone(),
            dependencies,
            payload: prepared,
        };

        // The new clock dominates the whole history, so it sorts last
        state.operations.push(operation);
        state.vector_clock = op_clock.clone();
        state.version += 1;
        state.last_modified = now;
        let version = state.version;

        self.propagation.push(PropagationEntry {
            crdt_id: crdt_id.to_string(),
            operation_id: Some(operation_id.clone()),
            counter,
            queued_at: now,
        });
        metrics::record_counter(metrics::OPERATIONS_APPLIED, 1);

        debug!(
            crdt_id = %crdt_id,
            opcode = %opcode,
            operation_id = %operation_id,
            version,
            ignored = outcome.ignored,
            "Operation applied"
        );
        self.events.emit(SyncEvent::Updated {
            crdt_id: crdt_id.to_string(),
            operation_id: operation_id.clone(),
            opcode: opcode.to_string(),
            version,
        });

        Ok(ApplyResult {
            operation_id,
            result: outcome,
            vector_clock: op_clock,
            version,
        })
    }

    /// Merge a remote copy of a CRDT into the local one
    pub fn merge(&mut self, crdt_id: &str, remote: CrdtState) -> SyncResult<MergeResult> {
        if remote.id != crdt_id {
            return Err(SyncError::Crdt(CrdtError::InvalidPayload(format!(
                "state for '{}' merged into '{}'",
                remote.id, crdt_id
            ))));
        }

        let Some(local) = self.crdts.get(crdt_id) else {
            return Ok(self.adopt(remote));
        };
        if local.kind != remote.kind {
            return Err(SyncError::Crdt(CrdtError::KindMismatch {
                expected: local.kind.to_string(),
                actual: remote.kind.to_string(),
            }));
        }

        let mut missing: Vec<CrdtOperation> = local.missing_from(&remote).into_iter().cloned().collect();
        sort_history(&mut missing);

        // Work on a copy so a failing replay leaves the local state intact
        let mut working = local.clone();
        let mut conflict_sets = Vec::new();
        for op in &missing {
            let concurrent: Vec<CrdtOperation> = self
                .detector
                .detect(op, &working.operations)
                .into_iter()
                .cloned()
                .collect();
            working.data.apply(&op.payload)?;
            working.operations.push(op.clone());
            if !concurrent.is_empty() {
                let mut members = concurrent;
                members.push(op.clone());
                conflict_sets.push(ConflictSet::new(crdt_id.to_string(), members));
            }
        }

        working.data.merge(&remote.data)?;
        working.vector_clock.merge(&remote.vector_clock);

        let known: HashSet<OperationId> = working.operations.iter().map(|op| op.id.clone()).collect();
        working
            .operations
            .extend(remote.operations.into_iter().filter(|op| !known.contains(&op.id)));
        sort_history(&mut working.operations);

        let replayed = missing.len();
        let data_changed = working.data != local.data;
        let bump = if replayed > 0 {
            replayed as u64
        } else if data_changed {
            1
        } else {
            0
        };
        if bump > 0 {
            working.version += bump;
            working.last_modified = self.time.now_millis();
        }

        self.clock.merge(&working.vector_clock);
        let result_clock = working.vector_clock.clone();
        let new_version = working.version;
        self.crdts.insert(crdt_id.to_string(), working);

        if replayed > 0 {
            metrics::record_counter(metrics::OPERATIONS_REPLAYED, replayed as u64);
        }
        let strategy = self.config.default_strategy.clone();
        let conflicts_resolved = self.resolve_sets(conflict_sets, &strategy, true).len();

        debug!(
            crdt_id = %crdt_id,
            replayed,
            conflicts = conflicts_resolved,
            version = new_version,
            "Remote state merged"
        );
        self.events.emit(SyncEvent::Merged {
            crdt_id: crdt_id.to_string(),
            operations_applied: replayed,
            version: new_version,
            adopted: false,
        });

        Ok(MergeResult {
            operations_applied: replayed,
            new_version,
            vector_clock: result_clock,
            conflicts_resolved,
            adopted: false,
        })
    }

    fn adopt(&mut self, remote: CrdtState) -> MergeResult {
        let operations_applied = remote.operations.len();
        let result = MergeResult {
            operations_applied,
            new_version: remote.version,
            vector_clock: remote.vector_clock.clone(),
            conflicts_resolved: 0,
            adopted: true,
        };
        self.clock.merge(&remote.vector_clock);

        debug!(crdt_id = %remote.id, kind = %remote.kind, owner = %remote.owner, "Adopted remote CRDT");
        self.events.emit(SyncEvent::Merged {
            crdt_id: remote.id.clone(),
            operations_applied,
            version: remote.version,
            adopted: true,
        });
        self.crdts.insert(remote.id.clone(), remote);
        result
    }

    /// Resolve conflict sets and record them; an unknown strategy is a no-op
    fn resolve_sets(&mut self, sets: Vec<ConflictSet>, strategy: &str, automatic: bool) -> Vec<ConflictResolution> {
        if sets.is_empty() {
            return Vec::new();
        }

        let now = self.time.now_millis();
        let crdts = &self.crdts;
        let records = match self
            .resolver
            .resolve(sets, strategy, automatic, now, |id| crdts.get(id).map(CrdtState::value))
        {
            Ok(records) => records,
            Err(e) => {
                warn!(strategy = %strategy, error = %e, "Conflicts left unresolved");
                return Vec::new();
            }
        };

        metrics::record_counter(metrics::CONFLICTS_RESOLVED, records.len() as u64);
        let mut crdt_ids: Vec<CrdtId> = records.iter().map(|r| r.crdt_id.clone()).collect();
        crdt_ids.dedup();
        self.events.emit(SyncEvent::ConflictsResolved {
            crdt_ids,
            count: records.len(),
            strategy: strategy.to_string(),
            automatic,
        });
        records
    }

    /// Group operations into conflict sets and resolve them with `strategy`
    pub fn resolve_conflicts(&mut self, operations: &[CrdtOperation], strategy: &str) -> SyncResult<ResolveResult> {
        if !self.resolver.has_strategy(strategy) {
            warn!(strategy = %strategy, "Unknown conflict resolution strategy, nothing resolved");
            return Ok(ResolveResult::default());
        }

        let sets = self.detector.group(operations);
        let records = self.resolve_sets(sets, strategy, false);
        info!(strategy = %strategy, resolved = records.len(), "Conflicts resolved");

        Ok(ResolveResult {
            conflicts_resolved: records.len(),
            resolutions: records.iter().map(ConflictResolution::summary).collect(),
            records,
        })
    }

    /// Trim every history above the compaction threshold; returns the number trimmed
    pub fn compact_operations(&mut self) -> usize {
        let threshold = self.config.compaction_threshold;
        let retain = self.config.compaction_retain;

        let mut trimmed = 0;
        for state in self.crdts.values_mut() {
            let dropped = state.compact(threshold, retain);
            if dropped > 0 {
                debug!(crdt_id = %state.id, dropped, "History compacted");
                trimmed += dropped;
            }
        }

        if trimmed > 0 {
            metrics::record_counter(metrics::OPERATIONS_COMPACTED, trimmed as u64);
            self.events.emit(SyncEvent::Compacted {
                operations_compacted: trimmed,
            });
        }
        trimmed
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Run one sync round against `targets`, or every known replica
    ///
    /// Per-replica failures are recorded in the summary and never abort the round.
    /// The session fails only when discovery fails and no targets were given.
    pub async fn sync_replicas(
        &mut self,
        transport: &dyn ReplicaTransport,
        targets: Option<Vec<ReplicaId>>,
    ) -> SyncResult<SyncSummary> {
        let now = self.time.now_millis();
        let staleness = self.config.staleness_timeout.as_millis() as u64;
        for replica in self.registry.refresh_liveness(now, staleness) {
            debug!(replica = %replica, "Replica went offline");
        }

        let discovery_failed = match transport.discover().await {
            Ok(peers) => {
                for peer in peers {
                    self.register_replica(&peer);
                }
                false
            }
            Err(e) => {
                warn!(error = %e, "Replica discovery failed");
                true
            }
        };

        // Without explicit targets the round depends on discovery
        let abort = targets.is_none() && discovery_failed;
        let mut targets = targets.unwrap_or_else(|| self.registry.ids());
        targets.retain(|t| t != &self.replica_id);
        targets.sort();
        targets.dedup();

        let mut session = SyncSession::open(targets, now);
        if abort {
            error!(session = %session.id, "Sync round aborted before any exchange");
            session.abort(self.time.now_millis());
        } else {
            let span = info_span!("sync_round", session = %session.id);
            self.run_round(transport, &mut session).instrument(span).await;
        }

        let status = self.registry.partition_status(self.config.partition_threshold);
        if status.partitioned {
            warn!(
                known = status.known,
                reachable = status.reachable,
                "Network partition detected"
            );
        }

        let summary = SyncSummary::from(&session);
        match session.status {
            SessionStatus::Failed => metrics::record_counter(metrics::SESSIONS_FAILED, 1),
            _ => metrics::record_counter(metrics::SESSIONS_COMPLETED, 1),
        }
        metrics::record_counter(metrics::OPERATIONS_EXCHANGED, summary.operations_synced as u64);
        self.sessions.record(session);

        info!(
            session = %summary.session_id,
            synced = summary.replicas_synced,
            failed = summary.failed_replicas.len(),
            operations = summary.operations_synced,
            conflicts = summary.conflicts_resolved,
            "Sync round finished"
        );
        self.events.emit(SyncEvent::SyncCompleted {
            session_id: summary.session_id.clone(),
            replicas_synced: summary.replicas_synced,
            failed_replicas: summary.failed_replicas.clone(),
            operations_synced: summary.operations_synced,
            conflicts_resolved: summary.conflicts_resolved,
            duration_ms: summary.duration_ms,
        });
        Ok(summary)
    }

    async fn run_round(&mut self, transport: &dyn ReplicaTransport, session: &mut SyncSession) {
        let _timer = Timer::new(metrics::ROUND_DURATION_MS);
        let staleness = self.config.staleness_timeout.as_millis() as u64;

        for target in session.targets.clone() {
            let request = self.build_request(session, &target);
            let exchanged = match tokio::time::timeout(self.config.exchange_timeout, transport.exchange(&target, request)).await
            {
                Ok(Ok(response)) => self.absorb_response(&target, response),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(SyncError::unavailable(&target, "exchange timed out")),
            };

            match exchanged {
                Ok((operations, conflicts)) => {
                    debug!(replica = %target, operations, conflicts, "Replica synced");
                    session.record_success(&target, operations, conflicts);
                }
                Err(e) => {
                    warn!(replica = %target, error = %e, "Sync with replica failed");
                    self.registry.record_failure(&target, self.time.now_millis(), staleness);
                    session.record_failure(&target);
                    metrics::record_counter(metrics::REPLICAS_FAILED, 1);
                }
            }
        }

        let pruned = self.propagation.prune_acknowledged(&self.replica_id, self.registry.digests());
        if pruned > 0 {
            debug!(pruned, pending = self.propagation.len(), "Propagation buffer pruned");
        }
        session.finish(self.time.now_millis());
    }

    fn build_request(&self, session: &SyncSession, target: &str) -> SyncRequest {
        let peer_digest = self.registry.get(target).map(|info| &info.digest);
        let states = self
            .crdts
            .values()
            .filter_map(|state| state.delta_for(peer_digest.and_then(|d| d.get(&state.id))))
            .collect();

        SyncRequest {
            session_id: session.id.clone(),
            origin: self.replica_id.clone(),
            clock: self.clock.clone(),
            digest: self.digest(),
            states,
        }
    }

    /// Merge a response; returns (operations, conflicts) counted on both sides
    fn absorb_response(&mut self, target: &str, response: SyncResponse) -> SyncResult<(usize, usize)> {
        let mut operations = response.operations_applied;
        let mut conflicts = response.conflicts_resolved;
        for state in response.states {
            let crdt_id = state.id.clone();
            let merged = self.merge(&crdt_id, state)?;
            operations += merged.operations_applied;
            conflicts += merged.conflicts_resolved;
        }

        let status = if conflicts > 0 {
            ReplicaStatus::Conflict
        } else if self.digest() == response.digest {
            ReplicaStatus::Synced
        } else {
            ReplicaStatus::Diverged
        };
        self.registry.record_exchange(
            target,
            ExchangeReport {
                clock: response.clock,
                digest: response.digest,
                operation_count: response.operation_count,
                status,
            },
            self.time.now_millis(),
        );
        Ok((operations, conflicts))
    }

    /// Responder side of an exchange: merge the pushed states, answer with
    /// what the origin lacks
    pub fn handle_sync_request(&mut self, request: SyncRequest) -> SyncResult<SyncResponse> {
        let mut operations_applied = 0;
        let mut conflicts_resolved = 0;
        for state in request.states {
            let crdt_id = state.id.clone();
            let merged = self.merge(&crdt_id, state)?;
            operations_applied += merged.operations_applied;
            conflicts_resolved += merged.conflicts_resolved;
        }

        if request.origin != self.replica_id {
            self.registry
                .record_contact(&request.origin, &request.clock, &request.digest, self.time.now_millis());
        }

        let states: Vec<CrdtState> = self
            .crdts
            .values()
            .filter_map(|state| state.delta_for(request.digest.get(&state.id)))
            .collect();

        debug!(
            origin = %request.origin,
            session = %request.session_id,
            applied = operations_applied,
            returned = states.len(),
            "Handled sync request"
        );

        Ok(SyncResponse {
            responder: self.replica_id.clone(),
            clock: self.clock.clone(),
            digest: self.digest(),
            states,
            operations_applied,
            conflicts_resolved,
            operation_count: self.operation_count(),
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&self, crdt_id: &str) -> Option<&CrdtState> {
        self.crdts.get(crdt_id)
    }

    pub fn value(&self, crdt_id: &str) -> Option<Value> {
        self.crdts.get(crdt_id).map(CrdtState::value)
    }

    pub fn crdt_ids(&self) -> Vec<CrdtId> {
        self.crdts.keys().cloned().collect()
    }

    pub fn replicas(&self) -> impl Iterator<Item = &ReplicaInfo> {
        self.registry.iter()
    }

    pub fn registry(&self) -> &ReplicaRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SyncSession> {
        self.sessions.sessions()
    }

    pub fn resolutions(&self) -> impl Iterator<Item = &ConflictResolution> {
        self.resolver.history()
    }

    pub fn propagation(&self) -> &PropagationBuffer {
        &self.propagation
    }

    /// Object clock of every local CRDT
    pub fn digest(&self) -> Digest {
        self.crdts
            .iter()
            .map(|(id, state)| (id.clone(), state.vector_clock.clone()))
            .collect()
    }

    fn operation_count(&self) -> usize {
        self.crdts.values().map(|s| s.operations.len()).sum()
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            replica_id: self.replica_id.clone(),
            crdt_count: self.crdts.len(),
            operation_count: self.operation_count(),
            pending_propagation: self.propagation.len(),
            dropped_propagation: self.propagation.dropped(),
            replica_count: self.registry.len(),
            online_replicas: self.registry.iter().filter(|r| r.online).count(),
            session_count: self.sessions.len(),
            resolution_count: self.resolver.history_len(),
            consistency: self.registry.consistency_level(self.config.partition_threshold),
            clock: self.clock.clone(),
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Restore the stored snapshots; returns whether a replica snapshot existed
    pub async fn restore(&mut self, store: &dyn KeyValueStore) -> SyncResult<bool> {
        let found = match snapshot::load_replica(store, &self.replica_id).await? {
            Some(snap) => {
                self.clock = snap.clock;
                self.crdts = snap.crdts;
                self.propagation = snap.propagation;
                self.propagation.set_capacity(self.config.max_pending_operations);
                self.resolver.restore(snap.resolutions);
                debug!(replica = %self.replica_id, crdts = self.crdts.len(), "Replica snapshot restored");
                true
            }
            None => {
                info!(replica = %self.replica_id, "No snapshot found, starting empty");
                false
            }
        };

        if let Some(snap) = snapshot::load_registry(store, &self.replica_id).await? {
            self.registry = ReplicaRegistry::from_replicas(snap.replicas);
            self.sessions.restore(snap.sessions);
        }
        Ok(found)
    }

    /// Write both snapshots
    pub async fn persist(&self, store: &dyn KeyValueStore) -> SyncResult<()> {
        let now = self.time.now_millis();
        let replica = ReplicaSnapshot {
            metadata: SnapshotMetadata {
                format: SNAPSHOT_FORMAT,
                saved_at: now,
                crdt_count: self.crdts.len(),
            },
            replica_id: self.replica_id.clone(),
            clock: self.clock.clone(),
            crdts: self.crdts.clone(),
            propagation: self.propagation.clone(),
            resolutions: self.resolver.history().cloned().collect(),
        };
        let registry = RegistrySnapshot {
            replica_id: self.replica_id.clone(),
            saved_at: now,
            replicas: self.registry.replicas().clone(),
            sessions: self.sessions.sessions().cloned().collect(),
        };

        snapshot::save_replica(store, &replica, self.snapshot_ttl).await?;
        snapshot::save_registry(store, &registry, self.snapshot_ttl).await?;
        Ok(())
    }
}
