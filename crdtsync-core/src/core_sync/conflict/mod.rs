/*
    conflict - Conflict detection and resolution
*/

pub mod detector;
pub mod record;
pub mod resolver;

pub use detector::ConflictDetector;
pub use record::{ConflictKind, ConflictResolution, ConflictSet};
pub use resolver::{
    AutomaticMerge, ConflictResolver, LastWriterWins, ReplicaPriority, ResolutionStrategy, StrategyOutcome,
    AUTOMATIC_STRATEGY, LAST_WRITER_WINS_STRATEGY, REPLICA_PRIORITY_STRATEGY,
};
