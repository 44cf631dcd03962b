/*
    sync - Replica coordination

    Peer registry, sync sessions, protocol messages, transports and the
    periodic driver.
*/

pub mod driver;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

pub use driver::{DriverReport, IntervalTicker, ManualTicker, SyncDriver, TickHandle, Ticker};
pub use protocol::{Digest, SyncRequest, SyncResponse};
pub use registry::{
    ConsistencyLevel, ExchangeReport, PartitionStatus, ReplicaInfo, ReplicaRegistry, ReplicaStatus,
};
pub use session::{SessionManager, SessionStatus, SyncSession, SyncSummary};
pub use transport::{InMemoryNetwork, ReplicaTransport, SharedSynchronizer, StoreBackedTransport};
