/*
    CRDT type library

    Eight replicated data types behind one trait, plus the vector clock and
    write stamp they are ordered by.
*/

pub mod data;
pub mod g_counter;
pub mod g_map;
pub mod g_set;
pub mod lww_map;
pub mod or_map;
pub mod pn_counter;
pub mod pn_set;
pub mod sequence;
pub mod stamp;
pub mod traits;
pub mod vector_clock;

pub use data::{CrdtData, CrdtKind, CrdtOp};
pub use g_counter::GCounter;
pub use g_map::GMap;
pub use g_set::GSet;
pub use lww_map::LwwMap;
pub use or_map::OrMap;
pub use pn_counter::PnCounter;
pub use pn_set::PnSet;
pub use sequence::{ElementId, Sequence};
pub use stamp::WriteStamp;
pub use traits::{ApplyOutcome, Crdt};
pub use vector_clock::{CausalOrdering, VectorClock};
