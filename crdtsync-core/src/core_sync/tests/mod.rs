/*
    Scenario tests for core_sync

    Test suite covering:
    - Convergence of every CRDT type under reordering
    - Vector clock edge cases
    - Synchronizer scenarios (merge, conflicts, compaction, buffering)
    - Sync rounds over the in-process network
*/
