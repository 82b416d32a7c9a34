#[derive(Debug, Clone)]
pub enum Message {
    // === INITDB MESSAGES ===
    AskInitializeDb,
    DbInitialized,
    DbAlreadySetUp,

    // === UPGRADE MESSAGES ===
    UpgradeUpToDate,
    UpgradePending(usize),
    RunningPhase(String),
    ResumingUnfinishedPhase(String),
    RevisionApplied(i32),
    UpgradeComplete(usize),

    // === DOWNGRADE MESSAGES ===
    DowngradePlan { from: i32, to: i32 },
    ConfirmDowngrade(i32),
    PinnedConnections { count: usize, revision: i32 },
    RevertingPhase(String),
    NothingToDowngrade,
    DowngradeComplete(i32),

    // === REVISION MESSAGES ===
    DumpingSchema(String),
    SchemaDumped(String),
    DiffEmpty,
    RevisionWritten { number: i32, path: String },
    IncantationWritten(String),

    // === SHIM SCHEMA MESSAGES ===
    ShimSchemaCreated(String),
    ShimSchemaDropped(String),
    ShimSchemaInUse(String),

    // === GENERIC MESSAGES ===
    OperationCancelled,
}
