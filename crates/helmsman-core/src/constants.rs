//! Application constants

/// Planning loop limits
pub mod agent {
    /// Maximum planner calls per unconfirmed turn.
    pub const MAX_ITERATIONS: usize = 10;

    /// Trigger shown next to a confirmation prompt to apply the pending calls.
    pub const CONFIRM_TRIGGER: &str = "confirm";

    /// Trigger shown next to a confirmation prompt to discard the pending calls.
    pub const CANCEL_TRIGGER: &str = "cancel";
}

/// Cluster policy defaults
pub mod cluster {
    pub const DEFAULT_NAMESPACE: &str = "default";
    pub const DEFAULT_IMAGE: &str = "nginx:latest";
    pub const DEFAULT_MAX_REPLICAS: u32 = 10;
    pub const DEFAULT_SERVICE_PORT: u16 = 80;

    /// Upper bound on projected list items fed back into planning.
    pub const MAX_LIST_ITEMS: usize = 200;
}

/// Oracle defaults
pub mod ai {
    pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub const DEFAULT_TEMPERATURE: f64 = 0.0;
    pub const MAX_OUTPUT_TOKENS: usize = 4096;
}

/// Filesystem names
pub mod ui {
    pub const CONFIG_DIR_NAME: &str = ".helmsman";
    pub const CONFIG_FILE_NAME: &str = "config.toml";
    pub const LOG_FILE_NAME: &str = "helmsman.log";
}
