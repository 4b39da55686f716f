use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] bovespa_core::ValidationError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Fetch(#[from] bovespa_core::FetchError),

    #[error(transparent)]
    Notification(#[from] bovespa_core::NotificationError),

    #[error(transparent)]
    Warehouse(#[from] bovespa_warehouse::WarehouseError),

    #[error("strict mode failed: warnings={warning_count}, errors={error_count}")]
    StrictModeViolation {
        warning_count: usize,
        error_count: usize,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::Command(_) => 2,
            Self::Notification(_) => 2,
            Self::Serialization(_) => 4,
            Self::StrictModeViolation { .. } => 5,
            Self::Fetch(_) => 6,
            Self::Warehouse(_) => 7,
            Self::Io(_) => 10,
        }
    }
}
