use std::fmt;

/// Failure of a single call to the chain-data collaborator.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("RPC request timed out after {0} ms")]
    Timeout(u64),

    #[error("Invalid address or signature: {0}")]
    InvalidAddress(String),

    #[error("Failed to decode RPC response: {0}")]
    Decode(String),
}

/// Pipeline stage an error was raised in, for log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BlockFetch,
    MintResolution,
    BuyerExtraction,
    FundingTrace,
    Liveness,
    Retention,
    Autopsy,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::BlockFetch => "block_fetch",
            Stage::MintResolution => "mint_resolution",
            Stage::BuyerExtraction => "buyer_extraction",
            Stage::FundingTrace => "funding_trace",
            Stage::Liveness => "liveness",
            Stage::Retention => "retention",
            Stage::Autopsy => "autopsy",
        };
        f.write_str(name)
    }
}

/// Recoverable failures of one analysis task. None of these stop the
/// monitoring loop.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Transient lookup failure during {stage}: {source}")]
    TransientLookup {
        stage: Stage,
        #[source]
        source: ChainError,
    },

    #[error("Missing data during {stage}: {reason}")]
    MissingData { stage: Stage, reason: String },
}

impl AnalysisError {
    pub fn missing(stage: Stage, reason: impl Into<String>) -> Self {
        AnalysisError::MissingData {
            stage,
            reason: reason.into(),
        }
    }

    pub fn transient(stage: Stage, source: ChainError) -> Self {
        AnalysisError::TransientLookup { stage, source }
    }

    pub fn stage(&self) -> Stage {
        match self {
            AnalysisError::TransientLookup { stage, .. } => *stage,
            AnalysisError::MissingData { stage, .. } => *stage,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("Signal sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Signal serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Signal sink closed: {0}")]
    Closed(String),
}
