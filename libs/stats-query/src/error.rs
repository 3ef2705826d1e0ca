use std::num::ParseFloatError;

use hickory_proto::ProtoError;

#[derive(thiserror::Error, Debug)]
pub enum StatsError {
    #[error("failed to build stats query: {0}")]
    Query(#[source] ProtoError),
    #[error("stats DNS exchange failed: {0}")]
    Transport(#[from] ProtoError),
    #[error("stats DNS record {name:?}: unexpected number of replies: got {count}, want 1")]
    ValueCount { name: String, count: usize },
    #[error("stats DNS record {name:?}: invalid value {value:?}: {source}")]
    ParseValue {
        name: String,
        value: String,
        #[source]
        source: ParseFloatError,
    },
}

pub type Result<T> = std::result::Result<T, StatsError>;
