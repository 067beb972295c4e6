use thiserror::Error;

/// Errors raised while decoding inbound payloads.
///
/// Decode failures are recovered locally: the raw payload string is
/// stored under the event's data label instead. Nothing here reaches
/// the caller of `ingest`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
