/// Failures surfaced by the store client.
///
/// `Ambiguous` is the only retryable variant: the store could not confirm
/// whether a conditional write committed on enough replicas before the call
/// timed out. It is a structured variant, never detected by matching error
/// message text. Everything else propagates to the caller unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Commit status of a conditional write is unknown (quorum timeout).
    Ambiguous { op: &'static str },
    /// Not enough nodes reachable for the configured consistency level.
    Unavailable(String),
    /// Value failed to decode at the client boundary.
    Codec(String),
    /// Any other store-side failure.
    Backend(String),
}

impl StoreError {
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, StoreError::Ambiguous { .. })
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Ambiguous { op } => {
                write!(f, "conditional write outcome unknown during {op}")
            }
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Codec(msg) => write!(f, "value decode failed: {msg}"),
            StoreError::Backend(msg) => write!(f, "store error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}
