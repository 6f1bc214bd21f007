use thiserror::Error;

/// Result of a manager operation, generic over the factory's error type.
pub type Result<T, E> = std::result::Result<T, ObserveError<E>>;

/// Failure of a manager or binding operation.
///
/// Non-renderable elements are not an error: they are ignored silently.
#[derive(Debug, Error)]
pub enum ObserveError<E> {
    /// The watcher factory rejected the configuration. Passed through as-is.
    #[error("watcher factory failed: {0}")]
    Factory(#[source] E),

    /// The manager was torn down (or its scope dropped).
    #[error("observation manager has been torn down")]
    TornDown,

    /// Another operation on the same scope is still running, e.g. a binding
    /// called from inside a synchronous delivery.
    #[error("observation manager is busy")]
    Busy,
}

impl<E> ObserveError<E> {
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        matches!(self, Self::TornDown)
    }

    /// The factory error, if this is one.
    #[must_use]
    pub fn factory_error(&self) -> Option<&E> {
        match self {
            Self::Factory(err) => Some(err),
            _ => None,
        }
    }
}

/// Invalid [`ObserverOptions`](crate::options::ObserverOptions) input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("threshold {value} is outside [0, 1]")]
    ThresholdOutOfRange { value: f64 },

    #[error("root margin must have 1 to 4 components, got {count}")]
    MarginArity { count: usize },

    #[error("invalid root margin component `{token}`: expected px or %")]
    MarginToken { token: String },
}
