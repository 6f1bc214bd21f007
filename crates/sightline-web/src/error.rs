use thiserror::Error;

/// The browser refused to construct an `IntersectionObserver`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebWatcherError {
    /// The constructor threw (e.g. `SyntaxError` for a bad root margin).
    #[error("IntersectionObserver constructor threw: {message}")]
    Rejected { message: String },
}

impl WebWatcherError {
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl From<wasm_bindgen::JsValue> for WebWatcherError {
    fn from(value: wasm_bindgen::JsValue) -> Self {
        use wasm_bindgen::JsCast;

        let message = value
            .dyn_ref::<js_sys::Error>()
            .map(|err| String::from(err.message()))
            .or_else(|| value.as_string())
            .unwrap_or_else(|| format!("{value:?}"));
        Self::rejected(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_includes_message() {
        let err = WebWatcherError::rejected("rootMargin must be specified in pixels or percent");
        assert_eq!(
            err.to_string(),
            "IntersectionObserver constructor threw: rootMargin must be specified in pixels or percent"
        );
    }

    #[test]
    fn wraps_as_factory_error() {
        let err: sightline_core::ObserveError<WebWatcherError> =
            sightline_core::ObserveError::Factory(WebWatcherError::rejected("bad"));
        assert_eq!(err.factory_error(), Some(&WebWatcherError::rejected("bad")));
        assert!(std::error::Error::source(&err).is_some());
    }
}
