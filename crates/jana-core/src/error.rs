use thiserror::Error;

/// Engine-level failure modes (§7 of the error handling design).
///
/// User callback failures are never unwound across a worker thread boundary;
/// they are caught at the worker, wrapped into `CallbackException`, appended
/// to the controller's exception list, and handled per the active
/// `FailurePolicy`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("component '{component}' failed to initialize: {source}")]
    ComponentInitFailure {
        component: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("callback '{callback}' on component '{component}' (plugin '{plugin}') failed: {source}")]
    CallbackException {
        component: String,
        plugin: String,
        callback: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("backpressure stall: pool exhausted with no progress for {0:?}")]
    BackpressureStall(std::time::Duration),

    #[error("timeout exceeded: event {event_number} exceeded its wall-clock budget of {budget:?}")]
    TimeoutExceeded {
        event_number: u64,
        budget: std::time::Duration,
    },

    #[error("interrupted by signal")]
    Interrupted,

    #[error("factory not found for type '{type_name}' tag '{tag}'")]
    FactoryNotFound { type_name: &'static str, tag: String },

    #[error("queue overflow on '{queue}': attempted to exceed capacity {capacity}")]
    QueueOverflow { queue: String, capacity: usize },

    #[error("invalid wiring: {0}")]
    InvalidWiring(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// True for kinds that represent a single event/callback going wrong,
    /// as opposed to a structural problem with the topology itself.
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            EngineError::CallbackException { .. } | EngineError::TimeoutExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_exception_message() {
        let e = EngineError::CallbackException {
            component: "TrackFactory".into(),
            plugin: "tracking".into(),
            callback: "process".into(),
            source: Box::new(std::io::Error::new(std::io::ErrorKind::Other, "boom")),
        };
        assert!(e.to_string().contains("TrackFactory"));
        assert!(e.is_per_event());
    }

    #[test]
    fn factory_not_found_is_not_per_event() {
        let e = EngineError::FactoryNotFound {
            type_name: "Track",
            tag: String::new(),
        };
        assert!(!e.is_per_event());
    }
}
