/// Errors from registry and scheduler operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    #[error("no {0} context configured, call set_{0}() first")]
    NotConfigured(&'static str),
    #[error("class does not exist: {0}")]
    ClassNotFound(String),
    #[error("object does not exist: {0}")]
    ObjectNotFound(String),
    /// Erasing an object the registry does not hold. Usually a double delete.
    #[error("object is not registered (already erased?): {0}")]
    NotRegistered(String),
    #[error("object has been destroyed: {0}")]
    ObjectDestroyed(String),
    #[error("linking {near} as the near of {far} would create a cycle")]
    LodCycle { far: String, near: String },
    #[error("class {0} cannot inherit from itself")]
    ClassCycle(String),
    #[error("invalid streamer config: {0}")]
    InvalidConfig(String),
}
