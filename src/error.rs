use thiserror::Error;

/// Errors raised while loading, planning or dispatching contract scripts.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// A source location matched a resource that could not be read.
    #[error("cannot read script source '{location}': {source}")]
    Read {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid source pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// The browser-side try/catch template returned the error sentinel.
    #[error("Failed to execute injected script: {0}")]
    Injected(String),

    #[error("Cannot execute detection script of '{contract}': {source}")]
    Detection {
        contract: String,
        #[source]
        source: Box<ScriptError>,
    },

    /// The script channel itself failed (CDP error, engine error, closed session).
    #[error("script execution failed: {0}")]
    Execution(String),

    #[error("script bound to method '{method}' of contract '{contract}' failed: {source}")]
    Dispatch {
        contract: String,
        method: String,
        #[source]
        source: Box<ScriptError>,
    },

    #[error("cyclic script dependency: {0}")]
    Cycle(String),

    #[error("unknown contract '{0}'")]
    UnknownContract(String),

    #[error("Cannot determine which manual implementation should be used for '{0}'")]
    AmbiguousManualImplementation(String),

    #[error("calling '{method}' of manual implementation '{implementation}' failed: {reason}")]
    Manual {
        implementation: String,
        method: String,
        reason: String,
    },

    #[error("no browser session available")]
    NoSession,

    #[error("cannot convert script result to {target}: {reason}")]
    Conversion { target: &'static str, reason: String },
}

impl ScriptError {
    pub fn root(&self) -> &ScriptError {
        match self {
            ScriptError::Dispatch { source, .. } | ScriptError::Detection { source, .. } => {
                source.root()
            }
            other => other,
        }
    }
}

/// Errors raised by the wait engine.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("Wait command is not fully configured! No condition found!")]
    IllegalCondition,

    /// The command's target could not be located. Retried by the poll loop.
    #[error("element not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Script(#[from] ScriptError),
}
