//
// error.rs
//
// Error taxonomy shared by the document store, the feature bus and the
// namespace resolver
//

use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::Url;

/// Errors raised by document synchronization and snapshot lookups.
///
/// These are surfaced to the client; they are never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("document not opened: {0}")]
    NotOpened(Url),

    #[error("invalid change for {uri}: {reason}")]
    InvalidChange { uri: Url, reason: String },

    #[error("stale version for {uri}: requested {requested}, current {current:?}")]
    StaleVersion {
        uri: Url,
        requested: i32,
        current: Option<i32>,
    },

    #[error("position {line}:{character} is outside of {uri}")]
    InvalidPosition { uri: Url, line: u32, character: u32 },
}

impl From<DocumentError> for jsonrpc::Error {
    fn from(err: DocumentError) -> Self {
        jsonrpc::Error::invalid_params(err.to_string())
    }
}

/// Errors raised while looking up a keyword in a namespace.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown namespace '{0}'")]
    UnknownNamespace(String),

    #[error("empty keyword name")]
    EmptyName,
}

/// Errors raised by the command registry.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("'{0}' is not a command")]
    NotACommand(String),

    #[error("command '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("invalid arguments for '{command}': {reason}")]
    InvalidArguments { command: String, reason: String },

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl From<CommandError> for jsonrpc::Error {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::NotACommand(_) | CommandError::InvalidArguments { .. } => {
                jsonrpc::Error::invalid_params(err.to_string())
            }
            CommandError::AlreadyRegistered(_) | CommandError::Failed(_) => {
                let mut e = jsonrpc::Error::internal_error();
                e.message = err.to_string().into();
                e
            }
        }
    }
}

/// Raised when a request was cancelled while a handler was running.
///
/// Handlers return it through `anyhow`; the bus recognises it by downcast
/// and drops it without logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request cancelled")]
pub struct Cancelled;

/// True when `err` (or anything in its chain) is a cancellation.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<Cancelled>())
}

/// Map a request failure onto a protocol error.
///
/// Document-state and argument errors are the caller's fault; anything else
/// is internal.
pub fn to_jsonrpc(err: anyhow::Error) -> jsonrpc::Error {
    if is_cancelled(&err) {
        return jsonrpc::Error {
            code: jsonrpc::ErrorCode::RequestCancelled,
            message: "request cancelled".into(),
            data: None,
        };
    }
    let err = match err.downcast::<DocumentError>() {
        Ok(doc_err) => return doc_err.into(),
        Err(err) => err,
    };
    let err = match err.downcast::<CommandError>() {
        Ok(cmd_err) => return cmd_err.into(),
        Err(err) => err,
    };
    let mut rpc = jsonrpc::Error::internal_error();
    rpc.message = format!("{:#}", err).into();
    rpc
}
