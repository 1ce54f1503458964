//
// bus.rs
//
// Multicast feature events, capability negotiation and the command registry
//

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexSet;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{CodeActionKind, WorkspaceEdit};

use crate::error::{is_cancelled, CommandError};

// ============================================================================
// Handler metadata
// ============================================================================

/// Registration-time description of a handler.
///
/// Everything the bus needs to filter a handler or to advertise capabilities
/// for it lives here rather than on the handler itself.
#[derive(Debug, Clone, Default)]
pub struct HandlerDescriptor {
    pub name: String,
    /// `None` means the handler serves every language.
    pub language_ids: Option<Vec<String>>,
    pub trigger_characters: Vec<String>,
    pub commit_characters: Vec<String>,
    pub code_action_kinds: Vec<CodeActionKind>,
}

impl HandlerDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn languages<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.language_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn trigger_characters<I, S>(mut self, chars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger_characters = chars.into_iter().map(Into::into).collect();
        self
    }

    pub fn commit_characters<I, S>(mut self, chars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commit_characters = chars.into_iter().map(Into::into).collect();
        self
    }

    pub fn code_action_kinds(mut self, kinds: impl IntoIterator<Item = CodeActionKind>) -> Self {
        self.code_action_kinds = kinds.into_iter().collect();
        self
    }

    /// Whether the handler takes part in an invocation for `language_id`.
    pub fn serves_language(&self, language_id: &str) -> bool {
        match &self.language_ids {
            None => true,
            Some(ids) => ids.iter().any(|id| id == language_id),
        }
    }
}

/// Filter that keeps handlers serving `language_id` plus handlers without a
/// language restriction.
pub fn for_language(language_id: &str) -> impl Fn(&HandlerDescriptor) -> bool + '_ {
    move |descriptor: &HandlerDescriptor| descriptor.serves_language(language_id)
}

/// Filter that keeps every handler.
pub fn any_handler(_: &HandlerDescriptor) -> bool {
    true
}

// ============================================================================
// Handlers and faults
// ============================================================================

#[async_trait]
pub trait Handler<A, R>: Send + Sync {
    async fn handle(&self, args: A) -> anyhow::Result<R>;
}

/// Plain async closures can be registered directly.
#[async_trait]
impl<A, R, F, Fut> Handler<A, R> for F
where
    A: Send + 'static,
    R: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<R>> + Send + 'static,
{
    async fn handle(&self, args: A) -> anyhow::Result<R> {
        (self)(args).await
    }
}

/// A failure captured from one handler of a fan-out.
#[derive(Debug, thiserror::Error)]
pub enum HandlerFault {
    #[error("handler '{handler}' failed: {error:#}")]
    Failed {
        handler: String,
        error: anyhow::Error,
    },

    #[error("handler '{handler}' panicked")]
    Panicked { handler: String },

    #[error("handler '{handler}' was cancelled")]
    Cancelled { handler: String },
}

impl HandlerFault {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HandlerFault::Cancelled { .. })
    }
}

/// Aborts tasks still running when the invocation is dropped, so a cancelled
/// request does not leave handlers working in the background.
struct AbortOnDrop<T>(Vec<Option<JoinHandle<T>>>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        for handle in self.0.iter().flatten() {
            handle.abort();
        }
    }
}

// ============================================================================
// Event
// ============================================================================

type BoxedHandler<A, R> = Arc<dyn Handler<A, R>>;

/// A named event with any number of registered handlers.
pub struct Event<A, R> {
    name: &'static str,
    handlers: Vec<(HandlerDescriptor, BoxedHandler<A, R>)>,
}

impl<A, R> std::fmt::Debug for Event<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field(
                "handlers",
                &self.handlers.iter().map(|(d, _)| &d.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<A, R> Event<A, R>
where
    A: Clone + Send + 'static,
    R: Send + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn register<H>(&mut self, descriptor: HandlerDescriptor, handler: H)
    where
        H: Handler<A, R> + 'static,
    {
        log::trace!("Registering '{}' on {}", descriptor.name, self.name);
        self.handlers.push((descriptor, Arc::new(handler)));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.handlers.iter().map(|(d, _)| d)
    }

    /// Run every handler accepted by `filter` concurrently.
    ///
    /// Results come back in registration order, one per participating handler.
    pub async fn invoke<F>(&self, args: A, filter: F) -> Vec<Result<R, HandlerFault>>
    where
        F: Fn(&HandlerDescriptor) -> bool,
    {
        let participants: Vec<_> = self
            .handlers
            .iter()
            .filter(|(descriptor, _)| filter(descriptor))
            .collect();

        let mut tasks = AbortOnDrop(
            participants
                .iter()
                .map(|(_, handler)| {
                    let handler = Arc::clone(handler);
                    let args = args.clone();
                    Some(tokio::spawn(async move { handler.handle(args).await }))
                })
                .collect(),
        );

        let mut results = Vec::with_capacity(participants.len());
        for (slot, (descriptor, _)) in tasks.0.iter_mut().zip(&participants) {
            let Some(task) = slot.as_mut() else { continue };
            let outcome = task.await;
            *slot = None;
            let handler = descriptor.name.clone();
            let result = match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) if is_cancelled(&error) => Err(HandlerFault::Cancelled { handler }),
                Ok(Err(error)) => Err(HandlerFault::Failed { handler, error }),
                Err(join) if join.is_cancelled() => Err(HandlerFault::Cancelled { handler }),
                Err(_) => Err(HandlerFault::Panicked { handler }),
            };
            results.push(result);
        }
        results
    }

    /// Invoke and keep only successful results; faults are logged, except
    /// cancellations which are dropped silently.
    pub async fn collect<F>(&self, args: A, filter: F) -> Vec<R>
    where
        F: Fn(&HandlerDescriptor) -> bool,
    {
        successes(self.name, self.invoke(args, filter).await)
    }

    pub fn trigger_characters(&self) -> Vec<String> {
        union(self.descriptors().map(|d| d.trigger_characters.iter().cloned()))
    }

    pub fn commit_characters(&self) -> Vec<String> {
        union(self.descriptors().map(|d| d.commit_characters.iter().cloned()))
    }

    pub fn code_action_kinds(&self) -> Vec<CodeActionKind> {
        union(self.descriptors().map(|d| d.code_action_kinds.iter().cloned()))
    }
}

fn union<T, I>(groups: impl Iterator<Item = I>) -> Vec<T>
where
    T: std::hash::Hash + Eq,
    I: Iterator<Item = T>,
{
    groups.flatten().collect::<IndexSet<T>>().into_iter().collect()
}

/// Split fan-out results into values, logging every non-cancellation fault.
pub fn successes<R>(event: &str, results: Vec<Result<R, HandlerFault>>) -> Vec<R> {
    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(value) => Some(value),
            Err(fault) if fault.is_cancelled() => None,
            Err(fault) => {
                log::error!("{}: {}", event, fault);
                None
            }
        })
        .collect()
}

// ============================================================================
// Commands
// ============================================================================

/// What a command produced. An edit is applied on the client by the caller.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CommandOutput {
    pub value: Option<serde_json::Value>,
    pub edit: Option<WorkspaceEdit>,
}

#[async_trait]
pub trait Command: Send + Sync {
    async fn execute(&self, arguments: Vec<serde_json::Value>) -> Result<CommandOutput, CommandError>;
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
    order: Vec<String>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.order)
            .finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C>(&mut self, id: impl Into<String>, command: C) -> Result<(), CommandError>
    where
        C: Command + 'static,
    {
        let id = id.into();
        if self.commands.contains_key(&id) {
            return Err(CommandError::AlreadyRegistered(id));
        }
        self.order.push(id.clone());
        self.commands.insert(id, Arc::new(command));
        Ok(())
    }

    /// Registered command ids, in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub async fn execute(
        &self,
        id: &str,
        arguments: Vec<serde_json::Value>,
    ) -> Result<CommandOutput, CommandError> {
        let command = self
            .commands
            .get(id)
            .cloned()
            .ok_or_else(|| CommandError::NotACommand(id.to_string()))?;
        command.execute(arguments).await
    }
}
