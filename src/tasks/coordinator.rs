//! Task routing.

use super::foraging::ForagingHandler;
use super::relations::RelationsHandler;
use super::specialist::SpecialistHandler;
use super::{Envelope, TaskHandler, TaskKind, TaskParams};
use crate::backend::{Catalog, SearchBackend};
use crate::error::{BackendError, TaskError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A task name with its one-line description.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// A registered handler and the tasks it declares.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerInfo {
    pub name: String,
    pub tasks: Vec<TaskInfo>,
}

/// Routes tasks to the first registered handler that declares them.
#[derive(Default, Clone)]
pub struct Coordinator {
    handlers: Vec<(String, Arc<dyn TaskHandler>)>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `specialist`, `foraging` and `relations`, in that order.
    pub fn with_default_handlers(backend: Arc<dyn SearchBackend>, catalog: Catalog) -> Self {
        let mut coordinator = Self::new();
        coordinator.register(
            "specialist",
            Arc::new(SpecialistHandler::new(backend.clone(), catalog.clone())),
        );
        coordinator.register(
            "foraging",
            Arc::new(ForagingHandler::new(backend.clone(), catalog.clone())),
        );
        coordinator.register("relations", Arc::new(RelationsHandler::new(backend, catalog)));
        coordinator
    }

    /// Add a handler, replacing one already registered under `name`.
    pub fn register(&mut self, name: &str, handler: Arc<dyn TaskHandler>) {
        match self.handlers.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = handler,
            None => self.handlers.push((name.to_string(), handler)),
        }
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Declared tasks across all handlers, first declaration wins.
    pub fn known_tasks(&self) -> Vec<TaskKind> {
        let mut tasks = Vec::new();
        for (_, handler) in &self.handlers {
            for task in handler.declared_tasks() {
                if !tasks.contains(task) {
                    tasks.push(*task);
                }
            }
        }
        tasks
    }

    pub fn list_tasks(&self) -> Vec<HandlerInfo> {
        self.handlers
            .iter()
            .map(|(name, handler)| HandlerInfo {
                name: name.clone(),
                tasks: handler
                    .declared_tasks()
                    .iter()
                    .map(|t| TaskInfo {
                        name: t.name(),
                        description: t.description(),
                    })
                    .collect(),
            })
            .collect()
    }

    fn find_handler(&self, task: TaskKind) -> Option<(&str, &Arc<dyn TaskHandler>)> {
        self.handlers
            .iter()
            .find(|(_, h)| h.supports(task))
            .map(|(n, h)| (n.as_str(), h))
    }

    fn unsupported(&self, task: &str) -> Envelope {
        let known: Vec<&str> = self.known_tasks().iter().map(TaskKind::name).collect();
        Envelope::failure(
            TaskError::Unsupported {
                task: task.to_string(),
            }
            .to_string(),
        )
        .with("known_agents", self.handler_names())
        .with("known_tasks", known)
    }

    /// Run `task` with `params`.
    ///
    /// Unknown tasks, invalid parameters and unresolved labels come back as
    /// error envelopes. Only backend failures are returned as `Err`.
    pub async fn dispatch(&self, task: &str, params: &Value) -> Result<Envelope, BackendError> {
        let Some(kind) = TaskKind::parse(task) else {
            warn!("Unknown task '{}'", task);
            return Ok(self.unsupported(task));
        };
        let Some((name, handler)) = self.find_handler(kind) else {
            warn!("No handler for task '{}'", task);
            return Ok(self.unsupported(task));
        };

        let parsed = match TaskParams::parse(kind, params) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Rejected {} params: {}", kind, e);
                return Ok(Envelope::failure(e.to_string()));
            }
        };

        info!("Dispatching {} to {}", kind, name);
        debug!("Params: {:?}", parsed);

        match handler.handle(parsed).await {
            Ok(envelope) => {
                info!("{} answered with {} records", kind, envelope.record_count());
                Ok(envelope)
            }
            Err(TaskError::Backend(e)) => {
                warn!("{} failed on {}: {}", kind, e.path(), e);
                Err(e)
            }
            Err(TaskError::Unsupported { .. }) => Ok(self.unsupported(task)),
            Err(e) => Ok(Envelope::failure(e.to_string())),
        }
    }
}
