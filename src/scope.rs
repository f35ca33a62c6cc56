//! Execution scopes.
//!
//! A scope is the variable environment a query and its handler evaluate
//! against. It owns any resources evaluation acquired (registered as
//! destructors) and releases them exactly once on [`Scope::close`] or drop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::ServerConfig;
use crate::logging::{LogLevel, PlainLogger};
use crate::value::Value;

type Destructor = Box<dyn FnOnce() + Send>;

/// Variable bindings plus attached logger and cleanup hooks.
pub struct Scope {
    vars: Vec<(String, Value)>,
    config: Option<Arc<ServerConfig>>,
    logger: Option<PlainLogger>,
    destructors: Mutex<Vec<Destructor>>,
    closed: AtomicBool,
}

impl Scope {
    /// An open scope with no variables, config or logger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vars: Vec::new(),
            config: None,
            logger: None,
            destructors: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Binds `name`, shadowing an earlier binding with the same name.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.vars.push((name, value)),
        }
    }

    /// Builder-style [`Scope::bind`].
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind(name, value);
        self
    }

    /// Binds the server config as `server_config` and keeps a typed copy.
    #[must_use]
    pub fn with_server_config(mut self, config: Arc<ServerConfig>) -> Self {
        let structured = serde_json::to_value(config.as_ref()).unwrap_or(serde_json::Value::Null);
        self.bind("server_config", Value::Structured(structured));
        self.config = Some(config);
        self
    }

    /// Resolves a variable.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.vars.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// The typed server config, if one was bound.
    #[must_use]
    pub fn server_config(&self) -> Option<&Arc<ServerConfig>> {
        self.config.as_ref()
    }

    /// Attaches the logger used by [`Scope::log`].
    pub fn set_logger(&mut self, logger: PlainLogger) {
        self.logger = Some(logger);
    }

    /// The attached logger, if any.
    #[must_use]
    pub fn logger(&self) -> Option<&PlainLogger> {
        self.logger.as_ref()
    }

    /// Logs through the attached logger, or at debug level without one.
    pub fn log(&self, level: LogLevel, message: &str) {
        match &self.logger {
            Some(logger) => logger.log(level, message),
            None => tracing::debug!("{message}"),
        }
    }

    /// Registers cleanup to run when the scope closes.
    ///
    /// If the scope is already closed the destructor runs immediately.
    pub fn add_destructor(&self, f: impl FnOnce() + Send + 'static) {
        if self.closed.load(Ordering::Acquire) {
            f();
            return;
        }
        self.destructors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(f));
    }

    /// Runs registered destructors in reverse order. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let destructors = std::mem::take(&mut *self.destructors.lock().unwrap_or_else(PoisonError::into_inner));
        for d in destructors.into_iter().rev() {
            d();
        }
    }

    /// True once [`Scope::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("vars", &self.vars.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())
            .field("logger", &self.logger)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn bind_and_resolve() {
        let mut scope = Scope::new().with_var("artifact_name", "A");
        assert_eq!(scope.resolve("artifact_name"), Some(&Value::from("A")));
        scope.bind("artifact_name", "B");
        assert_eq!(scope.resolve("artifact_name"), Some(&Value::from("B")));
        assert!(scope.resolve("missing").is_none());
    }

    #[test]
    fn server_config_is_visible_as_variable() {
        let cfg = Arc::new(ServerConfig {
            server_name: "fe".to_string(),
            ..ServerConfig::default()
        });
        let scope = Scope::new().with_server_config(Arc::clone(&cfg));
        let bound = scope.resolve("server_config").unwrap();
        assert_eq!(bound.get("server_name"), Some(Value::from("fe")));
        assert_eq!(scope.server_config().unwrap().server_name, "fe");
    }

    #[test]
    fn close_runs_destructors_once_in_reverse() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let scope = Scope::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            scope.add_destructor(move || order.lock().unwrap().push(i));
        }

        scope.close();
        scope.close();
        drop(scope);

        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn destructor_added_after_close_runs_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let scope = Scope::new();
        scope.close();

        let h = Arc::clone(&hits);
        scope.add_destructor(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_closes_scope() {
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let scope = Scope::new();
            let h = Arc::clone(&hits);
            scope.add_destructor(move || {
                h.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
