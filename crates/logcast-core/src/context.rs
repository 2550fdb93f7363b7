//! Ambient runtime context attached to every entry.
//!
//! The builder performs no I/O. Facts it cannot know itself (memory, battery,
//! network type, locale...) come from accessor closures registered by the
//! host; an accessor that fails or panics only loses its own field.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use crate::config::AppInfo;
use crate::entry::Fields;

/// Host-supplied source for one context field.
pub type Accessor = Arc<dyn Fn() -> anyhow::Result<Value> + Send + Sync>;

/// Identity and navigation state owned by one engine instance.
#[derive(Debug, Clone)]
pub struct AmbientState {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Screen or view the user is currently on
    pub screen: Option<String>,
    /// When the current session began
    pub session_started: Instant,
}

impl AmbientState {
    pub fn new() -> Self {
        Self {
            user_id: None,
            session_id: None,
            screen: None,
            session_started: Instant::now(),
        }
    }

    /// Whole seconds since the session started.
    pub fn session_duration_secs(&self) -> u64 {
        self.session_started.elapsed().as_secs()
    }
}

impl Default for AmbientState {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembles the `context` map for each entry.
#[derive(Clone)]
pub struct ContextBuilder {
    app: AppInfo,
    accessors: Vec<(String, Accessor)>,
}

impl ContextBuilder {
    pub fn new(app: AppInfo) -> Self {
        Self {
            app,
            accessors: Vec::new(),
        }
    }

    /// Register an accessor. Later registrations for the same key win, and
    /// accessors override the built-in fields.
    pub fn with_accessor<F>(mut self, key: impl Into<String>, accessor: F) -> Self
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.accessors.push((key.into(), Arc::new(accessor)));
        self
    }

    pub fn app(&self) -> &AppInfo {
        &self.app
    }

    /// Snapshot the current ambient facts.
    pub fn build(&self, ambient: &AmbientState) -> Fields {
        let mut context = Fields::new();

        context.insert("app_name".into(), Value::from(self.app.name.as_str()));
        context.insert("app_version".into(), Value::from(self.app.version.as_str()));
        if let Some(build) = &self.app.build {
            context.insert("app_build".into(), Value::from(build.as_str()));
        }
        context.insert("platform".into(), Value::from(std::env::consts::OS));
        context.insert("arch".into(), Value::from(std::env::consts::ARCH));
        if let Some(screen) = &ambient.screen {
            context.insert("screen".into(), Value::from(screen.as_str()));
        }
        let auth = if ambient.user_id.is_some() {
            "authenticated"
        } else {
            "anonymous"
        };
        context.insert("auth_status".into(), Value::from(auth));
        context.insert(
            "session_duration".into(),
            Value::from(ambient.session_duration_secs()),
        );
        context.insert(
            "timezone".into(),
            Value::from(chrono::Local::now().offset().to_string()),
        );
        context.insert("thread".into(), Value::from(current_thread_label()));

        for (key, accessor) in &self.accessors {
            match panic::catch_unwind(AssertUnwindSafe(|| accessor())) {
                Ok(Ok(value)) => {
                    context.insert(key.clone(), value);
                }
                Ok(Err(e)) => {
                    debug!(field = %key, error = %e, "Context accessor failed, field omitted");
                }
                Err(_) => {
                    debug!(field = %key, "Context accessor panicked, field omitted");
                }
            }
        }

        context
    }
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("app", &self.app)
            .field(
                "accessors",
                &self.accessors.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn current_thread_label() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_fields() {
        let builder = ContextBuilder::new(AppInfo {
            name: "shop".into(),
            version: "1.2.3".into(),
            build: Some("42".into()),
        });
        let mut ambient = AmbientState::new();
        ambient.screen = Some("cart".into());

        let ctx = builder.build(&ambient);
        assert_eq!(ctx["app_version"], "1.2.3");
        assert_eq!(ctx["app_build"], "42");
        assert_eq!(ctx["screen"], "cart");
        assert_eq!(ctx["auth_status"], "anonymous");
        assert!(ctx.contains_key("platform"));
        assert!(ctx.contains_key("thread"));
    }

    #[test]
    fn test_failing_accessors_are_omitted() {
        let builder = ContextBuilder::new(AppInfo::default())
            .with_accessor("battery", || Ok(Value::from(0.83)))
            .with_accessor("network", || Err(anyhow::anyhow!("radio off")))
            .with_accessor("memory", || panic!("sensor exploded"));

        let ctx = builder.build(&AmbientState::new());
        assert_eq!(ctx["battery"], 0.83);
        assert!(!ctx.contains_key("network"));
        assert!(!ctx.contains_key("memory"));
    }

    #[test]
    fn test_authenticated_when_user_set() {
        let mut ambient = AmbientState::new();
        ambient.user_id = Some("u-1".into());
        let ctx = ContextBuilder::new(AppInfo::default()).build(&ambient);
        assert_eq!(ctx["auth_status"], "authenticated");
    }
}
