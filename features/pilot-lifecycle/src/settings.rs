use std::time::Duration;

/// Engine wide knobs, fixed once the orchestrator is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Upper bound for a single instantiation. `None` waits forever and runs the
    /// instantiator on the calling thread, which is what you want under a debugger.
    pub instantiation_timeout: Option<Duration>,
    /// Name of the worker threads running bounded instantiations
    pub worker_name: String,
}

impl LifecycleSettings {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_WORKER_NAME: &'static str = "pilot-instantiate";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.instantiation_timeout = Some(timeout);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.instantiation_timeout = None;
        self
    }

    pub fn with_worker_name(mut self, worker_name: impl Into<String>) -> Self {
        self.worker_name = worker_name.into();
        self
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            instantiation_timeout: Some(Self::DEFAULT_TIMEOUT),
            worker_name: Self::DEFAULT_WORKER_NAME.to_string(),
        }
    }
}
