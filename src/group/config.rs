//! Group configuration

/// Group configuration options
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Label attached to every log record emitted by the group
    pub name: String,

    /// Initial capacity of the receiver registry
    pub registry_capacity: usize,

    /// Emit a trace event for every value dropped on a full receiver
    pub trace_drops: bool,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            name: "group".to_string(),
            registry_capacity: 16,
            trace_drops: false,
        }
    }
}

impl GroupConfig {
    /// Create a new config with a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the group name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the initial registry capacity
    pub fn registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    /// Trace every value dropped on a full receiver
    ///
    /// Off by default: a slow receiver can produce one event per published value.
    pub fn trace_drops(mut self, enabled: bool) -> Self {
        self.trace_drops = enabled;
        self
    }
}
