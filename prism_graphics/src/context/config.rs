/// Context configuration and counters

/// Context configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// Binding indices must stay below this, per binding table
    pub max_binding_slots: u32,
    /// Name used in log lines
    pub label: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_binding_slots: 64,
            label: "Prism Context".to_string(),
        }
    }
}

/// Per-context counters, updated by `flush`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    /// Successful flushes
    pub flushes: u64,
    /// Draw calls issued to the backend
    pub draws: u64,
    /// Times a pending pipeline became current
    pub pipeline_switches: u64,
    /// Standalone uniforms uploaded
    pub uniforms_uploaded: u64,
    /// Standalone uniforms skipped (unsupported type)
    pub uniforms_skipped: u64,
    /// Textures or buffers realized at flush time
    pub lazy_realizations: u64,
    /// Indirect draws accepted without being issued
    pub ignored_indirect_draws: u64,
}
