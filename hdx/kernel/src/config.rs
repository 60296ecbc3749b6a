//! Kernel configuration

use crate::MAX_ACTIVE;

/// Configuration for the HDX kernel.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub name: &'static str,
    /// Registration limit, at most [`MAX_ACTIVE`]
    pub max_active: u8,
    /// Called by [`Kernel::run`](crate::Kernel::run) whenever nothing is pending
    pub idle_callback: Option<fn()>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "HDX",
            max_active: MAX_ACTIVE as u8,
            idle_callback: None,
        }
    }
}

impl KernelConfig {
    /// Creates a new kernel configuration builder.
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }

    /// Registration limit clamped to the table size
    pub fn capacity(&self) -> usize {
        (self.max_active as usize).min(MAX_ACTIVE)
    }
}

/// Builder for kernel configuration.
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    /// Sets the kernel name used in diagnostics.
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the maximum number of active objects.
    pub fn max_active(mut self, max: u8) -> Self {
        self.config.max_active = max;
        self
    }

    /// Sets the idle callback function.
    pub fn idle_callback(mut self, callback: fn()) -> Self {
        self.config.idle_callback = Some(callback);
        self
    }

    /// Builds the kernel configuration.
    pub fn build(self) -> KernelConfig {
        self.config
    }
}
