//! Half-duplex link configuration

/// Largest mailbox a [`HalfDuplexPort`](crate::HalfDuplexPort) provides
/// storage for, per object
pub const MAX_QUEUE: usize = 16;

/// Configuration of one half-duplex link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HxConfig {
    /// Priority of the orchestrator, receiver and transmitter
    pub priority: u8,
    /// The line echoes every transmitted frame back to the receiver
    pub loopback: bool,
    /// Transmit enable output is active low
    pub tx_active_low: bool,
    /// Receive enable output is active low
    pub rx_active_low: bool,
    /// Time to wait for an answer, zero to wait forever. The receiver only
    /// raises its first interrupt after eight bytes, so include their
    /// transfer time.
    pub response_timeout_ms: u16,
    /// Delay between enabling the transmit driver and sending
    pub tx_delay_us: u16,
    pub hx_mailbox: usize,
    pub rx_mailbox: usize,
    pub tx_mailbox: usize,
}

impl Default for HxConfig {
    fn default() -> Self {
        Self {
            priority: 1,
            loopback: false,
            tx_active_low: false,
            rx_active_low: false,
            response_timeout_ms: 100,
            tx_delay_us: 0,
            hx_mailbox: 8,
            rx_mailbox: 4,
            tx_mailbox: 4,
        }
    }
}

impl HxConfig {
    /// Creates a new link configuration builder.
    pub fn builder() -> HxConfigBuilder {
        HxConfigBuilder::default()
    }

    /// Check the mailbox capacities against [`MAX_QUEUE`]
    pub fn validate(&self) -> Result<(), crate::SetupError> {
        for capacity in [self.hx_mailbox, self.rx_mailbox, self.tx_mailbox] {
            if capacity == 0 || capacity > MAX_QUEUE {
                return Err(crate::SetupError::MailboxCapacity(capacity));
            }
        }
        Ok(())
    }
}

/// Builder for link configuration.
#[derive(Debug, Clone, Default)]
pub struct HxConfigBuilder {
    config: HxConfig,
}

impl HxConfigBuilder {
    /// Sets the priority shared by the link's active objects.
    pub fn priority(mut self, priority: u8) -> Self {
        self.config.priority = priority;
        self
    }

    /// Expects each transmitted frame to come back before the answer.
    pub fn loopback(mut self, enabled: bool) -> Self {
        self.config.loopback = enabled;
        self
    }

    /// Sets the polarity of the transmit and receive enable outputs.
    pub fn active_low(mut self, tx: bool, rx: bool) -> Self {
        self.config.tx_active_low = tx;
        self.config.rx_active_low = rx;
        self
    }

    /// Sets the response timeout in milliseconds.
    pub fn response_timeout_ms(mut self, ms: u16) -> Self {
        self.config.response_timeout_ms = ms;
        self
    }

    /// Sets the transmit settle delay in microseconds.
    pub fn tx_delay_us(mut self, us: u16) -> Self {
        self.config.tx_delay_us = us;
        self
    }

    /// Sets the mailbox capacities of orchestrator, receiver and transmitter.
    pub fn mailboxes(mut self, hx: usize, rx: usize, tx: usize) -> Self {
        self.config.hx_mailbox = hx;
        self.config.rx_mailbox = rx;
        self.config.tx_mailbox = tx;
        self
    }

    pub fn build(self) -> HxConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SetupError;

    #[test]
    fn test_builder_defaults() {
        let config = HxConfig::builder().loopback(true).response_timeout_ms(50).build();
        assert!(config.loopback);
        assert_eq!(config.response_timeout_ms, 50);
        assert_eq!(config.priority, 1);
        assert_eq!(config.hx_mailbox, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mailbox_limits() {
        let config = HxConfig::builder().mailboxes(4, 0, 4).build();
        assert_eq!(config.validate(), Err(SetupError::MailboxCapacity(0)));
        let config = HxConfig::builder().mailboxes(MAX_QUEUE + 1, 4, 4).build();
        assert_eq!(config.validate(), Err(SetupError::MailboxCapacity(MAX_QUEUE + 1)));
    }
}
