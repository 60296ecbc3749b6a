//! Hardware countdown timer abstraction

/// One hardware countdown timer, ticking once per microsecond.
///
/// The timer counts down from the value loaded by [`arm`](Self::arm) and
/// raises its expiry interrupt once when it reaches zero. The interrupt
/// handler must call [`TimerDaemon::on_timeout`](crate::TimerDaemon::on_timeout)
/// for the matching bank.
pub trait CountdownTimer {
    /// Largest value [`arm`](Self::arm) accepts
    const MAX_TICKS: u32 = u32::MAX;

    /// Stop counting and discard a pending expiry interrupt
    fn disable(&mut self);

    /// Value loaded by the last `arm`
    fn reload_value(&self) -> u32;

    /// Current count
    fn counter(&self) -> u32;

    /// Load `ticks` and start counting down
    fn arm(&mut self, ticks: u32);

    /// Ticks consumed since the last `arm`
    fn elapsed(&self) -> u32 {
        self.reload_value().saturating_sub(self.counter())
    }
}
