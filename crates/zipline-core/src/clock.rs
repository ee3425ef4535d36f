use jiff::Timestamp;

/// Source of the current time for the code generator.
///
/// Abstracted so tests can drive the generator with a deterministic
/// clock instead of the system one.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time of the clock.
    fn now(&self) -> Timestamp;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
