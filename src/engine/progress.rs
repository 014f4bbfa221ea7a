use std::sync::atomic::{AtomicU32, Ordering};

/// Completion fraction shared between a background task and its observers.
///
/// Values stay within `0.0..=1.0` and only increase until [`ProgressCell::reset`].
#[derive(Debug, Default)]
pub struct ProgressCell(AtomicU32);

impl ProgressCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Raise the stored fraction to `value`; lower values are ignored.
    pub fn advance(&self, value: f32) {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (value > f32::from_bits(bits)).then_some(value.to_bits())
            });
    }

    /// Start over at zero for the next unit of work.
    pub fn reset(&self) {
        self.0.store(0f32.to_bits(), Ordering::Release);
    }

    pub fn complete(&self) {
        self.advance(1.0);
    }

    pub fn is_complete(&self) -> bool {
        self.get() >= 1.0
    }
}
