//! Fixed-window moving average with a running sum.

/// Circular moving average over the last `N` samples.
///
/// Seeding fills every slot with the same value so the first readings
/// after boot do not ramp up from zero.
#[derive(Debug, Clone)]
pub struct MovingAverage<const N: usize> {
    ring: [f32; N],
    head: usize,
    sum: f32,
}

impl<const N: usize> MovingAverage<N> {
    pub const fn new() -> Self {
        Self {
            ring: [0.0; N],
            head: 0,
            sum: 0.0,
        }
    }

    /// Overwrite every slot with `value`.
    pub fn seed(&mut self, value: f32) {
        self.ring = [value; N];
        self.head = 0;
        self.sum = value * N as f32;
    }

    /// Replace the oldest sample and return the new average.
    pub fn push(&mut self, value: f32) -> f32 {
        self.sum -= self.ring[self.head];
        self.ring[self.head] = value;
        self.sum += value;
        self.head = (self.head + 1) % N;
        self.average()
    }

    pub fn average(&self) -> f32 {
        if N == 0 {
            return 0.0;
        }
        self.sum / N as f32
    }
}

impl<const N: usize> Default for MovingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}
