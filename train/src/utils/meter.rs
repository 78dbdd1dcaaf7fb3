use crate::common::*;

/// Windowed moving average over the most recent values.
#[derive(Debug, Clone)]
pub struct MovingAverageMeter {
    window: VecDeque<f64>,
    capacity: usize,
}

impl MovingAverageMeter {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn add(&mut self, value: f64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);
    }

    pub fn value(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
    }
}
