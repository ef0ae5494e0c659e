/// A single measured value and the (probe clock) time it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub timestamp: i64,
}

/// Running statistics for one sensor: last, min, max, and the most recent
/// sample that took the value from above `threshold` to below it.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorStats {
    threshold: f64,
    last: Option<Sample>,
    min: Option<Sample>,
    max: Option<Sample>,
    dipped: Option<Sample>,
}

impl SensorStats {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last: None,
            min: None,
            max: None,
            dipped: None,
        }
    }

    pub fn record(&mut self, sample: Sample) {
        if self.max.is_none_or(|m| sample.value > m.value) {
            self.max = Some(sample);
        }
        if self.min.is_none_or(|m| sample.value < m.value) {
            self.min = Some(sample);
        }
        if let Some(last) = self.last {
            if sample.value < self.threshold && last.value > self.threshold {
                self.dipped = Some(sample);
            }
        }
        self.last = Some(sample);
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn last(&self) -> Option<Sample> {
        self.last
    }

    pub fn min(&self) -> Option<Sample> {
        self.min
    }

    pub fn max(&self) -> Option<Sample> {
        self.max
    }

    pub fn dipped(&self) -> Option<Sample> {
        self.dipped
    }
}
