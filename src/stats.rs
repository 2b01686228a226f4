use std::collections::VecDeque;

/// How a smoothed statistic folds a new observation into its value.
pub trait UpdateRule {
    fn apply(&mut self, previous: Option<f32>, observation: f32) -> f32;
}

/// Exponential moving average; the first observation seeds the value.
#[derive(Clone, Copy, Debug)]
pub struct Ema {
    /// weight of the previous value
    pub ratio: f32,
}

impl UpdateRule for Ema {
    fn apply(&mut self, previous: Option<f32>, observation: f32) -> f32 {
        match previous {
            Some(average) => average * self.ratio + observation * (1.0 - self.ratio),
            None => observation,
        }
    }
}

/// Plain mean over the last `len` observations.
#[derive(Clone, Debug)]
pub struct RollingMean {
    history: VecDeque<f32>,
}

impl RollingMean {
    /// A window that starts out filled with `len` copies of `initial`.
    pub fn filled(len: usize, initial: f32) -> Self {
        assert!(len != 0);
        RollingMean {
            history: std::iter::repeat(initial).take(len).collect(),
        }
    }

    pub fn newest(&self) -> Option<f32> {
        self.history.back().cloned()
    }

    fn mean(&self) -> f32 {
        self.history.iter().sum::<f32>() / self.history.len() as f32
    }
}

impl UpdateRule for RollingMean {
    fn apply(&mut self, _previous: Option<f32>, observation: f32) -> f32 {
        self.history.pop_front();
        self.history.push_back(observation);
        self.mean()
    }
}

#[derive(Clone, Debug)]
pub struct Smoothed<R> {
    rule: R,
    value: Option<f32>,
}

impl<R: UpdateRule> Smoothed<R> {
    pub fn new(rule: R) -> Self {
        Smoothed {
            rule: rule,
            value: None,
        }
    }

    pub fn push(&mut self, observation: f32) -> f32 {
        let value = self.rule.apply(self.value, observation);
        self.value = Some(value);
        value
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn rule(&self) -> &R {
        &self.rule
    }
}

impl Smoothed<RollingMean> {
    pub fn rolling(len: usize, initial: f32) -> Self {
        let rule = RollingMean::filled(len, initial);
        Smoothed {
            value: Some(rule.mean()),
            rule: rule,
        }
    }
}
