//! Training events and the context passed to their callbacks.

use std::collections::BTreeMap;
use std::fmt;

use kakari_core::data::Batch;
use kakari_core::DependencyParser;

/// Points in the training loop where listeners and hooks are notified.
///
/// Variants are listed in firing order. `EpochValidateBegin` and
/// `EpochValidateEnd` only fire when validation data is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    TrainBegin,
    EpochBegin,
    EpochTrainBegin,
    BatchBegin,
    BatchEnd,
    EpochTrainEnd,
    EpochValidateBegin,
    EpochValidateEnd,
    EpochEnd,
    TrainEnd,
}

impl Event {
    pub const ALL: [Event; 10] = [
        Event::TrainBegin,
        Event::EpochBegin,
        Event::EpochTrainBegin,
        Event::BatchBegin,
        Event::BatchEnd,
        Event::EpochTrainEnd,
        Event::EpochValidateBegin,
        Event::EpochValidateEnd,
        Event::EpochEnd,
        Event::TrainEnd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Event::TrainBegin => "train_begin",
            Event::EpochBegin => "epoch_begin",
            Event::EpochTrainBegin => "epoch_train_begin",
            Event::BatchBegin => "batch_begin",
            Event::BatchEnd => "batch_end",
            Event::EpochTrainEnd => "epoch_train_end",
            Event::EpochValidateBegin => "epoch_validate_begin",
            Event::EpochValidateEnd => "epoch_validate_end",
            Event::EpochEnd => "epoch_end",
            Event::TrainEnd => "train_end",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Mean {
    sum: f64,
    count: usize,
}

/// Named values reported during one phase (an epoch's training or
/// validation pass). Repeated reports of a name are averaged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    values: BTreeMap<String, Mean>,
}

impl Observation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` to the running mean of `name`.
    pub fn report(&mut self, name: &str, value: f64) {
        let mean = self.values.entry(name.to_string()).or_default();
        mean.sum += value;
        mean.count += 1;
    }

    /// Replaces whatever was reported under `name`.
    pub fn set(&mut self, name: &str, value: f64) {
        self.values
            .insert(name.to_string(), Mean { sum: value, count: 1 });
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .get(name)
            .filter(|m| m.count > 0)
            .map(|m| m.sum / m.count as f64)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.values
            .iter()
            .map(|(name, m)| (name.as_str(), m.sum / m.count.max(1) as f64))
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value:.4}")?;
        }
        Ok(())
    }
}

/// State visible to listeners and hooks when an event fires.
pub struct EventContext<'a, M: DependencyParser> {
    pub event: Event,
    pub model: &'a M,
    /// 1-based; 0 outside any epoch.
    pub epoch: usize,
    pub n_epoch: usize,
    /// Whether the current phase updates parameters.
    pub train: bool,
    /// Number of sentences in the current phase.
    pub size: usize,
    /// Set for `BatchBegin` and `BatchEnd`.
    pub batch: Option<Batch<'a>>,
    /// Model output, set for `BatchEnd`.
    pub ys: Option<&'a M::Output>,
    /// Batch loss, set for `BatchEnd`.
    pub loss: Option<f64>,
    pub observation: &'a mut Observation,
}

impl<'a, M: DependencyParser> EventContext<'a, M> {
    /// A context outside any epoch or batch.
    pub fn new(event: Event, model: &'a M, observation: &'a mut Observation) -> Self {
        Self {
            event,
            model,
            epoch: 0,
            n_epoch: 0,
            train: false,
            size: 0,
            batch: None,
            ys: None,
            loss: None,
            observation,
        }
    }
}
