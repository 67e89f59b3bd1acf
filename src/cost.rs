//! Cost and accuracy scoring over labeled datasets.

use rayon::prelude::*;

use crate::{LabeledSample, NeuralNetwork};

/// Squared error of a single output unit.
pub fn node_cost(output: f64, expected: f64) -> f64 {
    let diff = output - expected;
    diff * diff
}

fn arg_max(values: &[f64]) -> usize {
    let mut index = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[index] {
            index = i;
        }
    }
    index
}

impl NeuralNetwork {
    /// Half squared error of the network output against the sample label.
    ///
    /// # Panics
    ///
    /// Panics if the sample's dimensions don't match the network.
    #[track_caller]
    pub fn sample_cost(&self, sample: &LabeledSample) -> f64 {
        let output = self.feed_forward(&sample.values);
        assert_eq!(
            output.len(),
            sample.label.len(),
            "label length does not match the output layer width",
        );
        let cost: f64 = output
            .iter()
            .zip(&sample.label)
            .map(|(&o, &e)| node_cost(o, e))
            .sum();
        cost * 0.5
    }

    /// Mean [`sample_cost`](Self::sample_cost) over `dataset`; 0 for an
    /// empty dataset.
    pub fn cost(&self, dataset: &[LabeledSample]) -> f64 {
        if dataset.is_empty() {
            return 0.0;
        }
        let total: f64 = dataset.iter().map(|s| self.sample_cost(s)).sum();
        total / dataset.len() as f64
    }

    /// Arg-max accuracy and mean cost over `dataset`: how many samples the
    /// network classifies correctly (highest output at the label's highest
    /// entry), and the mean half squared error.
    ///
    /// Runs in parallel; every worker borrows its own pooled computation
    /// buffer and reads the weights under the shared read lock.
    pub fn score(&self, dataset: &[LabeledSample]) -> (usize, f64) {
        if dataset.is_empty() {
            return (0, 0.0);
        }
        let (correct, total) = dataset
            .par_iter()
            .map(|sample| {
                let output = self.feed_forward(&sample.values);
                let hit = arg_max(&output) == arg_max(&sample.label);
                let cost: f64 = output
                    .iter()
                    .zip(&sample.label)
                    .map(|(&o, &e)| node_cost(o, e))
                    .sum();
                (hit as usize, cost * 0.5)
            })
            .reduce(|| (0, 0.0), |x, y| (x.0 + y.0, x.1 + y.1));
        (correct, total / dataset.len() as f64)
    }
}
