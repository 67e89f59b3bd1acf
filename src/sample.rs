/// A labeled training or test sample.
///
/// Produced and owned by an external dataset loader; the engine only reads
/// it. `values` must match the network's input width and `label` (one-hot or
/// soft) its output width.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    pub values: Vec<f64>,
    pub label: Vec<f64>,
}

impl LabeledSample {
    pub fn new(values: Vec<f64>, label: Vec<f64>) -> Self {
        Self { values, label }
    }
}
