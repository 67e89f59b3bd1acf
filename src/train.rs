//! Backpropagation with mini-batch gradient descent, plus the brute-force
//! finite-difference estimator used to validate it.

use crate::nn::{NeuralNetwork, Params, forward};
use crate::{
    LabeledSample, Mat, MatRef, mat, sigmoid_derivative_from_activation,
    softmax_derivative_from_activation,
};

/// Per-layer gradient state for one `learn` call.
struct GradLayer {
    /// Accumulated weight gradient, `[n x n_previous]`.
    dw: Mat,
    /// Accumulated bias gradient, `[n x 1]`.
    db: Mat,
    /// Error propagated backwards through this layer, `[n x 1]`.
    /// Per-sample state, unlike `dw` and `db`.
    err: Mat,
}

/// Training scratch: forward activations plus gradient state, one set per
/// layer. Pooled per network and recycled across `learn` calls.
pub(crate) struct LearnBuffer {
    activations: Box<[Mat]>,
    grads: Box<[GradLayer]>,
}

impl LearnBuffer {
    pub(crate) fn create(params: &Params) -> Self {
        Self {
            activations: params.layers.iter().map(|l| Mat::col(l.n)).collect(),
            grads: params
                .layers
                .iter()
                .map(|l| GradLayer {
                    dw: Mat::new(l.n, l.n_previous),
                    db: Mat::col(l.n),
                    err: Mat::col(l.n),
                })
                .collect(),
        }
    }

    /// Zeroes the accumulated gradients. Activations and error vectors are
    /// overwritten in full by each sample pass, so recycled buffers leak no
    /// state between calls.
    fn clear_gradients(&mut self) {
        for layer in self.grads.iter_mut() {
            mat::zero(layer.dw.view_mut());
            mat::zero(layer.db.view_mut());
        }
    }
}

impl NeuralNetwork {
    /// Runs one mini-batch gradient-descent step: averages the
    /// backpropagation gradient over `batch` and applies
    /// `w -= rate * dw`, `b -= rate * db` under the write lock.
    ///
    /// Does nothing on an empty batch. Weights are read under the read lock
    /// per sample pass and only written once the whole batch gradient is
    /// ready, so a failed or panicking gradient phase leaves the network
    /// untouched.
    ///
    /// # Panics
    ///
    /// Panics if any sample's dimensions don't match the network.
    #[track_caller]
    pub fn learn(&self, batch: &[LabeledSample], rate: f64) {
        if batch.is_empty() {
            return;
        }
        let (epoch, mut buf) = {
            let params = self.params.read();
            self.learn.get_or(|| LearnBuffer::create(&params))
        };
        self.compute_gradient(&mut buf, batch);
        self.apply_gradient(&buf, rate);
        self.learn.put(epoch, buf);
        log::trace!("applied gradient over {} samples at rate {rate}", batch.len());
    }

    fn compute_gradient(&self, buf: &mut LearnBuffer, batch: &[LabeledSample]) {
        buf.clear_gradients();
        for sample in batch {
            let params = self.params.read();
            forward(&params, &mut buf.activations, &sample.values);
            back_propagate_sample(&params, buf, sample);
        }

        // Average once, after the whole batch has been summed. Rescaling
        // inside the per-sample loop would weight samples unevenly.
        let factor = 1.0 / batch.len() as f64;
        for layer in buf.grads.iter_mut() {
            mat::scale(layer.dw.view_mut(), factor);
            mat::scale(layer.db.view_mut(), factor);
        }
    }

    fn apply_gradient(&self, buf: &LearnBuffer, rate: f64) {
        let mut params = self.params.write();
        for (u, grad) in buf.grads.iter().enumerate() {
            let layer = params.layer_mut(u);
            mat::add_smul_assign(layer.w, -rate, grad.dw.view());
            mat::add_smul_assign(layer.b, -rate, grad.db.view());
        }
    }

    /// Brute-force finite-difference estimate of the gradient of
    /// [`cost`](Self::cost) over `batch`, one entry per parameter in flat
    /// buffer order: each parameter is perturbed by `h` and the cost delta
    /// measured.
    ///
    /// Ground truth for validating backpropagation; far too slow to train
    /// with.
    pub fn numeric_gradient(&self, batch: &[LabeledSample], h: f64) -> Vec<f64> {
        let n_params = self.params.read().buf.len();
        let mut gradient = vec![0.0; n_params];
        for (i, slot) in gradient.iter_mut().enumerate() {
            let base = {
                let mut params = self.params.write();
                let base = params.buf[i];
                params.buf[i] = base + h;
                base
            };
            let above = self.cost(batch);
            self.params.write().buf[i] = base - h;
            let below = self.cost(batch);
            self.params.write().buf[i] = base;
            *slot = (above - below) / (2.0 * h);
        }
        gradient
    }
}

/// One backward pass. Expects `buf.activations` to hold the forward pass of
/// `sample`; consumes them (they become derivative values) while summing
/// into `buf.grads`.
fn back_propagate_sample(params: &Params, buf: &mut LearnBuffer, sample: &LabeledSample) {
    let n_layers = params.n_layers();
    if n_layers == 0 {
        return;
    }
    let last = n_layers - 1;

    // Output layer: err = (a - y) ⊙ a*(1-a), the softmax backward via the
    // diagonal approximation, with the derivative taken from the activation
    // value itself.
    {
        let a = &mut buf.activations[last];
        let err = &mut buf.grads[last].err;
        assert_eq!(
            sample.label.len(),
            a.rows(),
            "label length does not match the output layer width",
        );
        for (e, (&ak, &yk)) in err
            .data_mut()
            .iter_mut()
            .zip(a.data().iter().zip(&sample.label))
        {
            *e = ak - yk;
        }
        softmax_derivative_from_activation(a.data_mut());
        mat::hmul_assign(err.view_mut(), a.view());
    }
    accumulate_layer(&buf.activations, &mut buf.grads[last], last, sample);

    // Hidden layers, walking backwards:
    // err_u = (W_{u+1}^T · err_{u+1}) ⊙ a_u*(1-a_u).
    for u in (0..last).rev() {
        {
            let (head, tail) = buf.grads.split_at_mut(u + 1);
            let curr = &mut head[u];
            let err_next = tail[0].err.view();
            let w_next = params.layer(u + 1).w;
            // Row-major lets the transposed product run as row · matrix.
            mat::mul(curr.err.view_mut().as_row(), err_next.as_row(), w_next);

            let a = &mut buf.activations[u];
            mat::apply_assign(a.view_mut(), sigmoid_derivative_from_activation);
            mat::hmul_assign(curr.err.view_mut(), a.view());
        }
        accumulate_layer(&buf.activations, &mut buf.grads[u], u, sample);
    }
}

/// dw += outer(err, a_prev), db += err. The previous layer's activation is
/// still intact at this point; it is only consumed once the walk reaches it.
fn accumulate_layer(activations: &[Mat], grad: &mut GradLayer, u: usize, sample: &LabeledSample) {
    let a_prev = match u.checked_sub(1) {
        None => MatRef::col_from_slice(&sample.values),
        Some(previous) => activations[previous].view(),
    };
    mat::add_mul_assign(grad.dw.view_mut(), grad.err.view(), a_prev.as_row());
    mat::add_assign(grad.db.view_mut(), grad.err.view());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NeuralNetwork;

    fn sample(values: &[f64], label: &[f64]) -> LabeledSample {
        LabeledSample::new(values.to_vec(), label.to_vec())
    }

    /// Recovers the batch gradient a `learn` call applied, exploiting
    /// `w' = w - rate * dw` with rate 1.
    fn applied_gradient(nn: &NeuralNetwork, batch: &[LabeledSample]) -> Vec<f64> {
        let before = nn.params_to_vec();
        nn.learn(batch, 1.0);
        let after = nn.params_to_vec();
        nn.set_params(&before);
        before.iter().zip(&after).map(|(b, a)| b - a).collect()
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let nn = NeuralNetwork::new(&[2, 2]);
        let before = nn.params_to_vec();
        nn.learn(&[], 0.5);
        assert_eq!(nn.params_to_vec(), before);
    }

    #[test]
    fn single_layer_gradient_matches_closed_form() {
        // One softmax layer [2 -> 2] with fixed parameters: the update must
        // equal the hand-derived diagonal-approximation gradient exactly.
        let nn = NeuralNetwork::new(&[2, 2]);
        let params = [0.4, -0.3, 0.1, 0.2, 0.05, -0.05];
        nn.set_params(&params);

        let x = [1.0, -2.0];
        let y = [1.0, 0.0];
        let a = nn.feed_forward(&x).to_vec();

        let e: Vec<f64> = (0..2)
            .map(|k| (a[k] - y[k]) * a[k] * (1.0 - a[k]))
            .collect();
        let want = [
            e[0] * x[0],
            e[0] * x[1],
            e[1] * x[0],
            e[1] * x[1],
            e[0],
            e[1],
        ];

        let got = applied_gradient(&nn, &[sample(&x, &y)]);
        for (g, w) in got.iter().zip(&want) {
            assert!((g - w).abs() < 1e-12, "{g} != {w}");
        }
    }

    #[test]
    fn batch_gradient_is_the_mean_of_sample_gradients() {
        let nn = NeuralNetwork::new(&[3, 4, 2]);
        let s1 = sample(&[0.2, -0.4, 0.8], &[1.0, 0.0]);
        let s2 = sample(&[-0.6, 0.1, 0.3], &[0.0, 1.0]);

        let g1 = applied_gradient(&nn, &[s1.clone()]);
        let g2 = applied_gradient(&nn, &[s2.clone()]);
        let batch = applied_gradient(&nn, &[s1, s2]);

        for ((b, g1), g2) in batch.iter().zip(&g1).zip(&g2) {
            let mean = (g1 + g2) / 2.0;
            assert!((b - mean).abs() < 1e-12, "{b} != {mean}");
        }
    }

    #[test]
    fn repeated_samples_average_to_the_single_gradient() {
        // Pins the rescale-once-after-summation behavior: duplicating a
        // sample must not change the averaged gradient.
        let nn = NeuralNetwork::new(&[2, 3, 2]);
        let s = sample(&[0.7, -0.2], &[0.0, 1.0]);

        let single = applied_gradient(&nn, &[s.clone()]);
        let tripled = applied_gradient(&nn, &[s.clone(), s.clone(), s]);

        for (a, b) in single.iter().zip(&tripled) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn learn_reduces_cost_on_a_fixed_batch() {
        let nn = NeuralNetwork::new(&[2, 2, 2]);
        let params: Vec<f64> = (0..nn.params_to_vec().len())
            .map(|i| (i as f64 * 1.3).cos() * 0.4)
            .collect();
        nn.set_params(&params);
        let batch = [
            sample(&[0.0, 0.0], &[1.0, 0.0]),
            sample(&[0.0, 1.0], &[0.0, 1.0]),
            sample(&[1.0, 0.0], &[0.0, 1.0]),
            sample(&[1.0, 1.0], &[0.0, 1.0]),
        ];

        let start = nn.cost(&batch);
        for _ in 0..1000 {
            nn.learn(&batch, 0.5);
        }
        let end = nn.cost(&batch);
        assert!(
            end < start * 0.75,
            "cost did not materially decrease: {start} -> {end}",
        );
    }

    #[test]
    fn backprop_matches_finite_difference() {
        // With two outputs and labels summing to 1, the exact softmax
        // Jacobian product is exactly twice the diagonal term
        // (dC/dz0 = 2*a0*(1-a0)*(a0-y0)), so the diagonal backward computes
        // the gradient of half the cost for every parameter. The brute-force
        // estimate of the cost gradient must equal twice the backprop
        // gradient; a drift in either side breaks the exact factor.
        let nn = NeuralNetwork::new(&[2, 3, 2]);
        let params: Vec<f64> = (0..nn.params_to_vec().len())
            .map(|i| (i as f64 * 0.7).sin() * 0.5)
            .collect();
        nn.set_params(&params);

        let batch = [
            sample(&[0.3, -0.8], &[1.0, 0.0]),
            sample(&[-0.5, 0.2], &[0.0, 1.0]),
            sample(&[0.9, 0.4], &[0.3, 0.7]),
        ];

        let numeric = nn.numeric_gradient(&batch, 1e-5);
        let backprop = applied_gradient(&nn, &batch);

        assert_eq!(numeric.len(), backprop.len());
        for (n, b) in numeric.iter().zip(&backprop) {
            assert!((n - 2.0 * b).abs() < 1e-6, "numeric {n} vs backprop {b}");
        }
    }

    #[test]
    fn numeric_gradient_restores_parameters() {
        let nn = NeuralNetwork::new(&[2, 2]);
        let before = nn.params_to_vec();
        let _ = nn.numeric_gradient(&[sample(&[0.5, 0.5], &[1.0, 0.0])], 1e-5);
        assert_eq!(nn.params_to_vec(), before);
    }
}
