//! Scalar nonlinearities used by the forward and backward passes.

/// Logistic sigmoid, `1 / (1 + e^-x)`.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + f64::exp(-x))
}

/// `σ'(x) = σ(x) * (1 - σ(x))`, evaluated at the pre-activation.
pub fn sigmoid_derivative(x: f64) -> f64 {
    let sig = sigmoid(x);
    sig * (1.0 - sig)
}

/// `σ'` recovered from the activation value itself: for `a = σ(x)`,
/// `σ'(x) = a * (1 - a)`. Backprop uses this form, reading the stored
/// activations instead of re-evaluating at the pre-activation.
pub fn sigmoid_derivative_from_activation(a: f64) -> f64 {
    a * (1.0 - a)
}

/// Normalizes `values` in place into a probability distribution:
/// `v[i] = e^v[i] / Σ_j e^v[j]`.
pub fn softmax(values: &mut [f64]) {
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = f64::exp(*v);
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

/// In-place softmax backward via the diagonal approximation `a * (1 - a)`,
/// ignoring the cross terms of the full Jacobian. Intentional: the engine's
/// learning dynamics are defined in terms of this approximation.
pub fn softmax_derivative_from_activation(values: &mut [f64]) {
    for v in values.iter_mut() {
        *v = *v * (1.0 - *v);
    }
}
