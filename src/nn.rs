//! The network model: a flat parameter buffer sliced into layers, plus the
//! forward engine running against pooled scratch activations.

use std::fmt::{self, Debug};
use std::mem::ManuallyDrop;
use std::ops::Deref;

use parking_lot::RwLock;
use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::pool::Pool;
use crate::train::LearnBuffer;
use crate::{Mat, MatMut, MatRef, mat, sigmoid, softmax};

/// Shape and offsets of one layer inside the flat parameter buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LayerShape {
    /// Neuron count of this layer (rows of the weight matrix).
    pub(crate) n: usize,
    /// Neuron count of the previous layer (columns of the weight matrix).
    pub(crate) n_previous: usize,
    pub(crate) w_off: usize,
    pub(crate) b_off: usize,
}

/// Immutable view of one layer's parameters.
#[derive(Debug, Clone, Copy)]
pub struct LayerRef<'a> {
    pub n: usize,
    pub n_previous: usize,
    /// Weights, `[n x n_previous]`.
    pub w: MatRef<'a>,
    /// Biases, `[n x 1]`.
    pub b: MatRef<'a>,
}

/// Mutable view of one layer's parameters.
#[derive(Debug)]
pub struct LayerMut<'a> {
    pub n: usize,
    pub n_previous: usize,
    pub w: MatMut<'a>,
    pub b: MatMut<'a>,
}

/// Weights and biases of every layer, backed by one contiguous buffer.
///
/// Layer `i` maps `dims[i]` neurons to `dims[i+1]`; its weight matrix and
/// bias vector are adjacent slices of the buffer, in layer order. The whole
/// network is a single allocation, which also makes persistence a flat copy.
pub(crate) struct Params {
    pub(crate) buf: Box<[f64]>,
    pub(crate) layers: Box<[LayerShape]>,
}

/// Total parameter count for the given dimensions,
/// `Σ(dims[i+1] * dims[i] + dims[i+1])`.
pub(crate) fn param_count(dims: &[usize]) -> usize {
    dims.windows(2).map(|w| w[1] * w[0] + w[1]).sum()
}

fn layer_shapes(dims: &[usize]) -> Box<[LayerShape]> {
    let mut offset = 0;
    dims.windows(2)
        .map(|w| {
            let (n_previous, n) = (w[0], w[1]);
            let shape = LayerShape {
                n,
                n_previous,
                w_off: offset,
                b_off: offset + n * n_previous,
            };
            offset = shape.b_off + n;
            shape
        })
        .collect()
}

impl Params {
    /// Zeroed parameters for the given dimensions. `dims.len() >= 2` is the
    /// caller's responsibility.
    pub(crate) fn create(dims: &[usize]) -> Self {
        debug_assert!(dims.len() >= 2);
        Self {
            buf: bytemuck::zeroed_slice_box(param_count(dims)),
            layers: layer_shapes(dims),
        }
    }

    /// Parameters restored from a flat buffer, e.g. a persisted snapshot.
    /// `values.len()` must equal [`param_count`] of `dims`.
    pub(crate) fn from_parts(dims: &[usize], values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), param_count(dims));
        Self {
            buf: values.into_boxed_slice(),
            layers: layer_shapes(dims),
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            buf: Box::new([]),
            layers: Box::new([]),
        }
    }

    /// Fills every parameter with an independent standard-normal draw.
    pub(crate) fn randomize(&mut self) {
        let mut rng = rand::rng();
        for p in self.buf.iter_mut() {
            *p = StandardNormal.sample(&mut rng);
        }
    }

    pub(crate) fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// Reconstructs the dimension list `[d0, .., dn]` from the layer shapes.
    pub(crate) fn dims(&self) -> Vec<usize> {
        let Some(first) = self.layers.first() else {
            return Vec::new();
        };
        let mut dims = Vec::with_capacity(self.layers.len() + 1);
        dims.push(first.n_previous);
        dims.extend(self.layers.iter().map(|l| l.n));
        dims
    }

    pub(crate) fn layer(&self, index: usize) -> LayerRef<'_> {
        let shape = self.layers[index];
        LayerRef {
            n: shape.n,
            n_previous: shape.n_previous,
            w: MatRef::from_slice(
                shape.n,
                shape.n_previous,
                &self.buf[shape.w_off..shape.b_off],
            ),
            b: MatRef::col_from_slice(&self.buf[shape.b_off..shape.b_off + shape.n]),
        }
    }

    pub(crate) fn layer_mut(&mut self, index: usize) -> LayerMut<'_> {
        let shape = self.layers[index];
        let span = &mut self.buf[shape.w_off..shape.b_off + shape.n];
        let (w, b) = span.split_at_mut(shape.n * shape.n_previous);
        LayerMut {
            n: shape.n,
            n_previous: shape.n_previous,
            w: MatMut::from_slice(shape.n, shape.n_previous, w),
            b: MatMut::col_from_slice(b),
        }
    }
}

/// Forward-pass scratch: one activation vector per layer.
pub(crate) struct CompBuffer {
    pub(crate) activations: Box<[Mat]>,
}

impl CompBuffer {
    pub(crate) fn create(params: &Params) -> Self {
        Self {
            activations: params.layers.iter().map(|l| Mat::col(l.n)).collect(),
        }
    }
}

/// Layer-by-layer forward pass: `a = σ(W · a_prev + b)` for every hidden
/// layer, softmax over the logits of the last. Every activation slot is
/// overwritten in full, so recycled scratch carries no state across calls.
///
/// # Panics
///
/// Panics if `input` doesn't match the input width, or if `activations`
/// wasn't sized for `params`.
pub(crate) fn forward(params: &Params, activations: &mut [Mat], input: &[f64]) {
    let n_layers = params.n_layers();
    assert_eq!(activations.len(), n_layers, "scratch does not match topology");
    if n_layers == 0 {
        return;
    }
    assert_eq!(
        input.len(),
        params.layers[0].n_previous,
        "input length does not match the input layer width",
    );

    for u in 0..n_layers {
        let layer = params.layer(u);
        let (prev, rest) = activations.split_at_mut(u);
        let act = &mut rest[0];
        let a_prev = match prev.last() {
            None => MatRef::col_from_slice(input),
            Some(prev) => prev.view(),
        };

        // a = W * a_prev + b, then the nonlinearity.
        mat::add_mul(act.view_mut(), layer.b, layer.w, a_prev);
        if u + 1 == n_layers {
            softmax(act.data_mut());
        } else {
            mat::apply_assign(act.view_mut(), sigmoid);
        }
    }
}

/// A dense, fully-connected MLP: sigmoid hidden layers, softmax output.
///
/// Safe for concurrent use: [`feed_forward`](Self::feed_forward) and scoring
/// take the read lock for a whole traversal, [`learn`](Self::learn) takes
/// the write lock only to apply the averaged gradient. Scratch buffers come
/// from per-network pools, so steady-state inference and training allocate
/// nothing.
pub struct NeuralNetwork {
    pub(crate) params: RwLock<Params>,
    pub(crate) comp: Pool<CompBuffer>,
    pub(crate) learn: Pool<LearnBuffer>,
}

impl NeuralNetwork {
    /// Creates a network with the given layer widths, `dims[0]` being the
    /// input width, filled with independent standard-normal draws.
    ///
    /// # Panics
    ///
    /// Panics if fewer than two dimensions are given.
    #[track_caller]
    pub fn new(dims: &[usize]) -> Self {
        assert!(
            dims.len() >= 2,
            "a network needs at least two dimensions, got {}",
            dims.len(),
        );
        let mut params = Params::create(dims);
        params.randomize();
        log::debug!(
            "created network with dims {dims:?} ({} parameters)",
            params.buf.len(),
        );
        Self::from_params(params)
    }

    /// A zero-layer network. Feeding forward yields an empty output and
    /// learning is a no-op.
    pub fn empty() -> Self {
        Self::from_params(Params::empty())
    }

    pub(crate) fn from_params(params: Params) -> Self {
        Self {
            params: RwLock::new(params),
            comp: Pool::new(),
            learn: Pool::new(),
        }
    }

    /// Number of weight layers.
    pub fn n_layers(&self) -> usize {
        self.params.read().n_layers()
    }

    /// Input width, 0 for an empty network.
    pub fn input_len(&self) -> usize {
        self.params.read().layers.first().map_or(0, |l| l.n_previous)
    }

    /// Output width, 0 for an empty network.
    pub fn output_len(&self) -> usize {
        self.params.read().layers.last().map_or(0, |l| l.n)
    }

    /// The dimension list `[d0, .., dn]`, reconstructed from the layers.
    pub fn dims(&self) -> Vec<usize> {
        self.params.read().dims()
    }

    /// Copies out the flat parameter buffer, in layer order, weights before
    /// biases.
    pub fn params_to_vec(&self) -> Vec<f64> {
        self.params.read().buf.to_vec()
    }

    /// Overwrites the flat parameter buffer.
    ///
    /// # Panics
    ///
    /// Panics if `values.len()` differs from the network's parameter count.
    #[track_caller]
    pub fn set_params(&self, values: &[f64]) {
        let mut params = self.params.write();
        assert_eq!(
            values.len(),
            params.buf.len(),
            "parameter count does not match the topology",
        );
        params.buf.copy_from_slice(values);
    }

    /// Computes the network output for `input`.
    ///
    /// The returned [`Output`] aliases a pooled scratch buffer and hands it
    /// back for reuse when dropped; copy it out with [`Output::to_vec`] to
    /// keep it longer.
    ///
    /// Holds the read lock for the whole traversal, so every call sees one
    /// consistent set of weights; concurrent calls are safe with each other
    /// and are excluded while [`learn`](Self::learn) writes weights.
    ///
    /// # Panics
    ///
    /// Panics if `input.len()` differs from the input width.
    #[track_caller]
    pub fn feed_forward(&self, input: &[f64]) -> Output<'_> {
        let params = self.params.read();
        let (epoch, mut comp) = self.comp.get_or(|| CompBuffer::create(&params));
        forward(&params, &mut comp.activations, input);
        drop(params);
        Output {
            pool: &self.comp,
            epoch,
            comp: ManuallyDrop::new(comp),
        }
    }
}

impl Default for NeuralNetwork {
    fn default() -> Self {
        Self::empty()
    }
}

impl Debug for NeuralNetwork {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let params = self.params.read();
        f.debug_struct("NeuralNetwork")
            .field("dims", &params.dims())
            .field("n_params", &params.buf.len())
            .finish()
    }
}

/// Output of a forward pass, dereferencing to the output activations.
///
/// Owns the pool slot it aliases: the scratch buffer goes back to the
/// network's pool when this guard drops.
pub struct Output<'a> {
    pool: &'a Pool<CompBuffer>,
    epoch: u64,
    comp: ManuallyDrop<CompBuffer>,
}

impl Output<'_> {
    pub fn to_vec(&self) -> Vec<f64> {
        self.deref().to_vec()
    }
}

impl Deref for Output<'_> {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        match self.comp.activations.last() {
            Some(a) => a.data(),
            None => &[],
        }
    }
}

impl Drop for Output<'_> {
    fn drop(&mut self) {
        // Safety: `comp` is moved out exactly once, here, and not used again.
        let comp = unsafe { ManuallyDrop::take(&mut self.comp) };
        self.pool.put(self.epoch, comp);
    }
}
