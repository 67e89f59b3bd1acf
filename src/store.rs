//! Bit-exact persistence: dimensions plus the flat parameter buffer encoded
//! as base64 over little-endian IEEE-754 bytes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::NeuralNetwork;
use crate::nn::{Params, param_count};

/// Failure to decode a persisted network.
///
/// Data errors are recoverable and reported to the caller, unlike dimension
/// contract violations, which panic. A failed decode never mutates anything.
#[derive(Debug, Display, Error, From)]
pub enum StoreError {
    /// The container is not well-formed JSON for the expected schema.
    #[display("malformed network document: {_0}")]
    #[from]
    Json(#[error(source)] serde_json::Error),
    /// The layer payload is not valid base64.
    #[display("malformed layer payload: {_0}")]
    #[from]
    Base64(#[error(source)] base64::DecodeError),
    /// The decoded payload is not a whole number of 8-byte floats.
    #[display("layer payload of {len} bytes is not a multiple of 8")]
    Misaligned { len: usize },
    /// A non-empty dimension list needs an input and an output width.
    #[display("a network needs at least two dimensions, got {dims:?}")]
    BadDimensions { dims: Vec<usize> },
    /// The payload holds a different number of floats than the dimensions
    /// call for.
    #[display("dimensions {dims:?} require {want} floats, payload holds {got}")]
    SizeMismatch {
        dims: Vec<usize>,
        want: usize,
        got: usize,
    },
}

/// On-disk shape: `{"dimensions": [d0..dn], "layers": "<base64>"}`. An empty
/// network round-trips through an empty document.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredNetwork {
    dimensions: Vec<usize>,
    layers: String,
}

fn encode_params(values: &[f64]) -> String {
    let mut bytes = Vec::with_capacity(values.len() * 8);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    STANDARD.encode(bytes)
}

fn decode(bytes: &[u8]) -> Result<Params, StoreError> {
    let stored: StoredNetwork = serde_json::from_slice(bytes)?;
    let payload = STANDARD.decode(stored.layers.as_bytes())?;
    if payload.len() % 8 != 0 {
        return Err(StoreError::Misaligned { len: payload.len() });
    }
    if stored.dimensions.len() == 1 {
        return Err(StoreError::BadDimensions {
            dims: stored.dimensions,
        });
    }

    let want = param_count(&stored.dimensions);
    let got = payload.len() / 8;
    if got != want {
        return Err(StoreError::SizeMismatch {
            dims: stored.dimensions,
            want,
            got,
        });
    }
    if stored.dimensions.is_empty() {
        return Ok(Params::empty());
    }

    let mut values = Vec::with_capacity(got);
    for chunk in payload.chunks_exact(8) {
        let mut le = [0u8; 8];
        le.copy_from_slice(chunk);
        values.push(f64::from_le_bytes(le));
    }
    Ok(Params::from_parts(&stored.dimensions, values))
}

impl NeuralNetwork {
    /// Serializes the network as
    /// `{"dimensions": [d0..dn], "layers": "<base64>"}`, the payload being
    /// every parameter as little-endian f64 bytes, in layer order. The round
    /// trip through [`from_json`](Self::from_json) is bit-exact.
    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        let stored = {
            let params = self.params.read();
            StoredNetwork {
                dimensions: params.dims(),
                layers: encode_params(&params.buf),
            }
        };
        Ok(serde_json::to_vec(&stored)?)
    }

    /// Reconstructs a network from [`to_json`](Self::to_json) output, with
    /// fresh scratch pools.
    pub fn from_json(bytes: &[u8]) -> Result<Self, StoreError> {
        let params = decode(bytes)?;
        log::debug!("loaded network with dims {:?}", params.dims());
        Ok(Self::from_params(params))
    }

    /// Replaces this network's parameters with a persisted snapshot and
    /// invalidates both scratch pools, whose cached buffers are sized for
    /// the old topology. The network is untouched if decoding fails.
    ///
    /// Must not race a [`learn`](Self::learn) call on the same network:
    /// weights may only change between whole training calls.
    pub fn restore(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let new_params = decode(bytes)?;
        log::debug!("restoring network with dims {:?}", new_params.dims());
        let mut params = self.params.write();
        *params = new_params;
        self.comp.invalidate();
        self.learn.invalidate();
        Ok(())
    }
}
