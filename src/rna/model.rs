// projeto: lstmcotacao
// file: src/rna/model.rs

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::LstmError;

/// Architecture description persisted alongside the weights. Load-time
/// reconstruction builds an identically-shaped network from this struct
/// before any weight is read; the two must never drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub dropout_rate: f64,
    pub seq_length: usize,
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), LstmError> {
        if self.input_size != 1 {
            return Err(LstmError::InvalidInput(format!(
                "input_size must be 1 (single closing-price feature), got {}",
                self.input_size
            )));
        }
        if self.hidden_size == 0 || self.num_layers == 0 || self.seq_length == 0 {
            return Err(LstmError::InvalidInput(
                "hidden_size, num_layers and seq_length must all be >= 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(LstmError::InvalidInput(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        Ok(())
    }
}

/// Per-gate weights of one LSTM layer. `w_*` act on the layer input, `w_h*`
/// on the previous hidden state; i/f/g/o are the input, forget, cell and
/// output gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayerWeights {
    pub w_ii: Array2<f64>,
    pub w_if: Array2<f64>,
    pub w_ig: Array2<f64>,
    pub w_io: Array2<f64>,
    pub w_hi: Array2<f64>,
    pub w_hf: Array2<f64>,
    pub w_hg: Array2<f64>,
    pub w_ho: Array2<f64>,
    pub b_i: Array1<f64>,
    pub b_f: Array1<f64>,
    pub b_g: Array1<f64>,
    pub b_o: Array1<f64>,
}

impl LstmLayerWeights {
    fn random<R: Rng>(
        input_size: usize,
        hidden_size: usize,
        dist: &Normal<f64>,
        rng: &mut R,
    ) -> Self {
        let mat =
            |rows, cols, rng: &mut R| Array2::from_shape_fn((rows, cols), |_| dist.sample(rng));
        let vec = |len, rng: &mut R| Array1::from_shape_fn(len, |_| dist.sample(rng));
        LstmLayerWeights {
            w_ii: mat(hidden_size, input_size, rng),
            w_if: mat(hidden_size, input_size, rng),
            w_ig: mat(hidden_size, input_size, rng),
            w_io: mat(hidden_size, input_size, rng),
            w_hi: mat(hidden_size, hidden_size, rng),
            w_hf: mat(hidden_size, hidden_size, rng),
            w_hg: mat(hidden_size, hidden_size, rng),
            w_ho: mat(hidden_size, hidden_size, rng),
            b_i: vec(hidden_size, rng),
            b_f: vec(hidden_size, rng),
            b_g: vec(hidden_size, rng),
            b_o: vec(hidden_size, rng),
        }
    }

    fn zeros(input_size: usize, hidden_size: usize) -> Self {
        LstmLayerWeights {
            w_ii: Array2::zeros((hidden_size, input_size)),
            w_if: Array2::zeros((hidden_size, input_size)),
            w_ig: Array2::zeros((hidden_size, input_size)),
            w_io: Array2::zeros((hidden_size, input_size)),
            w_hi: Array2::zeros((hidden_size, hidden_size)),
            w_hf: Array2::zeros((hidden_size, hidden_size)),
            w_hg: Array2::zeros((hidden_size, hidden_size)),
            w_ho: Array2::zeros((hidden_size, hidden_size)),
            b_i: Array1::zeros(hidden_size),
            b_f: Array1::zeros(hidden_size),
            b_g: Array1::zeros(hidden_size),
            b_o: Array1::zeros(hidden_size),
        }
    }

    /// One cell step: gate activations, new cell state, new hidden state.
    fn step(
        &self,
        x: &Array1<f64>,
        h_prev: &Array1<f64>,
        c_prev: &Array1<f64>,
    ) -> (Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>) {
        let i = sigmoid(&(self.w_ii.dot(x) + self.w_hi.dot(h_prev) + &self.b_i));
        let f = sigmoid(&(self.w_if.dot(x) + self.w_hf.dot(h_prev) + &self.b_f));
        let g = tanh(&(self.w_ig.dot(x) + self.w_hg.dot(h_prev) + &self.b_g));
        let o = sigmoid(&(self.w_io.dot(x) + self.w_ho.dot(h_prev) + &self.b_o));
        let c = &f * c_prev + &i * &g;
        let h = &o * &c.mapv(f64::tanh);
        (i, f, g, o, c, h)
    }
}

fn sigmoid(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|v| 1.0 / (1.0 + (-v.clamp(-500.0, 500.0)).exp()))
}

fn tanh(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(f64::tanh)
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let a2 = a.view().insert_axis(Axis(1));
    let b2 = b.view().insert_axis(Axis(0));
    a2.dot(&b2)
}

/// Everything `backward` needs from one forward pass of one sample.
pub(crate) struct GateCache {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c: Array1<f64>,
}

pub(crate) struct ForwardCache {
    steps: Vec<Vec<GateCache>>, // indexed [timestep][layer]
    h_dropped: Array1<f64>,
    mask: Array1<f64>,
    pub prediction: f64,
}

/// Gradient accumulator mirroring the weight layout.
pub(crate) struct Gradients {
    layers: Vec<LstmLayerWeights>,
    w_out: Array1<f64>,
    b_out: f64,
}

impl Gradients {
    pub(crate) fn zeros(config: &ModelConfig) -> Self {
        let layers = (0..config.num_layers)
            .map(|l| {
                let input = if l == 0 { config.input_size } else { config.hidden_size };
                LstmLayerWeights::zeros(input, config.hidden_size)
            })
            .collect();
        Gradients {
            layers,
            w_out: Array1::zeros(config.hidden_size),
            b_out: 0.0,
        }
    }

    pub(crate) fn flatten(&self) -> Vec<f64> {
        flatten_parts(&self.layers, &self.w_out, self.b_out)
    }
}

fn flatten_parts(layers: &[LstmLayerWeights], w_out: &Array1<f64>, b_out: f64) -> Vec<f64> {
    let mut flat = Vec::new();
    for layer in layers {
        flat.extend(layer.w_ii.iter());
        flat.extend(layer.w_if.iter());
        flat.extend(layer.w_ig.iter());
        flat.extend(layer.w_io.iter());
        flat.extend(layer.w_hi.iter());
        flat.extend(layer.w_hf.iter());
        flat.extend(layer.w_hg.iter());
        flat.extend(layer.w_ho.iter());
        flat.extend(layer.b_i.iter());
        flat.extend(layer.b_f.iter());
        flat.extend(layer.b_g.iter());
        flat.extend(layer.b_o.iter());
    }
    flat.extend(w_out.iter());
    flat.push(b_out);
    flat
}

/// Stacked LSTM followed by training-time dropout on the last hidden state
/// and a single linear projection to one normalized scalar. Carries its own
/// `ModelConfig` so persistence can rebuild an identically-shaped network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiLayerLstm {
    config: ModelConfig,
    layers: Vec<LstmLayerWeights>,
    w_out: Array1<f64>,
    b_out: f64,
}

impl MultiLayerLstm {
    pub fn new<R: Rng>(config: ModelConfig, rng: &mut R) -> Result<Self, LstmError> {
        config.validate()?;
        let std = (1.0 / config.hidden_size as f64).sqrt();
        let dist = Normal::new(0.0, std).map_err(|e| LstmError::Computation {
            stage: "weight initialization",
            reason: e.to_string(),
        })?;
        let layers = (0..config.num_layers)
            .map(|l| {
                let input = if l == 0 { config.input_size } else { config.hidden_size };
                LstmLayerWeights::random(input, config.hidden_size, &dist, rng)
            })
            .collect();
        let w_out = Array1::from_shape_fn(config.hidden_size, |_| dist.sample(rng));
        Ok(MultiLayerLstm { config, layers, w_out, b_out: 0.0 })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Inference forward pass over one normalized window. Dropout is
    /// inactive; the output is the normalized next-value prediction.
    pub fn forward(&self, window: &[f64]) -> Result<f64, LstmError> {
        if window.len() != self.config.seq_length {
            return Err(LstmError::ShapeMismatch(format!(
                "window length {} does not match configured seq_length {}",
                window.len(),
                self.config.seq_length
            )));
        }
        let hidden = self.config.hidden_size;
        let mut h = vec![Array1::zeros(hidden); self.config.num_layers];
        let mut c = vec![Array1::zeros(hidden); self.config.num_layers];
        for &value in window {
            let mut x = Array1::from_vec(vec![value]);
            for (l, layer) in self.layers.iter().enumerate() {
                let (_, _, _, _, c_new, h_new) = layer.step(&x, &h[l], &c[l]);
                h[l] = h_new;
                c[l] = c_new;
                x = h[l].clone();
            }
        }
        let output = self.w_out.dot(&h[self.config.num_layers - 1]) + self.b_out;
        if output.is_finite() {
            Ok(output)
        } else {
            Err(LstmError::Computation {
                stage: "forward pass",
                reason: format!("non-finite output {output}"),
            })
        }
    }

    /// Training forward pass: caches every gate activation for BPTT and
    /// applies the inverted-dropout `mask` to the last hidden state before
    /// the linear head.
    pub(crate) fn forward_train(
        &self,
        window: &[f64],
        mask: &Array1<f64>,
    ) -> Result<ForwardCache, LstmError> {
        if window.len() != self.config.seq_length {
            return Err(LstmError::ShapeMismatch(format!(
                "window length {} does not match configured seq_length {}",
                window.len(),
                self.config.seq_length
            )));
        }
        let hidden = self.config.hidden_size;
        let num_layers = self.config.num_layers;
        let mut h = vec![Array1::zeros(hidden); num_layers];
        let mut c = vec![Array1::zeros(hidden); num_layers];
        let mut steps = Vec::with_capacity(window.len());

        for &value in window {
            let mut x = Array1::from_vec(vec![value]);
            let mut step_caches = Vec::with_capacity(num_layers);
            for (l, layer) in self.layers.iter().enumerate() {
                let (i, f, g, o, c_new, h_new) = layer.step(&x, &h[l], &c[l]);
                step_caches.push(GateCache {
                    x: x.clone(),
                    h_prev: h[l].clone(),
                    c_prev: c[l].clone(),
                    i,
                    f,
                    g,
                    o,
                    c: c_new.clone(),
                });
                h[l] = h_new;
                c[l] = c_new;
                x = h[l].clone();
            }
            steps.push(step_caches);
        }

        let h_dropped = &h[num_layers - 1] * mask;
        let prediction = self.w_out.dot(&h_dropped) + self.b_out;
        if !prediction.is_finite() {
            return Err(LstmError::Computation {
                stage: "forward pass",
                reason: format!("non-finite output {prediction}"),
            });
        }
        Ok(ForwardCache { steps, h_dropped, mask: mask.clone(), prediction })
    }

    /// Backpropagation through time for one sample, accumulating into
    /// `grads`. `d_pred` is dLoss/dPrediction for this sample.
    pub(crate) fn backward(&self, cache: &ForwardCache, d_pred: f64, grads: &mut Gradients) {
        let hidden = self.config.hidden_size;
        let num_layers = self.config.num_layers;
        let timesteps = cache.steps.len();

        grads.w_out.scaled_add(d_pred, &cache.h_dropped);
        grads.b_out += d_pred;

        // Per-layer gradients carried backwards across timesteps.
        let mut dh_carry = vec![Array1::<f64>::zeros(hidden); num_layers];
        let mut dc_carry = vec![Array1::<f64>::zeros(hidden); num_layers];

        for t in (0..timesteps).rev() {
            // Gradient flowing into the top layer's hidden state from above:
            // only the output head, and only at the last timestep.
            let mut dh_above = if t == timesteps - 1 {
                (&self.w_out * &cache.mask).mapv(|v| v * d_pred)
            } else {
                Array1::zeros(hidden)
            };

            for l in (0..num_layers).rev() {
                let gc = &cache.steps[t][l];
                let layer = &self.layers[l];
                let gl = &mut grads.layers[l];

                let dh = &dh_above + &dh_carry[l];
                let tanh_c = gc.c.mapv(f64::tanh);

                let d_o = &(&dh * &tanh_c) * &gc.o.mapv(|v| v * (1.0 - v));
                let dc = &(&(&dh * &gc.o) * &tanh_c.mapv(|v| 1.0 - v * v)) + &dc_carry[l];
                let d_i = &(&dc * &gc.g) * &gc.i.mapv(|v| v * (1.0 - v));
                let d_f = &(&dc * &gc.c_prev) * &gc.f.mapv(|v| v * (1.0 - v));
                let d_g = &(&dc * &gc.i) * &gc.g.mapv(|v| 1.0 - v * v);

                gl.w_ii += &outer(&d_i, &gc.x);
                gl.w_if += &outer(&d_f, &gc.x);
                gl.w_ig += &outer(&d_g, &gc.x);
                gl.w_io += &outer(&d_o, &gc.x);
                gl.w_hi += &outer(&d_i, &gc.h_prev);
                gl.w_hf += &outer(&d_f, &gc.h_prev);
                gl.w_hg += &outer(&d_g, &gc.h_prev);
                gl.w_ho += &outer(&d_o, &gc.h_prev);
                gl.b_i += &d_i;
                gl.b_f += &d_f;
                gl.b_g += &d_g;
                gl.b_o += &d_o;

                dh_carry[l] = layer.w_hi.t().dot(&d_i)
                    + layer.w_hf.t().dot(&d_f)
                    + layer.w_hg.t().dot(&d_g)
                    + layer.w_ho.t().dot(&d_o);
                dc_carry[l] = &dc * &gc.f;

                // Input gradient feeds the hidden state of the layer below
                // at this same timestep; discarded below layer 0.
                dh_above = layer.w_ii.t().dot(&d_i)
                    + layer.w_if.t().dot(&d_f)
                    + layer.w_ig.t().dot(&d_g)
                    + layer.w_io.t().dot(&d_o);
            }
        }
    }

    pub(crate) fn flatten_weights(&self) -> Vec<f64> {
        flatten_parts(&self.layers, &self.w_out, self.b_out)
    }

    pub(crate) fn unflatten_weights(&mut self, flat: &[f64]) -> Result<(), LstmError> {
        if flat.len() != self.num_parameters() {
            return Err(LstmError::ShapeMismatch(format!(
                "flat weight vector has {} entries, model has {} parameters",
                flat.len(),
                self.num_parameters()
            )));
        }
        let mut offset = 0;
        let read2 = |dst: &mut Array2<f64>, offset: &mut usize| {
            for v in dst.iter_mut() {
                *v = flat[*offset];
                *offset += 1;
            }
        };
        for layer in &mut self.layers {
            read2(&mut layer.w_ii, &mut offset);
            read2(&mut layer.w_if, &mut offset);
            read2(&mut layer.w_ig, &mut offset);
            read2(&mut layer.w_io, &mut offset);
            read2(&mut layer.w_hi, &mut offset);
            read2(&mut layer.w_hf, &mut offset);
            read2(&mut layer.w_hg, &mut offset);
            read2(&mut layer.w_ho, &mut offset);
            for v in layer
                .b_i
                .iter_mut()
                .chain(layer.b_f.iter_mut())
                .chain(layer.b_g.iter_mut())
                .chain(layer.b_o.iter_mut())
            {
                *v = flat[offset];
                offset += 1;
            }
        }
        for v in self.w_out.iter_mut() {
            *v = flat[offset];
            offset += 1;
        }
        self.b_out = flat[offset];
        Ok(())
    }

    /// Total trainable parameter count.
    pub fn num_parameters(&self) -> usize {
        let mut count = 0;
        for layer in &self.layers {
            count += layer.w_ii.len() + layer.w_if.len() + layer.w_ig.len() + layer.w_io.len();
            count += layer.w_hi.len() + layer.w_hf.len() + layer.w_hg.len() + layer.w_ho.len();
            count += layer.b_i.len() + layer.b_f.len() + layer.b_g.len() + layer.b_o.len();
        }
        count + self.w_out.len() + 1
    }

    /// Verifies that the deserialized weight shapes match the carried config.
    /// Called on every artifact load; a persisted blob whose weights disagree
    /// with its own config is rejected, never truncated or padded.
    pub fn validate_shapes(&self) -> Result<(), LstmError> {
        self.config.validate()?;
        if self.layers.len() != self.config.num_layers {
            return Err(LstmError::ShapeMismatch(format!(
                "weights contain {} layers, config says {}",
                self.layers.len(),
                self.config.num_layers
            )));
        }
        let hidden = self.config.hidden_size;
        for (l, layer) in self.layers.iter().enumerate() {
            let input = if l == 0 { self.config.input_size } else { hidden };
            let input_mats = [
                ("w_ii", &layer.w_ii),
                ("w_if", &layer.w_if),
                ("w_ig", &layer.w_ig),
                ("w_io", &layer.w_io),
            ];
            for (name, m) in input_mats {
                if m.dim() != (hidden, input) {
                    return Err(LstmError::ShapeMismatch(format!(
                        "layer {l} {name} has shape {:?}, expected ({hidden}, {input})",
                        m.dim()
                    )));
                }
            }
            let hidden_mats = [
                ("w_hi", &layer.w_hi),
                ("w_hf", &layer.w_hf),
                ("w_hg", &layer.w_hg),
                ("w_ho", &layer.w_ho),
            ];
            for (name, m) in hidden_mats {
                if m.dim() != (hidden, hidden) {
                    return Err(LstmError::ShapeMismatch(format!(
                        "layer {l} {name} has shape {:?}, expected ({hidden}, {hidden})",
                        m.dim()
                    )));
                }
            }
            let biases = [
                ("b_i", &layer.b_i),
                ("b_f", &layer.b_f),
                ("b_g", &layer.b_g),
                ("b_o", &layer.b_o),
            ];
            for (name, b) in biases {
                if b.len() != hidden {
                    return Err(LstmError::ShapeMismatch(format!(
                        "layer {l} {name} has length {}, expected {hidden}",
                        b.len()
                    )));
                }
            }
        }
        if self.w_out.len() != hidden {
            return Err(LstmError::ShapeMismatch(format!(
                "output projection has length {}, expected {hidden}",
                self.w_out.len()
            )));
        }
        Ok(())
    }
}

/// Inverted dropout mask: kept units are scaled by 1/(1-rate) so inference
/// needs no rescaling. A rate of zero yields an all-ones mask.
pub(crate) fn dropout_mask<R: Rng>(hidden_size: usize, rate: f64, rng: &mut R) -> Array1<f64> {
    if rate <= 0.0 {
        return Array1::ones(hidden_size);
    }
    let keep = 1.0 - rate;
    Array1::from_shape_fn(hidden_size, |_| {
        if rng.random::<f64>() < keep { 1.0 / keep } else { 0.0 }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn test_config() -> ModelConfig {
        ModelConfig {
            input_size: 1,
            hidden_size: 4,
            num_layers: 2,
            dropout_rate: 0.0,
            seq_length: 5,
        }
    }

    #[test]
    fn forward_is_deterministic_and_finite() {
        let mut rng = StdRng::seed_from_u64(7);
        let model = MultiLayerLstm::new(test_config(), &mut rng).unwrap();
        let window = [0.1, 0.2, 0.3, 0.4, 0.5];
        let a = model.forward(&window).unwrap();
        let b = model.forward(&window).unwrap();
        assert!(a.is_finite());
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn forward_rejects_wrong_window_length() {
        let mut rng = StdRng::seed_from_u64(7);
        let model = MultiLayerLstm::new(test_config(), &mut rng).unwrap();
        assert!(matches!(
            model.forward(&[0.1, 0.2]),
            Err(LstmError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn parameter_count_matches_architecture() {
        let mut rng = StdRng::seed_from_u64(7);
        let model = MultiLayerLstm::new(test_config(), &mut rng).unwrap();
        // layer 0: 4 gates * (4x1 + 4x4 + 4) = 96; layer 1: 4 * (4x4 + 4x4 + 4) = 144
        // head: 4 + 1 = 5
        assert_eq!(model.num_parameters(), 96 + 144 + 5);
    }

    #[test]
    fn flatten_unflatten_round_trip_preserves_outputs() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut model = MultiLayerLstm::new(test_config(), &mut rng).unwrap();
        let window = [0.9, 0.8, 0.7, 0.6, 0.5];
        let before = model.forward(&window).unwrap();
        let flat = model.flatten_weights();
        model.unflatten_weights(&flat).unwrap();
        let after = model.forward(&window).unwrap();
        assert_eq!(before.to_bits(), after.to_bits());
    }

    #[test]
    fn config_validation_rejects_bad_fields() {
        let mut config = test_config();
        config.dropout_rate = 1.0;
        assert!(config.validate().is_err());
        let mut config = test_config();
        config.num_layers = 0;
        assert!(config.validate().is_err());
        let mut config = test_config();
        config.input_size = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn shape_validation_catches_truncated_weights() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut model = MultiLayerLstm::new(test_config(), &mut rng).unwrap();
        assert!(model.validate_shapes().is_ok());
        model.w_out = Array1::zeros(3);
        assert!(matches!(
            model.validate_shapes(),
            Err(LstmError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn dropout_mask_is_all_ones_at_rate_zero() {
        let mut rng = StdRng::seed_from_u64(5);
        let mask = dropout_mask(8, 0.0, &mut rng);
        assert!(mask.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn training_forward_with_unit_mask_matches_inference() {
        let mut rng = StdRng::seed_from_u64(11);
        let model = MultiLayerLstm::new(test_config(), &mut rng).unwrap();
        let window = [0.5, 0.4, 0.6, 0.55, 0.45];
        let mask = Array1::ones(4);
        let cache = model.forward_train(&window, &mask).unwrap();
        let plain = model.forward(&window).unwrap();
        assert_eq!(cache.prediction.to_bits(), plain.to_bits());
    }
}
