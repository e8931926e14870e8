/*!
The recurrent GAN: a generator predicting the next feature row of a window, and a discriminator scoring windows
*/

use crate::data::FeatureRow;
use crate::{ForecastError, GpuFloat};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use tch::nn::{self, Linear, Module, RNNConfig, VarStore, LSTM, RNN};
use tch::{Device, Tensor};

pub mod store;
pub mod train;

/// Identifies one training run, so that weights and the scaler fit alongside them can be matched up
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl RunId {
    /// A fresh, random run identifier
    pub fn fresh() -> RunId {
        RunId(rand::random())
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A descriptor for an instance of the GAN
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GanDesc {
    /// The number of rows in an input window
    pub seq_length: usize,
    /// The number of features per row
    pub num_features: usize,
    /// The sizes of the stacked LSTM layers, first to last
    pub hidden: Vec<usize>,
}

impl Default for GanDesc {
    fn default() -> GanDesc {
        GanDesc {
            seq_length: 60,
            num_features: FeatureRow::NN_FIELDS,
            hidden: vec![64, 32],
        }
    }
}

impl GanDesc {
    /// Build a fresh, untrained generator and discriminator on a device
    pub fn build(&self, device: Device) -> Gan {
        Gan {
            generator: Generator::new(self, device),
            discriminator: Discriminator::new(self, device),
        }
    }
    /// The size of the last LSTM layer
    fn encoded(&self) -> i64 {
        self.hidden.last().copied().unwrap_or(self.num_features) as i64
    }
}

/// A stack of LSTM layers, reducing a batch of windows to the last hidden state of the top layer
#[derive(Debug)]
pub struct SequenceEncoder {
    /// The LSTM layers, bottom first
    pub layers: Vec<LSTM>,
}

impl SequenceEncoder {
    /// Build an encoder over a `VarStore` path
    pub fn new(vs: &nn::Path, inputs: usize, hidden: &[usize]) -> SequenceEncoder {
        let mut layers = Vec::with_capacity(hidden.len());
        let mut inputs = inputs as i64;
        for (i, size) in hidden.iter().enumerate() {
            let size = *size as i64;
            let config = RNNConfig {
                batch_first: true,
                ..Default::default()
            };
            layers.push(nn::lstm(vs / format!("lstm{}", i), inputs, size, config));
            inputs = size;
        }
        SequenceEncoder { layers }
    }
    /// Encode windows of shape `[batch, seq, features]` into `[batch, hidden]`
    pub fn encode(&self, xs: &Tensor) -> Tensor {
        let mut hidden = xs.shallow_clone();
        for layer in &self.layers {
            let (output, _state) = layer.seq(&hidden);
            hidden = output;
        }
        hidden.select(1, -1)
    }
}

/// Maps a window of scaled rows to a prediction of the next scaled row
#[derive(Debug)]
pub struct Generator {
    desc: GanDesc,
    vs: VarStore,
    encoder: SequenceEncoder,
    head: Linear,
    run_id: Option<RunId>,
}

impl Generator {
    /// Build an untrained generator
    pub fn new(desc: &GanDesc, device: Device) -> Generator {
        let vs = VarStore::new(device);
        let (encoder, head) = {
            let root = vs.root();
            let encoder =
                SequenceEncoder::new(&(&root / "encoder"), desc.num_features, &desc.hidden);
            let head = nn::linear(
                &root / "head",
                desc.encoded(),
                desc.num_features as i64,
                Default::default(),
            );
            (encoder, head)
        };
        Generator {
            desc: desc.clone(),
            vs,
            encoder,
            head,
            run_id: None,
        }
    }
    /// The descriptor this generator was built from
    pub fn desc(&self) -> &GanDesc {
        &self.desc
    }
    /// The generator's parameters
    pub fn var_store(&self) -> &VarStore {
        &self.vs
    }
    /// The generator's parameters, mutably
    pub fn var_store_mut(&mut self) -> &mut VarStore {
        &mut self.vs
    }
    /// The training run which produced this generator's weights; `None` if untrained
    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }
    /// Record the training run which produced this generator's weights
    pub fn set_run_id(&mut self, run_id: Option<RunId>) {
        self.run_id = run_id
    }
    /// The device this generator lives on
    pub fn device(&self) -> Device {
        self.vs.device()
    }
    /// Predict the next scaled row of a single window of scaled rows
    pub fn predict(&self, window: &[FeatureRow]) -> Result<FeatureRow, ForecastError> {
        let seq_length = self.desc.seq_length;
        if window.len() < seq_length || seq_length == 0 {
            return Err(ForecastError::insufficient(seq_length, window.len()));
        }
        let window = &window[window.len() - seq_length..];
        let input = window_batch(&[window], self.device());
        let output = tch::no_grad(|| self.forward(&input));
        let values: Vec<f64> = (0..FeatureRow::NN_FIELDS as i64)
            .map(|i| output.double_value(&[0, 0, i]))
            .collect();
        FeatureRow::from_slice(&values).ok_or_else(|| {
            ForecastError::insufficient(FeatureRow::NN_FIELDS, values.len())
        })
    }
}

impl Module for Generator {
    /// Windows `[batch, seq, features]` to predicted rows `[batch, 1, features]`
    fn forward(&self, xs: &Tensor) -> Tensor {
        let encoded = self.encoder.encode(xs);
        self.head
            .forward(&encoded)
            .view([-1, 1, self.desc.num_features as i64])
    }
}

/// Scores how real a window looks, from 0 (generated) to 1 (real)
#[derive(Debug)]
pub struct Discriminator {
    vs: VarStore,
    encoder: SequenceEncoder,
    head: Linear,
}

impl Discriminator {
    /// Build an untrained discriminator
    pub fn new(desc: &GanDesc, device: Device) -> Discriminator {
        let vs = VarStore::new(device);
        let (encoder, head) = {
            let root = vs.root();
            let encoder =
                SequenceEncoder::new(&(&root / "encoder"), desc.num_features, &desc.hidden);
            let head = nn::linear(&root / "head", desc.encoded(), 1, Default::default());
            (encoder, head)
        };
        Discriminator { vs, encoder, head }
    }
    /// The discriminator's parameters
    pub fn var_store(&self) -> &VarStore {
        &self.vs
    }
}

impl Module for Discriminator {
    /// Windows `[batch, seq, features]` to realism scores `[batch, 1]`
    fn forward(&self, xs: &Tensor) -> Tensor {
        self.head.forward(&self.encoder.encode(xs)).sigmoid()
    }
}

/// A generator and discriminator trained against each other
#[derive(Debug)]
pub struct Gan {
    /// The generator
    pub generator: Generator,
    /// The discriminator
    pub discriminator: Discriminator,
}

impl Gan {
    /// The combined path: score each window shifted by one row and completed with the generator's own prediction
    pub fn combined(&self, windows: &Tensor) -> Tensor {
        let predicted = self.generator.forward(windows);
        self.discriminator.forward(&append_row(windows, &predicted))
    }
}

/// Drop the first row of each window `[batch, seq, features]` and append `rows` `[batch, 1, features]`
pub fn append_row(windows: &Tensor, rows: &Tensor) -> Tensor {
    let seq_length = windows.size()[1];
    Tensor::cat(&[windows.narrow(1, 1, seq_length - 1), rows.shallow_clone()], 1)
}

/// Package windows of rows into a `[batch, seq, features]` tensor
pub fn window_batch(windows: &[&[FeatureRow]], device: Device) -> Tensor {
    let seq_length = windows.first().map(|window| window.len()).unwrap_or(0);
    let mut input = Vec::<GpuFloat>::with_capacity(windows.len() * seq_length * FeatureRow::NN_FIELDS);
    for window in windows {
        for row in window.iter() {
            row.push_row(&mut input);
        }
    }
    Tensor::from_slice(&input)
        .view([
            windows.len() as i64,
            seq_length as i64,
            FeatureRow::NN_FIELDS as i64,
        ])
        .to_device(device)
}

/// Package single rows into a `[batch, 1, features]` tensor
pub fn row_batch(rows: &[&FeatureRow], device: Device) -> Tensor {
    let mut output = Vec::<GpuFloat>::with_capacity(rows.len() * FeatureRow::NN_FIELDS);
    for row in rows {
        row.push_row(&mut output);
    }
    Tensor::from_slice(&output)
        .view([rows.len() as i64, 1, FeatureRow::NN_FIELDS as i64])
        .to_device(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<FeatureRow> {
        (0..len)
            .map(|i| FeatureRow {
                close: i as f64 / len as f64,
                ret: 0.5,
            })
            .collect()
    }

    #[test]
    fn shapes() {
        let desc = GanDesc {
            seq_length: 8,
            ..Default::default()
        };
        let gan = desc.build(Device::Cpu);
        let rows = ramp(8);
        let xs = window_batch(&[&rows, &rows, &rows], Device::Cpu);
        assert_eq!(xs.size(), vec![3, 8, 2]);

        let predicted = gan.generator.forward(&xs);
        assert_eq!(predicted.size(), vec![3, 1, 2]);

        let shifted = append_row(&xs, &predicted);
        assert_eq!(shifted.size(), vec![3, 8, 2]);

        let scores = gan.combined(&xs);
        assert_eq!(scores.size(), vec![3, 1]);
        for i in 0..3 {
            let score = scores.double_value(&[i, 0]);
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn append_row_shifts_windows() {
        let rows = ramp(4);
        let xs = window_batch(&[&rows], Device::Cpu);
        let next = FeatureRow {
            close: 9.0,
            ret: 8.0,
        };
        let ys = row_batch(&[&next], Device::Cpu);
        let shifted = append_row(&xs, &ys);
        assert_eq!(shifted.double_value(&[0, 0, 0]), rows[1].close as f32 as f64);
        assert_eq!(shifted.double_value(&[0, 3, 0]), 9.0);
        assert_eq!(shifted.double_value(&[0, 3, 1]), 8.0);
    }

    #[test]
    fn prediction_needs_a_full_window() {
        let desc = GanDesc {
            seq_length: 10,
            ..Default::default()
        };
        let generator = Generator::new(&desc, Device::Cpu);
        assert!(matches!(
            generator.predict(&ramp(9)),
            Err(ForecastError::InsufficientData {
                needed: 10,
                available: 9
            })
        ));
        let first = generator.predict(&ramp(10)).unwrap();
        let second = generator.predict(&ramp(10)).unwrap();
        assert_eq!(first, second);
        assert!(generator.run_id().is_none());
    }

    #[test]
    fn run_ids_display_as_hex() {
        assert_eq!(RunId(255).to_string(), "00000000000000ff");
        assert_ne!(RunId::fresh(), RunId::fresh());
    }
}
