/*!
Adversarial training loop
*/
use super::{append_row, row_batch, window_batch, Gan};
use crate::data::FeatureRow;
use crate::preprocess::Windows;
use crate::ForecastError;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tch::nn::{self, Module, OptimizerConfig};
use tch::{Device, Reduction, Tensor};
use tracing::{debug, info, warn};

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of epochs; each epoch is one discriminator and one generator update on a single sampled batch
    pub epochs: usize,
    /// Number of windows sampled per epoch
    pub batch_size: usize,
    /// Adam learning rate, shared by both networks
    pub learning_rate: f64,
    /// Adam first moment decay
    pub beta1: f64,
    /// Log losses every this many epochs
    pub log_every: usize,
    /// Seed for batch sampling and weight initialization; random if unset
    pub seed: Option<u64>,
    /// Show a progress bar over epochs
    pub progress: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            learning_rate: 2e-4,
            beta1: 0.5,
            log_every: 10,
            seed: None,
            progress: false,
        }
    }
}

/// Losses at the end of a training run
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// The number of epochs run
    pub epochs: usize,
    /// The discriminator loss of the last epoch, averaged over its real and fake steps
    pub d_loss: f64,
    /// The generator loss of the last epoch
    pub g_loss: f64,
}

/// Binary cross-entropy between probabilities and a constant label
pub fn bce(probabilities: &Tensor, label: f64) -> Tensor {
    let targets = Tensor::full_like(probabilities, label);
    probabilities.binary_cross_entropy::<Tensor>(&targets, None, Reduction::Mean)
}

/// Trains a GAN on windows of scaled rows
#[derive(Debug)]
pub struct Trainer {
    config: TrainingConfig,
    rng: StdRng,
}

impl Trainer {
    /// Create a trainer. Batch sampling is seeded from the config, if it has a seed
    pub fn new(config: TrainingConfig) -> Trainer {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Trainer { config, rng }
    }
    /// The configuration in use
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }
    /// Sample a batch of `(windows, next rows)` uniformly, with replacement. `windows` must not be empty
    pub fn sample_batch(&mut self, windows: &Windows, device: Device) -> (Tensor, Tensor) {
        let mut inputs: Vec<&[FeatureRow]> = Vec::with_capacity(self.config.batch_size);
        let mut targets: Vec<&FeatureRow> = Vec::with_capacity(self.config.batch_size);
        for _ in 0..self.config.batch_size {
            let i = self.rng.gen_range(0..windows.len());
            inputs.push(windows.window(i));
            targets.push(windows.target(i));
        }
        (window_batch(&inputs, device), row_batch(&targets, device))
    }
    /// Train for the configured number of epochs.
    ///
    /// There is no convergence criterion: the epoch count is a budget, and losses are only reported.
    pub fn train(&mut self, gan: &mut Gan, windows: &Windows) -> Result<TrainingSummary, ForecastError> {
        if windows.is_empty() {
            return Err(ForecastError::insufficient(windows.seq_length() + 1, 0));
        }
        let device = gan.generator.device();
        let adam = || nn::Adam {
            beta1: self.config.beta1,
            ..Default::default()
        };
        let mut disc_opt = adam().build(gan.discriminator.var_store(), self.config.learning_rate)?;
        let mut gen_opt = adam().build(gan.generator.var_store(), self.config.learning_rate)?;

        let progress = if self.config.progress {
            ProgressBar::new(self.config.epochs as u64)
        } else {
            ProgressBar::hidden()
        };
        progress.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos:>5}/{len:5} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        info!(
            "Training on {} windows for {} epochs, batch size {}",
            windows.len(),
            self.config.epochs,
            self.config.batch_size
        );

        let mut summary = TrainingSummary {
            epochs: 0,
            d_loss: f64::NAN,
            g_loss: f64::NAN,
        };
        for epoch in 0..self.config.epochs {
            let (real_seq, real_next) = self.sample_batch(windows, device);
            let fake_next = tch::no_grad(|| gan.generator.forward(&real_seq));

            let real_data = append_row(&real_seq, &real_next);
            let fake_data = append_row(&real_seq, &fake_next);

            // === DISCRIMINATOR ===
            let d_loss_real = bce(&gan.discriminator.forward(&real_data), 1.0);
            disc_opt.backward_step(&d_loss_real);
            let d_loss_fake = bce(&gan.discriminator.forward(&fake_data), 0.0);
            disc_opt.backward_step(&d_loss_fake);
            let d_loss = 0.5 * (d_loss_real.double_value(&[]) + d_loss_fake.double_value(&[]));

            // === GENERATOR ===
            // Only the generator's variables are registered with gen_opt, so the discriminator stays fixed
            let g_loss = bce(&gan.combined(&real_seq), 1.0);
            gen_opt.backward_step(&g_loss);
            let g_loss = g_loss.double_value(&[]);

            if !d_loss.is_finite() || !g_loss.is_finite() {
                warn!("Epoch {}: non-finite loss, D = {}, G = {}", epoch, d_loss, g_loss);
            }
            if self.config.log_every > 0 && epoch % self.config.log_every == 0 {
                info!("Epoch {}, D loss: {:.5}, G loss: {:.5}", epoch, d_loss, g_loss);
            } else {
                debug!("Epoch {}, D loss: {:.5}, G loss: {:.5}", epoch, d_loss, g_loss);
            }
            progress.set_message(format!("D = {:.4}, G = {:.4}", d_loss, g_loss));
            progress.inc(1);

            summary = TrainingSummary {
                epochs: epoch + 1,
                d_loss,
                g_loss,
            };
        }
        progress.finish_and_clear();
        Ok(summary)
    }
}
