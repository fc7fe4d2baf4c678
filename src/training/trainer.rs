/// Training loop for the emotion-conditioned seq2seq model
use candle_core::{DType, Device, Tensor};
use candle_nn::{Optimizer, VarBuilder, VarMap, SGD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

use crate::data::{Emotion, PairSource, TrainingPair, Vocabulary};
use crate::models::{top_token, Decoded};
use crate::{Seq2SeqConfig, Seq2SeqModel};
use super::checkpoint::{self, CheckpointMetadata};
use super::history::LossHistory;

/// Training configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrainingConfig {
    /// Number of passes over the training pairs
    pub num_epochs: usize,
    /// SGD learning rate
    pub learning_rate: f64,
    /// Probability that a pair is decoded with teacher forcing
    pub teacher_forcing_ratio: f64,
    /// Report (and checkpoint) the average loss every N pairs
    pub print_every: usize,
    /// Evaluate on the test pairs every N pairs
    pub test_every: usize,
    /// Directory for checkpoints, loss logs and the lookup table
    pub checkpoint_dir: String,
    /// Suffix shared by every artifact of one run
    pub run_name: String,
    /// Seed for the teacher-forcing coin
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_epochs: 5,
            learning_rate: 0.01,
            teacher_forcing_ratio: 0.5,
            print_every: 1000,
            test_every: 1000,
            checkpoint_dir: "result".to_string(),
            run_name: "lr001_dim500".to_string(),
            seed: 0,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.teacher_forcing_ratio) {
            return Err(crate::ChatbotError::Config(format!(
                "teacher_forcing_ratio must be in [0, 1], got {}",
                self.teacher_forcing_ratio
            )));
        }

        if self.learning_rate <= 0.0 {
            return Err(crate::ChatbotError::Config(
                "learning_rate must be > 0".to_string(),
            ));
        }

        if self.print_every == 0 || self.test_every == 0 {
            return Err(crate::ChatbotError::Config(
                "print_every and test_every must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Where the latest model checkpoint is written
    pub fn model_path(&self) -> PathBuf {
        Path::new(&self.checkpoint_dir).join(format!("saved_model_{}.safetensors", self.run_name))
    }

    /// Where the loss history is written
    pub fn loss_path(&self) -> PathBuf {
        Path::new(&self.checkpoint_dir).join(format!("loss_{}.json", self.run_name))
    }

    /// Where the vocabulary lookup table is written
    pub fn lookup_table_path(&self) -> PathBuf {
        Path::new(&self.checkpoint_dir).join(format!("lookup_table_{}.json", self.run_name))
    }
}

/// What happened while running one pair through the model
#[derive(Debug, Clone, PartialEq)]
pub struct PairOutcome {
    /// Summed NLL divided by the full target length
    pub loss: f32,
    /// Decoder steps actually taken
    pub steps: usize,
    /// Whether the ground truth was fed back
    pub teacher_forced: bool,
}

/// Trainer for Seq2SeqModel
pub struct Trainer {
    model: Seq2SeqModel,
    model_config: Seq2SeqConfig,
    varmap: VarMap,
    optimizer: SGD,
    rng: StdRng,
    config: TrainingConfig,
    device: Device,
    step: usize,
    epoch: usize,
}

impl Trainer {
    /// Create new trainer with freshly initialised weights
    pub fn new(
        model_config: Seq2SeqConfig,
        training_config: TrainingConfig,
        device: Device,
    ) -> crate::Result<Self> {
        training_config.validate()?;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = Seq2SeqModel::new(model_config.clone(), vb)?;

        // Plain SGD over every variable, including the shared embedding
        let optimizer = SGD::new(varmap.all_vars(), training_config.learning_rate)?;
        let rng = StdRng::seed_from_u64(training_config.seed);

        Ok(Self {
            model,
            model_config,
            varmap,
            optimizer,
            rng,
            config: training_config,
            device,
            step: 0,
            epoch: 0,
        })
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Optimizer steps taken so far
    pub fn step(&self) -> usize {
        self.step
    }

    /// Epochs completed so far
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Run one pair through encoder and decoder, updating weights if `is_train`
    ///
    /// The first target token seeds the decoder; every later target token is
    /// scored. Teacher forcing is decided once per pair. Without it the
    /// decoder consumes its own top prediction and stops right after emitting
    /// EOS.
    pub fn run_pair(&mut self, pair: &TrainingPair, is_train: bool) -> crate::Result<PairOutcome> {
        pair.validate(self.model_config.vocab_size, self.model_config.max_length)?;

        let target_len = pair.target.len();
        let encoded = self.model.encoder().encode(&pair.input)?;
        let targets = pair.target_tensor(&self.device)?;

        let mut decoder_input = targets.narrow(0, 0, 1)?;
        let mut decoder_hidden = encoded.hidden;

        let teacher_forced = self.rng.gen::<f64>() < self.config.teacher_forcing_ratio;

        let mut losses = Vec::with_capacity(target_len - 1);
        for di in 1..target_len {
            let step = self.model.decoder().forward(
                &decoder_input,
                &decoder_hidden,
                &encoded.outputs,
                pair.emotion,
                is_train,
            )?;

            let target = targets.narrow(0, di, 1)?;
            losses.push(candle_nn::loss::nll(&step.log_probs, &target)?);
            decoder_hidden = step.hidden;

            if teacher_forced {
                decoder_input = target;
            } else {
                let predicted = top_token(&step.log_probs)?;
                decoder_input = Tensor::new(&[predicted], &self.device)?;
                if predicted == self.model_config.eos_token {
                    break;
                }
            }
        }

        let steps = losses.len();
        let loss = Tensor::stack(&losses, 0)?.sum_all()?;
        let loss_sum = loss.to_scalar::<f32>()?;

        if is_train {
            self.optimizer.backward_step(&loss)?;
            self.step += 1;
        }

        log::debug!(
            "pair: steps={}, teacher_forced={}, loss_sum={:.4}",
            steps,
            teacher_forced,
            loss_sum
        );

        Ok(PairOutcome {
            loss: loss_sum / target_len as f32,
            steps,
            teacher_forced,
        })
    }

    /// Per-token loss for one pair; trains on it when `is_train`
    pub fn train_pair(&mut self, pair: &TrainingPair, is_train: bool) -> crate::Result<f32> {
        Ok(self.run_pair(pair, is_train)?.loss)
    }

    /// Mean loss over `pairs` without touching the weights
    pub fn evaluate(&mut self, pairs: &[TrainingPair]) -> crate::Result<f32> {
        if pairs.is_empty() {
            return Ok(0.0);
        }

        let mut total = 0.0;
        for pair in pairs {
            total += self.train_pair(pair, false)?;
        }
        Ok(total / pairs.len() as f32)
    }

    /// One pass over `source`
    ///
    /// Every `print_every` pairs the average training loss is recorded and the
    /// model is checkpointed; every `test_every` pairs the test loss is
    /// recorded and the loss log rewritten.
    ///
    /// # Returns
    /// Tuple of (train_losses, test_losses) recorded during this pass
    pub fn train_iters(
        &mut self,
        source: &mut impl PairSource,
        test_pairs: &[TrainingPair],
    ) -> crate::Result<(Vec<f32>, Vec<f32>)> {
        let mut train_losses = Vec::new();
        let mut test_losses = Vec::new();
        let mut print_loss_total = 0.0f32;
        let mut iter = 0usize;

        while let Some(pair) = source.next_pair() {
            let loss = self.train_pair(&pair, true)?;
            print_loss_total += loss;
            iter += 1;

            if iter % self.config.print_every == 0 {
                let print_loss_avg = print_loss_total / self.config.print_every as f32;
                print_loss_total = 0.0;
                log::info!("Step {}: train loss={:.4}", self.step, print_loss_avg);
                train_losses.push(print_loss_avg);

                let path = self.config.model_path();
                log::info!("Saving checkpoint to {:?}", path);
                self.save_checkpoint(&path, Some(print_loss_avg as f64))?;
            }

            if !test_pairs.is_empty() && iter % self.config.test_every == 0 {
                let test_loss = self.evaluate(test_pairs)?;
                log::info!("Step {}: test loss={:.4}", self.step, test_loss);
                test_losses.push(test_loss);

                std::fs::create_dir_all(&self.config.checkpoint_dir)?;
                LossHistory::new(train_losses.clone(), test_losses.clone())
                    .save(self.config.loss_path())?;
            }
        }

        Ok((train_losses, test_losses))
    }

    /// Full training loop
    ///
    /// Saves the lookup table, then runs `num_epochs` passes, rewriting the
    /// cumulative loss log after each one.
    pub fn train(
        &mut self,
        source: &mut impl PairSource,
        test_pairs: &[TrainingPair],
        vocab: &Vocabulary,
    ) -> crate::Result<LossHistory> {
        log::info!("Starting training for {} epochs", self.config.num_epochs);
        log::info!("Pairs per epoch: {}, test pairs: {}", source.num_pairs(), test_pairs.len());

        std::fs::create_dir_all(&self.config.checkpoint_dir)?;
        vocab.save(self.config.lookup_table_path())?;

        let mut history = LossHistory::default();
        for epoch in 0..self.config.num_epochs {
            log::info!("=== Epoch {}/{} ===", epoch + 1, self.config.num_epochs);

            source.reset();
            let (train_losses, test_losses) = self.train_iters(source, test_pairs)?;
            history.extend(train_losses, test_losses);
            history.save(self.config.loss_path())?;
            self.epoch = epoch + 1;

            log::info!(
                "Epoch {} complete: step={}, last train loss={:?}, last test loss={:?}",
                epoch + 1,
                self.step,
                history.last_train_loss(),
                history.last_test_loss()
            );
        }

        log::info!("Training complete!");
        Ok(history)
    }

    /// Greedy reply for an encoded utterance
    pub fn respond(&self, input: &[u32], emotion: Emotion) -> crate::Result<Decoded> {
        self.model.greedy_decode(input, emotion, self.model_config.max_length)
    }

    /// Save checkpoint
    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P, loss: Option<f64>) -> crate::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let metadata = CheckpointMetadata {
            step: self.step,
            epoch: self.epoch,
            learning_rate: self.optimizer.learning_rate(),
            loss,
            config: Some(serde_json::to_string(&self.model_config)?),
        };

        checkpoint::save_checkpoint(&self.varmap, path, metadata)
    }

    /// Restore weights and counters from a checkpoint
    pub fn load_checkpoint<P: AsRef<Path>>(&mut self, path: P) -> crate::Result<CheckpointMetadata> {
        let metadata = checkpoint::load_checkpoint(&self.varmap, path.as_ref(), &self.device)?;

        if let Some(config) = &metadata.config {
            let saved: Seq2SeqConfig = serde_json::from_str(config)?;
            if saved != self.model_config {
                log::warn!("Checkpoint was written with a different model configuration");
            }
        }

        self.step = metadata.step;
        self.epoch = metadata.epoch;
        log::info!("Restored checkpoint at step {}, epoch {}", self.step, self.epoch);

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PairDataset, PairLoader};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn tiny_model_config() -> Seq2SeqConfig {
        Seq2SeqConfig {
            vocab_size: 10,
            hidden_size: 12,
            n_layers: 1,
            dropout: 0.0,
            max_length: 6,
            ..Default::default()
        }
    }

    fn training_config(dir: &Path, ratio: f64) -> TrainingConfig {
        TrainingConfig {
            num_epochs: 1,
            learning_rate: 0.05,
            teacher_forcing_ratio: ratio,
            print_every: 2,
            test_every: 2,
            checkpoint_dir: dir.to_string_lossy().into_owned(),
            run_name: "test".to_string(),
            seed: 3,
        }
    }

    fn sample_pair() -> TrainingPair {
        TrainingPair::new(vec![0, 4, 5, 1], vec![0, 6, 7, 8, 1], Emotion::Joy)
    }

    fn snapshot(varmap: &VarMap) -> candle_core::Result<HashMap<String, Vec<f32>>> {
        let data = varmap.data().lock().unwrap();
        data.iter()
            .map(|(k, v)| Ok((k.clone(), v.as_tensor().flatten_all()?.to_vec1::<f32>()?)))
            .collect()
    }

    fn force_eos(trainer: &Trainer) -> crate::Result<()> {
        let data = trainer.varmap().data().lock().unwrap();
        let mut bias = vec![0f32; 10];
        bias[crate::EOS_TOKEN as usize] = 1e4;
        data["decoder.out.bias"].set(&Tensor::new(bias.as_slice(), &Device::Cpu)?)?;
        Ok(())
    }

    #[test]
    fn test_config_validation() {
        let mut config = TrainingConfig::default();
        assert!(config.validate().is_ok());

        config.teacher_forcing_ratio = 1.5;
        assert!(config.validate().is_err());

        let config = TrainingConfig {
            print_every: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_artifact_paths() {
        let config = TrainingConfig::default();
        assert_eq!(
            config.model_path(),
            Path::new("result").join("saved_model_lr001_dim500.safetensors")
        );
        assert_eq!(config.loss_path(), Path::new("result").join("loss_lr001_dim500.json"));
    }

    #[test]
    fn test_teacher_forcing_decodes_every_target() -> crate::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = training_config(temp_dir.path(), 1.0);
        let mut trainer = Trainer::new(tiny_model_config(), config, Device::Cpu)?;
        force_eos(&trainer)?;

        let outcome = trainer.run_pair(&sample_pair(), false)?;
        assert!(outcome.teacher_forced);
        assert_eq!(outcome.steps, 4);

        Ok(())
    }

    #[test]
    fn test_free_running_stops_after_eos() -> crate::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = training_config(temp_dir.path(), 0.0);
        let mut trainer = Trainer::new(tiny_model_config(), config, Device::Cpu)?;
        force_eos(&trainer)?;

        let pair = sample_pair();
        let outcome = trainer.run_pair(&pair, false)?;
        assert!(!outcome.teacher_forced);
        assert_eq!(outcome.steps, 1);

        // The single scored step, divided by the full target length of 5
        let encoded = trainer.model.encoder().encode(&pair.input)?;
        let step = trainer.model.decoder().forward(
            &Tensor::new(&pair.target[..1], &Device::Cpu)?,
            &encoded.hidden,
            &encoded.outputs,
            pair.emotion,
            false,
        )?;
        let nll = -step.log_probs.get(0)?.get(pair.target[1] as usize)?.to_scalar::<f32>()?;
        let summed = outcome.loss * pair.target.len() as f32;
        assert!(
            (summed - nll).abs() <= 1e-4 * nll.max(1.0),
            "summed loss {} != first step nll {}",
            summed,
            nll
        );

        Ok(())
    }

    #[test]
    fn test_evaluation_leaves_weights_untouched() -> crate::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = training_config(temp_dir.path(), 0.5);
        let mut trainer = Trainer::new(tiny_model_config(), config, Device::Cpu)?;

        let before = snapshot(trainer.varmap())?;
        let loss = trainer.evaluate(&[sample_pair(), sample_pair()])?;
        let after = snapshot(trainer.varmap())?;

        assert!(loss > 0.0);
        assert_eq!(before, after);
        assert_eq!(trainer.step(), 0);
        assert_eq!(trainer.evaluate(&[])?, 0.0);

        Ok(())
    }

    #[test]
    fn test_training_reduces_loss() -> crate::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = training_config(temp_dir.path(), 1.0);
        let mut trainer = Trainer::new(tiny_model_config(), config, Device::Cpu)?;
        let pair = sample_pair();

        let initial = trainer.train_pair(&pair, false)?;
        for _ in 0..60 {
            trainer.train_pair(&pair, true)?;
        }
        let trained = trainer.train_pair(&pair, false)?;

        assert_eq!(trainer.step(), 60);
        assert!(trained < initial, "loss {} did not drop below {}", trained, initial);

        Ok(())
    }

    #[test]
    fn test_invalid_pair_is_rejected() -> crate::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = training_config(temp_dir.path(), 1.0);
        let mut trainer = Trainer::new(tiny_model_config(), config, Device::Cpu)?;

        let short_target = TrainingPair::new(vec![2], vec![0], Emotion::Fear);
        assert!(trainer.train_pair(&short_target, true).is_err());

        let too_long = TrainingPair::new(vec![2; 7], vec![0, 1], Emotion::Fear);
        assert!(trainer.train_pair(&too_long, true).is_err());

        Ok(())
    }

    #[test]
    fn test_train_writes_artifacts_and_checkpoint_restores() -> crate::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut config = training_config(temp_dir.path(), 0.5);
        config.num_epochs = 2;

        let pairs = vec![
            sample_pair(),
            TrainingPair::new(vec![0, 6, 1], vec![0, 4, 1], Emotion::Sadness),
            TrainingPair::new(vec![0, 7, 8, 1], vec![0, 9, 2, 1], Emotion::Surprise),
            TrainingPair::new(vec![0, 3, 1], vec![0, 5, 5, 1], Emotion::Anger),
        ];
        let dataset = PairDataset::new(pairs.clone(), 10, 6)?;
        let mut loader = PairLoader::new(dataset, true, 11);
        let vocab = Vocabulary::new();

        let mut trainer = Trainer::new(tiny_model_config(), config.clone(), Device::Cpu)?;
        let history = trainer.train(&mut loader, &pairs[..2], &vocab)?;

        // 4 pairs per epoch, reporting every 2
        assert_eq!(history.train_losses.len(), 4);
        assert_eq!(history.test_losses.len(), 4);
        assert_eq!(trainer.step(), 8);
        assert_eq!(trainer.epoch(), 2);

        assert_eq!(LossHistory::load(config.loss_path())?, history);
        assert_eq!(Vocabulary::load(config.lookup_table_path())?, vocab);

        let mut restored = Trainer::new(tiny_model_config(), config.clone(), Device::Cpu)?;
        let metadata = restored.load_checkpoint(config.model_path())?;
        assert_eq!(metadata.step, 8);
        assert_eq!(metadata.learning_rate, 0.05);
        assert_eq!(snapshot(restored.varmap())?, snapshot(trainer.varmap())?);

        let model = crate::models::load_from_checkpoint(config.model_path(), &Device::Cpu)?;
        assert_eq!(model.config(), &tiny_model_config());
        Ok(())
    }

    #[test]
    fn test_respond_returns_reply() -> crate::Result<()> {
        let temp_dir = TempDir::new()?;
        let config = training_config(temp_dir.path(), 1.0);
        let trainer = Trainer::new(tiny_model_config(), config, Device::Cpu)?;

        let reply = trainer.respond(&[0, 4, 1], Emotion::Thankfulness)?;
        assert!(reply.tokens.len() <= 6);
        assert!(!reply.attentions.is_empty());

        Ok(())
    }
}
