/// Read-only model construction from saved checkpoints
use std::path::Path;
use candle_core::{Device, DType};
use candle_nn::VarBuilder;
use crate::Seq2SeqConfig;
use crate::training::Checkpoint;
use super::Seq2SeqModel;

/// Build a model over the tensors of a safetensors checkpoint
///
/// The weights are memory-mapped plain tensors, so the model can decode but
/// not train. Use `Trainer::load_checkpoint` to resume training instead.
///
/// # Errors
/// `ChatbotError::Config` for an invalid configuration, `ChatbotError::Model`
/// when the file lacks a tensor the configuration needs or holds one with a
/// different shape.
pub fn load_model<P: AsRef<Path>>(
    config: Seq2SeqConfig,
    weights_path: P,
    device: &Device,
) -> crate::Result<Seq2SeqModel> {
    config.validate()?;
    let path = weights_path.as_ref();
    log::info!(
        "Loading seq2seq weights from {:?} (vocab={}, hidden={}, max_length={})",
        path,
        config.vocab_size,
        config.hidden_size,
        config.max_length
    );

    // Safety: the file must not be modified while the model is alive
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };

    Seq2SeqModel::new(config, vb).map_err(|e| match e {
        crate::ChatbotError::Candle(err) => crate::ChatbotError::Model(format!(
            "Checkpoint {:?} does not match the model configuration: {}",
            path, err
        )),
        other => other,
    })
}

/// Load model using the configuration recorded in the checkpoint metadata
pub fn load_from_checkpoint<P: AsRef<Path>>(
    weights_path: P,
    device: &Device,
) -> crate::Result<Seq2SeqModel> {
    let metadata = Checkpoint::read_metadata(weights_path.as_ref())?;
    let config_json = metadata.config.ok_or_else(|| {
        crate::ChatbotError::Model(format!(
            "Checkpoint {:?} does not record a model configuration",
            weights_path.as_ref()
        ))
    })?;
    let config: Seq2SeqConfig = serde_json::from_str(&config_json)?;

    load_model(config, weights_path, device)
}
