/// Model checkpointing with safetensors
use std::path::Path;
use std::collections::HashMap;
use candle_core::{Tensor, Device};
use candle_nn::VarMap;
use safetensors::tensor::SafeTensors;

/// Header key under which the JSON metadata is stored
const METADATA_KEY: &str = "checkpoint";

/// Checkpoint metadata
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckpointMetadata {
    /// Number of optimizer steps taken
    pub step: usize,
    /// Completed epochs
    pub epoch: usize,
    /// Learning rate at checkpoint
    pub learning_rate: f64,
    /// Loss at checkpoint
    pub loss: Option<f64>,
    /// Model configuration (as JSON string)
    pub config: Option<String>,
}

impl Default for CheckpointMetadata {
    fn default() -> Self {
        Self {
            step: 0,
            epoch: 0,
            learning_rate: 0.0,
            loss: None,
            config: None,
        }
    }
}

/// Model checkpoint
pub struct Checkpoint {
    /// Model parameters
    pub tensors: HashMap<String, Tensor>,
    /// Metadata
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Create new checkpoint
    pub fn new(tensors: HashMap<String, Tensor>, metadata: CheckpointMetadata) -> Self {
        Self { tensors, metadata }
    }

    /// Snapshot every variable of a VarMap
    pub fn from_varmap(varmap: &VarMap, metadata: CheckpointMetadata) -> crate::Result<Self> {
        let data = varmap
            .data()
            .lock()
            .map_err(|e| crate::ChatbotError::Model(format!("VarMap lock poisoned: {}", e)))?;

        let tensors = data
            .iter()
            .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
            .collect();

        Ok(Self::new(tensors, metadata))
    }

    /// Save checkpoint to a safetensors file, metadata in the header
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let metadata_json = serde_json::to_string(&self.metadata)?;
        let header = HashMap::from([(METADATA_KEY.to_string(), metadata_json)]);

        safetensors::serialize_to_file(
            self.tensors.iter().map(|(name, tensor)| (name.as_str(), tensor)),
            &Some(header),
            path.as_ref(),
        )?;

        Ok(())
    }

    /// Load checkpoint from file
    ///
    /// Files without a metadata header load with default metadata.
    pub fn load<P: AsRef<Path>>(path: P, device: &Device) -> crate::Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let metadata = parse_metadata(&data)?;
        let tensors = candle_core::safetensors::load_buffer(&data, device)?;

        Ok(Self { tensors, metadata })
    }

    /// Read only the metadata header
    pub fn read_metadata<P: AsRef<Path>>(path: P) -> crate::Result<CheckpointMetadata> {
        let data = std::fs::read(path.as_ref())?;
        parse_metadata(&data)
    }

    /// Copy the checkpoint tensors into matching VarMap variables
    ///
    /// Every variable must be present with the same shape. Extra tensors in
    /// the checkpoint are ignored.
    pub fn restore_into(&self, varmap: &VarMap) -> crate::Result<()> {
        let data = varmap
            .data()
            .lock()
            .map_err(|e| crate::ChatbotError::Model(format!("VarMap lock poisoned: {}", e)))?;

        for (name, var) in data.iter() {
            let tensor = self.tensors.get(name).ok_or_else(|| {
                crate::ChatbotError::Model(format!("Checkpoint is missing variable {}", name))
            })?;

            if tensor.dims() != var.dims() {
                return Err(crate::ChatbotError::Model(format!(
                    "Shape mismatch for {}: checkpoint {:?}, model {:?}",
                    name,
                    tensor.dims(),
                    var.dims()
                )));
            }

            let tensor = tensor.to_device(var.device())?.to_dtype(var.dtype())?;
            var.set(&tensor)?;
        }

        let extra = self.tensors.keys().filter(|k| !data.contains_key(*k)).count();
        if extra > 0 {
            log::debug!("Ignored {} checkpoint tensors with no matching variable", extra);
        }

        Ok(())
    }
}

fn parse_metadata(data: &[u8]) -> crate::Result<CheckpointMetadata> {
    let (_, header) = SafeTensors::read_metadata(data)?;
    match header.metadata().as_ref().and_then(|m| m.get(METADATA_KEY)) {
        Some(json) => Ok(serde_json::from_str(json)?),
        None => {
            log::warn!("Checkpoint has no metadata header, using defaults");
            Ok(CheckpointMetadata::default())
        }
    }
}

/// Save model parameters to checkpoint
pub fn save_checkpoint<P: AsRef<Path>>(
    varmap: &VarMap,
    path: P,
    metadata: CheckpointMetadata,
) -> crate::Result<()> {
    Checkpoint::from_varmap(varmap, metadata)?.save(path)
}

/// Restore model parameters from checkpoint, returning its metadata
pub fn load_checkpoint<P: AsRef<Path>>(
    varmap: &VarMap,
    path: P,
    device: &Device,
) -> crate::Result<CheckpointMetadata> {
    let checkpoint = Checkpoint::load(path, device)?;
    checkpoint.restore_into(varmap)?;
    Ok(checkpoint.metadata)
}
