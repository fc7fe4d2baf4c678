/// Utility functions for the chatbot trainer
use candle_core::{Device, Result, Tensor};
use candle_nn::VarMap;

/// Pick CUDA device 0 when requested and available, otherwise the CPU
pub fn select_device(use_cuda: bool) -> Result<Device> {
    if use_cuda && candle_core::utils::cuda_is_available() {
        Device::new_cuda(0)
    } else {
        if use_cuda {
            log::warn!("CUDA requested but not available, falling back to CPU");
        }
        Ok(Device::Cpu)
    }
}

/// Calculate the number of parameters in a tensor
pub fn count_parameters(tensor: &Tensor) -> usize {
    tensor.dims().iter().product()
}

/// Total number of trainable parameters held by a VarMap
pub fn count_varmap_parameters(varmap: &VarMap) -> usize {
    varmap
        .all_vars()
        .iter()
        .map(|v| count_parameters(v.as_tensor()))
        .sum()
}
