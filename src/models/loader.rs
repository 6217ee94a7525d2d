/// Weight loading from safetensors files
use std::path::Path;
use candle_core::{Device, DType};
use candle_nn::VarBuilder;
use super::{ReidNet, ReidNetConfig};

/// Load model from safetensors file
///
/// # Arguments
/// * `config` - Model configuration
/// * `weights_path` - Path to safetensors file
/// * `device` - Device to load model on
///
/// # Returns
/// Loaded ReidNet
pub fn load_model<P: AsRef<Path>>(
    config: ReidNetConfig,
    weights_path: P,
    device: &Device,
) -> crate::Result<ReidNet> {
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path.as_ref()], DType::F32, device)?
    };

    Ok(ReidNet::new(config, vb)?)
}
