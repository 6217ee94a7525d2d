/// Re-id models
use candle_core::{Result, Tensor, D};
use candle_nn::{BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Dropout, Linear, Module, ModuleT, VarBuilder};
use serde::{Deserialize, Serialize};

pub mod loader;

/// Anything the trainer can drive
pub trait ReidModel {
    /// Forward pass over the model inputs (images first)
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor>;

    /// Toggle training behaviour (dropout, batch-norm statistics)
    fn set_training(&mut self, training: bool);
}

/// Configuration for [`ReidNet`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReidNetConfig {
    /// Image channels
    pub in_channels: usize,

    /// Width of the first conv stage; doubled at each of the three stages
    pub base_channels: usize,

    /// Embedding dimension
    pub num_features: usize,

    /// Classifier outputs; 0 returns embeddings instead of logits
    pub num_classes: usize,

    /// Dropout probability before the classifier
    pub dropout: f32,

    /// L2-normalise embeddings instead of applying ReLU
    pub norm: bool,
}

impl Default for ReidNetConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            base_channels: 32,
            num_features: 256,
            num_classes: 751,
            dropout: 0.5,
            norm: false,
        }
    }
}

impl ReidNetConfig {
    /// Channels coming out of the backbone
    pub fn backbone_channels(&self) -> usize {
        self.base_channels * 4
    }
}

/// Conv + batch-norm + ReLU, stride 2
struct ConvStage {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvStage {
    fn new(in_channels: usize, out_channels: usize, vb: VarBuilder) -> Result<Self> {
        let conv_config = Conv2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };
        let conv = candle_nn::conv2d_no_bias(in_channels, out_channels, 3, conv_config, vb.pp("conv"))?;
        let bn = candle_nn::batch_norm(out_channels, BatchNormConfig::default(), vb.pp("bn"))?;
        Ok(Self { conv, bn })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let xs = self.conv.forward(xs)?;
        self.bn.forward_t(&xs, train)?.relu()
    }
}

/// Small convolutional re-id network
///
/// Three stride-2 conv stages, global average pooling, an embedding layer
/// with batch-norm, then an optional identity classifier.
pub struct ReidNet {
    config: ReidNetConfig,
    stages: Vec<ConvStage>,
    feat: Linear,
    feat_bn: BatchNorm,
    dropout: Dropout,
    classifier: Option<Linear>,
    training: bool,
}

impl ReidNet {
    pub fn new(config: ReidNetConfig, vb: VarBuilder) -> Result<Self> {
        let widths = [
            config.in_channels,
            config.base_channels,
            config.base_channels * 2,
            config.backbone_channels(),
        ];
        let stages = widths
            .windows(2)
            .enumerate()
            .map(|(i, w)| ConvStage::new(w[0], w[1], vb.pp(format!("stage{}", i))))
            .collect::<Result<Vec<_>>>()?;

        let feat = candle_nn::linear(config.backbone_channels(), config.num_features, vb.pp("feat"))?;
        let feat_bn = candle_nn::batch_norm(config.num_features, BatchNormConfig::default(), vb.pp("feat_bn"))?;
        let dropout = Dropout::new(config.dropout);

        let classifier = if config.num_classes > 0 {
            Some(candle_nn::linear(config.num_features, config.num_classes, vb.pp("classifier"))?)
        } else {
            None
        };

        Ok(Self {
            config,
            stages,
            feat,
            feat_bn,
            dropout,
            classifier,
            training: false,
        })
    }

    pub fn config(&self) -> &ReidNetConfig {
        &self.config
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Features `[batch, num_features]` or logits `[batch, num_classes]`
    pub fn forward_images(&self, images: &Tensor) -> Result<Tensor> {
        let train = self.training;

        let mut xs = images.clone();
        for stage in &self.stages {
            xs = stage.forward_t(&xs, train)?;
        }

        // Global average pooling: [b, c, h, w] -> [b, c]
        let pooled = xs.mean(D::Minus1)?.mean(D::Minus1)?;

        let feats = self.feat.forward(&pooled)?;
        let feats = self.feat_bn.forward_t(&feats, train)?;

        let feats = if self.config.norm {
            l2_normalize(&feats)?
        } else {
            feats.relu()?
        };
        let feats = self.dropout.forward(&feats, train)?;

        match &self.classifier {
            Some(classifier) => classifier.forward(&feats),
            None => Ok(feats),
        }
    }
}

impl ReidModel for ReidNet {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        let images = inputs
            .first()
            .ok_or_else(|| candle_core::Error::Msg("ReidNet expects an image tensor".to_string()))?;
        self.forward_images(images)
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

/// Row-wise L2 normalisation of `[batch, dim]`
pub fn l2_normalize(xs: &Tensor) -> Result<Tensor> {
    let norm = (xs.sqr()?.sum_keepdim(D::Minus1)? + 1e-12)?.sqrt()?;
    xs.broadcast_div(&norm)
}
