//! Transformer encoder stack

use candle_core::{Result, Tensor};
use candle_nn::{layer_norm, linear, LayerNorm, Linear, Module, VarBuilder};

use super::attention::MultiHeadAttention;

/// Feed-Forward Network
pub struct FeedForward {
    linear1: Linear,
    linear2: Linear,
    dropout: f64,
}

impl FeedForward {
    /// Create a new feed-forward network
    pub fn new(d_model: usize, d_ff: usize, dropout: f64, vb: VarBuilder) -> Result<Self> {
        let linear1 = linear(d_model, d_ff, vb.pp("linear1"))?;
        let linear2 = linear(d_ff, d_model, vb.pp("linear2"))?;

        Ok(Self {
            linear1,
            linear2,
            dropout,
        })
    }

    /// Forward pass
    pub fn forward(&self, x: &Tensor, training: bool) -> Result<Tensor> {
        let x = self.linear1.forward(x)?;
        let x = x.gelu_erf()?;

        let x = if training && self.dropout > 0.0 {
            candle_nn::ops::dropout(&x, self.dropout as f32)?
        } else {
            x
        };

        self.linear2.forward(&x)
    }
}

/// One encoder layer: self-attention plus feed-forward, with post-norm
/// residual connections.
pub struct EncoderLayer {
    self_attention: MultiHeadAttention,
    feed_forward: FeedForward,
    norm1: LayerNorm,
    norm2: LayerNorm,
    dropout: f64,
}

impl EncoderLayer {
    /// Create a new encoder layer
    pub fn new(
        d_model: usize,
        n_heads: usize,
        d_ff: usize,
        dropout: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let self_attention = MultiHeadAttention::new(d_model, n_heads, dropout, vb.pp("self_attn"))?;
        let feed_forward = FeedForward::new(d_model, d_ff, dropout, vb.pp("ffn"))?;
        let norm1 = layer_norm(d_model, 1e-5, vb.pp("norm1"))?;
        let norm2 = layer_norm(d_model, 1e-5, vb.pp("norm2"))?;

        Ok(Self {
            self_attention,
            feed_forward,
            norm1,
            norm2,
            dropout,
        })
    }

    /// Forward pass
    ///
    /// Input shape: [batch, seq_len, d_model]
    /// Output shape: [batch, seq_len, d_model]
    pub fn forward(&self, x: &Tensor, mask: Option<&Tensor>, training: bool) -> Result<Tensor> {
        // Self-attention with residual connection
        let (attn_out, _) = self.self_attention.forward(x, x, x, mask, training)?;
        let attn_out = if training && self.dropout > 0.0 {
            candle_nn::ops::dropout(&attn_out, self.dropout as f32)?
        } else {
            attn_out
        };
        let x = (x + attn_out)?;
        let x = self.norm1.forward(&x)?;

        // Feed-forward with residual connection
        let ff_out = self.feed_forward.forward(&x, training)?;
        let ff_out = if training && self.dropout > 0.0 {
            candle_nn::ops::dropout(&ff_out, self.dropout as f32)?
        } else {
            ff_out
        };
        let x = (&x + ff_out)?;
        self.norm2.forward(&x)
    }
}

/// Transformer encoder: a stack of encoder layers with an optional final
/// layer normalization.
pub struct Encoder {
    layers: Vec<EncoderLayer>,
    norm: Option<LayerNorm>,
}

impl Encoder {
    /// Create a new encoder stack
    pub fn new(
        d_model: usize,
        n_heads: usize,
        d_ff: usize,
        dropout: f64,
        n_layers: usize,
        final_norm: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(n_layers);
        for i in 0..n_layers {
            let layer =
                EncoderLayer::new(d_model, n_heads, d_ff, dropout, vb.pp(format!("layer_{}", i)))?;
            layers.push(layer);
        }

        let norm = if final_norm {
            Some(layer_norm(d_model, 1e-5, vb.pp("norm"))?)
        } else {
            None
        };

        Ok(Self { layers, norm })
    }

    /// Forward pass through all encoder layers
    ///
    /// Input shape: [batch, seq_len, d_model]
    /// Output shape: [batch, seq_len, d_model]
    pub fn forward(&self, x: &Tensor, mask: Option<&Tensor>, training: bool) -> Result<Tensor> {
        let mut x = x.clone();
        for layer in &self.layers {
            x = layer.forward(&x, mask, training)?;
        }

        match &self.norm {
            Some(norm) => norm.forward(&x),
            None => Ok(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn create_test_vb() -> (VarMap, VarBuilder<'static>) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        (varmap, vb)
    }

    #[test]
    fn test_feed_forward() -> Result<()> {
        let (_varmap, vb) = create_test_vb();
        let ff = FeedForward::new(64, 256, 0.1, vb)?;

        let x = Tensor::randn(0f32, 1f32, (2, 10, 64), &Device::Cpu)?;
        let output = ff.forward(&x, false)?;

        assert_eq!(output.dims(), &[2, 10, 64]);

        Ok(())
    }

    #[test]
    fn test_encoder_layer() -> Result<()> {
        let (_varmap, vb) = create_test_vb();
        let layer = EncoderLayer::new(32, 4, 128, 0.1, vb)?;

        let x = Tensor::randn(0f32, 1f32, (2, 10, 32), &Device::Cpu)?;
        let output = layer.forward(&x, None, false)?;

        assert_eq!(output.dims(), &[2, 10, 32]);

        Ok(())
    }

    #[test]
    fn test_encoder_stack() -> Result<()> {
        let (_varmap, vb) = create_test_vb();
        let encoder = Encoder::new(32, 4, 128, 0.1, 2, true, vb)?;

        let x = Tensor::randn(0f32, 1f32, (2, 10, 32), &Device::Cpu)?;
        let output = encoder.forward(&x, None, false)?;

        assert_eq!(output.dims(), &[2, 10, 32]);

        Ok(())
    }
}
