//! Transformer decoder stack

use candle_core::{Result, Tensor};
use candle_nn::{layer_norm, LayerNorm, Module, VarBuilder};

use super::attention::MultiHeadAttention;
use super::encoder::FeedForward;

/// One decoder layer: causally masked self-attention over the target,
/// cross-attention over encoder memory, then feed-forward. Post-norm
/// residual connections around each block.
pub struct DecoderLayer {
    self_attention: MultiHeadAttention,
    cross_attention: MultiHeadAttention,
    feed_forward: FeedForward,
    norm1: LayerNorm,
    norm2: LayerNorm,
    norm3: LayerNorm,
    dropout: f64,
}

impl DecoderLayer {
    /// Create a new decoder layer
    pub fn new(
        d_model: usize,
        n_heads: usize,
        d_ff: usize,
        dropout: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let self_attention = MultiHeadAttention::new(d_model, n_heads, dropout, vb.pp("self_attn"))?;
        let cross_attention =
            MultiHeadAttention::new(d_model, n_heads, dropout, vb.pp("cross_attn"))?;
        let feed_forward = FeedForward::new(d_model, d_ff, dropout, vb.pp("ffn"))?;
        let norm1 = layer_norm(d_model, 1e-5, vb.pp("norm1"))?;
        let norm2 = layer_norm(d_model, 1e-5, vb.pp("norm2"))?;
        let norm3 = layer_norm(d_model, 1e-5, vb.pp("norm3"))?;

        Ok(Self {
            self_attention,
            cross_attention,
            feed_forward,
            norm1,
            norm2,
            norm3,
            dropout,
        })
    }

    fn maybe_dropout(&self, x: Tensor, training: bool) -> Result<Tensor> {
        if training && self.dropout > 0.0 {
            candle_nn::ops::dropout(&x, self.dropout as f32)
        } else {
            Ok(x)
        }
    }

    /// Forward pass
    ///
    /// Target shape: [batch, tgt_len, d_model]
    /// Memory shape: [batch, src_len, d_model]
    /// Output shape: [batch, tgt_len, d_model]
    pub fn forward(
        &self,
        tgt: &Tensor,
        memory: &Tensor,
        tgt_mask: Option<&Tensor>,
        training: bool,
    ) -> Result<Tensor> {
        // Masked self-attention over the target
        let (attn_out, _) = self
            .self_attention
            .forward(tgt, tgt, tgt, tgt_mask, training)?;
        let attn_out = self.maybe_dropout(attn_out, training)?;
        let x = (tgt + attn_out)?;
        let x = self.norm1.forward(&x)?;

        // Cross-attention over encoder memory
        let (cross_out, _) = self
            .cross_attention
            .forward(&x, memory, memory, None, training)?;
        let cross_out = self.maybe_dropout(cross_out, training)?;
        let x = (&x + cross_out)?;
        let x = self.norm2.forward(&x)?;

        // Feed-forward
        let ff_out = self.feed_forward.forward(&x, training)?;
        let ff_out = self.maybe_dropout(ff_out, training)?;
        let x = (&x + ff_out)?;
        self.norm3.forward(&x)
    }
}

/// Transformer decoder: a stack of decoder layers with an optional final
/// layer normalization.
pub struct Decoder {
    layers: Vec<DecoderLayer>,
    norm: Option<LayerNorm>,
}

impl Decoder {
    /// Create a new decoder stack
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
                DecoderLayer::new(d_model, n_heads, d_ff, dropout, vb.pp(format!("layer_{}", i)))?;
            layers.push(layer);
        }

        let norm = if final_norm {
            Some(layer_norm(d_model, 1e-5, vb.pp("norm"))?)
        } else {
            None
        };

        Ok(Self { layers, norm })
    }

    /// Forward pass through all decoder layers
    ///
    /// Target shape: [batch, tgt_len, d_model]
    /// Memory shape: [batch, src_len, d_model]
    /// Output shape: [batch, tgt_len, d_model]
    pub fn forward(
        &self,
        tgt: &Tensor,
        memory: &Tensor,
        tgt_mask: Option<&Tensor>,
        training: bool,
    ) -> Result<Tensor> {
        let mut x = tgt.clone();
        for layer in &self.layers {
            x = layer.forward(&x, memory, tgt_mask, training)?;
        }

        match &self.norm {
            Some(norm) => norm.forward(&x),
            None => Ok(x),
        }
    }
}
