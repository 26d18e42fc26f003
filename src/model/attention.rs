//! Attention mechanisms for the forecasting transformer
//!
//! Implements:
//! - Scaled dot-product attention with additive masking
//! - Multi-Head Attention usable for both self-attention and cross-attention

use candle_core::{Result, Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// Scaled dot-product attention
///
/// The optional mask is additive: entries are 0.0 for allowed pairs and -inf
/// for forbidden ones, broadcast onto the [batch, heads, q_len, k_len] score
/// matrix before the softmax.
pub fn scaled_dot_product_attention(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
    mask: Option<&Tensor>,
    dropout: f64,
    training: bool,
) -> Result<(Tensor, Tensor)> {
    let d_k = query.dim(D::Minus1)? as f64;
    let scale = 1.0 / d_k.sqrt();

    // Compute attention scores: Q @ K^T / sqrt(d_k)
    let scores = query.matmul(&key.transpose(D::Minus2, D::Minus1)?.contiguous()?)?;
    let scores = (scores * scale)?;

    let scores = match mask {
        Some(m) => scores.broadcast_add(m)?,
        None => scores,
    };

    let attention_weights = candle_nn::ops::softmax(&scores, D::Minus1)?;

    let attention_weights = if training && dropout > 0.0 {
        candle_nn::ops::dropout(&attention_weights, dropout as f32)?
    } else {
        attention_weights
    };

    let output = attention_weights.matmul(value)?;

    Ok((output, attention_weights))
}

/// Multi-Head Attention
///
/// Query and key/value sequences may have different lengths, so the same
/// module serves the encoder's self-attention, the decoder's masked
/// self-attention, and the decoder's cross-attention over encoder memory.
pub struct MultiHeadAttention {
    query_proj: Linear,
    key_proj: Linear,
    value_proj: Linear,
    output_proj: Linear,
    n_heads: usize,
    head_dim: usize,
    dropout: f64,
}

impl MultiHeadAttention {
    /// Create a new multi-head attention layer
    pub fn new(d_model: usize, n_heads: usize, dropout: f64, vb: VarBuilder) -> Result<Self> {
        if d_model % n_heads != 0 {
            candle_core::bail!(
                "d_model ({}) must be divisible by n_heads ({})",
                d_model,
                n_heads
            );
        }

        let head_dim = d_model / n_heads;

        let query_proj = linear(d_model, d_model, vb.pp("query"))?;
        let key_proj = linear(d_model, d_model, vb.pp("key"))?;
        let value_proj = linear(d_model, d_model, vb.pp("value"))?;
        let output_proj = linear(d_model, d_model, vb.pp("output"))?;

        Ok(Self {
            query_proj,
            key_proj,
            value_proj,
            output_proj,
            n_heads,
            head_dim,
            dropout,
        })
    }

    /// Forward pass with optional additive mask
    ///
    /// Query shape: [batch, q_len, d_model]
    /// Key/value shape: [batch, kv_len, d_model]
    /// Output shape: [batch, q_len, d_model], weights [batch, heads, q_len, kv_len]
    pub fn forward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        mask: Option<&Tensor>,
        training: bool,
    ) -> Result<(Tensor, Tensor)> {
        let (batch_size, q_len, _) = query.dims3()?;
        let kv_len = key.dim(1)?;

        // Project Q, K, V
        let q = self.query_proj.forward(query)?;
        let k = self.key_proj.forward(key)?;
        let v = self.value_proj.forward(value)?;

        // Split heads: [batch, n_heads, len, head_dim]
        let q = q
            .reshape((batch_size, q_len, self.n_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let k = k
            .reshape((batch_size, kv_len, self.n_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let v = v
            .reshape((batch_size, kv_len, self.n_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;

        let (output, attention_weights) =
            scaled_dot_product_attention(&q, &k, &v, mask, self.dropout, training)?;

        // Merge heads back: [batch, q_len, d_model]
        let output = output
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch_size, q_len, self.n_heads * self.head_dim))?;

        let output = self.output_proj.forward(&output)?;

        Ok((output, attention_weights))
    }
}
