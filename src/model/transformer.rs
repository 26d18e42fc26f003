//! Sequence-to-sequence transformer variants for time-series forecasting
//!
//! Two variants share the same building blocks:
//! - [`TimeSeriesTransformer`]: convenience model with framework defaults,
//!   exposing `encode_sequence` / `decode_seq` for autoregressive decoding.
//! - [`ConfigurableTransformer`]: fully-configurable stacks with per-stack
//!   final normalization; whole-window forward only.
//!
//! Both are reachable through the [`Forecaster`] trait, which carries an
//! explicit capability flag for incremental decoding.

use candle_core::{Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

use super::decoder::Decoder;
use super::embedding::{PositionalEncoding, TokenEmbedding};
use super::encoder::Encoder;
use super::TransformerConfig;

/// Common interface over the forecasting transformer variants.
pub trait Forecaster {
    /// Map a source window and a target window to per-step forecasts.
    ///
    /// `tgt_mask` is the additive causal mask over the target; `src_mask`
    /// optionally masks the encoder's self-attention.
    fn forward(
        &self,
        src: &Tensor,
        tgt: &Tensor,
        tgt_mask: &Tensor,
        src_mask: Option<&Tensor>,
        training: bool,
    ) -> Result<Tensor>;

    /// Whether the model exposes the separated encode/decode entry points
    /// required by the greedy decoder.
    fn supports_incremental_decode(&self) -> bool {
        false
    }

    /// Encode the source window into a memory tensor.
    fn encode_sequence(
        &self,
        _src: &Tensor,
        _src_mask: Option<&Tensor>,
        _training: bool,
    ) -> Result<Tensor> {
        candle_core::bail!("this model does not support incremental decoding")
    }

    /// Decode a (possibly partial) target window against precomputed memory.
    fn decode_seq(
        &self,
        _memory: &Tensor,
        _tgt: &Tensor,
        _tgt_mask: &Tensor,
        _seq_size: Option<usize>,
        _training: bool,
    ) -> Result<Tensor> {
        candle_core::bail!("this model does not support incremental decoding")
    }
}

/// Convenience forecasting transformer
///
/// Projects input channels to the model width, adds positional encoding,
/// runs default-sized encoder and decoder stacks (8 heads, 6 layers each),
/// and projects the decoder output down to one scalar per time step. The
/// input projection and positional encoding are shared between the source
/// and target windows.
pub struct TimeSeriesTransformer {
    embedding: TokenEmbedding,
    positional: PositionalEncoding,
    encoder: Encoder,
    decoder: Decoder,
    output_proj: Linear,
    seq_len: usize,
}

impl TimeSeriesTransformer {
    /// Create a model with default hyperparameters (d_model 128, 8 heads,
    /// 6 encoder and decoder layers, feed-forward width 2048, dropout 0.1)
    pub fn new(n_features: usize, seq_len: usize, vb: VarBuilder) -> Result<Self> {
        let config = TransformerConfig {
            n_features,
            seq_len,
            ..Default::default()
        };
        Self::with_config(&config, vb)
    }

    /// Create a model from an explicit configuration
    pub fn with_config(config: &TransformerConfig, vb: VarBuilder) -> Result<Self> {
        config.validate().map_err(candle_core::Error::Msg)?;

        let embedding = TokenEmbedding::new(config.n_features, config.d_model, vb.pp("embedding"))?;
        let positional = PositionalEncoding::new(
            config.d_model,
            config.max_position,
            config.dropout,
            vb.device(),
        )?;
        let encoder = Encoder::new(
            config.d_model,
            config.n_heads,
            config.d_ff,
            config.dropout,
            config.n_encoder_layers,
            false,
            vb.pp("encoder"),
        )?;
        let decoder = Decoder::new(
            config.d_model,
            config.n_heads,
            config.d_ff,
            config.dropout,
            config.n_decoder_layers,
            false,
            vb.pp("decoder"),
        )?;
        let output_proj = linear(config.d_model, 1, vb.pp("output"))?;

        tracing::debug!(
            "created TimeSeriesTransformer: d_model={}, heads={}, layers={}+{}",
            config.d_model,
            config.n_heads,
            config.n_encoder_layers,
            config.n_decoder_layers
        );

        Ok(Self {
            embedding,
            positional,
            encoder,
            decoder,
            output_proj,
            seq_len: config.seq_len,
        })
    }

    /// Shared input pipeline: dense projection plus positional encoding
    ///
    /// Input shape: [batch, seq_len, n_features]
    /// Output shape: [batch, seq_len, d_model]
    fn embed(&self, x: &Tensor, training: bool) -> Result<Tensor> {
        let x = self.embedding.forward(x)?;
        self.positional.forward(&x, training)
    }

    /// Configured forecast window length
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }
}

impl Forecaster for TimeSeriesTransformer {
    /// Full forward pass: encode the source, then decode the target
    ///
    /// Source/target shape: [batch, seq_len, n_features]
    /// Output shape: [batch, seq_len]
    fn forward(
        &self,
        src: &Tensor,
        tgt: &Tensor,
        tgt_mask: &Tensor,
        src_mask: Option<&Tensor>,
        training: bool,
    ) -> Result<Tensor> {
        let memory = self.encode_sequence(src, src_mask, training)?;
        self.decode_seq(&memory, tgt, tgt_mask, None, training)
    }

    fn supports_incremental_decode(&self) -> bool {
        true
    }

    /// Encode the source window into memory
    ///
    /// Input shape: [batch, src_len, n_features]
    /// Output shape: [batch, src_len, d_model]
    fn encode_sequence(
        &self,
        src: &Tensor,
        src_mask: Option<&Tensor>,
        training: bool,
    ) -> Result<Tensor> {
        let src = self.embed(src, training)?;
        self.encoder.forward(&src, src_mask, training)
    }

    /// Decode a target window against precomputed memory
    ///
    /// The decoder output is projected to one scalar per step and reshaped
    /// to [batch, seq_size]; `seq_size` defaults to the configured window
    /// length and must match the target length, otherwise the reshape fails.
    fn decode_seq(
        &self,
        memory: &Tensor,
        tgt: &Tensor,
        tgt_mask: &Tensor,
        seq_size: Option<usize>,
        training: bool,
    ) -> Result<Tensor> {
        let seq_size = seq_size.unwrap_or(self.seq_len);

        let tgt = self.embed(tgt, training)?;
        let out = self.decoder.forward(&tgt, memory, Some(tgt_mask), training)?;
        let out = self.output_proj.forward(&out)?;

        out.reshape(((), seq_size))
    }
}

/// Fully-configurable forecasting transformer
///
/// Takes every hyperparameter from [`TransformerConfig`] and applies a
/// separate final layer normalization to each stack. Unlike the convenience
/// variant it keeps the time-major output shape [seq_len, batch, 1] and does
/// not expose separated encode/decode entry points, so it cannot drive the
/// greedy decoder.
pub struct ConfigurableTransformer {
    embedding: TokenEmbedding,
    positional: PositionalEncoding,
    encoder: Encoder,
    decoder: Decoder,
    output_proj: Linear,
}

impl ConfigurableTransformer {
    /// Create a model from a configuration
    pub fn new(config: &TransformerConfig, vb: VarBuilder) -> Result<Self> {
        config.validate().map_err(candle_core::Error::Msg)?;

        let embedding = TokenEmbedding::new(config.n_features, config.d_model, vb.pp("embedding"))?;
        let positional = PositionalEncoding::new(
            config.d_model,
            config.max_position,
            config.dropout,
            vb.device(),
        )?;
        let encoder = Encoder::new(
            config.d_model,
            config.n_heads,
            config.d_ff,
            config.dropout,
            config.n_encoder_layers,
            true,
            vb.pp("encoder"),
        )?;
        let decoder = Decoder::new(
            config.d_model,
            config.n_heads,
            config.d_ff,
            config.dropout,
            config.n_decoder_layers,
            true,
            vb.pp("decoder"),
        )?;
        let output_proj = linear(config.d_model, 1, vb.pp("output"))?;

        tracing::debug!(
            "created ConfigurableTransformer: d_model={}, heads={}, layers={}+{}, d_ff={}",
            config.d_model,
            config.n_heads,
            config.n_encoder_layers,
            config.n_decoder_layers,
            config.d_ff
        );

        Ok(Self {
            embedding,
            positional,
            encoder,
            decoder,
            output_proj,
        })
    }

    fn embed(&self, x: &Tensor, training: bool) -> Result<Tensor> {
        let x = self.embedding.forward(x)?;
        self.positional.forward(&x, training)
    }
}

impl Forecaster for ConfigurableTransformer {
    /// Full forward pass
    ///
    /// Source/target shape: [batch, seq_len, n_features]
    /// Output shape: [seq_len, batch, 1] (time-major, kept for parity with
    /// the stack-internal layout)
    fn forward(
        &self,
        src: &Tensor,
        tgt: &Tensor,
        tgt_mask: &Tensor,
        src_mask: Option<&Tensor>,
        training: bool,
    ) -> Result<Tensor> {
        let src = self.embed(src, training)?;
        let tgt = self.embed(tgt, training)?;

        // The encoder attends with the source mask; the causal target mask
        // only constrains the decoder's self-attention.
        let memory = self.encoder.forward(&src, src_mask, training)?;
        let out = self.decoder.forward(&tgt, &memory, Some(tgt_mask), training)?;
        let out = self.output_proj.forward(&out)?;

        out.permute((1, 0, 2))
    }
}
