//! Model module for transformer-based time-series forecasting
//!
//! This module provides the core model components:
//! - Embeddings (input projection and positional encoding)
//! - Attention mechanisms (self-attention and cross-attention)
//! - Encoder and decoder stacks
//! - The two forecasting transformer variants

mod attention;
mod decoder;
mod embedding;
mod encoder;
mod mask;
mod transformer;

pub use attention::{scaled_dot_product_attention, MultiHeadAttention};
pub use decoder::{Decoder, DecoderLayer};
pub use embedding::{PositionalEncoding, TokenEmbedding};
pub use encoder::{Encoder, EncoderLayer, FeedForward};
pub use mask::generate_square_subsequent_mask;
pub use transformer::{ConfigurableTransformer, Forecaster, TimeSeriesTransformer};

use serde::{Deserialize, Serialize};

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Number of input channels per time step
    pub n_features: usize,
    /// Sequence length (forecast window)
    pub seq_len: usize,
    /// Model dimension
    pub d_model: usize,
    /// Number of attention heads
    pub n_heads: usize,
    /// Number of encoder layers
    pub n_encoder_layers: usize,
    /// Number of decoder layers
    pub n_decoder_layers: usize,
    /// Feed-forward dimension
    pub d_ff: usize,
    /// Dropout rate
    pub dropout: f64,
    /// Maximum length supported by the positional encoding table
    pub max_position: usize,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            n_features: 1,
            seq_len: 48,
            d_model: 128,
            n_heads: 8,
            n_encoder_layers: 6,
            n_decoder_layers: 6,
            d_ff: 2048,
            dropout: 0.1,
            max_position: 5000,
        }
    }
}

impl TransformerConfig {
    /// Create a new configuration with custom parameters
    pub fn new(n_features: usize, seq_len: usize, d_model: usize, n_heads: usize) -> Self {
        Self {
            n_features,
            seq_len,
            d_model,
            n_heads,
            ..Default::default()
        }
    }

    /// Set the encoder and decoder depth
    pub fn with_n_layers(mut self, n_layers: usize) -> Self {
        self.n_encoder_layers = n_layers;
        self.n_decoder_layers = n_layers;
        self
    }

    /// Set the feed-forward dimension
    pub fn with_d_ff(mut self, d_ff: usize) -> Self {
        self.d_ff = d_ff;
        self
    }

    /// Set the dropout rate
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Set the positional encoding capacity
    pub fn with_max_position(mut self, max_position: usize) -> Self {
        self.max_position = max_position;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.d_model % self.n_heads != 0 {
            return Err(format!(
                "d_model ({}) must be divisible by n_heads ({})",
                self.d_model, self.n_heads
            ));
        }
        if self.d_model % 2 != 0 {
            return Err(format!(
                "d_model ({}) must be even for sin/cos positional pairing",
                self.d_model
            ));
        }
        if self.n_features == 0 {
            return Err("n_features must be greater than 0".to_string());
        }
        if self.seq_len == 0 {
            return Err("seq_len must be greater than 0".to_string());
        }
        if self.n_encoder_layers == 0 || self.n_decoder_layers == 0 {
            return Err("encoder and decoder need at least one layer".to_string());
        }
        if self.dropout < 0.0 || self.dropout >= 1.0 {
            return Err(format!(
                "dropout ({}) must be in [0, 1); survivors are scaled by 1/(1-p)",
                self.dropout
            ));
        }
        if self.seq_len > self.max_position {
            return Err(format!(
                "seq_len ({}) exceeds positional encoding capacity ({})",
                self.seq_len, self.max_position
            ));
        }
        Ok(())
    }
}
