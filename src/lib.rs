//! Transformer Forecast
//!
//! Sequence-to-sequence transformer models for multivariate time-series
//! forecasting, built on the Candle ML framework, plus the autoregressive
//! greedy decoding loop used at inference time.
//!
//! # Features
//!
//! - **Two model variants**: a convenience transformer with framework
//!   defaults and a fully-configurable encoder/decoder stack, unified under
//!   the [`Forecaster`] trait
//! - **Causal masking**: square subsequent masks enforcing autoregressive
//!   order over the target window
//! - **Greedy decoding**: step-by-step inference that feeds each prediction
//!   back as input, with optional known future covariates
//!
//! # Example
//!
//! ```rust,ignore
//! use candle_core::{DType, Device};
//! use candle_nn::{VarBuilder, VarMap};
//! use transformer_forecast::{
//!     greedy_decode, generate_square_subsequent_mask, TimeSeriesTransformer,
//! };
//!
//! let varmap = VarMap::new();
//! let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
//!
//! // One input channel, 48-step forecast window
//! let model = TimeSeriesTransformer::new(1, 48, vb)?;
//!
//! // ... train the parameters held by `varmap` ...
//!
//! let out = greedy_decode(&model, &history, None, 48, &seed, None)?;
//! println!("{:?}", out.predictions);
//! ```

pub mod decoding;
pub mod model;

// Re-export main types
pub use decoding::{greedy_decode, GreedyDecodeOutput};
pub use model::{
    generate_square_subsequent_mask, ConfigurableTransformer, Forecaster, PositionalEncoding,
    TimeSeriesTransformer, TokenEmbedding, TransformerConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default model dimension
pub const DEFAULT_D_MODEL: usize = 128;

/// Default number of attention heads
pub const DEFAULT_N_HEADS: usize = 8;

/// Default forecast window length
pub const DEFAULT_SEQ_LEN: usize = 48;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_defaults_match_config() {
        let config = TransformerConfig::default();
        assert_eq!(config.d_model, DEFAULT_D_MODEL);
        assert_eq!(config.n_heads, DEFAULT_N_HEADS);
        assert_eq!(config.seq_len, DEFAULT_SEQ_LEN);
    }
}
