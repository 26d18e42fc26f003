//! Embedding layers for the forecasting transformer
//!
//! Implements:
//! - Token Embedding (projects raw time-series channels to model dimension)
//! - Positional Encoding (adds deterministic sinusoidal position information)

use candle_core::{Device, Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// Token Embedding layer
///
/// Projects input channels to the model dimension. One instance is shared
/// between the source and target windows so both live in the same space.
pub struct TokenEmbedding {
    projection: Linear,
}

impl TokenEmbedding {
    /// Create a new token embedding layer
    pub fn new(n_features: usize, d_model: usize, vb: VarBuilder) -> Result<Self> {
        let projection = linear(n_features, d_model, vb.pp("projection"))?;
        Ok(Self { projection })
    }

    /// Forward pass
    ///
    /// Input shape: [batch, seq_len, n_features]
    /// Output shape: [batch, seq_len, d_model]
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.projection.forward(x)
    }
}

/// Positional Encoding
///
/// Adds sinusoidal position information to token embeddings. The table is
/// precomputed once up to `max_len` and sliced per call; it carries no
/// learnable parameters and is never touched by training.
pub struct PositionalEncoding {
    encoding: Tensor,
    max_len: usize,
    dropout: f64,
}

impl PositionalEncoding {
    /// Create a new positional encoding layer
    pub fn new(d_model: usize, max_len: usize, dropout: f64, device: &Device) -> Result<Self> {
        let encoding = Self::create_encoding(d_model, max_len, device)?;
        Ok(Self {
            encoding,
            max_len,
            dropout,
        })
    }

    /// Create the sinusoidal table
    ///
    /// T[p, 2k] = sin(p / 10000^(2k / d_model))
    /// T[p, 2k + 1] = cos(p / 10000^(2k / d_model))
    fn create_encoding(d_model: usize, max_len: usize, device: &Device) -> Result<Tensor> {
        let mut encoding = vec![0f32; max_len * d_model];

        for pos in 0..max_len {
            for i in 0..d_model {
                let angle = pos as f64 / 10000f64.powf((2 * (i / 2)) as f64 / d_model as f64);
                encoding[pos * d_model + i] = if i % 2 == 0 {
                    angle.sin() as f32
                } else {
                    angle.cos() as f32
                };
            }
        }

        Tensor::from_vec(encoding, (max_len, d_model), device)
    }

    /// Forward pass
    ///
    /// Input shape: [batch, seq_len, d_model]
    /// Output shape: [batch, seq_len, d_model]
    ///
    /// Fails if `seq_len` exceeds the precomputed table length. Dropout is
    /// applied during training only.
    pub fn forward(&self, x: &Tensor, training: bool) -> Result<Tensor> {
        let seq_len = x.dim(1)?;
        if seq_len > self.max_len {
            candle_core::bail!(
                "sequence length {} exceeds positional encoding capacity {}",
                seq_len,
                self.max_len
            );
        }

        // Slice the table to the sequence length and broadcast over batch
        let pe = self.encoding.narrow(0, 0, seq_len)?;
        let output = x.broadcast_add(&pe)?;

        if training && self.dropout > 0.0 {
            candle_nn::ops::dropout(&output, self.dropout as f32)
        } else {
            Ok(output)
        }
    }

    /// Get a slice of the encoding table for analysis
    pub fn encoding(&self, seq_len: usize) -> Result<Tensor> {
        self.encoding.narrow(0, 0, seq_len)
    }

    /// Maximum sequence length supported by the table
    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn create_test_vb() -> (VarMap, VarBuilder<'static>) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        (varmap, vb)
    }

    #[test]
    fn test_token_embedding() -> Result<()> {
        let (_varmap, vb) = create_test_vb();
        let emb = TokenEmbedding::new(6, 64, vb)?;

        let x = Tensor::randn(0f32, 1f32, (2, 10, 6), &Device::Cpu)?;
        let output = emb.forward(&x)?;

        assert_eq!(output.dims(), &[2, 10, 64]);

        Ok(())
    }

    #[test]
    fn test_positional_encoding_shape() -> Result<()> {
        let pe = PositionalEncoding::new(64, 512, 0.1, &Device::Cpu)?;

        let x = Tensor::randn(0f32, 1f32, (2, 10, 64), &Device::Cpu)?;
        let output = pe.forward(&x, false)?;

        assert_eq!(output.dims(), &[2, 10, 64]);

        Ok(())
    }

    #[test]
    fn test_encoding_is_deterministic() -> Result<()> {
        let a = PositionalEncoding::new(32, 100, 0.1, &Device::Cpu)?;
        let b = PositionalEncoding::new(32, 100, 0.1, &Device::Cpu)?;

        let table_a: Vec<Vec<f32>> = a.encoding(100)?.to_vec2()?;
        let table_b: Vec<Vec<f32>> = b.encoding(100)?.to_vec2()?;

        assert_eq!(table_a, table_b);

        Ok(())
    }

    #[test]
    fn test_sin_cos_pairing() -> Result<()> {
        let pe = PositionalEncoding::new(16, 50, 0.0, &Device::Cpu)?;
        let table: Vec<Vec<f32>> = pe.encoding(50)?.to_vec2()?;

        // Each even/odd pair is sin/cos of the same angle
        for row in &table {
            for k in 0..8 {
                let norm = row[2 * k].powi(2) + row[2 * k + 1].powi(2);
                assert!((norm - 1.0).abs() < 1e-5);
            }
        }

        Ok(())
    }

    #[test]
    fn test_rejects_sequence_beyond_table() -> Result<()> {
        let pe = PositionalEncoding::new(16, 8, 0.1, &Device::Cpu)?;

        let x = Tensor::randn(0f32, 1f32, (1, 9, 16), &Device::Cpu)?;
        assert!(pe.forward(&x, false).is_err());

        Ok(())
    }

    #[test]
    fn test_zero_dropout_is_identity() -> Result<()> {
        let pe = PositionalEncoding::new(16, 32, 0.0, &Device::Cpu)?;

        let x = Tensor::randn(0f32, 1f32, (2, 10, 16), &Device::Cpu)?;
        let train: Vec<Vec<Vec<f32>>> = pe.forward(&x, true)?.to_vec3()?;
        let eval: Vec<Vec<Vec<f32>>> = pe.forward(&x, false)?.to_vec3()?;

        assert_eq!(train, eval);

        Ok(())
    }
}
