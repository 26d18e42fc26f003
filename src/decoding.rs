//! Autoregressive greedy decoding
//!
//! Drives a trained forecasting transformer at inference time: the source
//! window is encoded once, then the target sequence is grown one step at a
//! time by feeding each prediction back as input for the next step.

use candle_core::{Result, Tensor};

use crate::model::{generate_square_subsequent_mask, Forecaster};

/// Result of a greedy decode run
#[derive(Debug, Clone)]
pub struct GreedyDecodeOutput {
    /// The full decoded sequence, seed step included: [batch, max_len, n_features]
    pub sequence: Tensor,
    /// The model's scalar forecasts, one per generated step: [batch, max_len - 1]
    pub predictions: Tensor,
}

/// Greedily decode `max_len` steps from a source window
///
/// The seed is the last time step of `start_symbol`. Each iteration rebuilds
/// the causal mask for the current target length, decodes against the fixed
/// encoder memory, and appends a new step composed of the model's prediction
/// in channel 0 and, when `known_future` is given, that step's known
/// covariates in the remaining channels (zeros otherwise). `known_future` is
/// read-only; predictions are returned in an explicit accumulator instead of
/// being written back into caller-owned buffers.
///
/// The whole run is inference-only: decoder outputs are detached so no
/// gradient graph accumulates across iterations.
///
/// # Arguments
/// * `src` - source window, [batch, src_len, n_features]
/// * `src_mask` - optional additive mask for the encoder
/// * `max_len` - total output length including the seed step (at least 2)
/// * `start_symbol` - seed window, [batch, seed_len, n_features]; at least one step
/// * `known_future` - optional future covariates, [batch, >= max_len - 1, n_features];
///   channel 0 is ignored
pub fn greedy_decode<M: Forecaster>(
    model: &M,
    src: &Tensor,
    src_mask: Option<&Tensor>,
    max_len: usize,
    start_symbol: &Tensor,
    known_future: Option<&Tensor>,
) -> Result<GreedyDecodeOutput> {
    if !model.supports_incremental_decode() {
        candle_core::bail!("greedy decoding requires a model with incremental decode support");
    }
    if max_len < 2 {
        candle_core::bail!("max_len must be at least 2, got {}", max_len);
    }

    let (batch_size, seed_len, n_features) = start_symbol.dims3()?;
    if seed_len == 0 {
        candle_core::bail!("start_symbol must hold at least one time step");
    }
    if let Some(kf) = known_future {
        let (kf_batch, kf_len, kf_features) = kf.dims3()?;
        if kf_batch != batch_size || kf_features != n_features {
            candle_core::bail!(
                "known_future shape {:?} does not match start_symbol shape {:?}",
                kf.dims(),
                start_symbol.dims()
            );
        }
        if kf_len < max_len - 1 {
            candle_core::bail!(
                "known_future covers {} steps but {} are decoded",
                kf_len,
                max_len - 1
            );
        }
    }

    let device = src.device();

    // Memory is computed once and reused for every step
    let memory = model.encode_sequence(src, src_mask, false)?.detach();

    // Seed with the last time step of the start symbol
    let mut ys = start_symbol.narrow(1, seed_len - 1, 1)?;
    let mut predictions = Vec::with_capacity(max_len - 1);

    for i in 0..max_len - 1 {
        // The target grew by one step, so the causal mask is rebuilt
        let tgt_mask = generate_square_subsequent_mask(i + 1, device)?;

        let out = model
            .decode_seq(&memory, &ys, &tgt_mask, Some(i + 1), false)?
            .detach();
        let pred = out.narrow(1, i, 1)?;

        tracing::debug!("greedy decode step {}/{}", i + 1, max_len - 1);

        // Next input step: prediction in channel 0, known covariates after
        let pred_step = pred.unsqueeze(2)?;
        let step = if n_features > 1 {
            let covariates = match known_future {
                Some(kf) => kf.narrow(1, i, 1)?.narrow(2, 1, n_features - 1)?,
                None => Tensor::zeros((batch_size, 1, n_features - 1), src.dtype(), device)?,
            };
            Tensor::cat(&[&pred_step, &covariates], 2)?
        } else {
            pred_step
        };

        ys = Tensor::cat(&[&ys, &step], 1)?;
        predictions.push(pred);
    }

    let predictions = Tensor::cat(&predictions, 1)?;

    Ok(GreedyDecodeOutput {
        sequence: ys,
        predictions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConfigurableTransformer, TimeSeriesTransformer, TransformerConfig};
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    fn create_test_vb() -> (VarMap, VarBuilder<'static>) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        (varmap, vb)
    }

    fn small_config(n_features: usize) -> TransformerConfig {
        TransformerConfig::new(n_features, 8, 16, 2)
            .with_n_layers(1)
            .with_d_ff(32)
            .with_dropout(0.0)
            .with_max_position(64)
    }

    #[test]
    fn test_decode_lengths() -> Result<()> {
        let (_varmap, vb) = create_test_vb();
        let model = TimeSeriesTransformer::with_config(&small_config(1), vb)?;

        let src = Tensor::randn(0f32, 1f32, (2, 8, 1), &Device::Cpu)?;
        let seed = Tensor::randn(0f32, 1f32, (2, 3, 1), &Device::Cpu)?;

        let out = greedy_decode(&model, &src, None, 5, &seed, None)?;

        // Seed step plus exactly max_len - 1 generated steps
        assert_eq!(out.sequence.dims(), &[2, 5, 1]);
        assert_eq!(out.predictions.dims(), &[2, 4]);

        Ok(())
    }

    #[test]
    fn test_predictions_match_sequence_channel_zero() -> Result<()> {
        let (_varmap, vb) = create_test_vb();
        let model = TimeSeriesTransformer::with_config(&small_config(1), vb)?;

        let src = Tensor::randn(0f32, 1f32, (1, 8, 1), &Device::Cpu)?;
        let seed = Tensor::randn(0f32, 1f32, (1, 2, 1), &Device::Cpu)?;

        let out = greedy_decode(&model, &src, None, 4, &seed, None)?;

        let generated: Vec<Vec<Vec<f32>>> = out.sequence.narrow(1, 1, 3)?.to_vec3()?;
        let preds: Vec<Vec<f32>> = out.predictions.to_vec2()?;

        for (step, &pred) in preds[0].iter().enumerate() {
            assert_eq!(generated[0][step][0], pred);
        }

        Ok(())
    }

    #[test]
    fn test_known_future_covariates_flow_through() -> Result<()> {
        let (_varmap, vb) = create_test_vb();
        let model = TimeSeriesTransformer::with_config(&small_config(3), vb)?;

        let src = Tensor::randn(0f32, 1f32, (1, 8, 3), &Device::Cpu)?;
        let seed = Tensor::randn(0f32, 1f32, (1, 1, 3), &Device::Cpu)?;
        let known = Tensor::randn(0f32, 1f32, (1, 4, 3), &Device::Cpu)?;

        let out = greedy_decode(&model, &src, None, 5, &seed, Some(&known))?;
        assert_eq!(out.sequence.dims(), &[1, 5, 3]);

        // Channels 1.. of each generated step come straight from known_future
        let seq: Vec<Vec<Vec<f32>>> = out.sequence.to_vec3()?;
        let kf: Vec<Vec<Vec<f32>>> = known.to_vec3()?;
        for i in 0..4 {
            assert_eq!(seq[0][i + 1][1], kf[0][i][1]);
            assert_eq!(seq[0][i + 1][2], kf[0][i][2]);
        }

        Ok(())
    }

    #[test]
    fn test_known_future_is_not_mutated() -> Result<()> {
        let (_varmap, vb) = create_test_vb();
        let model = TimeSeriesTransformer::with_config(&small_config(2), vb)?;

        let src = Tensor::randn(0f32, 1f32, (1, 8, 2), &Device::Cpu)?;
        let seed = Tensor::randn(0f32, 1f32, (1, 1, 2), &Device::Cpu)?;
        let known = Tensor::randn(0f32, 1f32, (1, 3, 2), &Device::Cpu)?;
        let before: Vec<Vec<Vec<f32>>> = known.to_vec3()?;

        greedy_decode(&model, &src, None, 4, &seed, Some(&known))?;

        let after: Vec<Vec<Vec<f32>>> = known.to_vec3()?;
        assert_eq!(before, after);

        Ok(())
    }

    #[test]
    fn test_rejects_model_without_capability() -> Result<()> {
        let (_varmap, vb) = create_test_vb();
        let model = ConfigurableTransformer::new(&small_config(1), vb)?;

        let src = Tensor::randn(0f32, 1f32, (1, 8, 1), &Device::Cpu)?;
        let seed = Tensor::randn(0f32, 1f32, (1, 1, 1), &Device::Cpu)?;

        assert!(greedy_decode(&model, &src, None, 4, &seed, None).is_err());

        Ok(())
    }

    #[test]
    fn test_rejects_short_horizon_and_covariates() -> Result<()> {
        let (_varmap, vb) = create_test_vb();
        let model = TimeSeriesTransformer::with_config(&small_config(2), vb)?;

        let src = Tensor::randn(0f32, 1f32, (1, 8, 2), &Device::Cpu)?;
        let seed = Tensor::randn(0f32, 1f32, (1, 1, 2), &Device::Cpu)?;

        assert!(greedy_decode(&model, &src, None, 1, &seed, None).is_err());

        // Covariate window shorter than the decode horizon
        let short = Tensor::randn(0f32, 1f32, (1, 2, 2), &Device::Cpu)?;
        assert!(greedy_decode(&model, &src, None, 4, &seed, Some(&short)).is_err());

        Ok(())
    }

    #[test]
    fn test_rejects_empty_seed() -> Result<()> {
        let (_varmap, vb) = create_test_vb();
        let model = TimeSeriesTransformer::with_config(&small_config(1), vb)?;

        let src = Tensor::randn(0f32, 1f32, (1, 8, 1), &Device::Cpu)?;
        let seed = Tensor::zeros((1, 0, 1), DType::F32, &Device::Cpu)?;

        assert!(greedy_decode(&model, &src, None, 4, &seed, None).is_err());

        Ok(())
    }
}
