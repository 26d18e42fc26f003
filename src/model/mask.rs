//! Causal attention mask generation

use candle_core::{Device, Result, Tensor};

/// Generate a square causal mask for a sequence
///
/// Entry (i, j) is 0.0 when position j is allowed to attend to position i
/// (j <= i) and -inf otherwise. The mask is added to the attention scores
/// before the softmax, so masked positions contribute zero weight.
///
/// This is a pure function of `size` and is recomputed whenever the sequence
/// length changes; the autoregressive decode loop grows the target by one
/// position per step and calls it once per iteration.
pub fn generate_square_subsequent_mask(size: usize, device: &Device) -> Result<Tensor> {
    let mut mask = vec![0f32; size * size];

    for i in 0..size {
        for j in (i + 1)..size {
            mask[i * size + j] = f32::NEG_INFINITY;
        }
    }

    Tensor::from_vec(mask, (size, size), device)
}
