//! Integration tests for the individual layer primitives

use microgpt_model::{
    AttentionHead, Dropout, FeedForward, LayerNorm, Linear, MultiHeadAttention, Rng,
    TransformerBlock, softmax,
};

fn rng() -> Rng {
    Rng::new(42)
}

#[test]
fn projection_produces_output_width() {
    let linear = Linear::new(3, 5, &mut rng());
    let output = linear.forward(&[1.0, 2.0, 3.0]);
    assert_eq!(output.len(), 5);
}

#[test]
fn projection_matches_weight_matrix() {
    // The bias cancels in P(x) - P(0), leaving exactly W·x.
    let linear = Linear::new(4, 3, &mut rng());
    let x = [0.5, -1.0, 2.0, 0.25];

    let p_x = linear.forward(&x);
    let p_zero = linear.forward(&[0.0; 4]);

    for row in 0..3 {
        let expected: f32 = (0..4).map(|col| linear.weight[row * 4 + col] * x[col]).sum();
        assert!((p_x[row] - p_zero[row] - expected).abs() < 1e-5);
    }
}

#[test]
fn projection_batch_apply_preserves_shape() {
    let linear = Linear::new(3, 7, &mut rng());
    let batch: Vec<Vec<f32>> = (0..4).map(|i| vec![i as f32, 1.0, -1.0]).collect();
    let outputs = linear.forward_batch(&batch);
    assert_eq!(outputs.len(), 4);
    assert!(outputs.iter().all(|out| out.len() == 7));
}

#[test]
#[should_panic(expected = "does not match projection input width")]
fn projection_rejects_mismatched_width() {
    let linear = Linear::new(3, 5, &mut rng());
    linear.forward(&[1.0; 4]);
}

#[test]
fn softmax_is_a_probability_distribution() {
    let mut scores = vec![2.0, -1.0, 0.5, 3.25, -4.0];
    softmax(&mut scores);

    assert!(scores.iter().all(|&p| p >= 0.0));
    let sum: f32 = scores.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
}

#[test]
fn softmax_is_shift_invariant() {
    let mut a = vec![0.1, 1.7, -0.3, 2.2];
    let mut b: Vec<f32> = a.iter().map(|&v| v + 1000.0).collect();
    softmax(&mut a);
    softmax(&mut b);

    for (pa, pb) in a.iter().zip(&b) {
        assert!((pa - pb).abs() < 1e-5);
    }
}

#[test]
fn softmax_of_equal_scores_is_uniform() {
    let mut scores = vec![7.0; 8];
    softmax(&mut scores);
    for &p in &scores {
        assert!((p - 0.125).abs() < 1e-6);
    }
}

#[test]
fn layer_norm_centers_and_scales() {
    let norm = LayerNorm::new(4);
    let output = norm.forward(&[1.0, 2.0, 3.0, 4.0]);

    let mean: f32 = output.iter().sum::<f32>() / 4.0;
    let variance: f32 = output.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / 4.0;

    assert!(mean.abs() < 1e-4);
    assert!((variance - 1.0).abs() < 1e-3);
}

#[test]
fn layer_norm_constant_vector_stays_finite() {
    // Zero variance must be absorbed by the epsilon stabilizer.
    let norm = LayerNorm::new(6);
    let output = norm.forward(&[3.0; 6]);
    assert!(output.iter().all(|v| v.is_finite()));
    assert!(output.iter().all(|&v| v.abs() < 1e-3));
}

#[test]
fn layer_norm_applies_scale_and_shift() {
    let plain = LayerNorm::new(3);
    let scaled = LayerNorm::from_parameters(vec![2.0; 3], vec![1.0; 3]);
    let input = [0.5, -1.5, 4.0];

    let base = plain.forward(&input);
    let output = scaled.forward(&input);

    for (b, o) in base.iter().zip(&output) {
        assert!((o - (2.0 * b + 1.0)).abs() < 1e-5);
    }
}

#[test]
#[should_panic(expected = "does not match normalization width")]
fn layer_norm_rejects_mismatched_width() {
    let norm = LayerNorm::new(4);
    norm.forward(&[1.0; 5]);
}

#[test]
fn dropout_zero_rate_is_identity() {
    let dropout = Dropout::new(0.0);
    let input = vec![1.0, -2.0, 3.5];
    assert_eq!(dropout.forward(&input, &mut rng()), input);
}

#[test]
fn dropout_zeroes_or_rescales_each_element() {
    let dropout = Dropout::new(0.5);
    let input = vec![1.0; 100];
    let output = dropout.forward(&input, &mut rng());

    assert_eq!(output.len(), 100);
    assert!(output.iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
    // With 100 draws at rate 0.5 and a fixed seed, both outcomes occur.
    assert!(output.iter().any(|&v| v == 0.0));
    assert!(output.iter().any(|&v| v != 0.0));
}

#[test]
#[should_panic(expected = "Drop rate must be in [0, 1)")]
fn dropout_rejects_full_drop_rate() {
    Dropout::new(1.0);
}

#[test]
fn attention_head_produces_head_width() {
    let mut rng = rng();
    let head = AttentionHead::new(8, 2, 0.0, &mut rng);
    let output = head.forward(&[0.25; 8], &mut rng);
    assert_eq!(output.len(), 2);
}

#[test]
fn multi_head_attention_restores_embedding_width() {
    for (n_embd, n_heads) in [(8, 2), (12, 3), (4, 4)] {
        let mut rng = rng();
        let attention = MultiHeadAttention::new(n_embd, n_heads, 0.0, &mut rng);
        let input = vec![0.1; n_embd];
        assert_eq!(attention.forward(&input, &mut rng).len(), n_embd);
    }
}

#[test]
#[should_panic(expected = "must evenly divide embedding width")]
fn multi_head_attention_rejects_non_dividing_heads() {
    MultiHeadAttention::new(10, 3, 0.0, &mut rng());
}

#[test]
fn feed_forward_preserves_width() {
    let mut rng = rng();
    let ffwd = FeedForward::new(6, &mut rng);
    assert_eq!(ffwd.forward(&[0.5; 6]).len(), 6);
    assert_eq!(ffwd.expand.out_features, 24);
}

#[test]
fn block_preserves_width_and_is_deterministic() {
    let mut rng = rng();
    let block = TransformerBlock::new(8, 2, 0.0, &mut rng);
    let input = vec![0.3; 8];

    let first = block.forward(&input, &mut rng);
    let second = block.forward(&input, &mut rng);

    assert_eq!(first.len(), 8);
    assert_eq!(first, second);
}

#[test]
fn block_batch_apply_preserves_shape() {
    let mut rng = rng();
    let block = TransformerBlock::new(4, 2, 0.0, &mut rng);
    let batch: Vec<Vec<f32>> = (0..3).map(|i| vec![i as f32 * 0.1; 4]).collect();

    let outputs = block.forward_batch(&batch, &mut rng);
    assert_eq!(outputs.len(), 3);
    assert!(outputs.iter().all(|out| out.len() == 4));
}
