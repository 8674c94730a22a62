//! Integration tests for corpus loading, splitting and batch sampling

use anyhow::Result;
use microgpt_corpus::{Vocabulary, clean_line, encode_corpus, load_corpus, sample_batch, split_tokens};
use microgpt_model::Rng;
use std::fs;
use tempfile::TempDir;

#[test]
fn clean_line_lowercases_and_strips_punctuation() {
    assert_eq!(clean_line("Hello, World!"), "hello world");
    assert_eq!(clean_line("  spaced   out  "), "spaced out");
    assert_eq!(clean_line("!!!"), "");
}

#[test]
fn load_corpus_drops_blank_and_label_lines() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("input.txt");
    fs::write(
        &path,
        "First Citizen:\nBefore we proceed any further,\n\nhear me speak.\n",
    )?;

    let lines = load_corpus(&path)?;
    assert_eq!(lines, vec!["before we proceed any further", "hear me speak"]);
    Ok(())
}

#[test]
fn load_corpus_rejects_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = load_corpus(&temp_dir.path().join("absent.txt")).unwrap_err();
    assert!(err.to_string().contains("Failed to read corpus file"));
}

#[test]
fn encode_corpus_flattens_lines_in_order() -> Result<()> {
    let lines = vec!["a b c".to_string(), "c b a".to_string()];
    let vocab = Vocabulary::build(&lines);

    let tokens = encode_corpus(&vocab, &lines)?;
    assert_eq!(tokens, vec![0, 1, 2, 2, 1, 0]);
    Ok(())
}

#[test]
fn split_tokens_respects_the_fraction() {
    let tokens: Vec<usize> = (0..10).collect();
    let (train, val) = split_tokens(&tokens, 0.7);

    assert_eq!(train, (0..7).collect::<Vec<_>>());
    assert_eq!(val, (7..10).collect::<Vec<_>>());

    let (all, none) = split_tokens(&tokens, 1.0);
    assert_eq!(all.len(), 10);
    assert!(none.is_empty());
}

#[test]
fn sample_batch_produces_shifted_windows() -> Result<()> {
    let data: Vec<usize> = (0..50).collect();
    let mut rng = Rng::new(42);

    let (inputs, targets) = sample_batch(&data, 4, 8, &mut rng)?;

    assert_eq!(inputs.len(), 4);
    assert_eq!(targets.len(), 4);
    for (x, y) in inputs.iter().zip(&targets) {
        assert_eq!(x.len(), 8);
        assert_eq!(y.len(), 8);
        // Targets are the inputs shifted one step ahead.
        for k in 0..7 {
            assert_eq!(y[k], x[k + 1]);
        }
        assert_eq!(y[7], x[7] + 1);
    }
    Ok(())
}

#[test]
fn sample_batch_rejects_short_streams() {
    let data: Vec<usize> = (0..5).collect();
    let mut rng = Rng::new(42);
    let err = sample_batch(&data, 2, 5, &mut rng).unwrap_err();
    assert!(err.to_string().contains("too short"));
}
