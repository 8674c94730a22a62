//! Integration tests for vocabulary construction and persistence

use anyhow::Result;
use microgpt_corpus::Vocabulary;
use tempfile::TempDir;

#[test]
fn build_assigns_ids_in_first_appearance_order() {
    let vocab = Vocabulary::build(["the cat sat", "the mat sat flat"]);

    assert_eq!(vocab.len(), 5);
    assert_eq!(vocab.id("the"), Some(0));
    assert_eq!(vocab.id("cat"), Some(1));
    assert_eq!(vocab.id("sat"), Some(2));
    assert_eq!(vocab.id("mat"), Some(3));
    assert_eq!(vocab.id("flat"), Some(4));
    assert_eq!(vocab.word(3), Some("mat"));
}

#[test]
fn encode_decode_round_trip() -> Result<()> {
    let vocab = Vocabulary::build(["a quick brown fox"]);

    let ids = vocab.encode("fox brown a")?;
    assert_eq!(ids, vec![3, 2, 0]);
    assert_eq!(vocab.decode(&ids)?, "fox brown a");
    Ok(())
}

#[test]
fn encode_rejects_unknown_words() {
    let vocab = Vocabulary::build(["a quick brown fox"]);
    let err = vocab.encode("lazy fox").unwrap_err();
    assert!(err.to_string().contains("'lazy' is not in the vocabulary"));
}

#[test]
fn decode_rejects_out_of_range_ids() {
    let vocab = Vocabulary::build(["a quick brown fox"]);
    let err = vocab.decode(&[0, 4]).unwrap_err();
    assert!(err.to_string().contains("outside the vocabulary"));
}

#[test]
fn save_load_round_trip() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("words.vocab");

    let vocab = Vocabulary::build(["to be or not to be"]);
    vocab.save(&path)?;

    let loaded = Vocabulary::load(&path)?;
    assert_eq!(loaded.len(), vocab.len());
    for id in 0..vocab.len() {
        assert_eq!(loaded.word(id), vocab.word(id));
    }
    assert_eq!(loaded.encode("not to be")?, vocab.encode("not to be")?);
    Ok(())
}

#[test]
fn load_rejects_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = Vocabulary::load(&temp_dir.path().join("absent.vocab")).unwrap_err();
    assert!(err.to_string().contains("Failed to open vocabulary file"));
}
