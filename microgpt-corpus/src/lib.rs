//! Corpus preparation for microgpt.
//!
//! Everything the model core deliberately does not do: reading and cleaning
//! raw text, building the word-level vocabulary, encoding text to token
//! ids, splitting the id stream into train/validation parts and sampling
//! random context windows from it.

mod corpus;
mod vocab;

pub use corpus::{clean_line, encode_corpus, load_corpus, sample_batch, split_tokens};
pub use vocab::Vocabulary;
