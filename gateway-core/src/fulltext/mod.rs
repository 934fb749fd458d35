//! Full-text inverted index (C12): pluggable tokenizers, BM25-scored
//! postings lists with skip lists, and MAXSCORE top-k / phrase search.

mod bm25;
mod index;
mod postings;
mod tokenizer;

pub use bm25::{bm25_score, idf, BM25_B, BM25_K1};
pub use index::{InvertedIndex, ScoredDoc};
pub use postings::{Posting, PostingsList};
pub use tokenizer::{
    ChineseTokenizer, EnglishTokenizer, NgramTokenizer, StandardTokenizer, Token, TokenType,
    Tokenizer,
};
