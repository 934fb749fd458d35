/// A single emitted token (§4.9): text plus its position in the token
/// stream and byte offsets in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub position: u32,
    pub start_byte: usize,
    pub end_byte: usize,
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Alnum,
    Cjk,
    NgramPrefix,
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "were", "will", "with",
];

const MIN_TOKEN_LEN: usize = 1;
const MAX_TOKEN_LEN: usize = 64;

/// Lowercases, drops stopwords, and enforces min/max rune length — the
/// base filter every tokenizer below applies before returning tokens
/// (§4.9 "base filter").
fn base_filter(tokens: Vec<Token>) -> Vec<Token> {
    tokens
        .into_iter()
        .filter(|t| {
            let len = t.text.chars().count();
            len >= MIN_TOKEN_LEN && len <= MAX_TOKEN_LEN && !STOPWORDS.contains(&t.text.as_str())
        })
        .collect()
}

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    /// Query-time tokenization; defaults to the same pipeline as indexing
    /// (overridden by tokenizers where search tokens differ, e.g. n-gram
    /// prefix-only mode).
    fn tokenize_for_search(&self, text: &str) -> Vec<Token> {
        self.tokenize(text)
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x20000..=0x2A6DF
    )
}

/// Splits on Unicode letter/digit boundaries; each CJK character becomes
/// its own token (§4.9).
pub struct StandardTokenizer;

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let lower = text.to_lowercase();
        let mut tokens = Vec::new();
        let mut position = 0u32;
        let mut current = String::new();
        let mut start_byte = 0usize;

        let flush = |current: &mut String, start_byte: usize, end_byte: usize, position: &mut u32, out: &mut Vec<Token>| {
            if !current.is_empty() {
                out.push(Token {
                    text: std::mem::take(current),
                    position: *position,
                    start_byte,
                    end_byte,
                    token_type: TokenType::Alnum,
                });
                *position += 1;
            }
        };

        for (byte_idx, c) in lower.char_indices() {
            if is_cjk(c) {
                flush(&mut current, start_byte, byte_idx, &mut position, &mut tokens);
                tokens.push(Token {
                    text: c.to_string(),
                    position,
                    start_byte: byte_idx,
                    end_byte: byte_idx + c.len_utf8(),
                    token_type: TokenType::Cjk,
                });
                position += 1;
                start_byte = byte_idx + c.len_utf8();
            } else if c.is_alphanumeric() {
                if current.is_empty() {
                    start_byte = byte_idx;
                }
                current.push(c);
            } else {
                flush(&mut current, start_byte, byte_idx, &mut position, &mut tokens);
                start_byte = byte_idx + c.len_utf8();
            }
        }
        flush(&mut current, start_byte, lower.len(), &mut position, &mut tokens);
        base_filter(tokens)
    }
}

/// Standard tokenization followed by naive English suffix stripping
/// (`-ing`, `-ed`, `-s`), a cheap stand-in for a real stemmer (§4.9).
pub struct EnglishTokenizer {
    standard: StandardTokenizer,
}

impl EnglishTokenizer {
    pub fn new() -> Self {
        Self {
            standard: StandardTokenizer,
        }
    }

    fn stem(word: &str) -> String {
        for suffix in ["ing", "ed", "es", "s"] {
            if word.len() > suffix.len() + 2 && word.ends_with(suffix) {
                return word[..word.len() - suffix.len()].to_string();
            }
        }
        word.to_string()
    }
}

impl Default for EnglishTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for EnglishTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        self.standard
            .tokenize(text)
            .into_iter()
            .map(|mut t| {
                t.text = Self::stem(&t.text);
                t
            })
            .collect()
    }
}

/// Character n-grams of `[min, max]` length; `prefix_only` restricts
/// emission to n-grams anchored at the token start (§4.9).
pub struct NgramTokenizer {
    pub min: usize,
    pub max: usize,
    pub prefix_only: bool,
}

impl NgramTokenizer {
    pub fn new(min: usize, max: usize, prefix_only: bool) -> Self {
        Self { min, max, prefix_only }
    }
}

impl Tokenizer for NgramTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let lower = text.to_lowercase();
        let chars: Vec<char> = lower.chars().collect();
        let mut tokens = Vec::new();
        let mut position = 0u32;

        let starts: Vec<usize> = if self.prefix_only { vec![0] } else { (0..chars.len()).collect() };
        for start in starts {
            for n in self.min..=self.max {
                if start + n > chars.len() {
                    break;
                }
                let gram: String = chars[start..start + n].iter().collect();
                tokens.push(Token {
                    text: gram,
                    position,
                    start_byte: start,
                    end_byte: start + n,
                    token_type: TokenType::NgramPrefix,
                });
                position += 1;
            }
        }
        base_filter(tokens)
    }
}

/// External dictionary-based segmentation is out of scope; this stub
/// produces 2/3-character prefix variants of each CJK run as a crude
/// substitute for indexing, per §4.9 ("optional ... produce 2/3-char
/// prefix variants").
pub struct ChineseTokenizer;

impl Tokenizer for ChineseTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let chars: Vec<char> = text.chars().filter(|c| is_cjk(*c)).collect();
        let mut tokens = Vec::new();
        let mut position = 0u32;
        for window in [2usize, 3usize] {
            if chars.len() < window {
                continue;
            }
            for start in 0..=(chars.len() - window) {
                let gram: String = chars[start..start + window].iter().collect();
                tokens.push(Token {
                    text: gram,
                    position,
                    start_byte: start,
                    end_byte: start + window,
                    token_type: TokenType::Cjk,
                });
                position += 1;
            }
        }
        base_filter(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_tokenizer_lowercases_and_splits() {
        let tokens = StandardTokenizer.tokenize("Hello, World!");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "world"]);
    }

    #[test]
    fn standard_tokenizer_emits_one_token_per_cjk_char() {
        let tokens = StandardTokenizer.tokenize("你好world");
        assert_eq!(tokens[0].text, "你");
        assert_eq!(tokens[1].text, "好");
        assert_eq!(tokens[2].text, "world");
    }

    #[test]
    fn stopwords_are_dropped() {
        let tokens = StandardTokenizer.tokenize("the cat and the hat");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["cat", "hat"]);
    }

    #[test]
    fn ngram_tokenizer_respects_bounds() {
        let tokens = NgramTokenizer::new(2, 3, false).tokenize("abcd");
        assert!(tokens.iter().all(|t| t.text.len() >= 2 && t.text.len() <= 3));
    }
}
