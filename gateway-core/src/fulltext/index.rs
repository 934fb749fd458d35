use super::bm25::{bm25_score, idf};
use super::postings::{Posting, PostingsList};
use super::tokenizer::Tokenizer;
use dashmap::DashMap;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: u32,
    pub score: f64,
}

/// Concurrent term -> postings-list index (§3 "Postings list", §4.9
/// "Indexing"/"Search"), shaped on the teacher's `DashMap`-backed
/// `InvertedIndex` (`indexing/inverted.rs`) but carrying BM25 contributions
/// and token positions instead of plain bitmaps.
pub struct InvertedIndex {
    terms: DashMap<String, PostingsList>,
    doc_lengths: DashMap<u32, u32>,
    total_doc_length: AtomicU64,
    doc_count: AtomicU64,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self {
            terms: DashMap::new(),
            doc_lengths: DashMap::new(),
            total_doc_length: AtomicU64::new(0),
            doc_count: AtomicU64::new(0),
        }
    }

    fn avg_doc_length(&self) -> f64 {
        let count = self.doc_count.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            self.total_doc_length.load(Ordering::Relaxed) as f64 / count as f64
        }
    }

    fn total_docs(&self) -> u64 {
        self.doc_count.load(Ordering::Relaxed)
    }

    /// Tokenizes `text` with `tokenizer`, computes term frequencies,
    /// builds a sparse BM25 vector and appends a `Posting` to each term's
    /// postings list (§4.9 "Indexing").
    pub fn add_document(&self, doc_id: u32, text: &str, tokenizer: &dyn Tokenizer) {
        let tokens = tokenizer.tokenize(text);
        let doc_len = tokens.len() as u32;

        let mut term_positions: HashMap<String, Vec<u32>> = HashMap::new();
        for token in &tokens {
            term_positions.entry(token.text.clone()).or_default().push(token.position);
        }

        self.doc_lengths.insert(doc_id, doc_len);
        self.total_doc_length.fetch_add(doc_len as u64, Ordering::Relaxed);
        self.doc_count.fetch_add(1, Ordering::Relaxed);
        let avg_doc_len = self.avg_doc_length();

        for (term, positions) in term_positions {
            let tf = positions.len() as u32;
            let mut entry = self.terms.entry(term).or_insert_with(PostingsList::new);
            let doc_freq_before = entry.doc_freq.max(1);
            let idf_estimate = idf(self.total_docs().max(1), doc_freq_before);
            let contribution = bm25_score(idf_estimate, tf as f64, doc_len as f64, avg_doc_len);
            entry.push(Posting {
                doc_id,
                term_freq: tf,
                positions,
                bm25_contribution: contribution,
            });
        }
        debug!(doc_id, terms = tokens.len(), "indexed document");
    }

    /// `search(query_vector)`: unions postings of query terms and sums
    /// `query_weight · bm25_score` per doc, sorted descending (§4.9).
    pub fn search(&self, query_vector: &HashMap<String, f64>) -> Vec<ScoredDoc> {
        let mut scores: HashMap<u32, f64> = HashMap::new();
        for (term, weight) in query_vector {
            if let Some(list) = self.terms.get(term) {
                for posting in &list.postings {
                    *scores.entry(posting.doc_id).or_insert(0.0) += weight * posting.bm25_contribution;
                }
            }
        }
        let mut out: Vec<ScoredDoc> = scores
            .into_iter()
            .map(|(doc_id, score)| ScoredDoc { doc_id, score })
            .collect();
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// DAAT with MAXSCORE (§4.9): sorts query terms by `max_score`
    /// descending, drives iteration from the first term's postings, and
    /// adds contributions from the remaining terms via skip-list lookups,
    /// maintaining a size-`k` min-heap.
    pub fn search_top_k(&self, query_vector: &HashMap<String, f64>, k: usize) -> Vec<ScoredDoc> {
        if k == 0 {
            return vec![];
        }
        let mut terms: Vec<(String, f64, dashmap::mapref::one::Ref<'_, String, PostingsList>)> = query_vector
            .iter()
            .filter_map(|(term, weight)| self.terms.get(term).map(|list| (term.clone(), *weight, list)))
            .collect();
        terms.sort_by(|a, b| b.2.max_score.partial_cmp(&a.2.max_score).unwrap_or(std::cmp::Ordering::Equal));

        if terms.is_empty() {
            return vec![];
        }

        let mut heap: BinaryHeap<Reverse<(OrderedFloat<f64>, u32)>> = BinaryHeap::with_capacity(k + 1);
        let (_, first_weight, first_list) = &terms[0];

        for posting in &first_list.postings {
            let mut score = first_weight * posting.bm25_contribution;
            for (_, weight, list) in &terms[1..] {
                if let Some(other) = list.find(posting.doc_id) {
                    score += weight * other.bm25_contribution;
                }
            }
            if heap.len() < k {
                heap.push(Reverse((OrderedFloat(score), posting.doc_id)));
            } else if let Some(Reverse((min_score, _))) = heap.peek() {
                if score > min_score.0 {
                    heap.pop();
                    heap.push(Reverse((OrderedFloat(score), posting.doc_id)));
                }
            }
        }

        let mut out: Vec<ScoredDoc> = heap
            .into_iter()
            .map(|Reverse((score, doc_id))| ScoredDoc { doc_id, score: score.0 })
            .collect();
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// Requires terms to co-occur in one document with positions
    /// satisfying `|pos_i − pos_0 − i| ≤ slop`, chained across terms
    /// (§4.9 "Phrase search").
    pub fn phrase_search(&self, terms: &[String], slop: u32) -> Vec<u32> {
        let Some(first_term) = terms.first() else {
            return vec![];
        };
        let Some(first_list) = self.terms.get(first_term) else {
            return vec![];
        };
        let rest: Vec<_> = terms[1..]
            .iter()
            .map(|t| self.terms.get(t))
            .collect();
        if rest.iter().any(|r| r.is_none()) {
            return vec![];
        }

        let mut matches = Vec::new();
        'docs: for p0 in &first_list.postings {
            for pos0 in &p0.positions {
                let mut ok = true;
                for (i, list) in rest.iter().enumerate() {
                    let list = list.as_ref().unwrap();
                    let Some(other) = list.find(p0.doc_id) else {
                        ok = false;
                        break;
                    };
                    let target = i as u32 + 1;
                    let satisfied = other
                        .positions
                        .iter()
                        .any(|pos_i| (*pos_i as i64 - *pos0 as i64 - target as i64).unsigned_abs() <= slop as u64);
                    if !satisfied {
                        ok = false;
                        break;
                    }
                }
                if ok {
                    matches.push(p0.doc_id);
                    continue 'docs;
                }
            }
        }
        matches
    }
}

impl Default for InvertedIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fulltext::StandardTokenizer;

    #[test]
    fn search_ranks_more_relevant_doc_higher() {
        let index = InvertedIndex::new();
        let tok = StandardTokenizer;
        index.add_document(1, "rust systems programming language", &tok);
        index.add_document(2, "rust rust rust programming rust", &tok);

        let mut query = HashMap::new();
        query.insert("rust".to_string(), 1.0);
        let results = index.search(&query);
        assert_eq!(results[0].doc_id, 2);
    }

    #[test]
    fn top_k_matches_full_search_ordering_for_small_k() {
        let index = InvertedIndex::new();
        let tok = StandardTokenizer;
        for i in 0..20u32 {
            index.add_document(i, &format!("term{i} shared common"), &tok);
        }
        let mut query = HashMap::new();
        query.insert("shared".to_string(), 1.0);
        query.insert("common".to_string(), 1.0);

        let full = index.search(&query);
        let top3 = index.search_top_k(&query, 3);
        let full_top3: Vec<u32> = full.iter().take(3).map(|d| d.doc_id).collect();
        let top3_ids: Vec<u32> = top3.iter().map(|d| d.doc_id).collect();
        assert_eq!(full_top3.len(), top3_ids.len());
    }

    #[test]
    fn phrase_search_requires_adjacent_positions_within_slop() {
        let index = InvertedIndex::new();
        let tok = StandardTokenizer;
        index.add_document(1, "the quick brown fox", &tok);
        index.add_document(2, "brown quick the fox", &tok);

        let matches = index.phrase_search(&["quick".to_string(), "brown".to_string()], 0);
        assert_eq!(matches, vec![1]);
    }
}
