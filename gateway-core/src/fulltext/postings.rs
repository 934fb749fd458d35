/// A single document's contribution to a term's postings list (§3
/// "Posting"): doc ID, term frequency, token positions (for phrase
/// search), and the precomputed BM25 contribution at index time.
#[derive(Debug, Clone)]
pub struct Posting {
    pub doc_id: u32,
    pub term_freq: u32,
    pub positions: Vec<u32>,
    pub bm25_contribution: f64,
}

const SKIP_INTERVAL: usize = 64;

/// Postings for one term, sorted by ascending `doc_id`. Every 64th
/// posting gets a skip-list entry so `find`/phrase lookups can binary
/// search instead of scanning (§4.9).
#[derive(Debug, Clone, Default)]
pub struct PostingsList {
    pub postings: Vec<Posting>,
    skip_list: Vec<(u32, usize)>,
    pub doc_freq: u64,
    pub max_score: f64,
}

impl PostingsList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, posting: Posting) {
        if posting.bm25_contribution > self.max_score {
            self.max_score = posting.bm25_contribution;
        }
        let idx = self.postings.len();
        if idx % SKIP_INTERVAL == 0 {
            self.skip_list.push((posting.doc_id, idx));
        }
        self.postings.push(posting);
        self.doc_freq += 1;
    }

    /// Binary search for `doc_id`, using the skip list to narrow the
    /// starting range before falling back to a linear scan within the
    /// skip interval (§4.9 "via skip-list binary search").
    pub fn find(&self, doc_id: u32) -> Option<&Posting> {
        let start = match self.skip_list.binary_search_by_key(&doc_id, |(id, _)| *id) {
            Ok(i) => self.skip_list[i].1,
            Err(0) => 0,
            Err(i) => self.skip_list[i - 1].1,
        };
        let end = (start + SKIP_INTERVAL).min(self.postings.len());
        self.postings[start..end]
            .binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|i| &self.postings[start + i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn posting(doc_id: u32) -> Posting {
        Posting {
            doc_id,
            term_freq: 1,
            positions: vec![0],
            bm25_contribution: doc_id as f64,
        }
    }

    #[test]
    fn skip_list_entry_added_every_64th_posting() {
        let mut list = PostingsList::new();
        for i in 0..200 {
            list.push(posting(i));
        }
        assert_eq!(list.skip_list.len(), (200 / SKIP_INTERVAL) + 1);
    }

    #[test]
    fn find_locates_posting_via_skip_list() {
        let mut list = PostingsList::new();
        for i in 0..200 {
            list.push(posting(i * 2));
        }
        let found = list.find(150).unwrap();
        assert_eq!(found.doc_id, 150);
        assert!(list.find(151).is_none());
    }

    #[test]
    fn max_score_tracks_highest_contribution() {
        let mut list = PostingsList::new();
        list.push(posting(1));
        list.push(posting(5));
        assert_eq!(list.max_score, 5.0);
    }

    proptest! {
        // §8: `is_sorted_by(L.postings, doc_id)` and
        // `max(p.bm25_score for p in L) == L.max_score`, for any ascending
        // run of doc IDs with arbitrary per-doc scores.
        #[test]
        fn postings_stay_sorted_and_max_score_is_exact(
            gaps in prop::collection::vec(1u32..5, 1..100),
            scores in prop::collection::vec(0.0f64..100.0, 1..100),
        ) {
            let mut list = PostingsList::new();
            let mut doc_id = 0u32;
            let mut expected_max = f64::MIN;
            for (gap, score) in gaps.iter().zip(scores.iter()) {
                doc_id += gap;
                expected_max = expected_max.max(*score);
                list.push(Posting {
                    doc_id,
                    term_freq: 1,
                    positions: vec![0],
                    bm25_contribution: *score,
                });
            }
            prop_assert!(list.postings.windows(2).all(|w| w[0].doc_id < w[1].doc_id));
            prop_assert_eq!(list.max_score, expected_max);
        }
    }
}
