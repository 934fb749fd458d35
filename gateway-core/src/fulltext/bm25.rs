/// Term-frequency saturation constant (§4.9).
pub const BM25_K1: f64 = 1.2;
/// Length-normalization constant (§4.9).
pub const BM25_B: f64 = 0.75;

/// `IDF(t) = log((N - df + 0.5) / (df + 0.5) + 1)`.
pub fn idf(total_docs: u64, doc_freq: u64) -> f64 {
    let n = total_docs as f64;
    let df = doc_freq as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// `score = IDF(t) · tf · (k1+1) / (tf + k1·(1 − b + b·|d|/avgdl))`.
pub fn bm25_score(idf: f64, tf: f64, doc_len: f64, avg_doc_len: f64) -> f64 {
    if avg_doc_len <= 0.0 {
        return 0.0;
    }
    let denom = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_doc_len);
    if denom <= 0.0 {
        return 0.0;
    }
    idf * tf * (BM25_K1 + 1.0) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_decreases_as_doc_freq_grows() {
        let rare = idf(1000, 2);
        let common = idf(1000, 500);
        assert!(rare > common);
    }

    #[test]
    fn score_increases_with_term_frequency() {
        let low = bm25_score(2.0, 1.0, 100.0, 100.0);
        let high = bm25_score(2.0, 5.0, 100.0, 100.0);
        assert!(high > low);
    }

    #[test]
    fn score_penalizes_longer_documents() {
        let short = bm25_score(2.0, 3.0, 50.0, 100.0);
        let long = bm25_score(2.0, 3.0, 300.0, 100.0);
        assert!(short > long);
    }
}
