use super::candidate::IndexCandidate;
use std::collections::HashMap;

/// Folds same-table, same-priority single/multi-column candidates into
/// composite indexes of up to `max_columns` columns (§4.7 "index
/// merger"). Candidates from different priorities are kept separate
/// since merging a WHERE-driven column with a GROUP BY column would
/// change what the index actually optimizes for.
pub fn merge_candidates(candidates: Vec<IndexCandidate>, max_columns: usize) -> Vec<IndexCandidate> {
    let mut groups: HashMap<(String, super::candidate::Priority), Vec<IndexCandidate>> = HashMap::new();
    for c in candidates {
        groups.entry((c.table.clone(), c.priority)).or_default().push(c);
    }

    let mut merged = Vec::new();
    for ((table, priority), group) in groups {
        let mut columns = Vec::new();
        let mut unique = false;
        for c in &group {
            for col in &c.columns {
                if !columns.contains(col) && columns.len() < max_columns {
                    columns.push(col.clone());
                }
            }
            unique |= c.unique;
        }
        if !columns.is_empty() {
            merged.push(IndexCandidate {
                table,
                columns,
                unique,
                priority,
            });
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::Priority;

    #[test]
    fn merges_same_table_same_priority_columns() {
        let candidates = vec![
            IndexCandidate {
                table: "t".into(),
                columns: vec!["a".into()],
                unique: false,
                priority: Priority::Where,
            },
            IndexCandidate {
                table: "t".into(),
                columns: vec!["b".into()],
                unique: false,
                priority: Priority::Where,
            },
        ];
        let merged = merge_candidates(candidates, 4);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].columns, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn respects_max_columns_cap() {
        let candidates = vec![
            IndexCandidate {
                table: "t".into(),
                columns: vec!["a".into(), "b".into(), "c".into()],
                unique: false,
                priority: Priority::Where,
            },
        ];
        let merged = merge_candidates(candidates, 2);
        assert_eq!(merged[0].columns.len(), 2);
    }
}
