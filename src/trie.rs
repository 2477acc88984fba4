use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<char, usize>,
    term: Option<String>,
    records: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<'a> {
    pub term: &'a str,
    pub records: &'a [usize],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyHit {
    pub record: usize,
    pub distance: usize,
}

#[derive(Debug)]
pub struct PrefixTrie {
    nodes: Vec<TrieNode>,
    terms: usize,
}

impl Default for PrefixTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefixTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            terms: 0,
        }
    }

    pub fn term_count(&self) -> usize {
        self.terms
    }

    /// Splits `text` on whitespace and indexes every token for `record`.
    pub fn insert_text(&mut self, text: &str, record: usize) {
        for token in text.split_whitespace() {
            self.insert(token, record);
        }
    }

    pub fn insert(&mut self, word: &str, record: usize) {
        let word = word.to_lowercase();
        if word.is_empty() {
            return;
        }
        let mut current = 0;
        for ch in word.chars() {
            current = match self.nodes[current].children.get(&ch) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[current].children.insert(ch, next);
                    next
                }
            };
        }
        let node = &mut self.nodes[current];
        if node.term.is_none() {
            node.term = Some(word);
            self.terms += 1;
        }
        if !node.records.contains(&record) {
            node.records.push(record);
        }
    }

    /// Terms starting with `prefix`, in lexicographic order, at most `limit`.
    pub fn autocomplete(&self, prefix: &str, limit: usize) -> Vec<Completion<'_>> {
        let mut out = Vec::new();
        if limit == 0 {
            return out;
        }
        let Some(start) = self.descend(&prefix.to_lowercase()) else {
            return out;
        };

        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if let Some(term) = node.term.as_deref() {
                out.push(Completion {
                    term,
                    records: &node.records,
                });
                if out.len() == limit {
                    break;
                }
            }
            stack.extend(node.children.values().rev());
        }
        out
    }

    /// Records holding a term within `max_edit_ops` insertions, deletions or
    /// substitutions of `term`. Each record appears once with its smallest
    /// distance; results are ordered by distance.
    pub fn fuzzy(&self, term: &str, max_edit_ops: usize) -> Vec<FuzzyHit> {
        let query: Vec<char> = term.to_lowercase().chars().collect();
        let mut best: HashMap<usize, usize> = HashMap::new();

        let first_row: Vec<usize> = (0..=query.len()).collect();
        let mut stack: Vec<(usize, Vec<usize>)> = vec![(0, first_row)];
        while let Some((i, row)) = stack.pop() {
            for (&ch, &child) in self.nodes[i].children.iter() {
                let next_row = next_edit_row(&row, &query, ch);
                let node = &self.nodes[child];
                let distance = next_row[query.len()];
                if node.term.is_some() && distance <= max_edit_ops {
                    for &record in node.records.iter() {
                        best.entry(record)
                            .and_modify(|d| *d = (*d).min(distance))
                            .or_insert(distance);
                    }
                }
                // Row minimum never decreases further down, so prune here.
                if next_row.iter().min().is_some_and(|m| *m <= max_edit_ops) {
                    stack.push((child, next_row));
                }
            }
        }

        let mut hits: Vec<FuzzyHit> = best
            .into_iter()
            .map(|(record, distance)| FuzzyHit { record, distance })
            .collect();
        hits.sort_by_key(|h| (h.distance, h.record));
        hits
    }

    fn descend(&self, prefix: &str) -> Option<usize> {
        prefix
            .chars()
            .try_fold(0, |current, ch| self.nodes[current].children.get(&ch).copied())
    }
}

fn next_edit_row(previous: &[usize], query: &[char], ch: char) -> Vec<usize> {
    let mut row = Vec::with_capacity(previous.len());
    row.push(previous[0] + 1);
    for j in 1..previous.len() {
        let substitution = previous[j - 1] + usize::from(query[j - 1] != ch);
        let insertion = row[j - 1] + 1;
        let deletion = previous[j] + 1;
        row.push(substitution.min(insertion).min(deletion));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie() -> PrefixTrie {
        let mut trie = PrefixTrie::new();
        trie.insert_text("Weekly Quiz review", 0);
        trie.insert_text("Quick study group", 1);
        trie.insert_text("quiz retake", 2);
        trie
    }

    #[test]
    fn autocomplete_lists_terms_in_order() {
        let trie = trie();
        let terms: Vec<&str> = trie.autocomplete("qu", 10).iter().map(|c| c.term).collect();
        assert_eq!(terms, vec!["quick", "quiz"]);

        let quiz = &trie.autocomplete("QUIZ", 10)[0];
        assert_eq!(quiz.records, &[0, 2]);
        assert_eq!(trie.autocomplete("qu", 1).len(), 1);
        assert!(trie.autocomplete("zz", 5).is_empty());
        assert!(trie.autocomplete("qu", 0).is_empty());
    }

    #[test]
    fn fuzzy_respects_edit_budget() {
        let mut trie = PrefixTrie::new();
        trie.insert("quiz", 7);

        assert_eq!(
            trie.fuzzy("qiz", 1),
            vec![FuzzyHit {
                record: 7,
                distance: 1
            }]
        );
        assert!(trie.fuzzy("qzz", 1).is_empty());
        assert_eq!(trie.fuzzy("qzz", 2).len(), 1);
        assert_eq!(trie.fuzzy("quiz", 0)[0].distance, 0);
    }

    #[test]
    fn fuzzy_keeps_minimum_distance_per_record() {
        let trie = trie();
        let hits = trie.fuzzy("quiz", 2);
        let records: Vec<(usize, usize)> = hits.iter().map(|h| (h.record, h.distance)).collect();
        // record 1 only reaches "quiz" through "quick" (distance 2).
        assert_eq!(records, vec![(0, 0), (2, 0), (1, 2)]);
    }

    #[test]
    fn counts_distinct_terms() {
        assert_eq!(trie().term_count(), 7);
    }
}
