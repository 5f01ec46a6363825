use serde::{Deserialize, Serialize};

/// One weighted keyword extracted from a user question (§3, §4.4 step 1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Keyword {
    pub keyword: String,
    pub weight: f64,
}

/// A normalized keyword set: weights non-negative, summing to 1, entries
/// below the drop threshold removed.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeywordSet(pub Vec<Keyword>);

const MIN_WEIGHT: f64 = 0.1;

impl KeywordSet {
    pub fn new(mut keywords: Vec<Keyword>) -> Self {
        keywords.retain(|k| k.weight.is_finite() && k.weight > 0.0);
        let mut set = Self(keywords);
        set.renormalize();
        set.0.retain(|k| k.weight >= MIN_WEIGHT);
        set.renormalize();
        set
    }

    fn renormalize(&mut self) {
        let total: f64 = self.0.iter().map(|k| k.weight).sum();
        if total <= 0.0 {
            return;
        }
        for k in &mut self.0 {
            k.weight /= total;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Keyword] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_normalized_to_one() {
        let set = KeywordSet::new(vec![
            Keyword { keyword: "snow".into(), weight: 3.0 },
            Keyword { keyword: "scattering".into(), weight: 1.0 },
        ]);
        let total: f64 = set.as_slice().iter().map(|k| k.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn low_weight_entries_are_dropped() {
        let set = KeywordSet::new(vec![
            Keyword { keyword: "main".into(), weight: 0.95 },
            Keyword { keyword: "noise".into(), weight: 0.05 },
        ]);
        assert_eq!(set.as_slice().len(), 1);
        assert_eq!(set.as_slice()[0].keyword, "main");
    }

    #[test]
    fn negative_or_nonfinite_weights_are_rejected() {
        let set = KeywordSet::new(vec![
            Keyword { keyword: "bad".into(), weight: -1.0 },
            Keyword { keyword: "good".into(), weight: 1.0 },
        ]);
        assert_eq!(set.as_slice().len(), 1);
        assert_eq!(set.as_slice()[0].keyword, "good");
    }
}
