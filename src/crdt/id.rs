use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A total-ordered identifier for one character: (counter, siteId).
///
/// Comparison is lexicographic on (counter, siteId). Each site stamps new
/// characters with (maxCounterObservedAnywhere + 1, ownSiteId), which
/// guarantees global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalId {
    pub counter: u64,
    pub site_id: u64,
}

impl GlobalId {
    pub fn new(counter: u64, site_id: u64) -> Self {
        Self { counter, site_id }
    }
}

impl Ord for GlobalId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.site_id.cmp(&other.site_id))
    }
}

impl PartialOrd for GlobalId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_counter_first() {
        assert!(GlobalId::new(1, 5) < GlobalId::new(2, 0));
    }

    #[test]
    fn breaks_ties_by_site() {
        assert!(GlobalId::new(3, 1) < GlobalId::new(3, 2));
        assert_eq!(GlobalId::new(3, 1).cmp(&GlobalId::new(3, 1)), Ordering::Equal);
    }
}
