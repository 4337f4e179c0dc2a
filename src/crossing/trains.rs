use std::collections::HashSet;

/// Berths approaching and leaving the crossing.
#[derive(Debug, Clone)]
pub struct WatchZone {
    berths: HashSet<String>,
}

impl WatchZone {
    pub fn new<I, S>(berths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            berths: berths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, berth: &str) -> bool {
        self.berths.contains(berth)
    }
}

/// Trains seen in the watch zone since the last barrier-up.
///
/// Entries never expire on their own; only [`TrainWatchList::take`] clears them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainWatchList {
    trains: Vec<String>,
}

impl TrainWatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the train was newly added.
    pub fn observe(&mut self, descr: &str) -> bool {
        if self.trains.iter().any(|t| t == descr) {
            return false;
        }
        self.trains.push(descr.to_string());
        true
    }

    pub fn trains(&self) -> &[String] {
        &self.trains
    }

    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }

    /// Hand over the current list and start a fresh one.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_keeps_first_seen_order_without_duplicates() {
        let mut list = TrainWatchList::new();
        assert!(list.observe("1W23"));
        assert!(list.observe("2B10"));
        assert!(!list.observe("1W23"));

        assert_eq!(list.trains(), &["1W23".to_string(), "2B10".to_string()]);
    }

    #[test]
    fn take_empties_the_list() {
        let mut list = TrainWatchList::new();
        list.observe("1W23");

        assert_eq!(list.take(), vec!["1W23".to_string()]);
        assert!(list.is_empty());
        assert!(list.observe("1W23"));
    }

    #[test]
    fn watch_zone_matches_configured_berths() {
        let zone = WatchZone::new(["5253", "5261"]);
        assert!(zone.contains("5261"));
        assert!(!zone.contains("5262"));
    }
}
