//! Cycle-wide breach aggregation
//!
//! Every breach of a scan cycle lands in one bucket per category. The buckets
//! are then collapsed into a single [`AlertSummary`], so a cycle produces at
//! most one notification no matter how many services or categories breached.

use crate::models::{AlertCategory, AlertSummary, Breach};

/// Breaching services per category.
///
/// Categories iterate in the order they were first breached; services keep
/// the order in which they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateAlertMap {
    buckets: Vec<(AlertCategory, Vec<String>)>,
}

impl AggregateAlertMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single breach
    pub fn push(&mut self, breach: Breach) {
        match self.buckets.iter_mut().find(|(c, _)| *c == breach.category) {
            Some((_, services)) => services.push(breach.service_name),
            None => self.buckets.push((breach.category, vec![breach.service_name])),
        }
    }

    /// Services that breached a category
    pub fn services(&self, category: AlertCategory) -> Option<&[String]> {
        self.buckets
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, services)| services.as_slice())
    }

    /// Categories in first-breached order
    pub fn categories(&self) -> impl Iterator<Item = AlertCategory> + '_ {
        self.buckets.iter().map(|(c, _)| *c)
    }

    /// Iterate `(category, services)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (AlertCategory, &[String])> {
        self.buckets.iter().map(|(c, s)| (*c, s.as_slice()))
    }

    /// Number of breached categories
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when nothing breached this cycle
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total breaches across all categories
    pub fn breach_count(&self) -> usize {
        self.buckets.iter().map(|(_, s)| s.len()).sum()
    }

    /// Collapse the map into one headline and one service label.
    ///
    /// The headline names the first category; the service label comes from
    /// the last category. Returns `None` when nothing breached.
    pub fn summarize(&self) -> Option<AlertSummary> {
        let (first_category, _) = self.buckets.first()?;
        let (_, last_services) = self.buckets.last()?;

        let headline = headline(*first_category, self.buckets.len());
        let service_label = service_label(last_services)?;

        Some(AlertSummary {
            headline,
            service_label,
        })
    }
}

impl Extend<Breach> for AggregateAlertMap {
    fn extend<T: IntoIterator<Item = Breach>>(&mut self, iter: T) {
        for breach in iter {
            self.push(breach);
        }
    }
}

impl FromIterator<Breach> for AggregateAlertMap {
    fn from_iter<T: IntoIterator<Item = Breach>>(iter: T) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

/// `svc` for one service, `svc+N nodes` for N further services
pub fn service_label(services: &[String]) -> Option<String> {
    match services {
        [] => None,
        [only] => Some(only.clone()),
        [first, rest @ ..] => Some(format!("{first}+{} nodes", rest.len())),
    }
}

/// Category name for one category, a catch-all phrase for several
pub fn headline(first: AlertCategory, category_count: usize) -> String {
    if category_count > 1 {
        format!("{first} and other thresholds have been breached for")
    } else {
        first.to_string()
    }
}
