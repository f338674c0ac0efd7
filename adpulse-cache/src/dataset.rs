//! Partitioned values and the acceptance policy for writes into them.
//!
//! A [`Dataset`] may be split into named parts (for metrics, one group per
//! ad platform). A write is judged part by part against the live value. An
//! incoming part is accepted if any of:
//!
//! 1. it has at least one non-zero primary metric,
//! 2. the live value has no such part,
//! 3. the write is flagged authoritative.
//!
//! A rejected part keeps its live value. Values without parts are judged
//! as a whole by the same rules.

use std::collections::{BTreeMap, BTreeSet};

use adpulse_core::{MetricGroup, MetricsPayload, SourceTag};

/// Value type that can be cached behind the acceptance policy.
pub trait Dataset: Clone + Send + Sync + 'static {
    /// True if at least one primary metric is non-zero.
    fn has_primary_activity(&self) -> bool;

    /// Names of the independently published parts. Empty for values that
    /// are only ever written whole.
    fn parts(&self) -> Vec<String> {
        Vec::new()
    }

    /// Activity of one part; `None` if the part is absent.
    fn part_activity(&self, _part: &str) -> Option<bool> {
        None
    }

    /// Drop every part for which `keep` returns false.
    fn retain_parts<F>(&mut self, _keep: F)
    where
        F: FnMut(&str) -> bool,
    {
    }

    /// Fold a newer value into this one. Parts present in `newer` win.
    fn absorb(&mut self, newer: Self) {
        *self = newer;
    }
}

impl Dataset for MetricsPayload {
    fn has_primary_activity(&self) -> bool {
        self.has_activity()
    }

    fn parts(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    fn part_activity(&self, part: &str) -> Option<bool> {
        self.group(part).map(MetricGroup::has_activity)
    }

    fn retain_parts<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.groups.retain(|name, _| keep(name.as_str()));
    }

    fn absorb(&mut self, newer: Self) {
        self.merge(newer);
    }
}

/// Why a write (or one part of it) was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptReason {
    PrimaryActivity,
    FirstValue,
    Authoritative,
}

/// Result of judging one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Every part was accepted. Carries the reason of the first part.
    Accepted(AcceptReason),
    /// Some parts were accepted; the rest kept their live value.
    Partial { accepted: usize, rejected: usize },
    Rejected,
}

impl PublishOutcome {
    /// True if anything was written.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected)
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial { .. })
    }
}

/// Verdict of the acceptance policy for one incoming value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    accepted: BTreeMap<String, AcceptReason>,
    rejected: BTreeSet<String>,
    whole: Option<AcceptReason>,
}

impl Admission {
    /// Judge `incoming` against the live value (`None` if there is none or
    /// it has expired).
    pub fn judge<V: Dataset>(incoming: &V, live: Option<&V>, authoritative: bool) -> Self {
        let parts = incoming.parts();
        if parts.is_empty() {
            return Self {
                whole: rule(incoming.has_primary_activity(), live.is_some(), authoritative),
                ..Self::default()
            };
        }

        let mut admission = Self::default();
        for part in parts {
            let active = incoming.part_activity(&part).unwrap_or(false);
            let present = live.is_some_and(|value| value.part_activity(&part).is_some());
            match rule(active, present, authoritative) {
                Some(reason) => {
                    admission.accepted.insert(part, reason);
                }
                None => {
                    admission.rejected.insert(part);
                }
            }
        }
        admission
    }

    pub fn any_accepted(&self) -> bool {
        self.whole.is_some() || !self.accepted.is_empty()
    }

    pub fn reason_for(&self, part: &str) -> Option<AcceptReason> {
        self.accepted.get(part).copied()
    }

    pub fn accepted_parts(&self) -> impl Iterator<Item = &str> {
        self.accepted.keys().map(String::as_str)
    }

    pub fn is_rejected(&self, part: &str) -> bool {
        self.rejected.contains(part)
    }

    pub fn outcome(&self) -> PublishOutcome {
        if let Some(reason) = self.whole {
            return PublishOutcome::Accepted(reason);
        }
        match self.accepted.values().next() {
            None => PublishOutcome::Rejected,
            Some(reason) if self.rejected.is_empty() => PublishOutcome::Accepted(*reason),
            Some(_) => PublishOutcome::Partial {
                accepted: self.accepted.len(),
                rejected: self.rejected.len(),
            },
        }
    }

    /// Build the value to store, or `None` if nothing was accepted.
    ///
    /// Only accepted parts of `incoming` are written. With `merge` they are
    /// folded into the live value; otherwise they replace it, except for
    /// rejected parts, which keep their live value.
    pub fn apply<V: Dataset>(&self, mut incoming: V, live: Option<&V>, merge: bool) -> Option<V> {
        if !self.any_accepted() {
            return None;
        }
        incoming.retain_parts(|part| self.accepted.contains_key(part));
        let Some(live) = live else {
            return Some(incoming);
        };

        if merge {
            let mut combined = live.clone();
            combined.absorb(incoming);
            Some(combined)
        } else if self.rejected.is_empty() {
            Some(incoming)
        } else {
            let mut kept = live.clone();
            kept.retain_parts(|part| self.rejected.contains(part));
            incoming.absorb(kept);
            Some(incoming)
        }
    }
}

fn rule(active: bool, has_live: bool, authoritative: bool) -> Option<AcceptReason> {
    if active {
        Some(AcceptReason::PrimaryActivity)
    } else if !has_live {
        Some(AcceptReason::FirstValue)
    } else if authoritative {
        Some(AcceptReason::Authoritative)
    } else {
        None
    }
}

/// The less trustworthy of two tags. Used to label values assembled from
/// parts of different provenance.
pub fn least_trusted(a: SourceTag, b: SourceTag) -> SourceTag {
    if b.trust_rank() < a.trust_rank() {
        b
    } else {
        a
    }
}
