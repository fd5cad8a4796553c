//! Grant/revoke computation between prior and planned sets

use std::collections::BTreeSet;

/// Elements to grant and revoke to move from one set to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDiff<T: Ord> {
    /// In planned but not in prior
    pub grant: Vec<T>,
    /// In prior but not in planned
    pub revoke: Vec<T>,
}

impl<T: Ord + Clone> SetDiff<T> {
    /// Compute `planned - prior` and `prior - planned`.
    ///
    /// Duplicates and ordering in the inputs are irrelevant; the output is
    /// sorted so the issued calls are deterministic.
    pub fn between<'a, I, J>(prior: I, planned: J) -> Self
    where
        T: 'a,
        I: IntoIterator<Item = &'a T>,
        J: IntoIterator<Item = &'a T>,
    {
        let prior: BTreeSet<&T> = prior.into_iter().collect();
        let planned: BTreeSet<&T> = planned.into_iter().collect();

        Self {
            grant: planned.difference(&prior).map(|t| (*t).clone()).collect(),
            revoke: prior.difference(&planned).map(|t| (*t).clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.grant.is_empty() && self.revoke.is_empty()
    }
}
