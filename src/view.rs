//! Which countries are shown on the charts.
//!
//! The renderer owns the legend; this state only records which datasets are
//! visible, and the pipeline reads it through `is_shown`. Every update returns a
//! new `ViewState` and leaves the old one intact.

use std::collections::BTreeSet;

use crate::domain::Location;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    shown: BTreeSet<String>,
}

impl ViewState {
    /// Every location visible.
    pub fn all_shown(locations: &[Location]) -> Self {
        Self {
            shown: locations.iter().map(|l| l.name.clone()).collect(),
        }
    }

    /// Every location visible except those in `hidden` (case-insensitive).
    pub fn with_hidden(locations: &[Location], hidden: &[String]) -> Self {
        let shown = locations
            .iter()
            .filter(|l| !hidden.iter().any(|h| h.trim().eq_ignore_ascii_case(&l.name)))
            .map(|l| l.name.clone())
            .collect();
        Self { shown }
    }

    pub fn is_shown(&self, name: &str) -> bool {
        self.shown.contains(name)
    }

    pub fn shown(&self) -> impl Iterator<Item = &str> {
        self.shown.iter().map(String::as_str)
    }

    pub fn show(&self, name: &str) -> Self {
        let mut shown = self.shown.clone();
        shown.insert(name.to_string());
        Self { shown }
    }

    pub fn hide(&self, name: &str) -> Self {
        let mut shown = self.shown.clone();
        shown.remove(name);
        Self { shown }
    }

    /// Flip one location, as a legend click does.
    pub fn toggle(&self, name: &str) -> Self {
        if self.is_shown(name) {
            self.hide(name)
        } else {
            self.show(name)
        }
    }
}
