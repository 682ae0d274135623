//! Plot legend clicks: a single click toggles a series, a double click
//! isolates it.
//!
//! A click is held back for the double click window before it is reported
//! as a single click; the caller drives time by passing `Instant`s.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::config::ClientConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegendAction {
    Toggle(String),
    Isolate(String),
}

#[derive(Debug, Clone)]
pub struct LegendClickResolver {
    window: Duration,
    pending: Option<(String, Instant)>,
}

impl LegendClickResolver {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.legend_double_click_window())
    }

    /// Register a click on `key`. Returns the actions that became final.
    pub fn click(&mut self, key: &str, now: Instant) -> Vec<LegendAction> {
        match self.pending.take() {
            Some((prev, at)) if prev == key && now.duration_since(at) <= self.window => {
                vec![LegendAction::Isolate(prev)]
            }
            Some((prev, _)) => {
                self.pending = Some((key.to_string(), now));
                vec![LegendAction::Toggle(prev)]
            }
            None => {
                self.pending = Some((key.to_string(), now));
                vec![]
            }
        }
    }

    /// Report a held click as a single click once its window has passed.
    pub fn poll(&mut self, now: Instant) -> Option<LegendAction> {
        match &self.pending {
            Some((_, at)) if now.duration_since(*at) > self.window => {
                self.pending.take().map(|(key, _)| LegendAction::Toggle(key))
            }
            _ => None,
        }
    }

    /// When the held click, if any, should be polled.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at + self.window)
    }
}

/// Which plot series are hidden.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegendVisibility {
    hidden: BTreeSet<String>,
}

impl LegendVisibility {
    pub fn is_visible(&self, key: &str) -> bool {
        !self.hidden.contains(key)
    }

    /// Apply a resolved click. Isolating the only visible series shows every
    /// series again.
    pub fn apply(&mut self, action: &LegendAction, all_keys: &[String]) {
        match action {
            LegendAction::Toggle(key) => {
                if !self.hidden.remove(key) {
                    self.hidden.insert(key.clone());
                }
            }
            LegendAction::Isolate(key) => {
                let only_visible = all_keys
                    .iter()
                    .all(|k| (k == key) == self.is_visible(k));
                if only_visible {
                    self.hidden.clear();
                } else {
                    self.hidden = all_keys.iter().filter(|k| *k != key).cloned().collect();
                }
            }
        }
    }
}
