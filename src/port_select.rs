// src/port_select.rs
//
// Model of the port selection control: the option list built from the last
// discovered port set and the currently selected path.

use crate::io::serial::ports::{same_port_set, PortDescriptor};

/// Notice shown when discovery finds nothing
pub const NO_PORTS_NOTICE: &str = "No ports discovered";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Same content as before; options and selection untouched
    Unchanged,
    /// Options rebuilt from the new set
    Repopulated,
}

#[derive(Clone, Debug, Default)]
pub struct PortSelector {
    options: Vec<PortDescriptor>,
    selected: Option<String>,
}

impl PortSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &[PortDescriptor] {
        &self.options
    }

    pub fn labels(&self) -> Vec<String> {
        self.options.iter().map(PortDescriptor::label).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn selected_path(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_index(&self) -> Option<usize> {
        let path = self.selected.as_deref()?;
        self.options.iter().position(|p| p.path == path)
    }

    /// Apply a freshly discovered port set.
    ///
    /// Nothing changes when the set has the same content as the current
    /// options (in any order). Otherwise the options are replaced; the
    /// selected path survives if it is still present, else the first entry
    /// is selected, else nothing is.
    pub fn refresh(&mut self, ports: Vec<PortDescriptor>) -> RefreshOutcome {
        if same_port_set(&self.options, &ports) {
            return RefreshOutcome::Unchanged;
        }

        let keep = self
            .selected
            .as_deref()
            .is_some_and(|path| ports.iter().any(|p| p.path == path));
        if !keep {
            self.selected = ports.first().map(|p| p.path.clone());
        }
        self.options = ports;
        RefreshOutcome::Repopulated
    }

    /// Select an option by path. Returns false if no such option exists.
    pub fn select(&mut self, path: &str) -> bool {
        if self.options.iter().any(|p| p.path == path) {
            self.selected = Some(path.to_string());
            true
        } else {
            false
        }
    }

    pub fn select_next(&mut self) {
        self.step(1);
    }

    pub fn select_prev(&mut self) {
        self.step(-1);
    }

    fn step(&mut self, delta: isize) {
        if self.options.is_empty() {
            return;
        }
        let last = self.options.len() - 1;
        let index = match self.selected_index() {
            Some(i) if delta > 0 => (i + 1).min(last),
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        self.selected = Some(self.options[index].path.clone());
    }
}

/// Notice text for a discovered set: set when empty, cleared otherwise
pub fn notice_for(ports: &[PortDescriptor]) -> Option<&'static str> {
    if ports.is_empty() {
        Some(NO_PORTS_NOTICE)
    } else {
        None
    }
}

// ============================================================================
// Tests
// ============================================================================
