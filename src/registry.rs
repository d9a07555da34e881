//! Ordered in-memory process collection and its sort state.
//!
//! Owned by a single thread; watcher events reach it through the owner's
//! dispatcher, never directly.

use crate::process::Process;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortAttribute {
    Pid,
    Name,
    Type,
    Architecture,
    IntegrityLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub attribute: SortAttribute,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self::ascending(SortAttribute::Name)
    }
}

impl SortState {
    pub fn new(attribute: SortAttribute, direction: SortDirection) -> Self {
        Self { attribute, direction }
    }

    pub fn ascending(attribute: SortAttribute) -> Self {
        Self::new(attribute, SortDirection::Ascending)
    }

    pub fn descending(attribute: SortAttribute) -> Self {
        Self::new(attribute, SortDirection::Descending)
    }

    /// Column-header click: the same attribute flips direction, another
    /// attribute starts ascending.
    pub fn toggled(self, attribute: SortAttribute) -> Self {
        if attribute == self.attribute {
            Self::new(attribute, self.direction.reversed())
        } else {
            Self::ascending(attribute)
        }
    }

    /// Total order: the attribute key, then pid. Descending reverses both.
    pub fn compare(&self, a: &Process, b: &Process) -> Ordering {
        let ord = match self.attribute {
            SortAttribute::Pid => a.pid.cmp(&b.pid),
            SortAttribute::Name => compare_case_insensitive(&a.name, &b.name),
            // Option orders None before Some.
            SortAttribute::Type => a.process_type.cmp(&b.process_type),
            SortAttribute::Architecture => a.architecture_raw.cmp(&b.architecture_raw),
            SortAttribute::IntegrityLevel => a.integrity_level.cmp(&b.integrity_level),
        }
        .then_with(|| a.pid.cmp(&b.pid));

        match self.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

fn compare_case_insensitive(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

#[derive(Debug, Clone, Default)]
pub struct SortedRegistry {
    processes: Vec<Process>,
    sort: SortState,
}

impl SortedRegistry {
    pub fn new(sort: SortState) -> Self {
        Self {
            processes: Vec::new(),
            sort,
        }
    }

    /// Replace the contents and order them under `sort`.
    pub fn reset(&mut self, items: Vec<Process>, sort: SortState) {
        self.processes = items;
        self.sort = sort;
        self.resort();
    }

    pub fn set_sort_state(&mut self, sort: SortState) {
        self.sort = sort;
        self.resort();
    }

    /// Binary-search insert; contents must already be sorted under the current state.
    pub fn insert(&mut self, process: Process) {
        let sort = self.sort;
        let index = self
            .processes
            .partition_point(|p| sort.compare(p, &process) != Ordering::Greater);
        self.processes.insert(index, process);
    }

    /// Remove the first record with `pid`. No-op when absent.
    pub fn remove_by_pid(&mut self, pid: u32) -> Option<Process> {
        let index = self.position_of(pid)?;
        Some(self.processes.remove(index))
    }

    pub fn position_of(&self, pid: u32) -> Option<usize> {
        self.processes.iter().position(|p| p.pid == pid)
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Process> {
        self.processes.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Process> {
        self.processes.get(index)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn sort_state(&self) -> SortState {
        self.sort
    }

    fn resort(&mut self) {
        let sort = self.sort;
        self.processes.sort_unstable_by(|a, b| sort.compare(a, b));
    }
}
