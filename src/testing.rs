//! Shared fixtures for the unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::LocalKey;

use err_context::prelude::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::error::AnyError;
use crate::lifecycle::Life;
use crate::registry::Registry;
use crate::section::Section;

thread_local! {
    static INIT_HITS: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
    static APPLY_HITS: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
}

type Hits = LocalKey<RefCell<HashMap<usize, usize>>>;

fn hit(hits: &'static Hits, idx: usize) {
    hits.with(|h| *h.borrow_mut().entry(idx).or_default() += 1);
}

fn hits(hits: &'static Hits, idx: usize) -> usize {
    hits.with(|h| h.borrow().get(&idx).copied().unwrap_or_default())
}

/// An option counting the calls of its callbacks (per test thread, per `idx`).
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct FakeOption {
    pub(crate) idx: usize,
    pub(crate) name: String,
    pub(crate) fail_init: bool,
    pub(crate) fail_apply: bool,
    pub(crate) panic: bool,
}

impl Section for FakeOption {
    fn init(&mut self) -> Result<(), AnyError> {
        hit(&INIT_HITS, self.idx);
        if self.fail_init {
            return Err(format!("Init of {} failed", self.idx).into());
        }
        Ok(())
    }

    fn apply(&mut self) -> Result<(), AnyError> {
        hit(&APPLY_HITS, self.idx);
        if self.panic {
            panic!("Apply of {} panicked", self.idx);
        }
        if self.fail_apply {
            return Err(format!("Apply of {} failed", self.idx).into());
        }
        Ok(())
    }
}

pub(crate) fn fake(
    idx: usize,
    name: &'static str,
) -> impl Fn() -> FakeOption + Send + Sync + 'static {
    move || FakeOption {
        idx,
        name: name.to_owned(),
        ..FakeOption::default()
    }
}

pub(crate) fn init_hits(idx: usize) -> usize {
    hits(&INIT_HITS, idx)
}

pub(crate) fn apply_hits(idx: usize) -> usize {
    hits(&APPLY_HITS, idx)
}

/// A config file in a temporary directory, not created until written.
pub(crate) struct ConfFile {
    _dir: TempDir,
    path: PathBuf,
}

impl ConfFile {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.conf");
        Self { _dir: dir, path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn write(&self, content: &str) {
        fs::write(&self.path, content).unwrap();
    }
}

/// What the fault reporter and the exit callback saw.
#[derive(Clone, Default)]
pub(crate) struct Exits {
    pub(crate) codes: Arc<Mutex<Vec<i32>>>,
    pub(crate) faults: Arc<Mutex<Vec<String>>>,
}

/// A registry that never looks for the default config file and never exits the process.
pub(crate) fn test_registry(life: &Arc<Life>) -> (Registry, Exits) {
    let exits = Exits::default();
    let mut registry = Registry::new("test", Arc::clone(life));
    let codes = Arc::clone(&exits.codes);
    let faults = Arc::clone(&exits.faults);
    registry
        .path_resolver(|_| None)
        .on_exit(move |code| codes.lock().push(code))
        .on_fault(move |e| {
            let chain = e.chain().map(|c| c.to_string()).collect::<Vec<_>>();
            faults.lock().push(chain.join("; "));
        });
    (registry, exits)
}
