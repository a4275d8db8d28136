//! The first load of the configuration.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{AnyError, DoubleLoad};
use crate::registry::{Registry, Stage};
use crate::section::Candidate;

impl Registry {
    /// Loads the configuration and initializes all the options.
    ///
    /// The file is looked for at `path`, or at the path set by
    /// [`config_path`][Registry::config_path], or (if neither is given) by the path resolver. If
    /// no file is found at all, the defaults are used. This is not an error.
    ///
    /// Then [`init`][crate::Section::init] is called on every option in the order of registration.
    /// The first failure is returned as it is, the rest of the options is not initialized and
    /// nothing becomes live. Otherwise all the options are made live at once.
    ///
    /// It is possible to load only once. Any further call (no matter if the first one succeeded)
    /// returns the [`DoubleLoad`] error.
    pub fn load(&self, path: Option<&Path>) -> Result<(), AnyError> {
        let _guard = self.reload_lock.lock();
        self.begin_load()?;
        let result = self.load_candidates(path).and_then(|c| self.init_all(c));
        self.finish_load(result)
    }

    /// Initializes all the options with their defaults, without looking for any file.
    ///
    /// This is the start-up used in the [test mode][Registry::test_mode]. Counts as the one
    /// allowed [`load`][Registry::load].
    pub fn init_defaults(&self) -> Result<(), AnyError> {
        let _guard = self.reload_lock.lock();
        self.begin_load()?;
        debug!("Initializing options with defaults");
        let result = self.resolve_defaults().and_then(|c| self.init_all(c));
        self.finish_load(result)
    }

    fn begin_load(&self) -> Result<(), AnyError> {
        let mut stage = self.stage.lock();
        if *stage != Stage::NotLoaded {
            return Err(DoubleLoad.into());
        }
        *stage = Stage::Loading;
        Ok(())
    }

    fn finish_load(&self, result: Result<(), AnyError>) -> Result<(), AnyError> {
        *self.stage.lock() = if result.is_ok() {
            Stage::Loaded
        } else {
            Stage::Failed
        };
        result
    }

    /// Decides which file is in use from now on.
    fn pick_path(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        let mut active = self.path.lock();
        if let Some(path) = explicit {
            *active = Some(path.to_owned());
        } else if active.is_none() {
            *active = (self.resolver)(&format!("{}.conf", self.app_name));
        }
        active.clone()
    }

    fn load_candidates(&self, path: Option<&Path>) -> Result<Vec<Box<dyn Candidate>>, AnyError> {
        match self.pick_path(path) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                self.decode_file(&path)
            }
            None => {
                info!("No config file found, using defaults");
                self.resolve_defaults()
            }
        }
    }

    fn init_all(&self, mut candidates: Vec<Box<dyn Candidate>>) -> Result<(), AnyError> {
        for (desc, candidate) in self.descriptors.iter().zip(candidates.iter_mut()) {
            debug!("Initializing option '{}'", desc.name);
            if let Err(e) = candidate.run_init() {
                debug!("Init of option '{}' failed, nothing gets live", desc.name);
                return Err(e);
            }
        }
        self.commit(candidates);
        info!("Configuration loaded, {} options live", self.descriptors.len());
        Ok(())
    }
}
