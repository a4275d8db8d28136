//! Reloading of the configuration at runtime.

use std::panic::{self, AssertUnwindSafe};

use err_context::prelude::*;
use log::{debug, error, info, trace};

use crate::error::{AnyError, ApplyFault, Panicked};
use crate::registry::{Descriptor, Registry, Stage, APPLY_FAULT_EXIT_CODE};
use crate::section::Candidate;

impl Registry {
    /// Reloads the configuration file.
    ///
    /// The file is decoded anew and every option whose content differs from the live one gets
    /// its [`apply`][crate::Section::apply] called, in the order of registration. Then all the
    /// options (even the unchanged ones) are replaced by the new instances.
    ///
    /// Problems with the file (it's malformed, some option can't be decoded) are only logged and
    /// the old configuration stays in place. Failing to apply an option, however, leaves the
    /// application in an unknown state. Such fault is passed to the fault reporter and the process
    /// is terminated with [`APPLY_FAULT_EXIT_CODE`] (see [`on_fault`][Registry::on_fault] and
    /// [`on_exit`][Registry::on_exit]).
    ///
    /// Does nothing before a successful [`load`][Registry::load], if there's no config file in
    /// use or when the application is shutting down. Concurrent calls are serialized.
    pub fn reload(&self) {
        let _guard = self.reload_lock.lock();
        if self.life.is_shutting_down() {
            info!("Shutting down, not reloading configuration");
            return;
        }
        if *self.stage.lock() != Stage::Loaded {
            debug!("Configuration not loaded, not reloading");
            return;
        }
        let path = match self.active_path() {
            Some(path) => path,
            None => {
                debug!("No config file in use, nothing to reload");
                return;
            }
        };

        info!("Reloading configuration from {}", path.display());
        let mut candidates = match self.decode_file(&path) {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Failed to reload configuration, keeping the old one");
                crate::log_error!(multi Error, e);
                return;
            }
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), ApplyFault> {
            self.apply_changed(&mut candidates)?;
            self.commit(candidates);
            Ok(())
        }));
        let fault: AnyError = match outcome {
            Ok(Ok(())) => {
                debug!("Configuration reloaded");
                return;
            }
            Ok(Err(fault)) => AnyError::from(fault),
            Err(payload) => Panicked::from_payload(payload)
                .context("Panicked while committing the new configuration")
                .into(),
        };
        (self.reporter)(&fault);
        (self.exit)(APPLY_FAULT_EXIT_CODE);
    }

    fn apply_changed(&self, candidates: &mut [Box<dyn Candidate>]) -> Result<(), ApplyFault> {
        for (desc, candidate) in self.descriptors.iter().zip(candidates.iter_mut()) {
            // User code runs in both the comparison (serialization, encoding) and the apply
            match panic::catch_unwind(AssertUnwindSafe(|| self.apply_one(desc, candidate))) {
                Ok(Ok(())) => (),
                Ok(Err(e)) => return Err(ApplyFault::new(&desc.name, e)),
                Err(payload) => {
                    let panicked = Panicked::from_payload(payload);
                    return Err(ApplyFault::new(&desc.name, panicked.into()));
                }
            }
        }
        Ok(())
    }

    fn apply_one(
        &self,
        desc: &Descriptor,
        candidate: &mut Box<dyn Candidate>,
    ) -> Result<(), AnyError> {
        if !self.changed(desc, &**candidate)? {
            trace!("Option '{}' didn't change", desc.name);
            return Ok(());
        }
        info!("Applying changed option '{}'", desc.name);
        candidate.run_apply()
    }

    /// Compares the canonical forms of the live and new instance.
    fn changed(&self, desc: &Descriptor, candidate: &dyn Candidate) -> Result<bool, AnyError> {
        let live = match desc.slot.live_value()? {
            Some(live) => live,
            None => return Ok(true),
        };
        let old = self.canonical.encode(&desc.name, &live)?;
        let new = self.canonical.encode(&desc.name, &candidate.to_value()?)?;
        Ok(old != new)
    }
}
