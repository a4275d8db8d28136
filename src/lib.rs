#![allow(clippy::type_complexity)]
#![forbid(unsafe_code)]

//! A process-wide registry of configuration options.
//!
//! An application is usually composed of many components, each needing some configuration. This
//! crate lets each component own its piece of configuration without the application having to
//! assemble one big configuration structure out of them:
//!
//! * The component defines its configuration [`Section`] (any [`serde`] (de)serializable
//!   structure) and registers it in the [`Registry`] under a name, together with a function
//!   creating its default value. It gets a [`Handle`] to read the live value through.
//! * At start, the registry loads a TOML file. Each registered option is read from the table of
//!   its name, decoded onto its default (so the file needs to list only the differences). Then all
//!   the options are [initialized][Section::init], in the order of registration.
//! * On `SIGUSR1`, the file is read again. The options whose content changed get
//!   [applied][Section::apply], then all of them are replaced by the new values.
//!
//! Options that are not mentioned in the file keep their defaults and a missing file is perfectly
//! fine. The defaults can be printed as a commented-out config file with the
//! `--dump-default-options` command line option (see [`Opts`]).
//!
//! # Lifecycle
//!
//! The registry is tied to a [`Life`], a simple tracker of the application's phases. Options may
//! be registered only during the [`Initing`][Phase::Initing] phase. The [`daemon`] module hooks
//! the load into the start of the application and stops reloading once it shuts down.
//!
//! # Failures
//!
//! Failing to initialize an option fails the whole load and nothing becomes live. A broken file
//! on reload is only logged, the old configuration stays. But if an option fails to apply (returns
//! an error or panics), the application is in an unknown state. The fault is reported and the
//! process terminates with [`APPLY_FAULT_EXIT_CODE`].
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use cfg_registry::{AnyError, Life, Registry, Section};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Deserialize, Serialize)]
//! struct Http {
//!     port: u16,
//!     workers: usize,
//! }
//!
//! impl Section for Http {
//!     fn apply(&mut self) -> Result<(), AnyError> {
//!         println!("Now running {} workers", self.workers);
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), AnyError> {
//! let life = Arc::new(Life::new());
//! let mut registry = Registry::new("server", Arc::clone(&life));
//! let http = registry.register("http", || Http {
//!     port: 8080,
//!     workers: 4,
//! });
//! # registry.path_resolver(|_| None);
//! let registry = Arc::new(registry);
//!
//! // No file in this example, so just the defaults
//! registry.load(None)?;
//! assert_eq!(8080, http.get().unwrap().port);
//! # Ok(())
//! # }
//! ```

mod cfg_loader;
pub mod daemon;
mod dump;
pub mod error;
pub mod lifecycle;
mod load;
#[doc(hidden)]
pub mod macro_support;
mod registry;
mod reload;
mod section;
#[cfg(test)]
mod testing;
pub mod utils;

pub use crate::daemon::Opts;
pub use crate::error::{
    AnyError, ApplyFault, DoubleLoad, OverrideTypeMismatch, Panicked, UnusedOverride,
};
pub use crate::lifecycle::{HookPoint, Life, Phase};
pub use crate::registry::{Handle, Registry, APPLY_FAULT_EXIT_CODE};
pub use crate::section::{Canonical, Section, TomlCanonical};
