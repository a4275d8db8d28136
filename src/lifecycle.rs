//! Phases of the application's life.
//!
//! A minimal phase tracker. Components register in the [`Initing`][Phase::Initing] phase, the
//! configuration is loaded by a hook right before starting and reloading stops once the
//! application starts shutting down.
//!
//! ```rust
//! use cfg_registry::lifecycle::{HookPoint, Life, Phase};
//!
//! let life = Life::new();
//! life.register_hook("hello", 10, HookPoint::BeforeRunning, || {
//!     println!("Hello");
//!     Ok(())
//! });
//! life.start().unwrap();
//! assert_eq!(Phase::Running, life.phase());
//! life.shutdown();
//! assert!(life.is_shutting_down());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::mem;

use log::{debug, error, trace};
use parking_lot::Mutex;

use crate::error::{log_errors, AnyError};

/// A phase of the application's life.
///
/// The phases only ever go forward, in the order of the variants.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Phase {
    /// Components are being created and register their configuration.
    Initing,
    /// Starting up, the configuration is loaded.
    Starting,
    /// Doing the actual work.
    Running,
    /// Terminating.
    ShuttingDown,
    /// Done.
    Halted,
}

/// When a hook runs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HookPoint {
    /// At the end of [`Initing`][Phase::Initing], before switching to
    /// [`Starting`][Phase::Starting].
    BeforeStarting,
    /// Before switching to [`Running`][Phase::Running].
    BeforeRunning,
    /// After switching to [`ShuttingDown`][Phase::ShuttingDown].
    OnShutdown,
}

struct Hook {
    name: String,
    priority: u8,
    point: HookPoint,
    body: Box<dyn FnOnce() -> Result<(), AnyError> + Send>,
}

/// The phase tracker.
pub struct Life {
    phase: Mutex<Phase>,
    hooks: Mutex<Vec<Hook>>,
}

impl Default for Life {
    fn default() -> Self {
        Self::new()
    }
}

impl Life {
    /// Creates the tracker in the [`Initing`][Phase::Initing] phase.
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Initing),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Is the application terminating (or already terminated)?
    pub fn is_shutting_down(&self) -> bool {
        self.phase() >= Phase::ShuttingDown
    }

    /// Registers a hook to run at the given point.
    ///
    /// Hooks of the same point run in ascending `priority`, the ones with equal priority in the
    /// order of registration. Each hook runs at most once.
    pub fn register_hook<N, F>(&self, name: N, priority: u8, point: HookPoint, hook: F)
    where
        N: Into<String>,
        F: FnOnce() -> Result<(), AnyError> + Send + 'static,
    {
        let name = name.into();
        trace!("Registering {:?} hook {} with priority {}", point, name, priority);
        self.hooks.lock().push(Hook {
            name,
            priority,
            point,
            body: Box::new(hook),
        });
    }

    /// Starts the application.
    ///
    /// Runs the [`BeforeStarting`][HookPoint::BeforeStarting] hooks, switches to
    /// [`Starting`][Phase::Starting], runs the [`BeforeRunning`][HookPoint::BeforeRunning] hooks
    /// and switches to [`Running`][Phase::Running]. The first failing hook aborts the start and
    /// its error is returned.
    ///
    /// # Panics
    ///
    /// If not in the [`Initing`][Phase::Initing] phase.
    pub fn start(&self) -> Result<(), AnyError> {
        let phase = self.phase();
        assert!(
            phase == Phase::Initing,
            "Can start only from the Initing phase, not {:?}",
            phase
        );
        self.run_hooks(HookPoint::BeforeStarting)?;
        self.switch(Phase::Starting);
        self.run_hooks(HookPoint::BeforeRunning)?;
        self.switch(Phase::Running);
        Ok(())
    }

    /// Shuts the application down.
    ///
    /// Switches to [`ShuttingDown`][Phase::ShuttingDown], runs the
    /// [`OnShutdown`][HookPoint::OnShutdown] hooks (errors are only logged, all of them run) and
    /// switches to [`Halted`][Phase::Halted]. Does nothing if already shutting down.
    pub fn shutdown(&self) {
        {
            let mut phase = self.phase.lock();
            if *phase >= Phase::ShuttingDown {
                return;
            }
            debug!("Switching from {:?} to {:?}", *phase, Phase::ShuttingDown);
            *phase = Phase::ShuttingDown;
        }
        for Hook { name, body, .. } in self.take_hooks(HookPoint::OnShutdown) {
            debug!("Running shutdown hook {}", name);
            if log_errors(module_path!(), body).is_err() {
                error!("Shutdown hook {} failed, continuing with the rest", name);
            }
        }
        self.switch(Phase::Halted);
    }

    fn switch(&self, to: Phase) {
        let mut phase = self.phase.lock();
        debug!("Switching from {:?} to {:?}", *phase, to);
        *phase = to;
    }

    /// Takes the hooks of one point out, sorted by priority.
    fn take_hooks(&self, point: HookPoint) -> Vec<Hook> {
        let mut hooks = self.hooks.lock();
        let (mut taken, kept): (Vec<_>, Vec<_>) = mem::take(&mut *hooks)
            .into_iter()
            .partition(|h| h.point == point);
        *hooks = kept;
        // Stable sort, keeps registration order on ties
        taken.sort_by_key(|h| h.priority);
        taken
    }

    // The lock is not held while running the hooks, they may register more.
    fn run_hooks(&self, point: HookPoint) -> Result<(), AnyError> {
        for hook in self.take_hooks(point) {
            debug!("Running {:?} hook {}", point, hook.name);
            (hook.body)()?;
        }
        Ok(())
    }
}

impl Debug for Life {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_struct("Life")
            .field("phase", &self.phase())
            .field("hooks", &self.hooks.lock().len())
            .finish()
    }
}
