//! Wiring of the registry into the application's life.
//!
//! The [`install`] function makes the configuration load right before the application starts and
//! reload whenever the process receives `SIGUSR1`. The command line fragment [`Opts`] carries the
//! user's wishes about the config file.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cfg_registry::{daemon, Life, Opts, Registry, Section};
//! use serde::{Deserialize, Serialize};
//! use structopt::StructOpt;
//!
//! #[derive(Debug, StructOpt)]
//! struct AppOpts {
//!     #[structopt(flatten)]
//!     config: Opts,
//! }
//!
//! #[derive(Debug, Deserialize, Serialize)]
//! struct Greeting {
//!     message: String,
//! }
//!
//! impl Section for Greeting {}
//!
//! fn main() {
//!     let opts = AppOpts::from_args();
//!     let life = Arc::new(Life::new());
//!     let mut registry = Registry::new("hello", Arc::clone(&life));
//!     let greeting = registry.register("greeting", || Greeting {
//!         message: "Hello".to_owned(),
//!     });
//!     let registry = Arc::new(registry);
//!     daemon::install(&registry, opts.config);
//!     life.start().unwrap();
//!     println!("{}", greeting.get().unwrap().message);
//!     life.shutdown();
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use err_context::prelude::*;
use log::{debug, info};
use signal_hook::iterator::Signals;
use structopt::StructOpt;

use crate::error::AnyError;
use crate::lifecycle::HookPoint;
use crate::registry::Registry;

/// Priority of the hook loading the configuration.
pub const LOAD_PRIORITY: u8 = 10;

/// A command line fragment for the configuration.
///
/// Meant to be flattened into the application's options:
///
/// ```rust
/// use cfg_registry::Opts;
/// use structopt::StructOpt;
///
/// #[derive(Debug, StructOpt)]
/// struct AppOpts {
///     #[structopt(flatten)]
///     config: Opts,
///
///     #[structopt(short = "v", long = "verbose")]
///     verbose: bool,
/// }
///
/// # fn main() {
/// let opts = AppOpts::from_iter(&["app", "--dump-default-options"]);
/// assert!(opts.config.dump_default_options);
/// # }
/// ```
#[derive(Clone, Debug, Default, StructOpt)]
pub struct Opts {
    /// Configuration file to use.
    #[structopt(
        short = "c",
        long = "config",
        parse(from_os_str = crate::utils::absolute_from_os_str)
    )]
    pub config: Option<PathBuf>,

    /// Print the default configuration and exit.
    #[structopt(long = "dump-default-options")]
    pub dump_default_options: bool,
}

/// Binds the registry to its [`Life`][crate::Life].
///
/// Registers a [`BeforeStarting`][HookPoint::BeforeStarting] hook with [`LOAD_PRIORITY`] that:
///
/// * In the [test mode][Registry::test_mode], [initializes the defaults][Registry::init_defaults]
///   and nothing else.
/// * If asked to dump the defaults, prints them to the standard output and exits the process
///   (through the exit callback, with code 0). Nothing is loaded.
/// * Otherwise, starts a background thread reloading the configuration on every `SIGUSR1` and
///   [loads][Registry::load] the configuration from the file in `opts`. The load error fails the
///   start.
///
/// The reload thread ends when the application shuts down.
pub fn install(registry: &Arc<Registry>, opts: Opts) {
    let registry_hook = Arc::clone(registry);
    registry.life.register_hook(
        "config",
        LOAD_PRIORITY,
        HookPoint::BeforeStarting,
        move || start(&registry_hook, &opts),
    );
}

fn start(registry: &Arc<Registry>, opts: &Opts) -> Result<(), AnyError> {
    if registry.test_mode {
        debug!("Test mode, starting with default options");
        return registry.init_defaults();
    }
    if opts.dump_default_options {
        let dump = registry
            .dump_defaults()
            .context("Failed to dump the default options")?;
        print!("{}", dump);
        (registry.exit)(0);
        return Ok(());
    }
    spawn_reloader(registry)?;
    registry.load(opts.config.as_deref())
}

fn spawn_reloader(registry: &Arc<Registry>) -> Result<(), AnyError> {
    let mut signals =
        Signals::new(&[libc::SIGUSR1]).context("Failed to register the SIGUSR1 handler")?;
    let handle = signals.handle();
    registry.life.register_hook(
        "config-reload-stop",
        LOAD_PRIORITY,
        HookPoint::OnShutdown,
        move || {
            handle.close();
            Ok(())
        },
    );
    let registry = Arc::clone(registry);
    thread::Builder::new()
        .name("cfg-reload".to_owned())
        .spawn(move || {
            debug!("Starting the reload thread");
            for signal in signals.forever() {
                info!("Received signal {}, reloading configuration", signal);
                registry.reload();
            }
            debug!("Terminating the reload thread");
        })
        .context("Failed to start the reload thread")?;
    Ok(())
}
