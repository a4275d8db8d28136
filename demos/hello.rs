//! A greeting server that can be reconfigured at runtime.
//!
//! Run it, edit the config file (`--config` or `hello.conf` in the XDG config directories) and
//! send it `SIGUSR1` to see the new greeting.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cfg_registry::{daemon, AnyError, Life, Opts, Registry, Section};
use log::info;
use serde::{Deserialize, Serialize};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct AppOpts {
    #[structopt(flatten)]
    config: Opts,

    /// How many greetings to print before exiting.
    #[structopt(short = "n", long = "count", default_value = "60")]
    count: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct Greeting {
    message: String,
    name: String,
}

impl Section for Greeting {
    fn init(&mut self) -> Result<(), AnyError> {
        if self.name.is_empty() {
            return Err("Nobody to greet".into());
        }
        Ok(())
    }

    fn apply(&mut self) -> Result<(), AnyError> {
        info!("Now greeting {}", self.name);
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct Pace {
    interval_ms: u64,
}

impl Section for Pace {}

fn main() -> Result<(), AnyError> {
    let opts = AppOpts::from_args();
    let life = Arc::new(Life::new());
    let mut registry = Registry::new("hello", Arc::clone(&life));
    let greeting = registry.register("greeting", || Greeting {
        message: "Hello".to_owned(),
        name: "world".to_owned(),
    });
    let pace = registry.register("pace", || Pace { interval_ms: 1000 });
    let registry = Arc::new(registry);
    daemon::install(&registry, opts.config);
    life.start()?;

    for _ in 0..opts.count {
        let greeting = greeting.get().expect("Loaded on start");
        println!("{}, {}!", greeting.message, greeting.name);
        let pace = pace.get().expect("Loaded on start");
        thread::sleep(Duration::from_millis(pace.interval_ms));
    }
    life.shutdown();
    Ok(())
}
