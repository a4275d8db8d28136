//! Printing of the default configuration.
//!
//! The output is a valid config file with everything commented out, suitable as a starting
//! point for writing a real one.

use err_context::prelude::*;

use crate::error::AnyError;
use crate::registry::Registry;
use crate::section::named;

fn comment_out(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                "\n".to_owned()
            } else {
                format!("# {}\n", line)
            }
        })
        .collect()
}

impl Registry {
    /// Renders the defaults of all the registered options.
    ///
    /// The options are created by their factories (test overrides are not used), in the order of
    /// registration. Every non-empty line is commented out.
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use cfg_registry::{Life, Registry, Section};
    /// # use serde::{Deserialize, Serialize};
    /// #[derive(Deserialize, Serialize)]
    /// struct Greeting {
    ///     message: String,
    /// }
    ///
    /// impl Section for Greeting {}
    ///
    /// let mut registry = Registry::new("hello", Arc::new(Life::new()));
    /// registry.register("greeting", || Greeting { message: "Hi".to_owned() });
    /// assert_eq!(
    ///     "# default options for hello\n\n# [greeting]\n# message = \"Hi\"\n",
    ///     registry.dump_defaults().unwrap(),
    /// );
    /// ```
    pub fn dump_defaults(&self) -> Result<String, AnyError> {
        let mut sections = Vec::with_capacity(self.descriptors.len());
        for desc in &self.descriptors {
            let value = desc.slot.create().to_value()?;
            let section = toml::to_string(&named(&desc.name, value)).with_context(|_| {
                format!("Failed to serialize default of option '{}'", desc.name)
            })?;
            sections.push(section);
        }
        let mut out = format!("# default options for {}\n\n", self.app_name);
        out.push_str(&comment_out(&sections.join("\n")));
        Ok(out)
    }
}
