//! Decoding of the configuration file into the registered options.
//!
//! The file is a TOML document with one top-level table per registered option. Each table is
//! decoded *onto* the default of its option, so the file needs to mention only the fields that
//! differ from the defaults:
//!
//! ```toml
//! [http]
//! port = 8080
//!
//! [greeting]
//! message = "Hello"
//! ```
//!
//! A missing file is not an error, all options simply keep their defaults. Unknown tables and
//! unknown fields inside known tables are only warned about, as they are most likely typos.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use err_context::prelude::*;
use log::{debug, info, trace, warn};
use toml::value::Table;

use crate::error::AnyError;
use crate::registry::Registry;
use crate::section::Candidate;

/// Reads the file into the raw top-level table.
///
/// Returns `None` if the file doesn't exist.
fn read_table(path: &Path) -> Result<Option<Table>, AnyError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e
                .context(format!("Failed to read config file {}", path.display()))
                .into())
        }
    };
    // The syntax error goes out as it is, it already says where the problem is
    let table = toml::from_str(&content)?;
    Ok(Some(table))
}

impl Registry {
    /// Creates the defaults and decodes the content of the file at `path` onto them.
    pub(crate) fn decode_file(&self, path: &Path) -> Result<Vec<Box<dyn Candidate>>, AnyError> {
        let mut candidates = self.resolve_defaults()?;
        let mut table = match read_table(path)? {
            Some(table) => table,
            None => {
                info!(
                    "Config file {} doesn't exist, using defaults",
                    path.display()
                );
                return Ok(candidates);
            }
        };
        debug!("Decoding config file {}", path.display());

        let mut unknown = Vec::new();
        for (desc, candidate) in self.descriptors.iter().zip(candidates.iter_mut()) {
            if let Some(raw) = table.remove(&desc.name) {
                trace!("Decoding option '{}'", desc.name);
                desc.slot
                    .decode(&desc.name, candidate, raw, &mut unknown)
                    .with_context(|_| format!("Bad config file {}", path.display()))?;
            }
        }
        // Whatever is left in the table is not ours
        unknown.extend(table.into_iter().map(|(key, _)| key));
        if !unknown.is_empty() {
            unknown.sort();
            warn!(
                "Unknown keys in config file {} ignored, possibly misspelled: {}",
                path.display(),
                unknown.join(", ")
            );
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    use super::*;
    use crate::lifecycle::Life;
    use crate::section::Section;

    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct Nested {
        level: u8,
        tags: Vec<String>,
    }

    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct Opt {
        name: String,
        count: i64,
        nested: Nested,
    }

    impl Section for Opt {}

    fn default_opt() -> Opt {
        Opt {
            name: "bar".to_owned(),
            count: 3,
            nested: Nested {
                level: 1,
                tags: vec!["a".to_owned()],
            },
        }
    }

    fn setup(content: Option<&str>) -> (TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        if let Some(content) = content {
            fs::write(dir.path().join("app.conf"), content).unwrap();
        }
        let mut registry = Registry::new("test", Arc::new(Life::new()));
        registry.register("foo", default_opt);
        (dir, registry)
    }

    fn decode(content: Option<&str>) -> Result<Opt, AnyError> {
        let (dir, registry) = setup(content);
        let candidate = registry
            .decode_file(&dir.path().join("app.conf"))?
            .remove(0);
        Ok(*candidate.into_any().downcast::<Opt>().unwrap())
    }

    #[test]
    fn missing_file() {
        assert_eq!(default_opt(), decode(None).unwrap());
    }

    #[test]
    fn empty_file() {
        assert_eq!(default_opt(), decode(Some("")).unwrap());
    }

    #[test]
    fn partial_value() {
        let opt = decode(Some("[foo]\nName = \"foobar\"\n")).unwrap();
        assert_eq!("foobar", opt.name);
        assert_eq!(3, opt.count);
        assert_eq!(default_opt().nested, opt.nested);
    }

    #[test]
    fn partial_nested() {
        let opt = decode(Some("[foo.Nested]\nLevel = 5\n")).unwrap();
        assert_eq!(5, opt.nested.level);
        assert_eq!(vec!["a".to_owned()], opt.nested.tags);
        assert_eq!("bar", opt.name);
    }

    #[test]
    fn unknown_keys_ignored() {
        let opt = decode(Some("[foo]\nCount = 4\nTypo = 1\n\n[other]\nx = 1\n")).unwrap();
        assert_eq!(4, opt.count);
    }

    #[test]
    fn malformed() {
        decode(Some("[ab"))
            .unwrap_err()
            .downcast_ref::<toml::de::Error>()
            .expect("Different error returned");
    }

    #[test]
    fn wrong_type() {
        let err = decode(Some("[foo]\nCount = \"many\"\n")).unwrap_err();
        let msg = err.display("; ").to_string();
        assert!(msg.contains("Failed to decode option 'foo'"), "{}", msg);
        assert!(msg.contains("Count"), "{}", msg);
    }

    #[test]
    fn directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new("test", Arc::new(Life::new()));
        registry.register("foo", default_opt);
        assert!(registry.decode_file(dir.path()).is_err());
    }
}
