//! The configuration sections and how they are compared.
//!
//! Every component owning a piece of configuration implements [`Section`] for its configuration
//! structure and registers it in the [`Registry`][crate::Registry] under a name. The name is also
//! the name of the top-level table in the configuration file.

use std::any::Any;

use serde::de::DeserializeOwned;
use serde::Serialize;
use toml::value::{Table, Value};

use crate::error::AnyError;

/// A configuration section owned by some component of the application.
///
/// The section is populated from its default (created by the factory passed to
/// [`register`][crate::Registry::register]) and the content of the configuration file. Then, the
/// registry calls [`init`][Section::init] once during the first load and
/// [`apply`][Section::apply] on every reload that actually changed the decoded content.
///
/// Whether the content changed is decided by comparing the serialized forms (see [`Canonical`]).
/// Fields skipped by serde therefore don't take part in the comparison, and they start from their
/// [`Default`] after decoding from a file, not from the factory's value.
///
/// # Examples
///
/// ```rust
/// use cfg_registry::{AnyError, Section};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, Deserialize, Serialize)]
/// struct Http {
///     port: u16,
///     workers: usize,
/// }
///
/// impl Section for Http {
///     fn init(&mut self) -> Result<(), AnyError> {
///         if self.workers == 0 {
///             return Err("Need at least one worker".into());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Section: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Called once, on the first load.
    ///
    /// An error aborts the whole load; the remaining sections are not initialized and nothing is
    /// committed.
    fn init(&mut self) -> Result<(), AnyError> {
        Ok(())
    }

    /// Called on reload, when the content of this section changed.
    ///
    /// There's nothing sensible to fall back to if a new configuration can be applied only
    /// partially, so an error (or a panic) here terminates the application. Problems the section
    /// can live with should be logged and swallowed instead.
    fn apply(&mut self) -> Result<(), AnyError> {
        Ok(())
    }
}

/// A type-erased fresh instance of some section, not yet committed.
pub(crate) trait Candidate: Send {
    fn run_init(&mut self) -> Result<(), AnyError>;
    fn run_apply(&mut self) -> Result<(), AnyError>;
    fn to_value(&self) -> Result<Value, AnyError>;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Section> Candidate for T {
    fn run_init(&mut self) -> Result<(), AnyError> {
        Section::init(self)
    }

    fn run_apply(&mut self) -> Result<(), AnyError> {
        Section::apply(self)
    }

    fn to_value(&self) -> Result<Value, AnyError> {
        Ok(Value::try_from(self)?)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// The canonical form of sections, used to decide if a section changed on reload.
///
/// Two instances are considered equal exactly if their canonical forms are identical strings.
/// There's no semantic comparison on top of that.
pub trait Canonical: Send + Sync {
    /// Encodes the serialized `value` of the section called `name`.
    fn encode(&self, name: &str, value: &Value) -> Result<String, AnyError>;
}

/// The default [`Canonical`] encoding.
///
/// The section is encoded as TOML text, inside a table of its name (as if it was in the config
/// file). The keys of TOML tables are sorted, so the order of fields doesn't matter.
#[derive(Copy, Clone, Debug, Default)]
pub struct TomlCanonical;

impl Canonical for TomlCanonical {
    fn encode(&self, name: &str, value: &Value) -> Result<String, AnyError> {
        Ok(toml::to_string(&named(name, value.clone()))?)
    }
}

/// Wraps the value into a single-entry table, the way it is found in the file.
pub(crate) fn named(name: &str, value: Value) -> Value {
    let mut table = Table::new();
    table.insert(name.to_owned(), value);
    Value::Table(table)
}

/// Recursively puts the `top` value over the `base`.
///
/// Tables are merged key by key, anything else is replaced.
pub(crate) fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Table(base), Value::Table(top)) => {
            for (key, value) in top {
                match base.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, top) => *base = top,
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Clone, Debug, Default, Deserialize, Serialize)]
    struct Inner {
        a: i32,
        b: i32,
    }

    #[derive(Clone, Debug, Default, Deserialize, Serialize)]
    struct Outer {
        inner: Inner,
        z: i32,
    }

    impl Section for Outer {}

    fn parse(s: &str) -> Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn overlay_keeps_unmentioned() {
        let mut base = parse("x = 1\ny = 2\n[t]\na = 1\nb = 2\n");
        overlay(&mut base, parse("y = 3\n[t]\nb = 4\n"));
        assert_eq!(parse("x = 1\ny = 3\n[t]\na = 1\nb = 4\n"), base);
    }

    #[test]
    fn overlay_replaces_arrays_and_scalars() {
        let mut base = parse("arr = [1, 2, 3]\n[t]\na = 1\n");
        overlay(&mut base, parse("arr = [4]\nt = 5\n"));
        assert_eq!(parse("arr = [4]\nt = 5\n"), base);
    }

    #[test]
    fn canonical_independent_of_formatting() {
        let first = TomlCanonical
            .encode("foo", &parse("b = 2\na = 1\n"))
            .unwrap();
        let second = TomlCanonical
            .encode("foo", &parse("a   =   1\n# comment\nb = 2"))
            .unwrap();
        assert_eq!(first, second);
        let third = TomlCanonical.encode("foo", &parse("a = 1\nb = 3\n")).unwrap();
        assert_ne!(first, third);
    }

    /// A scalar after a nested table can't be written by the plain serializer, going through the
    /// value works.
    #[test]
    fn canonical_out_of_order() {
        let outer = Outer::default();
        let value = outer.to_value().unwrap();
        TomlCanonical.encode("outer", &value).unwrap();
    }

    #[test]
    fn candidate_downcasts_back() {
        let candidate: Box<dyn Candidate> = Box::new(Outer {
            z: 42,
            ..Outer::default()
        });
        let outer = candidate.into_any().downcast::<Outer>().unwrap();
        assert_eq!(42, outer.z);
    }
}
