use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use err_context::prelude::*;
use log::{debug, trace};
use parking_lot::Mutex;
use toml::Value;

use crate::error::{AnyError, OverrideTypeMismatch, UnusedOverride};
use crate::lifecycle::{Life, Phase};
use crate::section::{overlay, Candidate, Canonical, Section, TomlCanonical};
use crate::utils;

/// The exit code used when applying a reloaded configuration fails.
pub const APPLY_FAULT_EXIT_CODE: i32 = 20;

/// Where the loading is.
///
/// Only one attempt to load is allowed, so `Failed` is final too.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Stage {
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

/// The typed part of a registered option, hidden behind [`Slot`].
struct TypedSlot<T, F> {
    factory: F,
    live: Arc<ArcSwapOption<T>>,
}

/// What the registry needs to do with an option without knowing its type.
pub(crate) trait Slot: Send + Sync {
    fn create(&self) -> Box<dyn Candidate>;
    fn adopt(&self, name: &str, instance: Box<dyn Any + Send>)
        -> Result<Box<dyn Candidate>, AnyError>;
    fn decode(
        &self,
        name: &str,
        candidate: &mut Box<dyn Candidate>,
        raw: Value,
        ignored: &mut Vec<String>,
    ) -> Result<(), AnyError>;
    fn live_value(&self) -> Result<Option<Value>, AnyError>;
    fn commit(&self, candidate: Box<dyn Candidate>);
}

impl<T, F> Slot for TypedSlot<T, F>
where
    T: Section,
    F: Fn() -> T + Send + Sync,
{
    fn create(&self) -> Box<dyn Candidate> {
        Box::new((self.factory)())
    }

    fn adopt(
        &self,
        name: &str,
        instance: Box<dyn Any + Send>,
    ) -> Result<Box<dyn Candidate>, AnyError> {
        match instance.downcast::<T>() {
            Ok(instance) => Ok(instance as Box<dyn Candidate>),
            Err(_) => Err(OverrideTypeMismatch(name.to_owned()).into()),
        }
    }

    fn decode(
        &self,
        name: &str,
        candidate: &mut Box<dyn Candidate>,
        raw: Value,
        ignored: &mut Vec<String>,
    ) -> Result<(), AnyError> {
        // Decoding onto the existing instance: start from what it serializes to and put the
        // file's content over that.
        let mut merged = candidate.to_value()?;
        overlay(&mut merged, raw);
        let mut unused = |path: serde_ignored::Path<'_>| {
            ignored.push(format!("{}.{}", name, path));
        };
        let decoded: T =
            serde_path_to_error::deserialize(serde_ignored::Deserializer::new(merged, &mut unused))
                .with_context(|_| format!("Failed to decode option '{}'", name))?;
        *candidate = Box::new(decoded);
        Ok(())
    }

    fn live_value(&self) -> Result<Option<Value>, AnyError> {
        match self.live.load_full() {
            Some(live) => Ok(Some(Value::try_from(&*live)?)),
            None => Ok(None),
        }
    }

    fn commit(&self, candidate: Box<dyn Candidate>) {
        let typed = candidate
            .into_any()
            .downcast::<T>()
            .expect("Candidate created by a different slot");
        self.live.store(Some(Arc::from(typed)));
    }
}

pub(crate) struct Descriptor {
    pub(crate) name: String,
    pub(crate) slot: Box<dyn Slot>,
}

/// Typed access to the live instance of one registered option.
///
/// Returned by [`Registry::register`]. It can be cloned and sent to other threads freely. The
/// instance is replaced as a whole on reload, so a snapshot obtained by [`get`][Handle::get] stays
/// consistent for as long as it is held.
pub struct Handle<T> {
    name: Arc<str>,
    live: Arc<ArcSwapOption<T>>,
}

impl<T> Handle<T> {
    /// The name the option is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The currently live instance.
    ///
    /// This is `None` until the configuration is successfully loaded.
    pub fn get(&self) -> Option<Arc<T>> {
        self.live.load_full()
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            live: Arc::clone(&self.live),
        }
    }
}

impl<T> Debug for Handle<T> {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_struct("Handle").field("name", &self.name).finish()
    }
}

/// The registry of configuration options.
///
/// Components register their [`Section`]s while the application is in the
/// [`Initing`][Phase::Initing] phase. Then the registry gets frozen by putting it into an [`Arc`]
/// and the configuration is [loaded][Registry::load] once and [reloaded][Registry::reload]
/// whenever asked to (usually by a signal, see [`daemon`][crate::daemon]).
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use cfg_registry::{Life, Registry, Section};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Deserialize, Serialize)]
/// struct Greeting {
///     message: String,
/// }
///
/// impl Section for Greeting {}
///
/// let life = Arc::new(Life::new());
/// let mut registry = Registry::new("hello", Arc::clone(&life));
/// let greeting = registry.register("greeting", || Greeting {
///     message: "Hello".to_owned(),
/// });
/// let registry = Arc::new(registry);
/// registry.init_defaults().unwrap();
/// assert_eq!("Hello", greeting.get().unwrap().message);
/// ```
pub struct Registry {
    pub(crate) app_name: String,
    pub(crate) life: Arc<Life>,
    pub(crate) descriptors: Vec<Descriptor>,
    pub(crate) overrides: Mutex<HashMap<String, Box<dyn Any + Send>>>,
    pub(crate) test_mode: bool,
    pub(crate) path: Mutex<Option<PathBuf>>,
    pub(crate) resolver: Box<dyn Fn(&str) -> Option<PathBuf> + Send + Sync>,
    pub(crate) stage: Mutex<Stage>,
    pub(crate) reload_lock: Mutex<()>,
    pub(crate) canonical: Box<dyn Canonical>,
    pub(crate) reporter: Box<dyn Fn(&AnyError) + Send + Sync>,
    pub(crate) exit: Box<dyn Fn(i32) + Send + Sync>,
}

impl Registry {
    /// Creates an empty registry.
    ///
    /// The `app_name` is used to look up the default configuration file (`<app_name>.conf`) and
    /// in the header of the [dumped defaults][Registry::dump_defaults].
    pub fn new<N: Into<String>>(app_name: N, life: Arc<Life>) -> Self {
        Self {
            app_name: app_name.into(),
            life,
            descriptors: Vec::new(),
            overrides: Mutex::new(HashMap::new()),
            test_mode: false,
            path: Mutex::new(None),
            resolver: Box::new(utils::resolve_config_file),
            stage: Mutex::new(Stage::NotLoaded),
            reload_lock: Mutex::new(()),
            canonical: Box::new(TomlCanonical),
            reporter: Box::new(|e: &AnyError| {
                crate::log_error!(multi Error, *e);
            }),
            exit: Box::new(|code| {
                process::exit(code);
            }),
        }
    }

    /// Registers an option.
    ///
    /// The `factory` creates the default value of the option. It may be called many times (on
    /// every load, reload or dump) and it has to create a new, independent instance each time.
    ///
    /// # Panics
    ///
    /// Registering is a programming-time contract, so violating it panics:
    ///
    /// * The name must be non-empty and consist only of `A-Za-z0-9_-` (a bare TOML key).
    /// * The name must not be registered yet.
    /// * The application must still be in the [`Initing`][Phase::Initing] phase.
    pub fn register<T, F>(&mut self, name: &str, factory: F) -> Handle<T>
    where
        T: Section,
        F: Fn() -> T + Send + Sync + 'static,
    {
        // Other characters are possible with quoted keys, but that's just confusing.
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            panic!("Bad option name '{}'", name);
        }
        if self.life.phase() != Phase::Initing {
            panic!(
                "Must register '{}' option during the Initing phase, not {:?}",
                name,
                self.life.phase()
            );
        }
        if self.descriptors.iter().any(|d| d.name == name) {
            panic!("Option '{}' already registered", name);
        }
        trace!("Registering option '{}'", name);
        let live = Arc::new(ArcSwapOption::empty());
        self.descriptors.push(Descriptor {
            name: name.to_owned(),
            slot: Box::new(TypedSlot {
                factory,
                live: Arc::clone(&live),
            }),
        });
        Handle {
            name: Arc::from(name),
            live,
        }
    }

    /// Registers an option with its [`Default`] as the default value.
    ///
    /// See [`register`][Registry::register].
    pub fn register_default<T: Section + Default>(&mut self, name: &str) -> Handle<T> {
        self.register(name, T::default)
    }

    /// Names of the registered options, in the order of registration.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.name.as_str())
    }

    /// The configuration file in use.
    ///
    /// Set after load found a file to load (even if it doesn't exist at the time), `None`
    /// otherwise.
    pub fn active_path(&self) -> Option<PathBuf> {
        self.path.lock().clone()
    }

    /// Enables the test mode.
    ///
    /// The lifecycle adapter doesn't touch the file system or signals in the test mode and
    /// [`set_default_for_test`][Registry::set_default_for_test] is allowed.
    pub fn test_mode(&mut self) -> &mut Self {
        self.test_mode = true;
        self
    }

    /// Sets the configuration file to use when [`load`][Registry::load] gets no path.
    pub fn config_path<P: Into<PathBuf>>(&mut self, path: P) -> &mut Self {
        *self.path.get_mut() = Some(path.into());
        self
    }

    /// Replaces the lookup of the default configuration file.
    ///
    /// The resolver gets the file name (`<app_name>.conf`) and returns the path to use, if any.
    /// The default is [`resolve_config_file`][utils::resolve_config_file].
    pub fn path_resolver<R>(&mut self, resolver: R) -> &mut Self
    where
        R: Fn(&str) -> Option<PathBuf> + Send + Sync + 'static,
    {
        self.resolver = Box::new(resolver);
        self
    }

    /// Replaces the encoding used to decide if an option changed on reload.
    pub fn canonical_encoding<C: Canonical + 'static>(&mut self, canonical: C) -> &mut Self {
        self.canonical = Box::new(canonical);
        self
    }

    /// Replaces the reporting of fatal reload faults.
    ///
    /// By default, the fault is logged with all its causes on the error level.
    pub fn on_fault<R>(&mut self, reporter: R) -> &mut Self
    where
        R: Fn(&AnyError) + Send + Sync + 'static,
    {
        self.reporter = Box::new(reporter);
        self
    }

    /// Replaces the termination of the process.
    ///
    /// The registry terminates the process after reporting a reload fault and after dumping the
    /// defaults. By default this is [`process::exit`]. If the replacement returns, the registry
    /// carries on as if the operation was aborted.
    pub fn on_exit<E>(&mut self, exit: E) -> &mut Self
    where
        E: Fn(i32) + Send + Sync + 'static,
    {
        self.exit = Box::new(exit);
        self
    }

    /// Overrides the default value of an option for a test.
    ///
    /// The instance is used instead of calling the factory the next time the defaults are
    /// created (usually the load), then it is forgotten. An override left unused by then is an
    /// error of that load, as it is most likely a misspelled name.
    ///
    /// # Panics
    ///
    /// If the registry is not in the [test mode][Registry::test_mode] or if the same name is
    /// already overridden.
    pub fn set_default_for_test<T: Section>(&mut self, name: &str, instance: T) {
        if !self.test_mode {
            panic!("set_default_for_test can be used only in the test mode");
        }
        let overrides = self.overrides.get_mut();
        if overrides.contains_key(name) {
            panic!("Default of option '{}' already overridden", name);
        }
        overrides.insert(name.to_owned(), Box::new(instance));
    }

    /// Creates a fresh set of default options, one per registered option, in registration order.
    pub(crate) fn resolve_defaults(&self) -> Result<Vec<Box<dyn Candidate>>, AnyError> {
        let mut overrides = self.overrides.lock();
        let mut candidates = Vec::with_capacity(self.descriptors.len());
        for desc in &self.descriptors {
            let candidate = match overrides.remove(&desc.name) {
                Some(instance) => {
                    debug!("Using overridden default of option '{}'", desc.name);
                    desc.slot.adopt(&desc.name, instance)?
                }
                None => desc.slot.create(),
            };
            candidates.push(candidate);
        }
        if let Some(name) = overrides.keys().next() {
            return Err(UnusedOverride(name.clone()).into());
        }
        Ok(candidates)
    }

    /// Stores the candidates as the live options.
    pub(crate) fn commit(&self, candidates: Vec<Box<dyn Candidate>>) {
        debug_assert_eq!(self.descriptors.len(), candidates.len());
        for (desc, candidate) in self.descriptors.iter().zip(candidates) {
            desc.slot.commit(candidate);
        }
    }
}

impl Debug for Registry {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_struct("Registry")
            .field("app_name", &self.app_name)
            .field("options", &self.names().collect::<Vec<_>>())
            .field("stage", &*self.stage.lock())
            .field("test_mode", &self.test_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    struct Simple {
        name: String,
    }

    impl Section for Simple {}

    fn simple(name: &'static str) -> impl Fn() -> Simple + Send + Sync + 'static {
        move || Simple {
            name: name.to_owned(),
        }
    }

    fn registry() -> Registry {
        Registry::new("test", Arc::new(Life::new()))
    }

    #[test]
    #[should_panic(expected = "Option 'foo' already registered")]
    fn dup_name() {
        let mut registry = registry();
        registry.register("foo", simple("a"));
        registry.register("foo", simple("b"));
    }

    #[test]
    fn bad_names() {
        for name in &["", "a/b", "a.b", "a b", "ěšč"] {
            let result = std::panic::catch_unwind(|| {
                registry().register(name, simple("x"));
            });
            let payload = result.unwrap_err();
            let msg = payload.downcast_ref::<String>().unwrap();
            assert_eq!(&format!("Bad option name '{}'", name), msg);
        }
    }

    #[test]
    fn good_names() {
        let mut registry = registry();
        for name in &["foo", "FOO-bar_1", "1234", "-", "_"] {
            registry.register(name, simple("x"));
        }
        assert_eq!(
            vec!["foo", "FOO-bar_1", "1234", "-", "_"],
            registry.names().collect::<Vec<_>>()
        );
    }

    #[test]
    #[should_panic(expected = "Must register 'foo' option during the Initing phase")]
    fn register_after_start() {
        let life = Arc::new(Life::new());
        let mut registry = Registry::new("test", Arc::clone(&life));
        life.start().unwrap();
        registry.register("foo", simple("x"));
    }

    #[test]
    fn factory_called_per_resolution() {
        let mut registry = registry();
        registry.register("foo", simple("bar"));
        let first = registry.resolve_defaults().unwrap();
        let second = registry.resolve_defaults().unwrap();
        let first = first.into_iter().next().unwrap().into_any();
        let second = second.into_iter().next().unwrap().into_any();
        let first = first.downcast::<Simple>().unwrap();
        let second = second.downcast::<Simple>().unwrap();
        assert_eq!(first, second);
        assert!(!std::ptr::eq(&*first, &*second));
    }

    #[test]
    fn override_consumed_once() {
        let mut registry = registry();
        registry.test_mode();
        registry.register("foo", simple("bar"));
        registry.set_default_for_test(
            "foo",
            Simple {
                name: "override".to_owned(),
            },
        );
        // Can be overridden again only after the first one is used up
        let first = registry.resolve_defaults().unwrap().remove(0);
        let first = first.into_any().downcast::<Simple>().unwrap();
        assert_eq!("override", first.name);
        let second = registry.resolve_defaults().unwrap().remove(0);
        let second = second.into_any().downcast::<Simple>().unwrap();
        assert_eq!("bar", second.name);
    }

    #[test]
    fn unused_override() {
        let mut registry = registry();
        registry.test_mode();
        registry.register("op1", simple("bar"));
        registry.set_default_for_test("wrongName", Simple { name: "x".to_owned() });
        let err = registry.resolve_defaults().err().unwrap();
        assert_eq!(
            &UnusedOverride("wrongName".to_owned()),
            err.downcast_ref::<UnusedOverride>().unwrap()
        );
    }

    #[test]
    fn override_wrong_type() {
        #[derive(Debug, Deserialize, Serialize)]
        struct Other {
            count: usize,
        }
        impl Section for Other {}

        let mut registry = registry();
        registry.test_mode();
        registry.register("foo", simple("bar"));
        registry.set_default_for_test("foo", Other { count: 1 });
        let err = registry.resolve_defaults().err().unwrap();
        assert!(err.downcast_ref::<OverrideTypeMismatch>().is_some());
    }

    #[test]
    #[should_panic(expected = "set_default_for_test can be used only in the test mode")]
    fn override_outside_test_mode() {
        let mut registry = registry();
        registry.set_default_for_test("foo", Simple { name: "x".to_owned() });
    }

    #[test]
    #[should_panic(expected = "Default of option 'foo' already overridden")]
    fn override_twice() {
        let mut registry = registry();
        registry.test_mode();
        registry.set_default_for_test("foo", Simple { name: "x".to_owned() });
        registry.set_default_for_test("foo", Simple { name: "y".to_owned() });
    }

    #[test]
    fn handle_before_load() {
        let mut registry = registry();
        let handle = registry.register("foo", simple("bar"));
        assert_eq!("foo", handle.name());
        assert!(handle.get().is_none());
        assert!(handle.clone().get().is_none());
    }
}
