//! Error handling utilities.
//!
//! Besides the logging helpers, this holds the error types the registry hands out. They are plain
//! structs so callers can tell them apart with `downcast_ref` on the returned [`AnyError`].

use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

use err_context::prelude::*;
use log::{log, Level};

/// A wrapper type for any error.
///
/// This is just a type alias for boxed standard error. Any errors go and this is guaranteed to be
/// fully compatible.
pub use err_context::AnyError;

/// Returned by the second call to [`load`][crate::Registry::load].
///
/// The configuration is loaded exactly once per registry, no matter how the first attempt ended.
/// Callers certain they already loaded may special-case this one.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DoubleLoad;

impl Display for DoubleLoad {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(fmt, "Can not call load() twice")
    }
}

impl Error for DoubleLoad {}

/// A default option was overridden for tests, but no option of that name is registered.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnusedOverride(pub String);

impl Display for UnusedOverride {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(
            fmt,
            "Overridden option {:?} not used, wrong option name?",
            self.0
        )
    }
}

impl Error for UnusedOverride {}

/// The override for a test carries a different type than the option registered under the name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OverrideTypeMismatch(pub String);

impl Display for OverrideTypeMismatch {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(
            fmt,
            "Overridden option {:?} is of a different type than the registered one",
            self.0
        )
    }
}

impl Error for OverrideTypeMismatch {}

/// A panic caught while running user code, with the message it carried.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Panicked(pub String);

impl Panicked {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<Any>".to_owned()
        };
        Panicked(msg)
    }
}

impl Display for Panicked {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(fmt, "{}", self.0)
    }
}

impl Error for Panicked {}

/// Applying a changed option during reload failed.
///
/// This is never returned to the caller of [`reload`][crate::Registry::reload]; it is handed to
/// the fault reporter right before the process is terminated.
#[derive(Debug)]
pub struct ApplyFault {
    option: String,
    cause: AnyError,
}

impl ApplyFault {
    pub(crate) fn new(option: &str, cause: AnyError) -> Self {
        Self {
            option: option.to_owned(),
            cause,
        }
    }

    /// Name of the option whose apply failed.
    pub fn option(&self) -> &str {
        &self.option
    }
}

impl Display for ApplyFault {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(fmt, "Failed to apply option '{}'", self.option)
    }
}

impl Error for ApplyFault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.cause)
    }
}

/// How to format errors in logs.
///
/// The enum is non-exhaustive, more variants may be added in the future and it won't be
/// considered an API breaking change.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[non_exhaustive]
pub enum ErrorLogFormat {
    /// Multi-cause error will span multiple log messages.
    MultiLine,

    /// The error is formatted on a single line.
    ///
    /// The causes are separated by semicolons.
    SingleLine,
}

/// Log one error on given log level.
///
/// It is printed to the log with all the causes.
///
/// This is the low-level version with full customization. You might also be interested in
/// [`log_errors`] or the convenience macro ([`log_error`][macro@log_error]).
pub fn log_error(level: Level, target: &str, e: &AnyError, format: ErrorLogFormat) {
    match format {
        ErrorLogFormat::MultiLine => {
            for cause in e.chain() {
                log!(target: target, level, "{}", cause);
            }
        }
        ErrorLogFormat::SingleLine => {
            log!(target: target, level, "{}", e.display("; "));
        }
    }
}

/// A convenience macro to log an [`AnyError`].
///
/// This logs an [`AnyError`] on given log level as a single line. Removes some boilerplate from
/// the [`log_error`] function.
///
/// # Examples
///
/// ```rust
/// use std::error::Error;
/// use std::fmt::{Display, Formatter, Result as FmtResult};
/// use cfg_registry::log_error;
///
/// #[derive(Debug)]
/// struct Broken;
///
/// impl Display for Broken {
///     fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
///         write!(fmt, "Something is broken")
///     }
/// }
///
/// impl Error for Broken {}
///
/// log_error!(Warn, Broken.into());
/// ```
///
/// [`log_error`]: fn@crate::error::log_error
#[macro_export]
macro_rules! log_error {
    ($level: ident, $err: expr) => {
        $crate::log_error!(@SingleLine, $level, $err);
    };
    (multi $level: ident, $err: expr) => {
        $crate::log_error!(@MultiLine, $level, $err);
    };
    (@$format: ident, $level: ident, $err: expr) => {
        $crate::error::log_error(
            $crate::macro_support::Level::$level,
            module_path!(),
            &$err,
            $crate::error::ErrorLogFormat::$format,
        );
    };
}

/// A wrapper around a fallible function, logging any returned errors.
///
/// The errors will be logged in the provided target. You may want to provide `module_path!` as the
/// target.
///
/// If the error has multiple levels (causes), they are printed in multi-line fashion, as multiple
/// separate log messages.
///
/// # Examples
///
/// ```rust
/// use err_context::prelude::*;
/// use cfg_registry::AnyError;
/// use cfg_registry::error;
/// # fn try_to_do_stuff() -> Result<(), AnyError> { Ok(()) }
///
/// let result = error::log_errors(module_path!(), || {
///     try_to_do_stuff().context("Didn't manage to do stuff")?;
///     Ok(())
/// });
/// # let _result = result;
/// ```
pub fn log_errors<R, F>(target: &str, f: F) -> Result<R, AnyError>
where
    F: FnOnce() -> Result<R, AnyError>,
{
    let result = f();
    if let Err(ref e) = result {
        log_error(Level::Error, target, e, ErrorLogFormat::MultiLine);
    }
    result
}
