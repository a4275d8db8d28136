//! Various utilities.
//!
//! The little things used by the registry that are useful to the user's code too.

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use log::{trace, warn};

/// Tries to read an absolute path from the given OS string.
///
/// This converts the path to PathBuf. Then it tries to make it absolute and canonical, so changing
/// current directory later on doesn't make it invalid.
///
/// The function never fails. However, the substeps (finding current directory to make it absolute
/// and canonization) might fail. In such case, the failing step is skipped.
///
/// The motivation is parsing command line arguments using the [`structopt`] crate. Users are used
/// to passing relative paths to command line (as opposed to configuration files). However, if the
/// daemon changes the current directory, the relative paths now point somewhere else.
///
/// # Examples
///
/// ```rust
/// use std::path::PathBuf;
///
/// use structopt::StructOpt;
///
/// #[derive(Debug, StructOpt)]
/// struct MyOpts {
///     #[structopt(short = "p", parse(from_os_str = cfg_registry::utils::absolute_from_os_str))]
///     path: PathBuf,
/// }
///
/// # fn main() { }
/// ```
pub fn absolute_from_os_str(path: &OsStr) -> PathBuf {
    let mut current = env::current_dir().unwrap_or_else(|e| {
        warn!(
            "Some paths may not be turned to absolute. Couldn't read current dir: {}",
            e,
        );
        PathBuf::new()
    });
    current.push(path);
    if let Ok(canonicized) = current.canonicalize() {
        canonicized
    } else {
        current
    }
}

/// Looks up a configuration file in the XDG config directories.
///
/// The user's config directory (as found by [`dirs::config_dir`]) is tried first, then each
/// directory of `$XDG_CONFIG_DIRS` (`/etc/xdg` if not set). The first existing file wins.
///
/// This is the default path resolver of the [`Registry`][crate::Registry].
pub fn resolve_config_file(file: &str) -> Option<PathBuf> {
    resolve_in(file, dirs::config_dir(), env::var_os("XDG_CONFIG_DIRS"))
}

fn resolve_in(file: &str, user: Option<PathBuf>, system: Option<OsString>) -> Option<PathBuf> {
    let system = system
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| OsString::from("/etc/xdg"));
    user.into_iter()
        .chain(env::split_paths(&system))
        .filter(|dir| dir.is_absolute())
        .map(|dir| dir.join(file))
        .find(|candidate| {
            trace!("Looking for config file at {}", candidate.display());
            candidate.is_file()
        })
}
