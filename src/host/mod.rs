//! Operating-system collaborators the updater drives.
//!
//! Everything that shells out to a platform utility sits behind [`Host`] so the
//! update flow can run against a fake in tests.

mod macos;

pub use macos::{parse_hid_idle_seconds, SystemHost};

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

pub trait Host {
    /// Expand a flat installer package into `dest` (which must not exist yet)
    fn expand_package(&self, package: &Path, dest: &Path) -> Result<()>;

    /// Read `key` from the bundle's metadata store; `Ok(None)` if it is not there
    fn read_bundle_value(&self, bundle: &Path, key: &str) -> Result<Option<String>>;

    /// Seconds since the last user input event
    fn idle_seconds(&self) -> Result<u64>;

    fn is_running(&self, app_name: &str) -> bool;

    /// Ask the application to quit cleanly
    fn quit(&self, app_name: &str) -> Result<()>;

    /// Run the platform installer with elevated privilege
    fn install_package(&self, package: &Path, target: &Path) -> Result<()>;

    /// UID of the user owning the interactive console
    fn console_uid(&self) -> Result<u32>;

    /// Open the application inside the given user's session
    fn launch_as(&self, uid: u32, app: &Path) -> Result<()>;

    fn sleep(&self, duration: Duration);
}
