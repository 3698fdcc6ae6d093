//! Command implementations
//!
//! Each module backs one subcommand of the CLI; the interactive menu drives
//! the same functions.

pub mod batch;
pub mod config;
pub mod download;
pub mod interactive;
pub mod login;

use crate::auth::AuthManager;
use crate::config::Config;

// Re-export commonly used entry points
pub use batch::run as batch_run;
pub use config::run as config_run;
pub use download::{run as download_run, select_options};
pub use interactive::run as interactive_run;
pub use login::{import_cookies, logout, run as login_run};

/// Restore a saved session into `auth`, trying `INSTAGRAM_PASSWORD` as the
/// key first. Returns whether requests will be authenticated.
pub(crate) fn restore_session(auth: &mut AuthManager) -> bool {
    let (_, password) = Config::credentials();
    let restored = auth.load_session(password.as_deref());
    if let (true, Some(user)) = (restored, auth.username()) {
        println!("🔓 Using saved session of @{}", user);
    }
    restored
}
