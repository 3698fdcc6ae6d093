//! Login, cookie import and logout.

use std::path::Path;

use tracing::info;

use crate::auth::AuthManager;
use crate::config::Config;
use crate::error::Result;
use crate::session::SessionLock;

/// Password login. Missing credentials come from the environment, then from
/// prompts.
pub async fn run(config: &Config, username: Option<&str>) -> Result<String> {
    let _lock = SessionLock::acquire(&config.session_dir)?;
    let mut auth = AuthManager::from_config(config)?;
    login_with(&mut auth, username).await
}

pub(crate) async fn login_with(auth: &mut AuthManager, username: Option<&str>) -> Result<String> {
    let (env_user, env_password) = Config::credentials();
    let username = username.map(str::to_string).or(env_user);
    auth.login(username.as_deref(), env_password.as_deref()).await
}

/// Log in with a cookie export from a browser session.
pub fn import_cookies<P: AsRef<Path>>(
    config: &Config,
    cookies_file: P,
    username: Option<&str>,
) -> Result<String> {
    let _lock = SessionLock::acquire(&config.session_dir)?;
    let mut auth = AuthManager::from_config(config)?;
    auth.login_with_cookies(cookies_file, username)
}

pub fn logout(config: &Config) -> Result<()> {
    let _lock = SessionLock::acquire(&config.session_dir)?;
    let mut auth = AuthManager::from_config(config)?;
    super::restore_session(&mut auth);
    auth.logout()?;
    println!("👋 Logged out, saved session removed");
    info!("Logout completed");
    Ok(())
}
