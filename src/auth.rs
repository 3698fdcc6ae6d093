//! Login, session reuse and logout.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::crypto::SessionEncryption;
use crate::error::{Error, Result};
use crate::instagram::{load_browser_cookies, InstagramClient, MediaSource};
use crate::session::{SessionData, SessionStore};
use crate::utils::validate_username;

/// Source of interactive answers (username, password, 2FA code).
pub trait Prompter: Send {
    fn ask(&mut self, label: &str, secret: bool) -> io::Result<String>;
}

/// Reads answers from stdin. Secret answers are echoed; the terminal is not
/// switched to no-echo mode.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&mut self, label: &str, _secret: bool) -> io::Result<String> {
        print!("{}", label);
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no input"));
        }
        Ok(input.trim_end_matches(['\r', '\n']).to_string())
    }
}

pub struct AuthManager {
    client: Arc<InstagramClient>,
    store: SessionStore,
    prompter: Box<dyn Prompter>,
    username: Option<String>,
}

impl AuthManager {
    pub fn new(client: Arc<InstagramClient>, store: SessionStore) -> Self {
        Self {
            client,
            store,
            prompter: Box::new(StdinPrompter),
            username: None,
        }
    }

    /// Client and encrypted session store built from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Arc::new(InstagramClient::new(config)?);
        let store = SessionStore::new(&config.session_dir, true)?;
        Ok(Self::new(client, store))
    }

    pub fn with_prompter<P: Prompter + 'static>(mut self, prompter: P) -> Self {
        self.prompter = Box::new(prompter);
        self
    }

    pub fn client(&self) -> Arc<InstagramClient> {
        Arc::clone(&self.client)
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn is_logged_in(&self) -> bool {
        self.username.is_some() && self.client.is_logged_in()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Restore the saved session into the client. Sessions saved after a
    /// password login need that password; cookie imports use the fallback
    /// key.
    pub fn load_session(&mut self, password: Option<&str>) -> bool {
        let keys = match password {
            Some(p) => vec![SessionEncryption::new(Some(p)), SessionEncryption::new(None)],
            None => vec![SessionEncryption::new(None)],
        };

        for key in &keys {
            if let Some((username, data)) = self.store.load(Some(key)) {
                if !data.is_authenticated() {
                    warn!("Saved session for {} has no sessionid", username);
                    return false;
                }
                self.client.set_session(data);
                self.username = Some(username);
                return true;
            }
        }
        false
    }

    /// Log in: reuse the saved session if possible, otherwise ask for
    /// whatever credentials are missing and log in with them. The new
    /// session is saved encrypted with the password.
    pub async fn login(&mut self, username: Option<&str>, password: Option<&str>) -> Result<String> {
        if self.load_session(password) {
            let user = self.username.clone().unwrap_or_default();
            println!("✅ Logged in using the saved session ({})", user);
            info!("Reused saved session for {}", user);
            return Ok(user);
        }

        let username = match username.filter(|u| !u.trim().is_empty()) {
            Some(u) => u.trim().to_string(),
            None => self.prompter.ask("📧 Instagram username: ", false)?.trim().to_string(),
        };
        let password = match password.filter(|p| !p.is_empty()) {
            Some(p) => p.to_string(),
            None => self.prompter.ask("🔒 Instagram password: ", true)?,
        };
        if username.is_empty() || password.is_empty() {
            return Err(Error::BadCredentials(
                "username and password are required".into(),
            ));
        }
        let username = validate_username(&username)?;

        println!("🔐 Logging in to Instagram...");
        let session = match self.client.login(&username, &password).await {
            Ok(session) => session,
            Err(Error::TwoFactorRequired { identifier }) => {
                println!("🔐 Two-factor authentication required");
                let code = self.prompter.ask("Enter the 2FA code: ", false)?;
                self.client
                    .two_factor_login(&username, &identifier, &code)
                    .await
                    .inspect_err(|e| error!("2FA failed: {}", e))?
            }
            Err(e) => {
                error!("Login failed: {}", e);
                return Err(e);
            }
        };

        self.persist(&username, &session, Some(&password));
        println!("✅ Logged in as {}", username);
        Ok(username)
    }

    /// Log in with cookies exported from a browser where the user is already
    /// logged in.
    pub fn login_with_cookies<P: AsRef<Path>>(
        &mut self,
        cookies_file: P,
        username: Option<&str>,
    ) -> Result<String> {
        let mut session = load_browser_cookies(cookies_file)?;
        if !session.is_authenticated() {
            return Err(Error::LoginRequired(
                "the cookie file has no sessionid; log in in the browser first".into(),
            ));
        }

        let username = match username.or(session.username.as_deref()) {
            Some(u) => validate_username(u)?,
            None => {
                return Err(Error::InvalidArgument(
                    "cannot tell the username: pass it explicitly or include the ds_user cookie"
                        .into(),
                ))
            }
        };
        session.username = Some(username.clone());

        self.client.set_session(session.clone());
        self.persist(&username, &session, None);
        println!("✅ Logged in as {} using browser cookies", username);
        Ok(username)
    }

    /// Saving is best effort: the login itself already worked.
    fn persist(&mut self, username: &str, session: &SessionData, password: Option<&str>) {
        self.username = Some(username.to_string());
        let key = SessionEncryption::new(password);
        match self.store.save(username, session, Some(&key)) {
            Ok(_) => println!("💾 Session saved (valid for about 90 days)"),
            Err(e) => {
                println!("⚠️  Could not save the session: {}", e);
                error!("Failed to save session: {}", e);
            }
        }
    }

    /// Forget the session in memory and on disk.
    pub fn logout(&mut self) -> Result<()> {
        let username = self.username.take();
        self.client.clear_session();
        self.store.remove(username.as_deref())?;
        match username {
            Some(u) => info!("Logged out {}", u),
            None => info!("Removed saved session"),
        }
        Ok(())
    }
}
