//! Command context: config, backend, session file and the console ports.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use yologen::client::{Confirm, HttpBackend, NoticeLevel, Notifier};
use yologen::guard::{GuardDecision, Navigator, Redirect, RouteGuard};
use yologen::{Capability, ClientConfig, Credentials, SessionStore, StoredSession, User};

pub struct App {
    pub config: ClientConfig,
    pub backend: Arc<HttpBackend>,
    pub session: SessionStore,
    pub notifier: Arc<ConsoleNotifier>,
}

impl App {
    /// Load config and the saved session. Makes no network calls.
    pub fn open(config_path: &Path, api_url: Option<String>) -> Result<Self> {
        let config = ClientConfig::load(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
            .with_env()
            .with_base_url_override(api_url);
        let credentials = Credentials::new();
        let backend = Arc::new(HttpBackend::from_config(&config, credentials.clone())?);
        let session =
            SessionStore::new(backend.clone(), credentials).with_ttl(config.session_ttl());
        session.restore(load_session(&config.session_path));
        debug!(base_url = %config.base_url, "Client ready");

        Ok(Self {
            config,
            backend,
            session,
            notifier: Arc::new(ConsoleNotifier),
        })
    }

    /// Resolve the saved session and gate the command on `required`.
    pub async fn require(&self, required: Option<Capability>) -> Result<User> {
        self.session.init().await;
        self.save_session()?;

        let state = self.session.snapshot();
        match RouteGuard::decide(required, &state) {
            GuardDecision::Render => state.user.context("Session resolved without a user"),
            GuardDecision::Redirect(Redirect::Login) => {
                bail!("Not logged in. Run `yologen login` first.")
            }
            GuardDecision::Redirect(Redirect::Unauthorized) => {
                let role = state.user.map(|u| u.role.to_string()).unwrap_or_default();
                match required {
                    Some(capability) => {
                        bail!("Permission denied: requires {capability}, you are {role}")
                    }
                    None => bail!("Permission denied"),
                }
            }
            GuardDecision::Wait => bail!("Session is still being resolved"),
        }
    }

    /// Write the live session to disk, or remove the file once it is gone.
    pub fn save_session(&self) -> Result<()> {
        let path = &self.config.session_path;
        match self.session.stored() {
            Some(session) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, serde_yaml::to_string(&session)?)
                    .with_context(|| format!("Failed to write session {}", path.display()))?;
                restrict_permissions(path)?;
            }
            None if path.exists() => std::fs::remove_file(path)?,
            None => {}
        }
        Ok(())
    }
}

fn load_session(path: &Path) -> Option<StoredSession> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_yaml::from_str(&content) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
            None
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

// ─── Console ports ────────────────────────────────────────────────────────────

pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Success => println!("  ✓ {message}"),
            NoticeLevel::Info => println!("  {message}"),
            NoticeLevel::Warning => eprintln!("  ! {message}"),
            // main prints the returned error
            NoticeLevel::Error => debug!("{message}"),
        }
    }
}

pub struct StdinConfirm {
    pub assume_yes: bool,
}

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{prompt} [y/N] ");
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

/// Opens targets in the system browser, printing them if that fails.
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, target: &str) {
        println!("{target}");
        if let Err(e) = open::that(target) {
            warn!(error = %e, "Could not open a browser");
        }
    }
}

pub struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, target: &str) {
        println!("{target}");
    }
}

/// Read one line from stdin after printing `prompt` to stderr.
pub fn read_line(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    if line.is_empty() {
        bail!("No input given");
    }
    Ok(line)
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
