//! Browser session lifecycle.
//!
//! A [`Session`] owns the chromedriver child process (when this process had
//! to spawn one), the WebDriver connection, and the download directory the
//! browser is bound to. Teardown never fails: every cleanup step logs and
//! moves on so a stuck browser cannot mask the run's real outcome.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::{ChromeCapabilities, ChromiumLikeCapabilities, DesiredCapabilities, WebDriver};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::driver::PageDriver;
use crate::errors::EngineError;
use crate::webdriver::WebDriverBackend;

/// Time given to a freshly spawned chromedriver before connecting.
const STARTUP_WAIT: Duration = Duration::from_millis(1500);

/// Settling time before teardown, so a final in-flight write can land.
const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct Session {
    backend: Arc<WebDriverBackend>,
    chromedriver: Option<Child>,
    download_dir: PathBuf,
}

impl Session {
    /// Starts chromedriver (unless one is already listening on the port),
    /// connects, and binds downloads to the configured root.
    pub async fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&config.download_root)?;
        // Chrome rejects relative paths in download prefs.
        let download_dir = config
            .download_root
            .canonicalize()
            .unwrap_or_else(|_| config.download_root.clone());

        let chromedriver = spawn_chromedriver(config.webdriver_port);
        if chromedriver.is_some() {
            tokio::time::sleep(STARTUP_WAIT).await;
        }

        let server = format!("http://localhost:{}", config.webdriver_port);
        let driver = connect(&server, config, &download_dir).await?;

        let dev_tools = ChromeDevTools::new(driver.handle.clone());
        let params = json!({
            "behavior": "allow",
            "downloadPath": download_dir.to_string_lossy(),
        });
        if let Err(e) = dev_tools
            .execute_cdp_with_params("Page.setDownloadBehavior", params)
            .await
        {
            // Headless Chrome honors the prefs anyway; keep going.
            warn!(error = %e, "CDP download binding failed");
        }

        info!(server, download_dir = %download_dir.display(), "session started");
        Ok(Self {
            backend: Arc::new(WebDriverBackend::new(driver)),
            chromedriver,
            download_dir,
        })
    }

    pub fn driver(&self) -> Arc<dyn PageDriver> {
        self.backend.clone()
    }

    /// Directory the browser writes downloads into.
    pub fn download_dir(&self) -> &PathBuf {
        &self.download_dir
    }

    /// Tears the session down. Infallible: failures are logged, not returned.
    pub async fn stop(mut self) {
        tokio::time::sleep(TEARDOWN_GRACE).await;
        if let Err(e) = self.backend.raw().quit().await {
            warn!(error = %e, "browser quit failed");
        }
        if let Some(mut child) = self.chromedriver.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "chromedriver kill failed");
            }
        }
        info!("session closed");
    }
}

fn spawn_chromedriver(port: u16) -> Option<Child> {
    match Command::new("chromedriver")
        .arg(format!("--port={port}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => Some(child),
        Err(e) => {
            // An externally managed chromedriver may already be listening.
            warn!(error = %e, port, "chromedriver spawn failed, assuming external server");
            None
        }
    }
}

/// Connects with the full capability set, falling back to a minimal one when
/// the local Chrome rejects an option.
async fn connect(
    server: &str,
    config: &EngineConfig,
    download_dir: &std::path::Path,
) -> Result<WebDriver, EngineError> {
    let preferred = preferred_caps(config, download_dir)?;
    match WebDriver::new(server, preferred).await {
        Ok(driver) => Ok(driver),
        Err(e) => {
            warn!(error = %e, "preferred capabilities rejected, retrying minimal");
            let minimal = minimal_caps(config)?;
            WebDriver::new(server, minimal)
                .await
                .map_err(|e| EngineError::SessionStart(e.to_string()))
        }
    }
}

fn preferred_caps(
    config: &EngineConfig,
    download_dir: &std::path::Path,
) -> Result<ChromeCapabilities, EngineError> {
    let mut caps = DesiredCapabilities::chrome();
    caps.add_arg("--no-sandbox")?;
    caps.add_arg("--disable-dev-shm-usage")?;
    caps.add_arg("--disable-gpu")?;
    caps.add_arg("--window-size=1920,1080")?;
    if config.headless {
        caps.add_arg("--headless=new")?;
    }
    caps.add_experimental_option(
        "prefs",
        json!({
            "download.default_directory": download_dir.to_string_lossy(),
            "download.prompt_for_download": false,
            "download.directory_upgrade": true,
            "safebrowsing.enabled": true,
        }),
    )?;
    debug!("chrome capabilities prepared");
    Ok(caps)
}

fn minimal_caps(config: &EngineConfig) -> Result<ChromeCapabilities, EngineError> {
    let mut caps = DesiredCapabilities::chrome();
    caps.add_arg("--no-sandbox")?;
    if config.headless {
        caps.add_arg("--headless=new")?;
    }
    Ok(caps)
}
