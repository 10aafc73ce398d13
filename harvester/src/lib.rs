//! Order document retrieval engine for a session-based legacy web portal.
//!
//! The portal offers no API; every interaction is a simulated UI action
//! against server-rendered pages. This crate drives a real browser through
//! the portal's workflow: authenticate, select the working context, then
//! loop over the order listing, downloading each order's delivery document
//! and optionally confirming the order server-side, until the portal's
//! no-data message or a progress limit ends the run.
//!
//! The state machine in [`engine`] is written entirely against the
//! [`driver::PageDriver`] trait; [`webdriver`] provides the WebDriver-backed
//! implementation and tests substitute a scripted portal.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), harvester::EngineError> {
//! let config: harvester::EngineConfig = serde_json::from_str(
//!     r#"{
//!         "base_url": "https://portal.example/login.aspx",
//!         "credentials": {
//!             "org_code": "ORG1",
//!             "login_id": "user",
//!             "password": "secret"
//!         },
//!         "download_root": "/var/lib/harvester/downloads"
//!     }"#,
//! ).map_err(|e| harvester::EngineError::SessionStart(e.to_string()))?;
//!
//! let cancel = Arc::new(AtomicBool::new(false));
//! let result = harvester::run_with_session(config, cancel).await?;
//! println!("{:?}: {} orders", result.outcome, result.orders_processed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod controls;
pub mod download;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod locator;
pub mod sentinel;
pub mod session;
pub mod wait;
pub mod webdriver;

pub use config::{Credentials, EngineConfig, Timeouts};
pub use controller::{OrderRow, PaginationController};
pub use download::{DownloadArtifact, DownloadWatch, NamePattern};
pub use driver::{ElementHandle, InteractiveElement, PageDriver};
pub use engine::{run_with_session, AbortReason, Engine, Phase, RunOutcome, RunResult};
pub use errors::EngineError;
pub use locator::{LocatorSpec, Strategy};
pub use session::Session;
