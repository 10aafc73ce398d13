//! The retrieval engine's phase machine.
//!
//! One run walks a fixed sequence of phases against the portal: reach the
//! site, authenticate, select the working context, then loop over listing
//! rounds until a terminal condition fires. Every run ends in exactly one
//! [`RunOutcome`]; phase errors are folded into the outcome rather than
//! escaping, so callers always get a report and teardown always happens.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::controller::{OrderRow, PaginationController};
use crate::controls;
use crate::download::{relocate, DownloadWatch, NamePattern};
use crate::driver::PageDriver;
use crate::errors::EngineError;
use crate::locator::{locate, locate_required};
use crate::sentinel::no_data_sentinel_present;
use crate::session::Session;
use crate::wait::poll_until;

/// Where in the run sequence the engine currently is. Reported in outcomes
/// and logs so a failure names the step that broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SiteAccess,
    Authenticate,
    SelectContext,
    ListOrders,
    OpenOrderDetail,
    TriggerDownload,
    ConfirmOrder,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::SiteAccess => "site access",
            Phase::Authenticate => "authenticate",
            Phase::SelectContext => "select context",
            Phase::ListOrders => "list orders",
            Phase::OpenOrderDetail => "open order detail",
            Phase::TriggerDownload => "trigger download",
            Phase::ConfirmOrder => "confirm order",
        };
        f.write_str(name)
    }
}

/// Why the run stopped before its natural end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The round ceiling was reached with work still pending.
    RoundLimit,
    /// A cooperative cancellation request was observed.
    Cancelled,
}

/// Terminal state of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The backlog was drained.
    Success,
    /// The very first listing was already empty.
    NoDataFound,
    /// A phase failed in a way no fallback absorbed.
    PhaseFailure { phase: Phase, reason: String },
    Aborted { reason: AbortReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub orders_processed: u32,
    pub rounds: u32,
}

pub struct Engine {
    driver: Arc<dyn PageDriver>,
    download_dir: PathBuf,
    config: EngineConfig,
    controller: PaginationController,
    cancel: Arc<AtomicBool>,
    round: u32,
    orders_processed: u32,
}

impl Engine {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        download_dir: PathBuf,
        config: EngineConfig,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        let controller =
            PaginationController::new(config.confirmation_enabled, config.stall_limit);
        Self {
            driver,
            download_dir,
            config,
            controller,
            cancel,
            round: 0,
            orders_processed: 0,
        }
    }

    /// Executes the run to its terminal state. Infallible by construction:
    /// whatever happens inside becomes part of the returned report.
    #[instrument(skip(self), fields(confirmation = self.config.confirmation_enabled, test_mode = self.config.test_mode))]
    pub async fn run(&mut self) -> RunResult {
        let outcome = match self.drive().await {
            Ok(outcome) => outcome,
            Err((phase, e)) => {
                error!(%phase, round = self.round, error = %e, "phase failed");
                RunOutcome::PhaseFailure {
                    phase,
                    reason: e.to_string(),
                }
            }
        };
        info!(?outcome, orders = self.orders_processed, rounds = self.round, "run finished");
        RunResult {
            outcome,
            orders_processed: self.orders_processed,
            rounds: self.round,
        }
    }

    async fn drive(&mut self) -> Result<RunOutcome, (Phase, EngineError)> {
        self.site_access().await.map_err(tag(Phase::SiteAccess))?;
        self.authenticate().await.map_err(tag(Phase::Authenticate))?;
        self.select_context().await.map_err(tag(Phase::SelectContext))?;

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                info!(round = self.round, "cancellation observed");
                return Ok(RunOutcome::Aborted {
                    reason: AbortReason::Cancelled,
                });
            }
            if self.round >= self.config.max_rounds {
                warn!(limit = self.config.max_rounds, "round ceiling reached");
                return Ok(RunOutcome::Aborted {
                    reason: AbortReason::RoundLimit,
                });
            }
            self.round += 1;

            self.list_orders().await.map_err(tag(Phase::ListOrders))?;

            if no_data_sentinel_present(self.driver.as_ref()).await {
                info!(round = self.round, "no-data sentinel present");
                return Ok(if self.orders_processed == 0 {
                    RunOutcome::NoDataFound
                } else {
                    RunOutcome::Success
                });
            }

            // Audit copy of the full listing, once per run.
            if self.round == 1 && self.config.confirmation_enabled {
                self.export_listing().await.map_err(tag(Phase::ListOrders))?;
            }

            let rows = self.listing_rows().await.map_err(tag(Phase::ListOrders))?;
            if rows.is_empty() {
                return Err((
                    Phase::ListOrders,
                    EngineError::LocatorExhausted("order rows".to_string()),
                ));
            }

            let row = match self.controller.select_row(&rows) {
                Some(row) => row.clone(),
                None => {
                    if self.controller.stalled_out() {
                        info!(round = self.round, "no new rows, backlog drained");
                        return Ok(RunOutcome::Success);
                    }
                    continue;
                }
            };

            info!(round = self.round, row_id = %row.row_id, "processing order");
            self.open_order_detail(&row)
                .await
                .map_err(tag(Phase::OpenOrderDetail))?;
            self.trigger_download()
                .await
                .map_err(tag(Phase::TriggerDownload))?;
            self.confirm_order().await.map_err(tag(Phase::ConfirmOrder))?;

            self.controller.note_processed(&row.row_id);
            self.orders_processed += 1;

            if self.config.test_mode {
                info!("test mode, stopping after one order");
                return Ok(RunOutcome::Success);
            }
        }
    }

    async fn site_access(&self) -> Result<(), EngineError> {
        self.driver.goto(&self.config.base_url).await?;
        self.wait_page_ready().await?;

        // A lingering session leaves a relogin link instead of the form.
        // Short probe: its absence is the common case.
        let probe = self
            .config
            .timeouts
            .per_strategy()
            .min(std::time::Duration::from_secs(2));
        let relogin = locate(
            self.driver.as_ref(),
            &controls::relogin_link(),
            probe,
            self.config.timeouts.poll(),
        )
        .await?;
        if let Some(link) = relogin {
            info!("stale session detected, forcing fresh login");
            self.driver.click(link).await?;
            self.wait_page_ready().await?;
        }
        Ok(())
    }

    async fn authenticate(&self) -> Result<(), EngineError> {
        let creds = &self.config.credentials;
        let org = self.require(controls::org_code_field()).await?;
        self.driver.fill(org, &creds.org_code).await?;
        let login = self.require(controls::login_id_field()).await?;
        self.driver.fill(login, &creds.login_id).await?;
        let password = self.require(controls::password_field()).await?;
        self.driver.fill(password, &creds.password).await?;

        let button = self.require(controls::login_button()).await?;
        self.driver.click(button).await?;
        self.wait_page_ready().await?;

        for marker in controls::LOGIN_ERROR_MARKERS {
            if self.driver.page_contains_text(marker).await? {
                return Err(EngineError::AuthRejected(format!(
                    "portal reported '{marker}' after login"
                )));
            }
        }
        info!("authenticated");
        Ok(())
    }

    async fn select_context(&self) -> Result<(), EngineError> {
        let link = self.require(controls::context_link()).await?;
        self.driver.click(link).await?;
        self.wait_page_ready().await
    }

    async fn list_orders(&self) -> Result<(), EngineError> {
        let tab = self.require(controls::orders_tab()).await?;
        self.driver.click(tab).await?;
        self.wait_page_ready().await?;

        // Test mode keeps the default filter so a known order stays visible.
        if !self.config.test_mode {
            let filter = self.require(controls::status_filter()).await?;
            self.driver
                .select_value(filter, controls::STATUS_REFERENCED)
                .await?;
        }

        let search = self.require(controls::search_button()).await?;
        self.driver.click(search).await?;
        self.wait_page_ready().await
    }

    async fn export_listing(&self) -> Result<(), EngineError> {
        let watch = DownloadWatch::begin(&self.download_dir, NamePattern::new("*.csv")?)?;
        let button = self.require(controls::listing_export_button()).await?;
        self.driver.click(button).await?;
        let artifact = watch
            .await_stable(self.config.timeouts.download(), self.config.timeouts.poll())
            .await?;
        relocate(&artifact, &self.dated_dir("listing"))?;
        Ok(())
    }

    async fn listing_rows(&self) -> Result<Vec<OrderRow>, EngineError> {
        let found = self
            .driver
            .elements_with_id_fragment(controls::ORDER_ROW_ID_FRAGMENT)
            .await?;
        debug!(rows = found.len(), "listing rows enumerated");
        Ok(found
            .into_iter()
            .map(|(handle, row_id)| OrderRow { handle, row_id })
            .collect())
    }

    async fn open_order_detail(&self, row: &OrderRow) -> Result<(), EngineError> {
        self.driver.click(row.handle).await?;
        self.wait_page_ready().await?;
        let kind = self.require(controls::print_kind_select()).await?;
        self.driver
            .select_value(kind, controls::PRINT_KIND_DELIVERY_LIST_D)
            .await
    }

    async fn trigger_download(&self) -> Result<(), EngineError> {
        let watch = DownloadWatch::begin(&self.download_dir, NamePattern::new("*")?)?;
        let button = self.require(controls::download_button()).await?;
        self.driver.click(button).await?;
        let artifact = watch
            .await_stable(self.config.timeouts.download(), self.config.timeouts.poll())
            .await?;
        relocate(&artifact, &self.dated_dir("orders"))?;
        Ok(())
    }

    async fn confirm_order(&self) -> Result<(), EngineError> {
        if !self.config.confirmation_enabled {
            debug!("confirmation disabled, leaving order untouched server-side");
            return Ok(());
        }
        let checkbox = self.require(controls::confirm_checkbox()).await?;
        self.driver.click(checkbox).await?;
        let button = self.require(controls::confirm_button()).await?;
        self.driver.click(button).await?;
        self.wait_page_ready().await
    }

    async fn require(
        &self,
        spec: crate::locator::LocatorSpec,
    ) -> Result<crate::driver::ElementHandle, EngineError> {
        locate_required(
            self.driver.as_ref(),
            &spec,
            self.config.timeouts.per_strategy(),
            self.config.timeouts.poll(),
        )
        .await
    }

    async fn wait_page_ready(&self) -> Result<(), EngineError> {
        let driver = self.driver.as_ref();
        let ready = poll_until(
            self.config.timeouts.page_ready(),
            self.config.timeouts.poll(),
            move || async move {
                match driver.dom_ready().await {
                    Ok(true) => Ok::<_, EngineError>(Some(())),
                    Ok(false) => Ok(None),
                    Err(e) => {
                        // Transient during navigation; the next poll retries.
                        debug!(error = %e, "readiness probe failed");
                        Ok(None)
                    }
                }
            },
        )
        .await?;
        ready.ok_or_else(|| {
            EngineError::PhaseTimeout(format!(
                "page not ready within {:?}",
                self.config.timeouts.page_ready()
            ))
        })
    }

    fn dated_dir(&self, kind: &str) -> PathBuf {
        dated_dir(&self.config.download_root, kind)
    }
}

fn tag(phase: Phase) -> impl FnOnce(EngineError) -> (Phase, EngineError) {
    move |e| (phase, e)
}

/// `<root>/<YYYY-MM-DD>/<kind>/`, dated with the local day of the run.
fn dated_dir(root: &Path, kind: &str) -> PathBuf {
    root.join(Local::now().format("%Y-%m-%d").to_string()).join(kind)
}

/// Full lifecycle entry point: start a session, run the engine, and always
/// tear the session down, whatever the run's outcome.
pub async fn run_with_session(
    config: EngineConfig,
    cancel: Arc<AtomicBool>,
) -> Result<RunResult, EngineError> {
    let session = Session::start(&config).await?;
    let mut engine = Engine::new(
        session.driver(),
        session.download_dir().clone(),
        config,
        cancel,
    );
    let result = engine.run().await;
    session.stop().await;
    Ok(result)
}
