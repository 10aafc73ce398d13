//! End-to-end engine runs against a scripted in-memory portal.
//!
//! The fake driver mimics the portal's observable behavior: listing rows that
//! disappear when confirmed (or persist when confirmation is off), a message
//! banner that shows the no-data text once the backlog is empty, and buttons
//! whose clicks drop real files into the bound download directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Local;
use harvester::controls;
use harvester::{
    AbortReason, Credentials, ElementHandle, Engine, EngineConfig, EngineError,
    InteractiveElement, PageDriver, Phase, RunOutcome, Timeouts,
};

struct FakeDriver {
    download_dir: PathBuf,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    rows: Vec<String>,
    consume_on_confirm: bool,
    fail_click_on: Option<String>,
    opened: Option<String>,
    file_counter: u32,
    handles: HashMap<String, u64>,
    names: HashMap<u64, String>,
    next_handle: u64,
}

impl State {
    fn handle_for(&mut self, name: &str) -> ElementHandle {
        if let Some(&h) = self.handles.get(name) {
            return ElementHandle::new(h);
        }
        self.next_handle += 1;
        self.handles.insert(name.to_string(), self.next_handle);
        self.names.insert(self.next_handle, name.to_string());
        ElementHandle::new(self.next_handle)
    }

    fn name_of(&self, handle: ElementHandle) -> Option<String> {
        self.names.get(&handle.id()).cloned()
    }
}

impl FakeDriver {
    fn new(download_dir: PathBuf, rows: &[&str], consume_on_confirm: bool) -> Self {
        Self {
            download_dir,
            state: Mutex::new(State {
                rows: rows.iter().map(|r| r.to_string()).collect(),
                consume_on_confirm,
                ..State::default()
            }),
        }
    }

    fn fail_click_on(self, control_id: &str) -> Self {
        self.state.lock().unwrap().fail_click_on = Some(control_id.to_string());
        self
    }

    fn write_download(&self, name: &str) {
        std::fs::write(self.download_dir.join(name), b"portal document body").unwrap();
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn goto(&self, _url: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn dom_ready(&self) -> Result<bool, EngineError> {
        Ok(true)
    }

    async fn current_url(&self) -> Result<String, EngineError> {
        Ok("https://portal.example/".to_string())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ElementHandle>, EngineError> {
        // No stale session in the fake portal.
        if id == "LogoutLinkButton" {
            return Ok(None);
        }
        Ok(Some(self.state.lock().unwrap().handle_for(id)))
    }

    async fn find_by_link_text(&self, _text: &str) -> Result<Option<ElementHandle>, EngineError> {
        Ok(None)
    }

    async fn interactive_elements(&self) -> Result<Vec<InteractiveElement>, EngineError> {
        Ok(Vec::new())
    }

    async fn elements_with_id_fragment(
        &self,
        fragment: &str,
    ) -> Result<Vec<(ElementHandle, String)>, EngineError> {
        let mut state = self.state.lock().unwrap();
        let rows = state.rows.clone();
        Ok(rows
            .into_iter()
            .filter(|r| r.contains(fragment))
            .map(|r| {
                let handle = state.handle_for(&r);
                (handle, r)
            })
            .collect())
    }

    async fn is_displayed(&self, _element: ElementHandle) -> Result<bool, EngineError> {
        Ok(true)
    }

    async fn is_enabled(&self, _element: ElementHandle) -> Result<bool, EngineError> {
        Ok(true)
    }

    async fn click(&self, element: ElementHandle) -> Result<(), EngineError> {
        let (name, counter) = {
            let mut state = self.state.lock().unwrap();
            let name = state
                .name_of(element)
                .ok_or_else(|| EngineError::Driver("unknown handle".to_string()))?;
            if state.fail_click_on.as_deref() == Some(name.as_str()) {
                return Err(EngineError::Driver(format!("click rejected: {name}")));
            }
            if state.rows.contains(&name) {
                state.opened = Some(name.clone());
            }
            if name == "ctl00_ContentPlaceHolder1_DecideButton" && state.consume_on_confirm {
                let opened = state.opened.take();
                state.rows.retain(|r| Some(r) != opened.as_ref());
            }
            state.file_counter += 1;
            (name, state.file_counter)
        };

        match name.as_str() {
            "ctl00_ContentPlaceHolder1_DownloadButton" => {
                self.write_download(&format!("listing-{counter}.csv"));
            }
            "ctl00_ContentPlaceHolder1_FormView2_PrintButton" => {
                self.write_download(&format!("order-{counter}.pdf"));
            }
            _ => {}
        }
        Ok(())
    }

    async fn fill(&self, _element: ElementHandle, _text: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn select_value(
        &self,
        _element: ElementHandle,
        _value: &str,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn text_of(&self, element: ElementHandle) -> Result<String, EngineError> {
        let state = self.state.lock().unwrap();
        if state.name_of(element).as_deref() == Some(controls::MESSAGE_AREA_ID)
            && state.rows.is_empty()
        {
            return Ok(controls::NO_DATA_SENTINEL.to_string());
        }
        Ok(String::new())
    }

    async fn page_contains_text(&self, _needle: &str) -> Result<bool, EngineError> {
        Ok(false)
    }
}

fn test_config(download_root: PathBuf) -> EngineConfig {
    EngineConfig {
        base_url: "https://portal.example/login.aspx".to_string(),
        credentials: Credentials {
            org_code: "ORG1".to_string(),
            login_id: "user".to_string(),
            password: "secret".to_string(),
        },
        download_root,
        headless: true,
        confirmation_enabled: true,
        test_mode: false,
        max_rounds: 50,
        stall_limit: 3,
        timeouts: Timeouts {
            page_ready_ms: 500,
            per_strategy_ms: 100,
            download_ms: 8_000,
            poll_ms: 10,
        },
        webdriver_port: 9515,
    }
}

fn row_id(n: u32) -> String {
    format!("ctl00_GridView2_ctl{n:02}_ImpDateLinkButton")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn run_engine(driver: FakeDriver, config: EngineConfig) -> harvester::RunResult {
    init_tracing();
    let dir = driver.download_dir.clone();
    let cancel = Arc::new(AtomicBool::new(false));
    let mut engine = Engine::new(Arc::new(driver), dir, config, cancel);
    engine.run().await
}

#[tokio::test]
async fn empty_first_listing_reports_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::new(dir.path().to_path_buf(), &[], true);
    let config = test_config(dir.path().to_path_buf());

    let result = run_engine(driver, config).await;
    assert_eq!(result.outcome, RunOutcome::NoDataFound);
    assert_eq!(result.orders_processed, 0);
    assert_eq!(result.rounds, 1);
}

#[tokio::test]
async fn confirmed_orders_drain_to_success() {
    let dir = tempfile::tempdir().unwrap();
    let rows = [row_id(2), row_id(3)];
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    let driver = FakeDriver::new(dir.path().to_path_buf(), &rows, true);
    let config = test_config(dir.path().to_path_buf());

    let result = run_engine(driver, config).await;
    assert_eq!(result.outcome, RunOutcome::Success);
    assert_eq!(result.orders_processed, 2);
    assert_eq!(result.rounds, 3);

    // One listing export plus one document per order, filed by day and kind.
    let day = Local::now().format("%Y-%m-%d").to_string();
    let listing = dir.path().join(&day).join("listing");
    let orders = dir.path().join(&day).join("orders");
    assert_eq!(std::fs::read_dir(&listing).unwrap().count(), 1);
    assert_eq!(std::fs::read_dir(&orders).unwrap().count(), 2);
}

#[tokio::test]
async fn round_ceiling_aborts_a_run_that_makes_no_progress() {
    let dir = tempfile::tempdir().unwrap();
    let row = row_id(2);
    // Confirmation clicks that the server never honors: the row persists.
    let driver = FakeDriver::new(dir.path().to_path_buf(), &[&row], false);
    let mut config = test_config(dir.path().to_path_buf());
    config.max_rounds = 3;

    let result = run_engine(driver, config).await;
    assert_eq!(
        result.outcome,
        RunOutcome::Aborted {
            reason: AbortReason::RoundLimit
        }
    );
    assert_eq!(result.rounds, 3);
    assert_eq!(result.orders_processed, 3);
}

#[tokio::test]
async fn disabled_confirmation_processes_each_row_once_then_stalls_out() {
    let dir = tempfile::tempdir().unwrap();
    let rows = [row_id(2), row_id(3), row_id(4)];
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    let driver = FakeDriver::new(dir.path().to_path_buf(), &rows, false);
    let mut config = test_config(dir.path().to_path_buf());
    config.confirmation_enabled = false;
    config.stall_limit = 2;

    let result = run_engine(driver, config).await;
    assert_eq!(result.outcome, RunOutcome::Success);
    assert_eq!(result.orders_processed, 3);
    // Three productive rounds, then two empty ones to hit the stall limit.
    assert_eq!(result.rounds, 5);

    let day = Local::now().format("%Y-%m-%d").to_string();
    let orders = dir.path().join(&day).join("orders");
    assert_eq!(std::fs::read_dir(&orders).unwrap().count(), 3);
    // No listing export without confirmation.
    assert!(!dir.path().join(&day).join("listing").exists());
}

#[tokio::test]
async fn test_mode_stops_after_a_single_order() {
    let dir = tempfile::tempdir().unwrap();
    let rows = [row_id(2), row_id(3)];
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    let driver = FakeDriver::new(dir.path().to_path_buf(), &rows, true);
    let mut config = test_config(dir.path().to_path_buf());
    config.test_mode = true;

    let result = run_engine(driver, config).await;
    assert_eq!(result.outcome, RunOutcome::Success);
    assert_eq!(result.orders_processed, 1);
    assert_eq!(result.rounds, 1);
}

#[tokio::test]
async fn click_failure_surfaces_as_phase_failure() {
    let dir = tempfile::tempdir().unwrap();
    let row = row_id(2);
    let driver = FakeDriver::new(dir.path().to_path_buf(), &[&row], true)
        .fail_click_on("ctl00_ContentPlaceHolder1_FormView1_Button1");
    let config = test_config(dir.path().to_path_buf());

    let result = run_engine(driver, config).await;
    match result.outcome {
        RunOutcome::PhaseFailure { phase, reason } => {
            assert_eq!(phase, Phase::ListOrders);
            assert!(reason.contains("click rejected"));
        }
        other => panic!("expected phase failure, got {other:?}"),
    }
    assert_eq!(result.orders_processed, 0);
}

#[tokio::test]
async fn cancellation_is_observed_at_the_round_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let row = row_id(2);
    let driver = FakeDriver::new(dir.path().to_path_buf(), &[&row], true);
    let config = test_config(dir.path().to_path_buf());

    let cancel = Arc::new(AtomicBool::new(true));
    let download_dir = driver.download_dir.clone();
    let mut engine = Engine::new(Arc::new(driver), download_dir, config, cancel);
    let result = engine.run().await;

    assert_eq!(
        result.outcome,
        RunOutcome::Aborted {
            reason: AbortReason::Cancelled
        }
    );
    assert_eq!(result.orders_processed, 0);
    assert_eq!(result.rounds, 0);
}
