//! Tiered element location.
//!
//! The portal renders server-generated control ids that are stable in practice
//! but occasionally shift between deployments, so every control the engine
//! touches is described by an ordered list of strategies. Each strategy gets
//! its own bounded wait; the first hit wins and later tiers are never tried.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::driver::{ElementHandle, PageDriver};
use crate::errors::EngineError;
use crate::wait::poll_until;

/// One way of finding a control, tried in declaration order.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Exact match on the control's stable identifier.
    StableId(String),
    /// Link-like control whose visible text contains the string.
    VisibleText(String),
    /// First interactive element whose label contains any of the keywords.
    KeywordScan(Vec<String>),
}

/// A named control plus the ordered strategies that resolve it.
#[derive(Debug, Clone)]
pub struct LocatorSpec {
    control: String,
    strategies: Vec<Strategy>,
}

impl LocatorSpec {
    pub fn new(control: impl Into<String>) -> Self {
        Self {
            control: control.into(),
            strategies: Vec::new(),
        }
    }

    pub fn stable_id(mut self, id: impl Into<String>) -> Self {
        self.strategies.push(Strategy::StableId(id.into()));
        self
    }

    pub fn visible_text(mut self, text: impl Into<String>) -> Self {
        self.strategies.push(Strategy::VisibleText(text.into()));
        self
    }

    pub fn keywords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strategies
            .push(Strategy::KeywordScan(words.into_iter().map(Into::into).collect()));
        self
    }

    pub fn control(&self) -> &str {
        &self.control
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }
}

/// Runs the spec's strategies in order, giving each one `per_strategy` of
/// polling at `poll` intervals. Returns the first usable hit, or `None` once
/// every tier is exhausted. Backend errors inside a tier are treated as
/// misses for that attempt so a flaky lookup does not abort the whole search.
#[instrument(level = "debug", skip(driver, spec), fields(control = spec.control()))]
pub async fn locate(
    driver: &dyn PageDriver,
    spec: &LocatorSpec,
    per_strategy: Duration,
    poll: Duration,
) -> Result<Option<ElementHandle>, EngineError> {
    for (tier, strategy) in spec.strategies().iter().enumerate() {
        let control = spec.control();
        let found: Option<ElementHandle> = poll_until(per_strategy, poll, move || async move {
            match resolve_once(driver, strategy).await {
                Ok(hit) => Ok::<_, EngineError>(hit),
                Err(e) => {
                    debug!(control, tier, error = %e, "lookup attempt failed");
                    Ok(None)
                }
            }
        })
        .await?;

        if let Some(handle) = found {
            debug!(control = spec.control(), tier, "resolved");
            return Ok(Some(handle));
        }
        debug!(control = spec.control(), tier, "strategy exhausted");
    }
    Ok(None)
}

/// As [`locate`], but exhaustion is an error naming the control.
pub async fn locate_required(
    driver: &dyn PageDriver,
    spec: &LocatorSpec,
    per_strategy: Duration,
    poll: Duration,
) -> Result<ElementHandle, EngineError> {
    locate(driver, spec, per_strategy, poll)
        .await?
        .ok_or_else(|| EngineError::LocatorExhausted(spec.control().to_string()))
}

async fn resolve_once(
    driver: &dyn PageDriver,
    strategy: &Strategy,
) -> Result<Option<ElementHandle>, EngineError> {
    let candidate = match strategy {
        Strategy::StableId(id) => driver.find_by_id(id).await?,
        Strategy::VisibleText(text) => driver.find_by_link_text(text).await?,
        Strategy::KeywordScan(words) => {
            let mut hit = None;
            for element in driver.interactive_elements().await? {
                if words.iter().any(|w| element.label.contains(w.as_str())) {
                    hit = Some(element.handle);
                    break;
                }
            }
            hit
        }
    };

    // A control that exists but cannot be interacted with is not a hit yet.
    match candidate {
        Some(handle) => {
            if driver.is_displayed(handle).await? && driver.is_enabled(handle).await? {
                Ok(Some(handle))
            } else {
                Ok(None)
            }
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::InteractiveElement;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubDriver {
        ids: HashMap<String, u64>,
        link_texts: HashMap<String, u64>,
        interactive: Vec<(u64, String)>,
        disabled: Vec<u64>,
        id_lookups: Mutex<u32>,
    }

    #[async_trait]
    impl PageDriver for StubDriver {
        async fn goto(&self, _url: &str) -> Result<(), EngineError> {
            Ok(())
        }

        async fn dom_ready(&self) -> Result<bool, EngineError> {
            Ok(true)
        }

        async fn current_url(&self) -> Result<String, EngineError> {
            Ok(String::new())
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<ElementHandle>, EngineError> {
            *self.id_lookups.lock().unwrap() += 1;
            Ok(self.ids.get(id).copied().map(ElementHandle::new))
        }

        async fn find_by_link_text(
            &self,
            text: &str,
        ) -> Result<Option<ElementHandle>, EngineError> {
            Ok(self.link_texts.get(text).copied().map(ElementHandle::new))
        }

        async fn interactive_elements(&self) -> Result<Vec<InteractiveElement>, EngineError> {
            Ok(self
                .interactive
                .iter()
                .map(|(id, label)| InteractiveElement {
                    handle: ElementHandle::new(*id),
                    label: label.clone(),
                })
                .collect())
        }

        async fn elements_with_id_fragment(
            &self,
            _fragment: &str,
        ) -> Result<Vec<(ElementHandle, String)>, EngineError> {
            Ok(Vec::new())
        }

        async fn is_displayed(&self, _element: ElementHandle) -> Result<bool, EngineError> {
            Ok(true)
        }

        async fn is_enabled(&self, element: ElementHandle) -> Result<bool, EngineError> {
            Ok(!self.disabled.contains(&element.0))
        }

        async fn click(&self, _element: ElementHandle) -> Result<(), EngineError> {
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

        async fn text_of(&self, _element: ElementHandle) -> Result<String, EngineError> {
            Ok(String::new())
        }

        async fn page_contains_text(&self, _needle: &str) -> Result<bool, EngineError> {
            Ok(false)
        }
    }

    fn fast() -> (Duration, Duration) {
        (Duration::from_millis(20), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn first_strategy_wins() {
        let mut driver = StubDriver::default();
        driver.ids.insert("btnGo".into(), 1);
        driver.link_texts.insert("Go".into(), 2);
        let spec = LocatorSpec::new("go button").stable_id("btnGo").visible_text("Go");

        let (per, poll) = fast();
        let hit = locate(&driver, &spec, per, poll).await.unwrap();
        assert_eq!(hit, Some(ElementHandle::new(1)));
    }

    #[tokio::test]
    async fn falls_through_to_keyword_scan() {
        let mut driver = StubDriver::default();
        driver.interactive = vec![(7, "ヘルプ".into()), (8, "ログイン".into())];
        let spec = LocatorSpec::new("login button")
            .stable_id("btnLogin")
            .keywords(["ログイン"]);

        let (per, poll) = fast();
        let hit = locate(&driver, &spec, per, poll).await.unwrap();
        assert_eq!(hit, Some(ElementHandle::new(8)));
    }

    #[tokio::test]
    async fn disabled_controls_are_not_hits() {
        let mut driver = StubDriver::default();
        driver.ids.insert("btnGo".into(), 1);
        driver.disabled.push(1);
        let spec = LocatorSpec::new("go button").stable_id("btnGo");

        let (per, poll) = fast();
        let hit = locate(&driver, &spec, per, poll).await.unwrap();
        assert_eq!(hit, None);
    }

    #[tokio::test]
    async fn exhaustion_returns_none_without_error() {
        let driver = StubDriver::default();
        let spec = LocatorSpec::new("ghost").stable_id("nope").visible_text("missing");

        let (per, poll) = fast();
        let hit = locate(&driver, &spec, per, poll).await.unwrap();
        assert_eq!(hit, None);
        // Both tiers polled more than once before giving up.
        assert!(*driver.id_lookups.lock().unwrap() > 1);
    }

    #[tokio::test]
    async fn locate_required_names_the_control() {
        let driver = StubDriver::default();
        let spec = LocatorSpec::new("search button").stable_id("nope");

        let (per, poll) = fast();
        let err = locate_required(&driver, &spec, per, poll).await.unwrap_err();
        assert!(matches!(err, EngineError::LocatorExhausted(ref c) if c == "search button"));
    }
}
