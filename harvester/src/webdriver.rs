//! WebDriver-backed implementation of [`PageDriver`].
//!
//! Wraps a thirtyfour session and hands the engine opaque handles instead of
//! live `WebElement`s, so the state machine never sees the wire protocol.
//! Handles are valid until the next navigation invalidates their elements;
//! the engine re-locates after every page transition, so stale handles only
//! surface as a driver error on the attempt that follows one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thirtyfour::components::SelectElement;
use thirtyfour::error::WebDriverError;
use thirtyfour::{By, WebDriver, WebElement};
use tokio::sync::Mutex;

use crate::driver::{ElementHandle, InteractiveElement, PageDriver};
use crate::errors::EngineError;

impl From<WebDriverError> for EngineError {
    fn from(e: WebDriverError) -> Self {
        EngineError::Driver(e.to_string())
    }
}

pub struct WebDriverBackend {
    driver: WebDriver,
    elements: Mutex<HashMap<u64, WebElement>>,
    next_id: AtomicU64,
}

impl WebDriverBackend {
    pub fn new(driver: WebDriver) -> Self {
        Self {
            driver,
            elements: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Clone of the underlying session, for teardown and CDP configuration.
    pub fn raw(&self) -> WebDriver {
        self.driver.clone()
    }

    async fn register(&self, element: WebElement) -> ElementHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.elements.lock().await.insert(id, element);
        ElementHandle::new(id)
    }

    async fn element(&self, handle: ElementHandle) -> Result<WebElement, EngineError> {
        self.elements
            .lock()
            .await
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| EngineError::Driver(format!("unknown element handle {}", handle.0)))
    }

    async fn first(&self, by: By) -> Result<Option<ElementHandle>, EngineError> {
        let mut found = self.driver.find_all(by).await?;
        if found.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.register(found.remove(0)).await))
    }

    fn label_of(text: String, value: Option<String>) -> String {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            value.unwrap_or_default()
        } else {
            trimmed.to_string()
        }
    }
}

#[async_trait]
impl PageDriver for WebDriverBackend {
    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        // Handles from the previous page are dead after navigation.
        self.elements.lock().await.clear();
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn dom_ready(&self) -> Result<bool, EngineError> {
        if self.driver.find_all(By::Tag("body")).await?.is_empty() {
            return Ok(false);
        }
        let state = self
            .driver
            .execute("return document.readyState", vec![])
            .await?;
        Ok(state.json().as_str() == Some("complete"))
    }

    async fn current_url(&self) -> Result<String, EngineError> {
        Ok(self.driver.current_url().await?.to_string())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ElementHandle>, EngineError> {
        self.first(By::Id(id)).await
    }

    async fn find_by_link_text(&self, text: &str) -> Result<Option<ElementHandle>, EngineError> {
        self.first(By::PartialLinkText(text)).await
    }

    async fn interactive_elements(&self) -> Result<Vec<InteractiveElement>, EngineError> {
        let found = self
            .driver
            .find_all(By::Css(
                "a, button, input[type='submit'], input[type='button']",
            ))
            .await?;
        let mut out = Vec::with_capacity(found.len());
        for element in found {
            let text = element.text().await.unwrap_or_default();
            let value = element.attr("value").await.unwrap_or(None);
            let label = Self::label_of(text, value);
            let handle = self.register(element).await;
            out.push(InteractiveElement { handle, label });
        }
        Ok(out)
    }

    async fn elements_with_id_fragment(
        &self,
        fragment: &str,
    ) -> Result<Vec<(ElementHandle, String)>, EngineError> {
        let found = self
            .driver
            .find_all(By::Css(format!("[id*='{fragment}']")))
            .await?;
        let mut out = Vec::with_capacity(found.len());
        for element in found {
            if let Some(id) = element.attr("id").await? {
                let handle = self.register(element).await;
                out.push((handle, id));
            }
        }
        Ok(out)
    }

    async fn is_displayed(&self, element: ElementHandle) -> Result<bool, EngineError> {
        Ok(self.element(element).await?.is_displayed().await?)
    }

    async fn is_enabled(&self, element: ElementHandle) -> Result<bool, EngineError> {
        Ok(self.element(element).await?.is_enabled().await?)
    }

    async fn click(&self, element: ElementHandle) -> Result<(), EngineError> {
        let element = self.element(element).await?;
        element.scroll_into_view().await?;
        element.click().await?;
        Ok(())
    }

    async fn fill(&self, element: ElementHandle, text: &str) -> Result<(), EngineError> {
        let element = self.element(element).await?;
        element.clear().await?;
        element.send_keys(text).await?;
        Ok(())
    }

    async fn select_value(&self, element: ElementHandle, value: &str) -> Result<(), EngineError> {
        let element = self.element(element).await?;
        let select = SelectElement::new(&element).await?;
        select.select_by_value(value).await?;
        Ok(())
    }

    async fn text_of(&self, element: ElementHandle) -> Result<String, EngineError> {
        Ok(self.element(element).await?.text().await?)
    }

    async fn page_contains_text(&self, needle: &str) -> Result<bool, EngineError> {
        let escaped = needle.replace('\'', "\\'");
        let found = self
            .driver
            .find_all(By::XPath(format!("//*[contains(text(), '{escaped}')]")))
            .await?;
        Ok(!found.is_empty())
    }
}
