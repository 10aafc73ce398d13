//! The seam between the engine and whatever renders the page.
//!
//! Everything above this trait is deterministic state-machine logic; everything
//! below it talks to a real browser. Tests substitute a scripted fake.

use async_trait::async_trait;

use crate::errors::EngineError;

/// Opaque reference to one resolved page control. Valid only for the page it
/// was resolved on; backends may invalidate handles across navigations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub(crate) u64);

impl ElementHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// One interactive control as seen by the keyword-scan locator tier.
#[derive(Debug, Clone)]
pub struct InteractiveElement {
    pub handle: ElementHandle,
    /// Visible label: inner text for links/buttons, `value` for inputs.
    pub label: String,
}

/// Minimal browser surface the engine needs. One implementation drives a real
/// WebDriver session; tests provide a scripted in-memory portal.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), EngineError>;

    /// True once the document root exists and the page script engine reports
    /// the document fully loaded.
    async fn dom_ready(&self) -> Result<bool, EngineError>;

    async fn current_url(&self) -> Result<String, EngineError>;

    /// Resolve a control by its stable identifier. `None` when absent.
    async fn find_by_id(&self, id: &str) -> Result<Option<ElementHandle>, EngineError>;

    /// Resolve a link-like control whose visible text contains `text`.
    async fn find_by_link_text(&self, text: &str) -> Result<Option<ElementHandle>, EngineError>;

    /// All links, buttons and submit-type inputs on the page, in document order.
    async fn interactive_elements(&self) -> Result<Vec<InteractiveElement>, EngineError>;

    /// All controls whose identifier contains `fragment`, with their full ids,
    /// in document order. Used to enumerate listing rows.
    async fn elements_with_id_fragment(
        &self,
        fragment: &str,
    ) -> Result<Vec<(ElementHandle, String)>, EngineError>;

    async fn is_displayed(&self, element: ElementHandle) -> Result<bool, EngineError>;

    async fn is_enabled(&self, element: ElementHandle) -> Result<bool, EngineError>;

    async fn click(&self, element: ElementHandle) -> Result<(), EngineError>;

    /// Clear the control, then type `text` into it.
    async fn fill(&self, element: ElementHandle, text: &str) -> Result<(), EngineError>;

    /// Select the option with the given `value` attribute on a dropdown.
    async fn select_value(&self, element: ElementHandle, value: &str) -> Result<(), EngineError>;

    async fn text_of(&self, element: ElementHandle) -> Result<String, EngineError>;

    /// True when any element's visible text contains `needle`.
    async fn page_contains_text(&self, needle: &str) -> Result<bool, EngineError>;
}
