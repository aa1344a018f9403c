use crate::browser::session::StorageState;
use crate::errors::Result;
use crate::locator::Locator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a browser tab (a CDP target id for Chrome).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(pub String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        TabId(id.into())
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One hop from a document into a child frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameSegment {
    /// First frame element matching the CSS selector.
    Css(String),
    /// N-th `iframe`/`frame` element of the document.
    Index(usize),
}

/// Path from a tab's main document down to a (possibly nested) frame.
/// The empty path is the main document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePath(pub Vec<FrameSegment>);

impl FramePath {
    pub fn main() -> Self {
        FramePath(Vec::new())
    }

    pub fn is_main(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, segment: FrameSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        FramePath(segments)
    }
}

/// A document a locator is evaluated against: a tab plus a frame path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub tab: TabId,
    pub frame: FramePath,
}

impl Scope {
    pub fn page(tab: &TabId) -> Self {
        Self {
            tab: tab.clone(),
            frame: FramePath::main(),
        }
    }

    pub fn frame(tab: &TabId, frame: FramePath) -> Self {
        Self {
            tab: tab.clone(),
            frame,
        }
    }

    /// Scope of the first frame element matching `selector` inside this scope.
    pub fn descend(&self, selector: &str) -> Self {
        Self {
            tab: self.tab.clone(),
            frame: self.frame.child(FrameSegment::Css(selector.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameInfo {
    pub path: FramePath,
    pub url: String,
}

/// Snapshot of what a locator currently resolves to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    pub count: usize,
    pub visible: bool,
    pub checked: Option<bool>,
    pub text: Option<String>,
}

impl ElementState {
    pub fn attached(&self) -> bool {
        self.count > 0
    }
}

/// Everything page objects need from a browser.
///
/// Implemented by the headless Chrome driver and by the in-memory
/// `testing::FakeBrowser`. Operations are addressed by tab and scope rather
/// than by a hidden "current page", so the caller always states which target
/// it is working on.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a fresh tab
    async fn new_tab(&self) -> Result<TabId>;

    /// Open a tab in a new browsing context that shares no cookies or
    /// storage with any other tab. Popups it opens join its context.
    async fn new_isolated_tab(&self) -> Result<TabId>;

    /// All open tabs, including popups opened by pages
    async fn tabs(&self) -> Result<Vec<TabId>>;

    async fn close_tab(&self, tab: &TabId) -> Result<()>;

    /// Navigate and wait for the navigation to commit
    async fn navigate(&self, tab: &TabId, url: &str) -> Result<()>;

    async fn url(&self, tab: &TabId) -> Result<String>;

    /// `document.readyState` of the tab's main document
    async fn ready_state(&self, tab: &TabId) -> Result<String>;

    /// Child frames of the tab, re-enumerated on every call
    async fn frames(&self, tab: &TabId) -> Result<Vec<FrameInfo>>;

    async fn query(&self, scope: &Scope, locator: &Locator) -> Result<ElementState>;

    /// Click the first visible match. `force` skips the visibility requirement.
    async fn click(&self, scope: &Scope, locator: &Locator, force: bool) -> Result<()>;

    /// Replace the value of the first visible match
    async fn fill(&self, scope: &Scope, locator: &Locator, value: &str) -> Result<()>;

    /// Check a checkbox; no-op if it is already checked
    async fn check(&self, scope: &Scope, locator: &Locator) -> Result<()>;

    async fn press(&self, scope: &Scope, locator: &Locator, key: &str) -> Result<()>;

    /// Rendered text of the scope's body
    async fn inner_text(&self, scope: &Scope) -> Result<String>;

    /// Full-page PNG
    async fn screenshot(&self, tab: &TabId) -> Result<Vec<u8>>;

    async fn storage_state(&self, tab: &TabId) -> Result<StorageState>;

    async fn apply_storage_state(&self, tab: &TabId, state: &StorageState) -> Result<()>;

    /// Drop cookies and web storage visible to the tab
    async fn clear_storage(&self, tab: &TabId) -> Result<()>;
}
