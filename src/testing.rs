//! Scripted in-memory browser for exercising page objects without Chrome.
//!
//! A [`FakeBrowser`] holds tabs of [`FakePage`]s. Pages are trees of
//! [`FakeFrame`]s carrying [`FakeElement`]s that answer to locators by CSS
//! string, role/name, text or test id. Clicking an element can trigger
//! [`Effect`]s such as opening a popup tab or closing the current one, and
//! elements or frames can be made to "load late" by staying absent for a
//! number of polls. Every interaction is recorded with the tab it hit.

pub mod scenes;

use crate::browser::session::StorageState;
use crate::core::{BrowserDriver, ElementState, FrameInfo, FramePath, FrameSegment, Scope, TabId};
use crate::errors::{CheckoutError, Result};
use crate::locator::{Locator, TextMatch};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-screenshot";

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub url: String,
    pub root: FakeFrame,
}

impl FakePage {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            root: FakeFrame::new("", url.clone()),
            url,
        }
    }

    pub fn with(mut self, element: FakeElement) -> Self {
        self.root.elements.push(element);
        self
    }

    pub fn with_frame(mut self, frame: FakeFrame) -> Self {
        self.root.frames.push(frame);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.root.text = text.into();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeFrame {
    /// CSS selector the parent document locates this frame element with
    pub selector: String,
    pub url: String,
    pub elements: Vec<FakeElement>,
    pub frames: Vec<FakeFrame>,
    /// Raw body text not attached to any element
    pub text: String,
    /// Number of driver calls on the tab during which the frame is absent
    pub absent_polls: u32,
}

impl FakeFrame {
    pub fn new(selector: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_frame(mut self, frame: FakeFrame) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn appears_after(mut self, polls: u32) -> Self {
        self.absent_polls = polls;
        self
    }

    fn present(&self) -> bool {
        self.absent_polls == 0
    }
}

/// What a click does besides being recorded.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Open a new tab with this page, like `window.open`
    OpenPopup(FakePage),
    /// Close the tab the clicked element lives in
    CloseTab,
    /// Navigate the tab; registered routes supply the new page
    Navigate(String),
    /// Make the element with this key visible, in any tab
    Reveal(String),
    /// Detach the element with this key, in any tab
    Remove(String),
}

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub key: String,
    pub selectors: Vec<String>,
    pub role: Option<String>,
    pub name: String,
    pub text: String,
    pub test_id: Option<String>,
    pub visible: bool,
    pub checked: Option<bool>,
    pub value: String,
    /// Number of queries during which the element is absent
    pub absent_polls: u32,
    /// Number of non-forced clicks rejected as "intercepted"
    pub rejected_clicks: u32,
    pub on_click: Vec<Effect>,
}

impl FakeElement {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            visible: true,
            ..Default::default()
        }
    }

    pub fn css(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>, name: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self.name = name.into();
        if self.text.is_empty() && self.role.as_deref() != Some("textbox") {
            self.text = self.name.clone();
        }
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn test_id(mut self, id: impl Into<String>) -> Self {
        self.test_id = Some(id.into());
        self
    }

    pub fn checkbox(mut self, name: impl Into<String>, checked: bool) -> Self {
        self = self.role("checkbox", name);
        self.checked = Some(checked);
        self
    }

    /// A selectable non-checkbox element (payment method tile); clicking
    /// selects it.
    pub fn with_checked(mut self, selected: bool) -> Self {
        self.checked = Some(selected);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn appears_after(mut self, polls: u32) -> Self {
        self.absent_polls = polls;
        self
    }

    pub fn rejects_clicks(mut self, count: u32) -> Self {
        self.rejected_clicks = count;
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }

    fn matches(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Css(selector) => self.selectors.iter().any(|s| s == selector),
            Locator::Role { role, name } => {
                self.role.as_deref() == Some(role.as_str())
                    && name.as_ref().map_or(true, |n| n.matches(&self.name))
            }
            Locator::Text(text) => !self.text.is_empty() && text.matches(&self.text),
            Locator::TestId(id) => self.test_id.as_deref() == Some(id.as_str()),
            Locator::Filtered {
                base,
                has_text,
                has_not_text,
            } => {
                self.matches(base)
                    && has_text.as_ref().map_or(true, |t| contains_match(t, &self.text))
                    && !has_not_text.as_ref().map_or(false, |t| contains_match(t, &self.text))
            }
            Locator::AnyOf(locators) => locators.iter().any(|l| self.matches(l)),
        }
    }
}

// has-text filters match anywhere inside the element's text
fn contains_match(text: &TextMatch, candidate: &str) -> bool {
    match text {
        TextMatch::Exact(value) => candidate.contains(value.as_str()),
        other => other.matches(candidate),
    }
}

fn frame_element_matches(frame: &FakeFrame, locator: &Locator) -> bool {
    match locator {
        Locator::Css(selector) => frame.present() && frame.selector == *selector,
        Locator::AnyOf(locators) => locators.iter().any(|l| frame_element_matches(frame, l)),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Navigate,
    Click,
    Fill,
    Check,
    Press,
}

#[derive(Debug, Clone)]
pub struct Interaction {
    pub tab: TabId,
    pub frame: FramePath,
    pub kind: InteractionKind,
    pub target: String,
    pub value: Option<String>,
}

struct FakeTab {
    id: TabId,
    page: FakePage,
}

#[derive(Default)]
struct FakeState {
    tabs: Vec<FakeTab>,
    next_id: u32,
    routes: HashMap<String, FakePage>,
    interactions: Vec<Interaction>,
    screenshots: Vec<TabId>,
    applied_states: Vec<(TabId, StorageState)>,
    stored_state: StorageState,
    cleared: Vec<TabId>,
    isolated: Vec<TabId>,
}

impl FakeState {
    fn open(&mut self, page: FakePage) -> TabId {
        self.next_id += 1;
        let id = TabId::new(format!("tab-{}", self.next_id));
        self.tabs.push(FakeTab {
            id: id.clone(),
            page,
        });
        id
    }

    fn tab_mut(&mut self, id: &TabId) -> Result<&mut FakeTab> {
        self.tabs
            .iter_mut()
            .find(|t| t.id == *id)
            .ok_or_else(|| CheckoutError::TabClosed(id.to_string()))
    }

    fn record(&mut self, scope: &Scope, kind: InteractionKind, target: String, value: Option<String>) {
        self.interactions.push(Interaction {
            tab: scope.tab.clone(),
            frame: scope.frame.clone(),
            kind,
            target,
            value,
        });
    }

    fn apply(&mut self, origin: &TabId, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenPopup(page) => {
                    self.open(page);
                }
                Effect::CloseTab => self.tabs.retain(|t| t.id != *origin),
                Effect::Navigate(url) => {
                    let page = self
                        .routes
                        .get(&url)
                        .cloned()
                        .unwrap_or_else(|| FakePage::new(url.clone()));
                    if let Ok(tab) = self.tab_mut(origin) {
                        tab.page = FakePage { url, ..page };
                    }
                }
                Effect::Reveal(key) => {
                    for tab in &mut self.tabs {
                        for_each_element(&mut tab.page.root, &mut |el| {
                            if el.key == key {
                                el.visible = true;
                                el.absent_polls = 0;
                            }
                        });
                    }
                }
                Effect::Remove(key) => {
                    for tab in &mut self.tabs {
                        remove_element(&mut tab.page.root, &key);
                    }
                }
            }
        }
    }
}

fn for_each_element(frame: &mut FakeFrame, f: &mut dyn FnMut(&mut FakeElement)) {
    for element in &mut frame.elements {
        f(element);
    }
    for child in &mut frame.frames {
        for_each_element(child, f);
    }
}

fn find_element(frame: &FakeFrame, key: &str) -> Option<FakeElement> {
    frame
        .elements
        .iter()
        .find(|e| e.key == key)
        .cloned()
        .or_else(|| frame.frames.iter().find_map(|f| find_element(f, key)))
}

fn remove_element(frame: &mut FakeFrame, key: &str) {
    frame.elements.retain(|e| e.key != key);
    for child in &mut frame.frames {
        remove_element(child, key);
    }
}

fn tick_frames(frame: &mut FakeFrame) {
    for child in &mut frame.frames {
        if child.absent_polls > 0 {
            child.absent_polls -= 1;
        } else {
            tick_frames(child);
        }
    }
}

fn child_index(frame: &FakeFrame, segment: &FrameSegment) -> Option<usize> {
    let mut present = frame
        .frames
        .iter()
        .enumerate()
        .filter(|(_, f)| f.present());
    match segment {
        FrameSegment::Css(selector) => present.find(|(_, f)| f.selector == *selector).map(|(i, _)| i),
        FrameSegment::Index(n) => present.nth(*n).map(|(i, _)| i),
    }
}

fn frame_mut<'a>(root: &'a mut FakeFrame, path: &FramePath) -> Result<&'a mut FakeFrame> {
    let mut current = root;
    for segment in &path.0 {
        let index = child_index(current, segment)
            .ok_or_else(|| CheckoutError::FrameNotFound(format!("{:?}", path)))?;
        current = &mut current.frames[index];
    }
    Ok(current)
}

fn collect_frames(frame: &FakeFrame, path: &FramePath, out: &mut Vec<FrameInfo>) {
    for (n, child) in frame.frames.iter().filter(|f| f.present()).enumerate() {
        let child_path = path.child(FrameSegment::Index(n));
        out.push(FrameInfo {
            path: child_path.clone(),
            url: child.url.clone(),
        });
        collect_frames(child, &child_path, out);
    }
}

/// Indices of elements currently matching, consuming one absent poll from
/// late elements.
fn matching(frame: &mut FakeFrame, locator: &Locator) -> Vec<usize> {
    let mut found = Vec::new();
    for (i, element) in frame.elements.iter_mut().enumerate() {
        if !element.matches(locator) {
            continue;
        }
        if element.absent_polls > 0 {
            element.absent_polls -= 1;
            continue;
        }
        found.push(i);
    }
    found
}

pub struct FakeBrowser {
    state: Mutex<FakeState>,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Serve `page` whenever a tab navigates to `url`.
    pub async fn route(&self, url: impl Into<String>, page: FakePage) {
        self.state.lock().await.routes.insert(url.into(), page);
    }

    /// Open a tab showing `page` directly.
    pub async fn open_page(&self, page: FakePage) -> TabId {
        self.state.lock().await.open(page)
    }

    /// Replace the content of an existing tab.
    pub async fn load(&self, tab: &TabId, page: FakePage) -> Result<()> {
        let mut state = self.state.lock().await;
        state.tab_mut(tab)?.page = page;
        Ok(())
    }

    pub async fn set_stored_state(&self, storage: StorageState) {
        self.state.lock().await.stored_state = storage;
    }

    pub async fn interactions(&self) -> Vec<Interaction> {
        self.state.lock().await.interactions.clone()
    }

    pub async fn screenshot_count(&self) -> usize {
        self.state.lock().await.screenshots.len()
    }

    pub async fn tab_ids(&self) -> Vec<TabId> {
        self.state.lock().await.tabs.iter().map(|t| t.id.clone()).collect()
    }

    pub async fn applied_states(&self) -> Vec<(TabId, StorageState)> {
        self.state.lock().await.applied_states.clone()
    }

    pub async fn cleared_tabs(&self) -> Vec<TabId> {
        self.state.lock().await.cleared.clone()
    }

    /// Tabs opened in their own browsing context.
    pub async fn isolated_tabs(&self) -> Vec<TabId> {
        self.state.lock().await.isolated.clone()
    }

    /// Current copy of the element with `key`, searching every tab.
    pub async fn element(&self, key: &str) -> Option<FakeElement> {
        let state = self.state.lock().await;
        state.tabs.iter().find_map(|t| find_element(&t.page.root, key))
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn new_tab(&self) -> Result<TabId> {
        Ok(self.state.lock().await.open(FakePage::new("about:blank")))
    }

    async fn new_isolated_tab(&self) -> Result<TabId> {
        let mut state = self.state.lock().await;
        let tab = state.open(FakePage::new("about:blank"));
        state.isolated.push(tab.clone());
        Ok(tab)
    }

    async fn tabs(&self) -> Result<Vec<TabId>> {
        Ok(self.tab_ids().await)
    }

    async fn close_tab(&self, tab: &TabId) -> Result<()> {
        let mut state = self.state.lock().await;
        let before = state.tabs.len();
        state.tabs.retain(|t| t.id != *tab);
        if state.tabs.len() == before {
            return Err(CheckoutError::TabClosed(tab.to_string()));
        }
        Ok(())
    }

    async fn navigate(&self, tab: &TabId, url: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.tab_mut(tab)?;
        state.record(&Scope::page(tab), InteractionKind::Navigate, url.to_string(), None);
        state.apply(tab, vec![Effect::Navigate(url.to_string())]);
        Ok(())
    }

    async fn url(&self, tab: &TabId) -> Result<String> {
        let mut state = self.state.lock().await;
        Ok(state.tab_mut(tab)?.page.url.clone())
    }

    async fn ready_state(&self, tab: &TabId) -> Result<String> {
        let mut state = self.state.lock().await;
        state.tab_mut(tab)?;
        Ok("complete".to_string())
    }

    async fn frames(&self, tab: &TabId) -> Result<Vec<FrameInfo>> {
        let mut state = self.state.lock().await;
        let root = &mut state.tab_mut(tab)?.page.root;
        let mut frames = Vec::new();
        collect_frames(root, &FramePath::main(), &mut frames);
        tick_frames(root);
        Ok(frames)
    }

    async fn query(&self, scope: &Scope, locator: &Locator) -> Result<ElementState> {
        let mut state = self.state.lock().await;
        let root = &mut state.tab_mut(&scope.tab)?.page.root;
        let result = frame_mut(root, &scope.frame).map(|frame| {
            let hits = matching(frame, locator);
            let frame_hits = frame
                .frames
                .iter()
                .filter(|f| frame_element_matches(f, locator))
                .count();
            let first = hits
                .iter()
                .map(|&i| &frame.elements[i])
                .find(|e| e.visible)
                .or_else(|| hits.first().map(|&i| &frame.elements[i]));
            ElementState {
                count: hits.len() + frame_hits,
                visible: first.map_or(false, |e| e.visible) || frame_hits > 0,
                checked: first.and_then(|e| e.checked),
                text: first.map(|e| e.text.clone()),
            }
        });
        tick_frames(root);
        result
    }

    async fn click(&self, scope: &Scope, locator: &Locator, force: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let frame = frame_mut(&mut state.tab_mut(&scope.tab)?.page.root, &scope.frame)?;
        let hits = matching(frame, locator);
        let index = hits
            .iter()
            .copied()
            .find(|&i| frame.elements[i].visible)
            .or_else(|| if force { hits.first().copied() } else { None })
            .ok_or_else(|| CheckoutError::NotInteractable(locator.to_string()))?;

        let element = &mut frame.elements[index];
        if element.rejected_clicks > 0 && !force {
            element.rejected_clicks -= 1;
            return Err(CheckoutError::NotInteractable(format!(
                "{} (click intercepted)",
                locator
            )));
        }
        // checkboxes toggle; selectable tiles only ever become selected
        if element.role.as_deref() == Some("checkbox") {
            element.checked = Some(!element.checked.unwrap_or(false));
        } else if element.checked == Some(false) {
            element.checked = Some(true);
        }
        let effects = element.on_click.clone();

        state.record(scope, InteractionKind::Click, locator.to_string(), None);
        state.apply(&scope.tab, effects);
        Ok(())
    }

    async fn fill(&self, scope: &Scope, locator: &Locator, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let frame = frame_mut(&mut state.tab_mut(&scope.tab)?.page.root, &scope.frame)?;
        let index = matching(frame, locator)
            .into_iter()
            .find(|&i| frame.elements[i].visible)
            .ok_or_else(|| CheckoutError::NotInteractable(locator.to_string()))?;
        frame.elements[index].value = value.to_string();

        state.record(scope, InteractionKind::Fill, locator.to_string(), Some(value.to_string()));
        Ok(())
    }

    async fn check(&self, scope: &Scope, locator: &Locator) -> Result<()> {
        let mut state = self.state.lock().await;
        let frame = frame_mut(&mut state.tab_mut(&scope.tab)?.page.root, &scope.frame)?;
        let index = matching(frame, locator)
            .into_iter()
            .find(|&i| frame.elements[i].visible)
            .ok_or_else(|| CheckoutError::NotInteractable(locator.to_string()))?;
        frame.elements[index].checked = Some(true);

        state.record(scope, InteractionKind::Check, locator.to_string(), None);
        Ok(())
    }

    async fn press(&self, scope: &Scope, locator: &Locator, key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let frame = frame_mut(&mut state.tab_mut(&scope.tab)?.page.root, &scope.frame)?;
        if matching(frame, locator).is_empty() {
            return Err(CheckoutError::NotInteractable(locator.to_string()));
        }
        state.record(scope, InteractionKind::Press, locator.to_string(), Some(key.to_string()));
        Ok(())
    }

    async fn inner_text(&self, scope: &Scope) -> Result<String> {
        let mut state = self.state.lock().await;
        let frame = frame_mut(&mut state.tab_mut(&scope.tab)?.page.root, &scope.frame)?;
        let mut lines: Vec<&str> = frame
            .elements
            .iter()
            .filter(|e| e.visible && e.absent_polls == 0 && !e.text.is_empty())
            .map(|e| e.text.as_str())
            .collect();
        if !frame.text.is_empty() {
            lines.push(frame.text.as_str());
        }
        Ok(lines.join("\n"))
    }

    async fn screenshot(&self, tab: &TabId) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        state.tab_mut(tab)?;
        state.screenshots.push(tab.clone());
        Ok(FAKE_PNG.to_vec())
    }

    async fn storage_state(&self, tab: &TabId) -> Result<StorageState> {
        let mut state = self.state.lock().await;
        state.tab_mut(tab)?;
        Ok(state.stored_state.clone())
    }

    async fn apply_storage_state(&self, tab: &TabId, storage: &StorageState) -> Result<()> {
        let mut state = self.state.lock().await;
        state.tab_mut(tab)?;
        state.applied_states.push((tab.clone(), storage.clone()));
        Ok(())
    }

    async fn clear_storage(&self, tab: &TabId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.tab_mut(tab)?;
        state.cleared.push(tab.clone());
        Ok(())
    }
}
