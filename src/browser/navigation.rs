use crate::core::{BrowserDriver, TabId};
use crate::errors::{CheckoutError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// How far a page has to get before a flow continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    Load,
    /// `load` plus a quiet period with no further document changes
    NetworkIdle,
}

const NETWORK_IDLE_SETTLE: Duration = Duration::from_millis(500);
const POLL: Duration = Duration::from_millis(50);

impl LoadState {
    fn reached(self, ready_state: &str) -> bool {
        match self {
            LoadState::DomContentLoaded => matches!(ready_state, "interactive" | "complete"),
            LoadState::Load | LoadState::NetworkIdle => ready_state == "complete",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub ready_state: String,
    pub duration_ms: u64,
}

/// Poll `document.readyState` until `state` is reached. For `NetworkIdle`
/// the page must also stay complete, on the same URL, for a settle period.
pub async fn wait_for_load_state(
    driver: &dyn BrowserDriver,
    tab: &TabId,
    state: LoadState,
    timeout: Duration,
) -> Result<NavigationResult> {
    let start = Instant::now();
    let deadline = start + timeout;
    let mut settled_since: Option<(Instant, String)> = None;

    loop {
        // a popup can still be attaching its document; treat that as "not yet"
        let ready = match driver.ready_state(tab).await {
            Ok(ready) => ready,
            Err(e) if e.is_transient() => String::new(),
            Err(e) => return Err(e),
        };

        if state.reached(&ready) {
            let url = driver.url(tab).await?;
            if state != LoadState::NetworkIdle {
                return Ok(finish(start, url, ready));
            }
            match &settled_since {
                Some((since, seen)) if *seen == url => {
                    if since.elapsed() >= NETWORK_IDLE_SETTLE {
                        return Ok(finish(start, url, ready));
                    }
                }
                _ => settled_since = Some((Instant::now(), url)),
            }
        } else {
            settled_since = None;
        }

        if Instant::now() >= deadline {
            return Err(CheckoutError::Timeout {
                what: format!("{:?} on tab {} (readyState {:?})", state, tab, ready),
                timeout,
            });
        }
        tokio::time::sleep(POLL).await;
    }
}

fn finish(start: Instant, url: String, ready_state: String) -> NavigationResult {
    let duration_ms = start.elapsed().as_millis() as u64;
    debug!("Load state reached on {} after {}ms", url, duration_ms);
    NavigationResult {
        url,
        ready_state,
        duration_ms,
    }
}
