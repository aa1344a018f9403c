use crate::core::TabId;
use tracing::info;

/// Which tab page objects are currently operating on.
///
/// Popups take over the role of current target while a third-party flow runs
/// in them; `restore` hands control back to the tab the scenario started in.
#[derive(Debug, Clone)]
pub struct ActiveTarget {
    home: TabId,
    current: TabId,
}

impl ActiveTarget {
    pub fn new(home: TabId) -> Self {
        Self {
            current: home.clone(),
            home,
        }
    }

    pub fn current(&self) -> &TabId {
        &self.current
    }

    pub fn home(&self) -> &TabId {
        &self.home
    }

    pub fn switch_to(&mut self, tab: TabId) {
        if tab != self.current {
            info!("Switching active target {} -> {}", self.current, tab);
            self.current = tab;
        }
    }

    pub fn restore(&mut self) {
        let home = self.home.clone();
        self.switch_to(home);
    }

    pub fn is_on_home(&self) -> bool {
        self.current == self.home
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popup_takes_over_then_hands_back() {
        let mut target = ActiveTarget::new(TabId::new("main"));
        target.switch_to(TabId::new("popup"));
        assert_eq!(target.current(), &TabId::new("popup"));
        assert!(!target.is_on_home());

        target.restore();
        assert_eq!(target.current(), &TabId::new("main"));
        assert!(target.is_on_home());
    }
}
