use crate::browser::session::ScenarioSession;
use crate::core::TabId;
use crate::detector::Detection;
use crate::errors::Result;
use crate::pages::{CheckoutPage, LoginPage, PageContext, PaymentFlow, WebstorePage};
use crate::target::ActiveTarget;

/// Per-scenario state handed to every step: the browser session, the
/// active target and whatever earlier steps produced.
pub struct ScenarioWorld {
    pub ctx: PageContext,
    pub target: ActiveTarget,
    pub flow: Option<PaymentFlow>,
    pub last_detection: Option<Detection>,
    session: ScenarioSession,
}

impl ScenarioWorld {
    pub async fn open(ctx: PageContext) -> Result<Self> {
        let session =
            ScenarioSession::open(ctx.driver.clone(), ctx.config.paths.storage_state.as_deref()).await?;
        Ok(Self {
            target: ActiveTarget::new(session.home().clone()),
            ctx,
            flow: None,
            last_detection: None,
            session,
        })
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn current_tab(&self) -> &TabId {
        self.target.current()
    }

    pub fn login(&self) -> LoginPage<'_> {
        LoginPage::new(&self.ctx, self.target.home())
    }

    pub fn webstore(&self) -> WebstorePage<'_> {
        WebstorePage::new(&self.ctx, self.target.home())
    }

    pub fn checkout(&mut self) -> CheckoutPage<'_> {
        CheckoutPage::new(&self.ctx, &mut self.target)
    }

    pub async fn close(self) -> Result<()> {
        self.session.close().await
    }
}
