#[cfg(feature = "chrome")]
pub mod chrome;
pub mod navigation;
#[cfg(feature = "chrome")]
pub mod scripts;
pub mod session;

#[cfg(feature = "chrome")]
pub use chrome::ChromeDriver;
pub use navigation::{wait_for_load_state, LoadState, NavigationResult};
pub use session::{capture_login_state, ScenarioSession, StorageState};
