pub mod browser;
pub mod config;

pub use browser::{BrowserDriver, ElementState, FrameInfo, FramePath, FrameSegment, Scope, TabId};
pub use config::Config;
