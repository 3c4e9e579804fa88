//! Browser automation capability
//!
//! The runner talks to a browser only through [`Driver`]. Concrete drivers
//! (WebDriver clients and the like) live outside this crate; the
//! [`dry_run`] driver performs no browser work and is used by the CLI.

pub mod dry_run;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::tree::Locator;

pub use dry_run::{DriverCall, DryRunDriver, DryRunFactory};

/// Browser a scenario is written for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
    InternetExplorer,
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserKind::Chrome => write!(f, "chrome"),
            BrowserKind::Firefox => write!(f, "firefox"),
            BrowserKind::InternetExplorer => write!(f, "internet explorer"),
        }
    }
}

/// Handle to an element found by [`Driver::find_element`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    /// Driver-specific element id
    pub id: String,
    /// Search that produced the element
    pub locator: Locator,
}

/// Remote-controlled browser session
///
/// Every call may fail; the runner turns failures into a failed node.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Load `url` in the current window
    async fn navigate(&self, url: &str) -> Result<()>;

    /// First element matching `locator`
    async fn find_element(&self, locator: &Locator) -> Result<ElementRef>;

    async fn click(&self, element: &ElementRef) -> Result<()>;

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()>;

    /// End the session; called exactly once per run
    async fn quit(&self) -> Result<()>;
}

/// Source of driver sessions
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Start a session for `browser`
    async fn create(&self, browser: BrowserKind) -> Result<Arc<dyn Driver>>;
}
