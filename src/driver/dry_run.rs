//! Driver that performs no browser work
//!
//! Each call is traced and recorded, every non-empty locator resolves to a
//! synthetic element. Useful for checking a scenario's structure and variables without
//! a browser.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BrowserKind, Driver, DriverFactory, ElementRef};
use crate::common::{Error, Result};
use crate::tree::Locator;

/// A call received by a [`DryRunDriver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Navigate(String),
    FindElement(Locator),
    Click(String),
    SendKeys { element: String, text: String },
    Quit,
}

#[derive(Debug)]
pub struct DryRunDriver {
    browser: BrowserKind,
    next_element: AtomicU64,
    calls: Mutex<Vec<DriverCall>>,
}

impl DryRunDriver {
    pub fn new(browser: BrowserKind) -> Self {
        Self {
            browser,
            next_element: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn browser(&self) -> BrowserKind {
        self.browser
    }

    /// Calls received so far, oldest first
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: DriverCall) {
        tracing::debug!(browser = %self.browser, ?call, "dry-run driver call");
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Driver for DryRunDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(DriverCall::Navigate(url.to_string()));
        Ok(())
    }

    async fn find_element(&self, locator: &Locator) -> Result<ElementRef> {
        self.record(DriverCall::FindElement(locator.clone()));
        if locator.value.trim().is_empty() {
            return Err(Error::driver_command("find_element", "empty locator"));
        }
        let n = self.next_element.fetch_add(1, Ordering::Relaxed);
        Ok(ElementRef {
            id: format!("dry-{}", n),
            locator: locator.clone(),
        })
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        self.record(DriverCall::Click(element.id.clone()));
        Ok(())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
        self.record(DriverCall::SendKeys {
            element: element.id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        self.record(DriverCall::Quit);
        Ok(())
    }
}

/// Factory handing out [`DryRunDriver`]s
///
/// Keeps the most recent session so callers can inspect what a run did.
#[derive(Debug, Default)]
pub struct DryRunFactory {
    last: Mutex<Option<Arc<DryRunDriver>>>,
}

impl DryRunFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session created by the latest [`DriverFactory::create`]
    pub fn last_session(&self) -> Option<Arc<DryRunDriver>> {
        self.last.lock().clone()
    }
}

#[async_trait]
impl DriverFactory for DryRunFactory {
    async fn create(&self, browser: BrowserKind) -> Result<Arc<dyn Driver>> {
        let driver = Arc::new(DryRunDriver::new(browser));
        *self.last.lock() = Some(driver.clone());
        Ok(driver)
    }
}
