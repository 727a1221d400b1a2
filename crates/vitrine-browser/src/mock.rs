//! Scripted automation page for testing relays without a browser.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::BrowserError;
use crate::page::AutomationPage;

/// Records every dispatched call; failure modes are switchable so tests
/// can exercise the degraded paths.
#[derive(Default)]
pub struct MockPage {
    calls: Mutex<Vec<String>>,
    fail_dispatch: AtomicBool,
    fail_capture: AtomicBool,
    fail_ack: AtomicBool,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every input/navigation dispatch fails.
    pub fn with_dispatch_failure() -> Self {
        let mock = Self::default();
        mock.fail_dispatch.store(true, Ordering::Relaxed);
        mock
    }

    /// Every screenshot/document request fails.
    pub fn with_capture_failure() -> Self {
        let mock = Self::default();
        mock.fail_capture.store(true, Ordering::Relaxed);
        mock
    }

    pub fn set_dispatch_failure(&self, fail: bool) {
        self.fail_dispatch.store(fail, Ordering::Relaxed);
    }

    pub fn set_capture_failure(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::Relaxed);
    }

    pub fn set_ack_failure(&self, fail: bool) {
        self.fail_ack.store(fail, Ordering::Relaxed);
    }

    /// Calls that reached the page, in dispatch order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn dispatch(&self, call: String) -> Result<(), BrowserError> {
        if self.fail_dispatch.load(Ordering::Relaxed) {
            return Err(BrowserError::ActionFailed {
                action: call,
                reason: "mock dispatch failure".into(),
            });
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl AutomationPage for MockPage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.dispatch(format!("navigate {url}"))
    }

    async fn go_back(&self) -> Result<(), BrowserError> {
        self.dispatch("go_back".into())
    }

    async fn go_forward(&self) -> Result<(), BrowserError> {
        self.dispatch("go_forward".into())
    }

    async fn reload(&self) -> Result<(), BrowserError> {
        self.dispatch("reload".into())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.dispatch(format!("mouse_move {x} {y}"))
    }

    async fn mouse_down(&self) -> Result<(), BrowserError> {
        self.dispatch("mouse_down".into())
    }

    async fn mouse_up(&self) -> Result<(), BrowserError> {
        self.dispatch("mouse_up".into())
    }

    async fn wheel(&self, delta_x: f64, delta_y: f64) -> Result<(), BrowserError> {
        self.dispatch(format!("wheel {delta_x} {delta_y}"))
    }

    async fn press_key(&self, key: &str) -> Result<(), BrowserError> {
        self.dispatch(format!("press_key {key}"))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        if self.fail_capture.load(Ordering::Relaxed) {
            return Err(BrowserError::ActionFailed {
                action: "screenshot".into(),
                reason: "mock capture failure".into(),
            });
        }
        self.calls.lock().push("screenshot".into());
        Ok(b"\x89PNG mock image bytes".to_vec())
    }

    async fn document_html(&self) -> Result<String, BrowserError> {
        if self.fail_capture.load(Ordering::Relaxed) {
            return Err(BrowserError::ActionFailed {
                action: "document_html".into(),
                reason: "mock capture failure".into(),
            });
        }
        self.calls.lock().push("document_html".into());
        Ok("<html><body>mock</body></html>".into())
    }

    async fn start_screencast(&self) -> Result<(), BrowserError> {
        self.calls.lock().push("start_screencast".into());
        Ok(())
    }

    async fn stop_screencast(&self) -> Result<(), BrowserError> {
        self.calls.lock().push("stop_screencast".into());
        Ok(())
    }

    async fn ack_frame(&self, token: u64) -> Result<(), BrowserError> {
        if self.fail_ack.load(Ordering::Relaxed) {
            return Err(BrowserError::ActionFailed {
                action: format!("ack {token}"),
                reason: "mock ack failure".into(),
            });
        }
        self.calls.lock().push(format!("ack {token}"));
        Ok(())
    }

    async fn close(&self) {
        self.calls.lock().push("close".into());
    }
}
