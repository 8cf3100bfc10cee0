use anyhow::{anyhow, Context, Result};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

pub trait Notifier {
    fn notify(&self, notification: Notification);
}

pub trait Clipboard {
    fn copy(&self, text: &str) -> Result<()>;
}

/// Desktop notifications through the platform notification service.
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, notification: Notification) {
        let result = notify_rust::Notification::new()
            .appname(&self.app_name)
            .summary(&notification.title)
            .body(&notification.body)
            .show();

        if let Err(e) = result {
            tracing::warn!(error = %e, title = %notification.title, "Failed to show notification");
        }
    }
}

/// System clipboard. The handle is kept open because on X11 the copied
/// text only lives as long as its owner.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Mutex<Option<arboard::Clipboard>>,
}

impl Clipboard for SystemClipboard {
    fn copy(&self, text: &str) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("Clipboard lock poisoned"))?;
        let clipboard = match guard.take() {
            Some(clipboard) => clipboard,
            None => arboard::Clipboard::new().context("Failed to access clipboard")?,
        };
        let clipboard = guard.insert(clipboard);
        clipboard
            .set_text(text)
            .context("Failed to copy text to clipboard")?;
        Ok(())
    }
}

/// The user-facing side effects of the app, bundled behind the two ports.
pub struct SideEffects {
    notifier: Box<dyn Notifier>,
    clipboard: Box<dyn Clipboard>,
}

impl SideEffects {
    pub fn new(notifier: Box<dyn Notifier>, clipboard: Box<dyn Clipboard>) -> Self {
        Self {
            notifier,
            clipboard,
        }
    }

    pub fn desktop() -> Self {
        Self::new(
            Box::new(DesktopNotifier::new("Trayshot")),
            Box::new(SystemClipboard::default()),
        )
    }

    pub fn notify(&self, title: &str, body: &str) {
        tracing::debug!(title, body, "Notify");
        self.notifier.notify(Notification::new(title, body));
    }

    /// Returns false when the clipboard could not be written.
    pub fn copy(&self, text: &str) -> bool {
        match self.clipboard.copy(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Clipboard write failed");
                false
            }
        }
    }

    pub fn not_allowed(&self) {
        self.notify("Not allowed!", "Only images are allowed.");
    }

    pub fn upload_completed(&self, copied: bool) {
        if copied {
            self.notify("Upload complete!", "URL copied to clipboard.");
        } else {
            self.notify("Upload complete!", "Could not copy the URL to the clipboard.");
        }
    }

    pub fn upload_failed(&self, reason: &str) {
        self.notify("Upload failed", reason);
    }

    /// Re-copy of a previously uploaded URL.
    pub fn copy_url(&self, url: &str) {
        if self.copy(url) {
            self.notify("Copied!", "URL copied to clipboard.");
        } else {
            self.notify("Copy failed", "Could not copy the URL to the clipboard.");
        }
    }

    pub fn nothing_uploaded(&self) {
        self.notify("Nothing to copy", "No uploads yet.");
    }
}
