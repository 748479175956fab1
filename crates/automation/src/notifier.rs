//! Best-effort desktop notifications for task events.

use tracing::{debug, warn};

pub const NOTIFICATION_TITLE: &str = "StarBot Automation";

pub trait Notifier: Send + Sync {
    /// Fire and forget. Returns whether a notification was dispatched.
    fn notify(&self, message: &str) -> bool;
}

/// Shows an OS notification through the platform's stock tooling.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNotifier;

impl SystemNotifier {
    fn command(message: &str) -> Option<tokio::process::Command> {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                message.replace('"', "\\\""),
                NOTIFICATION_TITLE
            );
            let mut cmd = tokio::process::Command::new("osascript");
            cmd.arg("-e").arg(script);
            Some(cmd)
        } else if cfg!(target_os = "windows") {
            let script = format!(
                "[reflection.assembly]::loadwithpartialname('System.Windows.Forms') | Out-Null; \
                 [System.Windows.Forms.MessageBox]::Show('{}','{}') | Out-Null",
                message.replace('\'', "''"),
                NOTIFICATION_TITLE
            );
            let mut cmd = tokio::process::Command::new("powershell.exe");
            cmd.args(["-NoProfile", "-Command", &script]);
            Some(cmd)
        } else if cfg!(unix) {
            let mut cmd = tokio::process::Command::new("notify-send");
            cmd.arg(NOTIFICATION_TITLE).arg(message);
            Some(cmd)
        } else {
            None
        }
    }
}

impl Notifier for SystemNotifier {
    fn notify(&self, message: &str) -> bool {
        let message = message.trim();
        if message.is_empty() {
            return false;
        }
        let Some(mut cmd) = Self::command(message) else {
            return false;
        };
        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        match cmd.spawn() {
            Ok(_child) => {
                debug!(message, "Dispatched system notification");
                true
            }
            Err(e) => {
                warn!(error = %e, "System notification unavailable");
                false
            }
        }
    }
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _message: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_never_dispatches() {
        assert!(!NoopNotifier.notify("hello"));
    }

    #[tokio::test]
    async fn empty_message_is_skipped() {
        assert!(!SystemNotifier.notify("   "));
    }
}
