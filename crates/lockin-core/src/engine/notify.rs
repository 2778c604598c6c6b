//! Best-effort desktop notifications.
//!
//! Delivery failures are logged at debug level and otherwise ignored; the
//! engine never waits on or reacts to a notification.

use std::process::{Command, Stdio};

pub trait Notifier {
    fn notify(&self, title: &str, message: &str);
}

/// Shells out to `osascript` on macOS and `notify-send` elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) {
        let mut cmd = if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                applescript_escape(message),
                applescript_escape(title)
            );
            let mut cmd = Command::new("osascript");
            cmd.args(["-e", &script]);
            cmd
        } else {
            let mut cmd = Command::new("notify-send");
            cmd.args([title, message]);
            cmd
        };

        let result = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match result {
            Ok(status) if !status.success() => {
                tracing::debug!(%status, "notification command failed");
            }
            Err(e) => tracing::debug!(error = %e, "notification command unavailable"),
            Ok(_) => {}
        }
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _title: &str, _message: &str) {}
}

fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_for_applescript() {
        assert_eq!(applescript_escape(r#"say "hi" \o/"#), r#"say \"hi\" \\o/"#);
    }
}
