//! Thin async wrapper over the `tmux(1)` CLI: the only place permitted to talk
//! to the multiplexer (SPEC_FULL.md §4.1).

use orc_core::Error;
use tokio::process::Command;

async fn run(args: &[&str]) -> Result<String, String> {
    let output = Command::new("tmux")
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to spawn tmux: {e}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

/// How much pane history to capture.
#[derive(Debug, Clone, Copy)]
pub enum CaptureMode {
    Visible,
    LastN(u32),
    AllScrollback,
}

/// Named keys the Keystroke Pacer and callers can send without knowing the
/// underlying tmux key syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedKey {
    Submit,
    NewlineNoSubmit,
    Interrupt,
}

impl NamedKey {
    fn tmux_args(self) -> &'static [&'static str] {
        match self {
            NamedKey::Submit => &["Enter"],
            NamedKey::NewlineNoSubmit => &["C-j"],
            NamedKey::Interrupt => &["C-c"],
        }
    }
}

/// Stateless handle onto the `tmux` binary. Cheap to clone (it's a unit struct);
/// kept as a type so call sites read like a capability rather than bare free
/// functions, and so it's trivially mockable behind a trait in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tmux;

impl Tmux {
    pub fn new() -> Self {
        Tmux
    }

    pub async fn session_exists(&self, name: &str) -> bool {
        run(&["has-session", "-t", name]).await.is_ok()
    }

    pub async fn new_session(&self, name: &str, cwd: Option<&str>) -> Result<(), Error> {
        let mut args = vec!["new-session", "-d", "-s", name];
        if let Some(dir) = cwd {
            args.push("-c");
            args.push(dir);
        }
        run(&args).await.map(|_| ()).map_err(Error::MultiplexerError)
    }

    pub async fn kill_session(&self, name: &str) -> Result<(), Error> {
        match run(&["kill-session", "-t", name]).await {
            Ok(_) => Ok(()),
            // Idempotent: killing an already-gone session is not an error.
            Err(e) if e.contains("session not found") || e.contains("can't find session") => {
                Ok(())
            }
            Err(e) => Err(Error::MultiplexerError(e)),
        }
    }

    pub async fn list_sessions(&self) -> Result<Vec<String>, Error> {
        match run(&["list-sessions", "-F", "#{session_name}"]).await {
            Ok(out) => Ok(out.lines().map(|l| l.to_string()).filter(|l| !l.is_empty()).collect()),
            Err(e) if e.contains("no server running") => Ok(Vec::new()),
            Err(e) => Err(Error::MultiplexerError(e)),
        }
    }

    pub async fn capture_pane(&self, name: &str, mode: CaptureMode) -> Result<String, Error> {
        let n_str;
        let mut args = vec!["capture-pane", "-t", name, "-p"];
        match mode {
            CaptureMode::Visible => {}
            CaptureMode::LastN(n) => {
                n_str = format!("-{n}");
                args.push("-S");
                args.push(&n_str);
            }
            CaptureMode::AllScrollback => {
                args.push("-S");
                args.push("-");
            }
        }
        run(&args).await.map_err(Error::MultiplexerError)
    }

    /// Sends a literal line of text, followed by a named key (defaults to
    /// `Submit` unless the caller asks otherwise). Used directly for short
    /// single-line sends; the Keystroke Pacer drives this per-segment for
    /// multiline payloads.
    pub async fn send_line(&self, name: &str, text: &str, submit: bool) -> Result<(), Error> {
        run(&["send-keys", "-t", name, "-l", text])
            .await
            .map_err(Error::MultiplexerError)?;
        if submit {
            self.send_named_key(name, NamedKey::Submit).await?;
        }
        Ok(())
    }

    pub async fn send_named_key(&self, name: &str, key: NamedKey) -> Result<(), Error> {
        let mut args = vec!["send-keys", "-t", name];
        args.extend_from_slice(key.tmux_args());
        run(&args).await.map(|_| ()).map_err(Error::MultiplexerError)
    }

    /// PID of the process attached to the pane, if the session exists.
    pub async fn pane_pid(&self, name: &str) -> Result<Option<u32>, Error> {
        match run(&["display-message", "-p", "-t", name, "#{pane_pid}"]).await {
            Ok(out) => Ok(out.trim().parse::<u32>().ok()),
            Err(e) if e.contains("can't find") => Ok(None),
            Err(e) => Err(Error::MultiplexerError(e)),
        }
    }

    pub async fn pane_active(&self, name: &str) -> Result<bool, Error> {
        match run(&["display-message", "-p", "-t", name, "#{pane_active}"]).await {
            Ok(out) => Ok(out.trim() == "1"),
            Err(e) if e.contains("can't find") => Ok(false),
            Err(e) => Err(Error::MultiplexerError(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_key_maps_to_expected_tmux_args() {
        assert_eq!(NamedKey::Submit.tmux_args(), &["Enter"]);
        assert_eq!(NamedKey::NewlineNoSubmit.tmux_args(), &["C-j"]);
        assert_eq!(NamedKey::Interrupt.tmux_args(), &["C-c"]);
    }
}
