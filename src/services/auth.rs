//! Authorization gates for video generation.
//!
//! Veo is a paid feature, so the first video request goes through an
//! explicit authorization step instead of silently spending the user's key.

use crate::error::{Result, RetouchError};
use crate::services::AuthGate;
use async_trait::async_trait;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

fn api_key_present() -> bool {
    std::env::var("GOOGLE_API_KEY").is_ok_and(|k| !k.trim().is_empty())
}

/// Non-interactive gate: authorized whenever `GOOGLE_API_KEY` is set.
/// Suitable for scripted use where the billing decision was already made.
#[derive(Debug, Default)]
pub struct EnvKeyGate;

impl EnvKeyGate {
    /// Creates a new gate.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuthGate for EnvKeyGate {
    async fn has_authorization(&self) -> bool {
        api_key_present()
    }

    async fn request_authorization(&self) -> Result<()> {
        if api_key_present() {
            Ok(())
        } else {
            Err(RetouchError::Auth(
                "GOOGLE_API_KEY is not set. Export a key with Veo access enabled.".into(),
            ))
        }
    }
}

/// Interactive gate: requires a one-time confirmation on the terminal
/// before the first video generation, in addition to a configured key.
#[derive(Debug, Default)]
pub struct TerminalAuthGate {
    confirmed: AtomicBool,
}

impl TerminalAuthGate {
    /// Creates a new gate with no confirmation recorded.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthGate for TerminalAuthGate {
    async fn has_authorization(&self) -> bool {
        self.confirmed.load(Ordering::Relaxed) && api_key_present()
    }

    async fn request_authorization(&self) -> Result<()> {
        if !api_key_present() {
            return Err(RetouchError::Auth(
                "GOOGLE_API_KEY is not set. Export a key with Veo access enabled.".into(),
            ));
        }

        let mut stdout = std::io::stdout().lock();
        writeln!(
            stdout,
            "Video generation with Veo uses your API key and may incur charges.\n\
             See https://ai.google.dev/gemini-api/docs/billing for details."
        )?;
        write!(stdout, "Proceed? [y/N] ")?;
        stdout.flush()?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;

        if matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            self.confirmed.store(true, Ordering::Relaxed);
            Ok(())
        } else {
            Err(RetouchError::Auth("video generation was not authorized".into()))
        }
    }
}
