use anyhow::{bail, Result};
use std::path::PathBuf;

/// Environment variable naming an explicit Chrome binary.
pub const CHROME_ENV: &str = "REMIX_CHROME";

/// Find the Chrome/Chromium binary: `REMIX_CHROME` first, then the usual
/// install locations, then `PATH`.
pub fn find_chrome_binary() -> Result<PathBuf> {
    if let Ok(explicit) = std::env::var(CHROME_ENV) {
        let path = PathBuf::from(&explicit);
        if path.exists() {
            tracing::info!("Using Chrome from {}: {}", CHROME_ENV, path.display());
            return Ok(path);
        }
        tracing::warn!("{} points to a missing file: {}", CHROME_ENV, explicit);
    }

    let candidates = chrome_candidates();
    if let Some(path) = candidates.iter().map(PathBuf::from).find(|p| p.exists()) {
        tracing::info!("Found Chrome at: {}", path.display());
        return Ok(path);
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium-browser", "chromium"] {
        if let Ok(path) = which::which(name) {
            tracing::info!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    bail!(
        "Could not find Chrome or Chromium. Set {} or install one of:\n{}",
        CHROME_ENV,
        candidates.join("\n")
    )
}

fn chrome_candidates() -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    #[cfg(target_os = "macos")]
    {
        candidates.extend([
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome".into(),
            "/Applications/Chromium.app/Contents/MacOS/Chromium".into(),
        ]);
        if let Ok(home) = std::env::var("HOME") {
            candidates.push(format!("{}/Applications/Google Chrome.app/Contents/MacOS/Google Chrome", home));
        }
    }

    #[cfg(target_os = "linux")]
    {
        candidates.extend([
            "/usr/bin/google-chrome".into(),
            "/usr/bin/google-chrome-stable".into(),
            "/usr/bin/chromium-browser".into(),
            "/usr/bin/chromium".into(),
            "/snap/bin/chromium".into(),
        ]);
    }

    #[cfg(target_os = "windows")]
    {
        for var in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
            if let Ok(dir) = std::env::var(var) {
                candidates.push(format!("{}\\Google\\Chrome\\Application\\chrome.exe", dir));
            }
        }
    }

    candidates
}

/// Switches that keep a test browser quiet and deterministic.
pub fn quiet_chrome_args() -> Vec<&'static str> {
    vec![
        "--no-first-run",
        "--no-default-browser-check",
        "--disable-background-networking",
        "--disable-client-side-phishing-detection",
        "--disable-default-apps",
        "--disable-extensions",
        "--disable-hang-monitor",
        "--disable-popup-blocking",
        "--disable-prompt-on-repost",
        "--disable-sync",
        "--disable-translate",
        "--metrics-recording-only",
        "--safebrowsing-disable-auto-update",
    ]
}
