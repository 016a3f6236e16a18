use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::sync::Arc;
use tempfile::TempDir;

use super::launcher::{find_chrome_binary, quiet_chrome_args};
use crate::executor::SessionHandle;

/// A launched Chrome with one page, usable as a script session.
pub struct BrowserSession {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    page: Page,
    headless: bool,
    _profile: TempDir,
}

impl BrowserSession {
    /// Launch Chrome with a throwaway profile and open `about:blank`.
    pub async fn launch(headless: bool) -> Result<Self> {
        let profile = tempfile::tempdir().context("Failed to create Chrome profile directory")?;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(find_chrome_binary()?)
            .user_data_dir(profile.path())
            .args(quiet_chrome_args())
            .window_size(1280, 720);
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(|e| anyhow::anyhow!("{}", e))?;

        let (browser, mut handler) = Browser::launch(config).await.context("Failed to launch Chrome")?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to create initial page")?;

        tracing::info!("Browser session started (headless: {})", headless);

        Ok(Self {
            browser,
            handler_task,
            page,
            headless,
            _profile: profile,
        })
    }

    /// Navigate the page and wait for the load to finish.
    pub async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        tracing::debug!("navigated to {}", url);
        Ok(())
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// The page as a script session.
    pub fn handle(&self) -> SessionHandle {
        Arc::new(self.page.clone())
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            tracing::warn!("Chrome did not close cleanly: {}", e);
        }
        self.handler_task.abort();
        Ok(())
    }
}
