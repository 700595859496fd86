use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use futures::StreamExt;
use log::{debug, info};
use tokio::task::JoinHandle;

/// A CDP connection; the handler task is aborted on drop.
pub struct Connection {
    pub browser: Browser,
    handler: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Connect to an already-running Chrome instance via CDP
pub async fn connect_to_chrome(port: u16) -> Result<Connection> {
    let debug_url = format!("http://127.0.0.1:{}", port);

    let (browser, mut handler) = Browser::connect(&debug_url)
        .await
        .with_context(|| format!("Failed to connect to Chrome on port {}", port))?;

    // Spawn the handler to process CDP events
    let handler = tokio::spawn(async move {
        while let Some(_event) = handler.next().await {}
    });

    info!("[Chrome] connected to CDP on port {}", port);
    Ok(Connection { browser, handler })
}

impl Connection {
    /// The first open tab whose URL satisfies `wanted`, else the first tab.
    pub async fn pick_page(&self, wanted: impl Fn(&str) -> bool) -> Result<Page> {
        let pages = self.browser.pages().await.context("Failed to get pages")?;
        let mut first = None;
        for page in pages {
            let url = page.url().await.ok().flatten().unwrap_or_default();
            debug!("[Chrome] open tab {}", url);
            if wanted(&url) {
                return Ok(page);
            }
            first.get_or_insert(page);
        }
        first.context("No pages found in Chrome")
    }
}
