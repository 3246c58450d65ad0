//! Page navigation methods.

use std::time::Duration;

use tokio::time::timeout_at;
use tracing::debug;

use crate::error::{Error, Result};
use crate::frames::{LifecycleWatcher, NavigationOutcome, WaitMode, WaitUntil};
use crate::protocol::PageCommand;
use crate::protocol::event::{NavigateResult, NavigationHistory};

use super::Page;

// ============================================================================
// NavigateOptions
// ============================================================================

/// Options for navigation calls.
///
/// # Example
///
/// ```ignore
/// let options = NavigateOptions::new()
///     .wait_until(WaitUntil::Load)
///     .wait_until(WaitUntil::NetworkIdle2)
///     .timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Default)]
pub struct NavigateOptions {
    wait_until: Vec<WaitUntil>,
    timeout: Option<Duration>,
    referer: Option<String>,
}

impl NavigateOptions {
    /// Waits for `load` with the page's default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition. Without any, the navigation waits for `load`.
    #[must_use]
    pub fn wait_until(mut self, condition: WaitUntil) -> Self {
        if !self.wait_until.contains(&condition) {
            self.wait_until.push(condition);
        }
        self
    }

    /// Overrides the timeout. Zero waits indefinitely.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the `Referer` of the navigation request.
    #[must_use]
    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

// ============================================================================
// Page - Navigation
// ============================================================================

impl Page {
    /// Navigates the main frame to `url` and waits for the conditions.
    ///
    /// Returns [`NavigationOutcome::Superseded`] when another navigation
    /// started first. The response of a satisfied outcome is `None` for
    /// same-document navigations.
    ///
    /// # Errors
    ///
    /// - [`Error::NavigationFailed`] if the browser reported a network error
    /// - [`Error::Timeout`] if the conditions did not hold in time
    /// - [`Error::TargetCrashed`] if the page crashed meanwhile
    /// - closed errors if the session went away
    pub async fn goto(&self, url: &str, options: NavigateOptions) -> Result<NavigationOutcome> {
        let frame_id = self.main_frame_id()?;
        debug!(url, %frame_id, "Navigating");

        let mut watcher = self.watcher(WaitMode::NextNavigation, &options)?;
        let command = PageCommand::Navigate {
            url: url.to_string(),
            referrer: options.referer.clone(),
            frame_id: Some(frame_id),
        };
        let result: NavigateResult =
            serde_json::from_value(self.send_within(&watcher, command).await?)?;

        if let Some(reason) = result.error_text {
            return Err(Error::navigation_failed(url, reason));
        }
        if result.loader_id.is_some() {
            watcher.expect_new_document();
        }
        watcher.wait().await
    }

    /// Reloads the page and waits for the conditions.
    ///
    /// # Errors
    ///
    /// Same as [`goto`](Self::goto), without `NavigationFailed`.
    pub async fn reload(&self, options: NavigateOptions) -> Result<NavigationOutcome> {
        debug!(url = %self.url(), "Reloading");

        let mut watcher = self.watcher(WaitMode::NextNavigation, &options)?;
        watcher.expect_new_document();
        self.send_within(&watcher, PageCommand::Reload { ignore_cache: false })
            .await?;
        watcher.wait().await
    }

    /// Goes one entry back in history.
    ///
    /// Returns `None` when there is no previous entry.
    ///
    /// # Errors
    ///
    /// Same as [`goto`](Self::goto), without `NavigationFailed`.
    pub async fn go_back(&self, options: NavigateOptions) -> Result<Option<NavigationOutcome>> {
        self.go_history(-1, options).await
    }

    /// Goes one entry forward in history.
    ///
    /// Returns `None` when there is no next entry.
    ///
    /// # Errors
    ///
    /// Same as [`goto`](Self::goto), without `NavigationFailed`.
    pub async fn go_forward(&self, options: NavigateOptions) -> Result<Option<NavigationOutcome>> {
        self.go_history(1, options).await
    }

    /// Waits for the main frame's next navigation, triggered elsewhere.
    ///
    /// # Errors
    ///
    /// Same as [`goto`](Self::goto), without `NavigationFailed`.
    pub async fn wait_for_navigation(&self, options: NavigateOptions) -> Result<NavigationOutcome> {
        self.watcher(WaitMode::NextNavigation, &options)?.wait().await
    }

    /// Waits for the conditions on the current document, without navigating.
    ///
    /// # Errors
    ///
    /// Same as [`goto`](Self::goto), without `NavigationFailed`.
    pub async fn wait_for_load_state(&self, options: NavigateOptions) -> Result<NavigationOutcome> {
        self.watcher(WaitMode::CurrentDocument, &options)?.wait().await
    }

    async fn go_history(
        &self,
        delta: isize,
        options: NavigateOptions,
    ) -> Result<Option<NavigationOutcome>> {
        let history: NavigationHistory = serde_json::from_value(
            self.inner
                .session
                .send_command(PageCommand::GetNavigationHistory)
                .await?,
        )?;

        let Some(entry) = history
            .current_index
            .checked_add_signed(delta)
            .and_then(|index| history.entries.get(index))
        else {
            debug!(delta, "No history entry");
            return Ok(None);
        };
        debug!(delta, url = %entry.url, "Navigating history");

        let watcher = self.watcher(WaitMode::NextNavigation, &options)?;
        self.send_within(&watcher, PageCommand::NavigateToHistoryEntry { entry_id: entry.id })
            .await?;
        watcher.wait().await.map(Some)
    }

    fn watcher(&self, mode: WaitMode, options: &NavigateOptions) -> Result<LifecycleWatcher> {
        let timeout = options.timeout.unwrap_or(self.inner.navigation_timeout);
        let frame_id = self.main_frame_id()?;
        self.inner
            .frames
            .watch(&frame_id, mode, &options.wait_until, timeout)
    }

    /// Sends `command`, bounded by the watcher's deadline.
    async fn send_within(
        &self,
        watcher: &LifecycleWatcher,
        command: PageCommand,
    ) -> Result<serde_json::Value> {
        let send = self.inner.session.send_command(command);
        let Some(deadline) = watcher.deadline() else {
            return send.await;
        };
        match timeout_at(deadline, send).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                "navigation command",
                u64::try_from(watcher.timeout().as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::network::Response;
    use crate::protocol::methods;
    use crate::transport::channel::testing::{answer, expect_command, page_event};

    use super::super::core::testing::page;

    fn commit(remote: &crate::transport::RemoteEnd, loader: &str, url: &str) {
        page_event(
            remote,
            methods::FRAME_NAVIGATED,
            json!({ "frame": { "id": "M", "loaderId": loader, "url": url } }),
        );
        page_event(
            remote,
            methods::LIFECYCLE_EVENT,
            json!({ "frameId": "M", "loaderId": loader, "name": "load", "timestamp": 1.0 }),
        );
    }

    #[tokio::test]
    async fn test_goto_returns_navigation_response() {
        let (_connection, page, mut remote) = page().await;
        let goto = tokio::spawn({
            let page = page.clone();
            async move {
                page.goto("https://a.test/next", NavigateOptions::new().referer("https://ref.test/"))
                    .await
            }
        });

        let command = expect_command(&mut remote, "Page.navigate").await;
        assert_eq!(command["params"]["url"], "https://a.test/next");
        assert_eq!(command["params"]["referrer"], "https://ref.test/");
        assert_eq!(command["params"]["frameId"], "M");

        page_event(
            &remote,
            methods::REQUEST_WILL_BE_SENT,
            json!({
                "requestId": "L1",
                "loaderId": "L1",
                "request": { "url": "https://a.test/next", "method": "GET", "headers": {} },
                "type": "Document",
                "frameId": "M"
            }),
        );
        page_event(
            &remote,
            methods::RESPONSE_RECEIVED,
            json!({
                "requestId": "L1",
                "response": { "url": "https://a.test/next", "status": 201, "headers": {} }
            }),
        );
        remote
            .reply(
                crate::transport::channel::command_id(&command).expect("id"),
                json!({ "frameId": "M", "loaderId": "L1" }),
            )
            .expect("reply");
        commit(&remote, "L1", "https://a.test/next");

        let outcome = goto.await.expect("join").expect("goto");
        assert_eq!(outcome.response().map(Response::status), Some(201));
        assert_eq!(page.url(), "https://a.test/next");
    }

    #[tokio::test]
    async fn test_goto_error_text_fails() {
        let (_connection, page, mut remote) = page().await;
        let goto = tokio::spawn({
            let page = page.clone();
            async move { page.goto("https://nope.test/", NavigateOptions::new()).await }
        });

        answer(
            &mut remote,
            "Page.navigate",
            json!({ "frameId": "M", "loaderId": "L1", "errorText": "net::ERR_NAME_NOT_RESOLVED" }),
        )
        .await;

        let err = goto.await.expect("join").unwrap_err();
        assert!(matches!(
            err,
            Error::NavigationFailed { ref reason, .. } if reason == "net::ERR_NAME_NOT_RESOLVED"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_goto_times_out_on_silent_browser() {
        let (_connection, page, mut remote) = page().await;
        let goto = tokio::spawn({
            let page = page.clone();
            async move {
                page.goto("https://slow.test/", NavigateOptions::new().timeout(Duration::from_secs(2)))
                    .await
            }
        });

        expect_command(&mut remote, "Page.navigate").await;
        let err = goto.await.expect("join").unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_reload_waits_for_new_document() {
        let (_connection, page, mut remote) = page().await;
        let reload = tokio::spawn({
            let page = page.clone();
            async move { page.reload(NavigateOptions::new()).await }
        });

        let command = answer(&mut remote, "Page.reload", json!({})).await;
        assert_eq!(command["params"]["ignoreCache"], false);
        commit(&remote, "L1", "https://a.test/");

        assert!(reload.await.expect("join").expect("reload").is_satisfied());
    }

    #[tokio::test]
    async fn test_go_back_without_entry() -> anyhow::Result<()> {
        let (_connection, page, mut remote) = page().await;
        let back = tokio::spawn({
            let page = page.clone();
            async move { page.go_back(NavigateOptions::new()).await }
        });

        answer(
            &mut remote,
            "Page.getNavigationHistory",
            json!({ "currentIndex": 0, "entries": [{ "id": 1, "url": "https://a.test/" }] }),
        )
        .await;

        assert!(back.await??.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_go_forward_navigates_entry() {
        let (_connection, page, mut remote) = page().await;
        let forward = tokio::spawn({
            let page = page.clone();
            async move { page.go_forward(NavigateOptions::new()).await }
        });

        answer(
            &mut remote,
            "Page.getNavigationHistory",
            json!({
                "currentIndex": 0,
                "entries": [
                    { "id": 1, "url": "https://a.test/" },
                    { "id": 2, "url": "https://a.test/next" }
                ]
            }),
        )
        .await;
        let command = answer(&mut remote, "Page.navigateToHistoryEntry", json!({})).await;
        assert_eq!(command["params"]["entryId"], 2);
        commit(&remote, "L2", "https://a.test/next");

        let outcome = forward.await.expect("join").expect("go_forward");
        assert!(outcome.is_some_and(|o| o.is_satisfied()));
    }

    #[tokio::test]
    async fn test_wait_for_navigation_superseded() {
        let (_connection, page, remote) = page().await;
        let wait = tokio::spawn({
            let page = page.clone();
            async move { page.wait_for_navigation(NavigateOptions::new()).await }
        });
        tokio::task::yield_now().await;

        page_event(
            &remote,
            methods::FRAME_NAVIGATED,
            json!({ "frame": { "id": "M", "loaderId": "L1", "url": "https://a.test/1" } }),
        );
        page_event(
            &remote,
            methods::FRAME_NAVIGATED,
            json!({ "frame": { "id": "M", "loaderId": "L2", "url": "https://a.test/2" } }),
        );

        assert_eq!(
            wait.await.expect("join").expect("wait"),
            NavigationOutcome::Superseded
        );
    }
}
