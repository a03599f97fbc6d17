//! Live reload: a broadcast channel, an SSE endpoint and the browser client.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::watch::WatchError;

/// Path of the SSE endpoint the client script connects to.
pub const RELOAD_PATH: &str = "/__sitepipe/reload";

/// Script injected into served HTML pages.
pub const CLIENT_SCRIPT: &str = r#"<script>
(function () {
  var source = new EventSource("/__sitepipe/reload");
  source.addEventListener("reload", function (event) {
    if (event.data === "css") {
      document.querySelectorAll('link[rel="stylesheet"]').forEach(function (link) {
        var url = new URL(link.href);
        url.searchParams.set("_reload", Date.now());
        link.href = url.toString();
      });
    } else {
      window.location.reload();
    }
  });
})();
</script>"#;

/// Events sent to reload clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadEvent {
    /// Reload the page
    Full,
    /// Only stylesheets changed; swap them without a page reload
    Css,
}

impl ReloadEvent {
    fn data(&self) -> &'static str {
        match self {
            ReloadEvent::Full => "full",
            ReloadEvent::Css => "css",
        }
    }
}

/// Broadcasts reload events to every connected browser.
#[derive(Debug, Clone)]
pub struct LiveReload {
    tx: Arc<broadcast::Sender<ReloadEvent>>,
}

impl LiveReload {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to reload events
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.tx.subscribe()
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Broadcast the reload a set of changed output paths calls for.
    ///
    /// Returns `None` for an empty set. Having no clients is not an error.
    pub fn trigger(&self, paths: &[PathBuf]) -> Option<ReloadEvent> {
        if paths.is_empty() {
            return None;
        }
        // Source maps change alongside what they map and never need a reload of their own
        let mut pages = paths.iter().filter(|p| !has_extension(p, "map")).peekable();
        let css_only = pages.peek().is_some() && pages.all(|p| has_extension(p, "css"));
        let event = if css_only { ReloadEvent::Css } else { ReloadEvent::Full };
        debug!(clients = self.client_count(), "broadcasting {} reload", event.data());
        let _ = self.tx.send(event);
        Some(event)
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::new()
    }
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(reload): State<LiveReload>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = reload.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(event) => yield Ok(Event::default().event("reload").data(event.data())),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "reload client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

/// Insert the client script before `</body>`, or append it.
pub fn inject_script(html: &str) -> String {
    match html.rfind("</body>") {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + CLIENT_SCRIPT.len());
            out.push_str(&html[..idx]);
            out.push_str(CLIENT_SCRIPT);
            out.push_str(&html[idx..]);
            out
        }
        None => format!("{html}{CLIENT_SCRIPT}"),
    }
}

/// Watch the output tree and trigger a reload for every debounced change.
///
/// The returned debouncer must be kept alive for as long as watching should go on.
pub fn watch_output(
    root: &Path,
    debounce: Duration,
    reload: LiveReload,
) -> Result<Debouncer<RecommendedWatcher>, WatchError> {
    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
            reload.trigger(&paths);
        }
        Err(error) => warn!("output watch error: {error:?}"),
    })
    .map_err(WatchError::WatcherInit)?;

    debouncer
        .watcher()
        .watch(root, RecursiveMode::Recursive)
        .map_err(|source| WatchError::WatchPath { path: root.to_path_buf(), source })?;
    Ok(debouncer)
}
