use std::sync::Arc;

use tokio::sync::oneshot;

use super::{
    Loader, LoaderCallbacks, LoaderConfig, LoaderContext, LoaderError, LoaderResponse,
    LoaderStats,
};

/// Terminal result of a load, as a value.
#[derive(Debug)]
pub enum LoadOutcome {
    Success {
        response: LoaderResponse,
        stats: LoaderStats,
    },
    Error {
        error: LoaderError,
        stats: LoaderStats,
    },
    Timeout {
        stats: LoaderStats,
    },
    Aborted {
        stats: LoaderStats,
    },
}

struct OneshotCallbacks {
    tx: oneshot::Sender<LoadOutcome>,
}

impl LoaderCallbacks for OneshotCallbacks {
    fn on_success(
        self: Box<Self>,
        response: LoaderResponse,
        stats: LoaderStats,
        _context: LoaderContext,
    ) {
        let _ = self.tx.send(LoadOutcome::Success { response, stats });
    }

    fn on_error(self: Box<Self>, error: LoaderError, _context: LoaderContext, stats: LoaderStats) {
        let _ = self.tx.send(LoadOutcome::Error { error, stats });
    }

    fn on_timeout(self: Box<Self>, stats: LoaderStats, _context: LoaderContext) {
        let _ = self.tx.send(LoadOutcome::Timeout { stats });
    }

    fn on_abort(self: Box<Self>, stats: LoaderStats, _context: LoaderContext) {
        let _ = self.tx.send(LoadOutcome::Aborted { stats });
    }
}

/// Callbacks that forward the outcome into a oneshot channel.
pub fn oneshot_callbacks() -> (Box<dyn LoaderCallbacks>, oneshot::Receiver<LoadOutcome>) {
    let (tx, rx) = oneshot::channel();
    (Box::new(OneshotCallbacks { tx }), rx)
}

/// Run one load and wait for its outcome.
///
/// If the loader drops the callbacks without calling any of them, the load
/// counts as aborted.
pub async fn load_to_completion(
    loader: &Arc<dyn Loader>,
    context: LoaderContext,
    config: LoaderConfig,
) -> LoadOutcome {
    let (callbacks, rx) = oneshot_callbacks();
    loader.load(context, config, callbacks);
    rx.await.unwrap_or_else(|_| {
        let mut stats = loader.stats();
        stats.aborted = true;
        LoadOutcome::Aborted { stats }
    })
}
