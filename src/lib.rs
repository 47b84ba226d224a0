pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod resolver;
pub mod upstream;
pub(crate) mod util;

use std::sync::Arc;

use history::store::HistoryStore;
use history::writer::HistoryWriter;
use resolver::AlertResolver;
use upstream::CaseBackend;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn CaseBackend>,
    pub resolver: AlertResolver,
    pub history: HistoryWriter,
    /// Read side of the history files. Writes go through `history`.
    pub store: Arc<HistoryStore>,
}

impl AppState {
    pub fn new(backend: Arc<dyn CaseBackend>, history: HistoryWriter, store: Arc<HistoryStore>) -> Self {
        Self {
            resolver: AlertResolver::new(backend.clone()),
            backend,
            history,
            store,
        }
    }
}
