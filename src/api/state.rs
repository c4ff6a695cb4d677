use std::sync::Arc;

use tokio::sync::mpsc;

use crate::admin::AdminService;
use crate::reactive::EnhancedTransaction;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub admin: Arc<AdminService>,
    /// Handoff queue into the reactive worker pool. The webhook handler
    /// only enqueues; it never processes inline.
    pub webhook_tx: mpsc::Sender<Vec<EnhancedTransaction>>,
    pub webhook_secret: String,
}
