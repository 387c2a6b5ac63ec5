use tokio::sync::broadcast;
use tracing::debug;

use crate::pipeline::ContentCache;

pub const CONTENT_SOURCE_SCOPES: [&str; 2] = ["content-sources", "content-sources-by-folder"];
const DEFAULT_CAPACITY: usize = 64;

/// Notice that cached content-source listings for a chatbot are stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInvalidation {
    pub chatbot_id: String,
    pub scopes: Vec<String>,
}

/// Fans invalidation notices out to any number of listeners.
pub struct BroadcastCache {
    sender: broadcast::Sender<CacheInvalidation>,
}

impl Default for BroadcastCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastCache {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheInvalidation> {
        self.sender.subscribe()
    }
}

impl ContentCache for BroadcastCache {
    fn invalidate(&self, chatbot_id: &str) {
        let notice = CacheInvalidation {
            chatbot_id: chatbot_id.to_string(),
            scopes: CONTENT_SOURCE_SCOPES.iter().map(ToString::to_string).collect(),
        };
        // No listeners is fine.
        let receivers = self.sender.send(notice).unwrap_or(0);
        debug!(%chatbot_id, receivers, "Invalidated content source caches");
    }
}
