use dashmap::DashMap;
use std::sync::Arc;

use crate::types::Channel;

/// Channel info memoized for the lifetime of one stream.  Entries are never
/// invalidated; a miss simply means "ask the API".
#[derive(Debug, Default)]
pub(crate) struct ChanCache {
    m: DashMap<String, Arc<Channel>>,
}

impl ChanCache {
    pub(crate) fn get(&self, id: &str) -> Option<Arc<Channel>> {
        self.m.get(id).map(|e| Arc::clone(e.value()))
    }

    pub(crate) fn set(&self, id: impl Into<String>, ch: Arc<Channel>) {
        self.m.insert(id.into(), ch);
    }

    pub(crate) fn len(&self) -> usize {
        self.m.len()
    }
}
