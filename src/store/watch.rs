//! Change notification on a single key
//!
//! A watch is a lazy, unbounded stream. Each step long-polls for the first
//! change strictly after the index of the last event it yielded, so a
//! consumer sees every change once, in order, as long as the store still
//! holds that history.

use crate::common::{Error, Result};
use crate::store::client::Client;
use crate::store::types::{Response, Wait};
use async_stream::stream;
use futures_util::Stream;

impl Client {
    /// Watch `path`, starting from its current state.
    ///
    /// If the key exists, its current value is yielded first (action `get`).
    /// If it does not, the first poll blocks until the key is created and
    /// yields the creation event.
    pub fn watch(&self, path: &str) -> impl Stream<Item = Result<Response>> + Send + 'static {
        watch_stream(self.clone(), path.to_string(), None)
    }

    /// Resume a watch after the event with modification index `index`.
    pub fn watch_after(
        &self,
        path: &str,
        index: u64,
    ) -> impl Stream<Item = Result<Response>> + Send + 'static {
        watch_stream(self.clone(), path.to_string(), Some(index))
    }
}

/// A store error is yielded once and ends the stream; restart from the last
/// good index with [`Client::watch_after`].
fn watch_stream(
    client: Client,
    path: String,
    mut cursor: Option<u64>,
) -> impl Stream<Item = Result<Response>> + Send + 'static {
    stream! {
        loop {
            let wait = match cursor {
                Some(index) => Wait::After(index),
                None => Wait::No,
            };
            match client.get(&path, wait).await {
                Ok(event) => {
                    cursor = Some(event.modified_index());
                    yield Ok(event);
                }
                Err(Error::Rejected(e)) if cursor.is_none() && e.is_key_not_found() => {
                    tracing::debug!(%path, index = e.index, "Watched key does not exist yet, waiting for it");
                    cursor = Some(e.index);
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    }
}
