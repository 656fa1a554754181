//! Lazy iteration over paginated pending join requests.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use joinwarden_protocol::{ChannelId, JoinRequest, PageCursor};
use tracing::debug;

use crate::{PlatformClient, PlatformError};

/// Finite, non-restartable sequence of pending join requests.
/// Ends after the first error.
pub type JoinRequestStream = BoxStream<'static, Result<JoinRequest, PlatformError>>;

struct PageState {
    client: Arc<dyn PlatformClient>,
    channel: ChannelId,
    page_size: u32,
    cursor: Option<PageCursor>,
    buffered: VecDeque<JoinRequest>,
    exhausted: bool,
    pages_fetched: u32,
}

/// Stream pending join requests in platform order, fetching one page of
/// `page_size` at a time and only when the previous page is drained.
pub fn pending_join_requests(
    client: Arc<dyn PlatformClient>,
    channel: ChannelId,
    page_size: u32,
) -> JoinRequestStream {
    let state = PageState {
        client,
        channel,
        page_size,
        cursor: None,
        buffered: VecDeque::new(),
        exhausted: false,
        pages_fetched: 0,
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(request) = state.buffered.pop_front() {
                return Ok(Some((request, state)));
            }
            if state.exhausted {
                return Ok(None);
            }

            let page = state
                .client
                .join_request_page(state.channel, state.cursor, state.page_size)
                .await?;
            state.pages_fetched += 1;

            debug!(
                component = "join_request_pages",
                event = "join_requests.page_fetched",
                channel_id = %state.channel,
                page = state.pages_fetched,
                count = page.requests.len(),
                has_more = page.next_cursor.is_some(),
                "Fetched join request page"
            );

            state.exhausted = page.requests.is_empty() || page.next_cursor.is_none();
            state.cursor = page.next_cursor;
            state.buffered.extend(page.requests);
        }
    })
    .boxed()
}
