//! Pagination combinators over the worker pool
//!
//! Two shapes, both built only on [`WorkerPool::submit`]:
//!
//! - **Offset-paged**: the total is unknown upfront. The first page at offset 0
//!   decides whether more exist; after that up to `worker_count` pages stay in
//!   flight. The first short page marks the end: no further offsets are issued
//!   and pages beyond it are discarded. Item order across pages is not
//!   preserved.
//! - **Cursor-paged**: strictly sequential. Page `i + 1` is only submitted
//!   after page `i` returned its cursor; a missing cursor ends the loop.
//!
//! A failed page aborts the loop and propagates. Rate limits never reach this
//! layer; the transport absorbs them.

use super::worker_pool::{JobExecutor, WorkerPool};
use crate::error::SyncError;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;

/// One page of a cursor-paged listing
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    /// Cursor of the next page; `None` on the last page
    pub next_cursor: Option<String>,
}

/// Fetch every item of an offset-paged listing
///
/// `make_job(offset, limit)` builds the job for one page and `extract` turns
/// its output into items. `max_items` caps both the offsets issued and the
/// returned length.
pub async fn fetch_offset_paged<E, T, J, X>(
    pool: &WorkerPool<E>,
    limit: u32,
    max_items: Option<u32>,
    make_job: J,
    extract: X,
) -> Result<Vec<T>, SyncError>
where
    E: JobExecutor,
    J: Fn(u32, u32) -> E::Job,
    X: Fn(E::Output) -> Result<Vec<T>, SyncError>,
{
    let limit = limit.max(1);
    let cap = max_items.unwrap_or(u32::MAX);
    if cap == 0 {
        return Ok(Vec::new());
    }

    // First page alone
    let first = extract(pool.submit(make_job(0, limit)).await.result?)?;
    if (first.len() as u32) < limit || limit >= cap {
        return Ok(truncate(first, cap));
    }

    let window = pool.worker_count().max(1);
    let mut pages: BTreeMap<u32, Vec<T>> = BTreeMap::new();
    pages.insert(0, first);

    let mut end_offset: Option<u32> = None;
    // Failed pages wait until the end is known; past-the-end ones are dropped
    let mut failures: BTreeMap<u32, SyncError> = BTreeMap::new();
    let mut next_offset = limit;
    let mut in_flight = FuturesUnordered::new();

    loop {
        while in_flight.len() < window
            && end_offset.is_none()
            && failures.is_empty()
            && next_offset < cap
        {
            let offset = next_offset;
            let pending = pool.submit(make_job(offset, limit));
            in_flight.push(async move { (offset, pending.await) });
            next_offset = next_offset.saturating_add(limit);
        }

        let Some((offset, response)) = in_flight.next().await else {
            break;
        };

        if end_offset.is_some_and(|end| offset > end) {
            continue;
        }

        match response.result.and_then(&extract) {
            Ok(items) => {
                if (items.len() as u32) < limit {
                    end_offset = Some(end_offset.map_or(offset, |end| end.min(offset)));
                }
                pages.insert(offset, items);
            }
            Err(e) => {
                failures.insert(offset, e);
            }
        }
    }

    if let Some(end) = end_offset {
        pages.retain(|&offset, _| offset <= end);
        failures.retain(|&offset, _| offset <= end);
    }
    if let Some((offset, error)) = failures.into_iter().next() {
        tracing::debug!(offset, error = %error, "Offset page failed");
        return Err(error);
    }

    let items = pages.into_values().flatten().collect();
    Ok(truncate(items, cap))
}

/// Fetch every item of a cursor-paged listing, one page at a time
pub async fn fetch_cursor_paged<E, T, J, X>(
    pool: &WorkerPool<E>,
    make_job: J,
    extract: X,
) -> Result<Vec<T>, SyncError>
where
    E: JobExecutor,
    J: Fn(Option<String>) -> E::Job,
    X: Fn(E::Output) -> Result<CursorPage<T>, SyncError>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = extract(pool.submit(make_job(cursor.clone())).await.result?)?;
        items.extend(page.items);

        match page.next_cursor {
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                tracing::warn!(cursor = %next, "Cursor did not advance, stopping pagination");
                break;
            }
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(items)
}

fn truncate<T>(mut items: Vec<T>, cap: u32) -> Vec<T> {
    if items.len() > cap as usize {
        items.truncate(cap as usize);
    }
    items
}
