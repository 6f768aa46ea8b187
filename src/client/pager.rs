//! Paginated range scans
//!
//! A [`Pager`] walks a range in key order, `limit` fresh entries per page.
//! Each page after the first restarts at the previous page's last key and
//! asks for one extra entry, which is the boundary key already handed out
//! and gets dropped. All pages read at the revision of the first page, so
//! writes that land mid-scan cannot tear it.

use crate::client::options::{validate_revision, GetOptions, SortOrder, SortTarget};
use crate::client::types::{KeyValue, Revision};
use crate::client::Client;
use crate::common::{display_bytes, key_successor, Error, Result};
use crate::proto::{self, range_request};

pub struct Pager {
    client: Client,
    start: Vec<u8>,
    end: Vec<u8>,
    limit: u64,
    descending: bool,
    keys_only: bool,
    serializable: bool,
    revision: Option<Revision>,
    /// Last key handed out
    cursor: Option<Vec<u8>>,
    done: bool,
}

impl Pager {
    pub(crate) fn new(client: Client, key: Vec<u8>, options: GetOptions) -> Result<Self> {
        if options.sort_target != SortTarget::Key {
            return Err(Error::InvalidArgument(
                "pagination requires key order".into(),
            ));
        }
        if options.count_only {
            return Err(Error::InvalidArgument(
                "pagination cannot be combined with count-only reads".into(),
            ));
        }
        let (start, end) = options.range.resolve(key)?;
        let revision = validate_revision(options.revision)?;
        // Continuation pages ask for one extra entry
        if options.limit >= i64::MAX as u64 {
            return Err(Error::InvalidArgument(format!(
                "limit {} too large",
                options.limit
            )));
        }

        Ok(Self {
            client,
            start,
            end,
            limit: options.limit,
            descending: options.sort_order == SortOrder::Descend,
            keys_only: options.keys_only,
            serializable: options.serializable,
            revision: (revision > 0).then_some(revision),
            cursor: None,
            done: false,
        })
    }

    /// Revision every page is read at, known once the first page is in
    pub fn revision(&self) -> Option<Revision> {
        self.revision
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Next page, or `None` once the range is exhausted. Pages are never
    /// empty.
    pub async fn next_page(&mut self) -> Result<Option<Vec<KeyValue>>> {
        if self.done {
            return Ok(None);
        }

        let (start, end, limit) = match (&self.cursor, self.descending) {
            (None, _) => (self.start.clone(), self.end.clone(), self.limit),
            (Some(last), false) => (last.clone(), self.end.clone(), self.limit + 1),
            (Some(last), true) => (self.start.clone(), key_successor(last), self.limit + 1),
        };
        tracing::debug!(
            "Fetching page from {} (limit {}, revision {:?})",
            display_bytes(&start),
            limit,
            self.revision
        );

        let sort_order = if self.descending {
            range_request::SortOrder::Descend
        } else {
            range_request::SortOrder::Ascend
        };
        let req = proto::RangeRequest {
            key: start,
            range_end: end,
            limit: limit as i64,
            revision: self.revision.unwrap_or_default(),
            sort_order: sort_order as i32,
            sort_target: range_request::SortTarget::Key as i32,
            serializable: self.serializable,
            keys_only: self.keys_only,
            count_only: false,
        };
        let resp = self.client.range(req).await?;

        if self.revision.is_none() {
            let revision = proto::header_revision(&resp.header);
            self.revision = (revision > 0).then_some(revision);
        }

        let mut kvs = resp.kvs;
        if let Some(last) = &self.cursor {
            // Boundary entry, already returned with the previous page
            if kvs.first().is_some_and(|kv| &kv.key == last) {
                kvs.remove(0);
            }
        }
        let page: Vec<KeyValue> = kvs.into_iter().map(Into::into).collect();

        if self.limit == 0 || !resp.more || page.is_empty() {
            self.done = true;
        }
        match page.last() {
            Some(kv) => {
                self.cursor = Some(kv.key.clone());
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }

    /// Drain the remaining pages into one vector
    pub async fn collect_all(mut self) -> Result<Vec<KeyValue>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}
