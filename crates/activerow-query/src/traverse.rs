//! Large-result traversal: paged chunking, forward cursors, lazy streams,
//! and buffered cooperative iteration.
//!
//! The buffered variant interleaves chunk fetches with item hand-off on a
//! single logical thread. It bounds memory, not latency: no two statements
//! ever execute against the handle simultaneously and no second core is
//! engaged.

use crate::builder::Query;
use crate::collection::Collection;
use crate::try_outcome;
use activerow_core::{
    AttributeCipher, Connection, Cx, EntityMeta, Error, Outcome, Record, Result, RowCursor,
};
use std::collections::VecDeque;
use std::sync::Arc;

impl Query {
    /// Traverse matching rows in fixed-size pages.
    ///
    /// Clones the builder per page, applying `LIMIT size OFFSET k`;
    /// terminates on an empty chunk. The callback may stop traversal early
    /// by returning `Ok(false)`. Each chunk is dropped before the next
    /// fetch, bounding peak memory.
    pub async fn chunk<C, F>(
        &self,
        cx: &Cx,
        conn: &C,
        size: u64,
        mut callback: F,
    ) -> Outcome<(), Error>
    where
        C: Connection,
        F: FnMut(Collection) -> Result<bool> + Send,
    {
        if size == 0 {
            return Outcome::Err(Error::invalid_argument("chunk size must be positive"));
        }

        let mut page = 0_u64;
        loop {
            let batch = try_outcome!(
                self.clone()
                    .limit(size)
                    .offset(page * size)
                    .get(cx, conn)
                    .await
            );
            if batch.is_empty() {
                break;
            }
            tracing::trace!(page, rows = batch.len(), "processing chunk");
            match callback(batch) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => return Outcome::Err(e),
            }
            page += 1;
        }
        Outcome::Ok(())
    }

    /// Execute once and pull records one at a time from the open result
    /// set.
    ///
    /// Eager-load directives do not apply here; rows are materialized
    /// individually as they are fetched.
    pub async fn cursor<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<RecordCursor<C::Cursor>, Error> {
        let inner = try_outcome!(conn.fetch(cx, &self.to_sql(), &self.bind_values()).await);
        Outcome::Ok(RecordCursor {
            inner,
            meta: self.meta(),
            cipher: self.cipher_arc(),
        })
    }

    /// A lazy, finite sequence backed by chunked fetches.
    ///
    /// Nothing executes until the first `next` call. The stream is not
    /// rewindable mid-iteration; restart by invoking `stream` again.
    #[must_use]
    pub fn stream(&self, chunk_size: u64) -> RecordStream {
        RecordStream {
            query: self.clone(),
            chunk_size: chunk_size.max(1),
            buffer: VecDeque::new(),
            next_offset: 0,
            done: false,
        }
    }

    /// Buffered cooperative iteration: refill and hand-off interleave on
    /// one thread, with the buffer bounded by `buffer_size`.
    ///
    /// The producer side signals termination with an empty fetch; the
    /// handler receives each record in order. Returns the processed count.
    pub async fn buffered<C, F>(
        &self,
        cx: &Cx,
        conn: &C,
        buffer_size: u64,
        mut handler: F,
    ) -> Outcome<u64, Error>
    where
        C: Connection,
        F: FnMut(Record) -> Result<()> + Send,
    {
        if buffer_size == 0 {
            return Outcome::Err(Error::invalid_argument("buffer size must be positive"));
        }

        let mut buffer: VecDeque<Record> = VecDeque::new();
        let mut offset = 0_u64;
        let mut done = false;
        let mut processed = 0_u64;

        loop {
            // Top the buffer up before it runs dry so the fetch of the
            // next chunk interleaves with hand-off of the current one.
            if !done && (buffer.len() as u64) <= buffer_size / 2 {
                let want = buffer_size - buffer.len() as u64;
                let batch = try_outcome!(
                    self.clone().limit(want).offset(offset).get(cx, conn).await
                )
                .into_records();
                offset += batch.len() as u64;
                if batch.is_empty() {
                    // Producer sentinel: nothing more to fetch.
                    done = true;
                } else {
                    buffer.extend(batch);
                }
            }

            match buffer.pop_front() {
                Some(record) => {
                    if let Err(e) = handler(record) {
                        return Outcome::Err(e);
                    }
                    processed += 1;
                }
                None if done => break,
                None => {}
            }
        }

        Outcome::Ok(processed)
    }
}

/// A forward-only cursor yielding one record per fetched row.
pub struct RecordCursor<Cur> {
    inner: Cur,
    meta: &'static EntityMeta,
    cipher: Option<Arc<dyn AttributeCipher + Send + Sync>>,
}

impl<Cur: RowCursor> RecordCursor<Cur> {
    /// Fetch and materialize the next record.
    pub async fn next(&mut self, cx: &Cx) -> Outcome<Option<Record>, Error> {
        let row = try_outcome!(self.inner.next_row(cx).await);
        match row {
            Some(row) => {
                let cipher = self.cipher.as_deref().map(|c| c as &dyn AttributeCipher);
                match Record::from_row(self.meta, &row, cipher) {
                    Ok(record) => Outcome::Ok(Some(record)),
                    Err(e) => Outcome::Err(e),
                }
            }
            None => Outcome::Ok(None),
        }
    }
}

/// A lazy chunk-backed record sequence.
pub struct RecordStream {
    query: Query,
    chunk_size: u64,
    buffer: VecDeque<Record>,
    next_offset: u64,
    done: bool,
}

impl RecordStream {
    /// Fetch the next record, pulling a new chunk when the buffer drains.
    pub async fn next<C: Connection>(
        &mut self,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<Option<Record>, Error> {
        if let Some(record) = self.buffer.pop_front() {
            return Outcome::Ok(Some(record));
        }
        if self.done {
            return Outcome::Ok(None);
        }

        let batch = try_outcome!(
            self.query
                .clone()
                .limit(self.chunk_size)
                .offset(self.next_offset)
                .get(cx, conn)
                .await
        )
        .into_records();
        self.next_offset += self.chunk_size;

        if batch.is_empty() {
            self.done = true;
            return Outcome::Ok(None);
        }
        if (batch.len() as u64) < self.chunk_size {
            self.done = true;
        }
        self.buffer.extend(batch);
        Outcome::Ok(self.buffer.pop_front())
    }
}
