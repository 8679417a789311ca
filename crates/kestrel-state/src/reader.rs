use std::sync::Arc;

use bytes::Bytes;
use error_stack::{report, ResultExt};
use hashbrown::HashMap;
use itertools::{Either, Itertools};
use kestrel_store_api::{
    ComputationGetDataRequest, GetDataRequest, GetDataResponse, KeyedGetDataRequest, StateStore,
    TagListFetch, TagListItem, TagValueFetch, TagValueItem,
};
use parking_lot::Mutex;

use crate::decoder::{ErasedOutcome, StoredDecoder};
use crate::registry::StateRegistry;
use crate::{
    Decoder, Error, HoldTime, ListHandle, StateTag, TagKind, ValueHandle, WatermarkHandle,
};

/// Reads persistent state for one keyed unit of work.
///
/// Handles returned by the factories are lazy: no state store call is
/// made until the first unresolved handle is awaited, at which point all
/// pending lookups are fetched in a single `get_data` round trip and
/// every registered handle is fulfilled.
pub struct StateReader {
    core: Arc<ReaderCore>,
}

impl StateReader {
    pub fn new(
        store: Arc<dyn StateStore>,
        computation: impl Into<String>,
        key: Bytes,
        work_token: i64,
    ) -> Self {
        Self {
            core: Arc::new(ReaderCore {
                store,
                computation: computation.into(),
                key,
                work_token,
                registry: StateRegistry::new(),
                flush_lock: Mutex::new(()),
            }),
        }
    }

    /// Deferred read of the value cell named by `tag`.
    ///
    /// The decoder supplied on the first registration of a tag is the one
    /// used to decode its response; later registrations of the same tag
    /// observe the same outcome and their decoder argument is ignored.
    pub fn value_handle<D: Decoder>(&self, tag: Bytes, decoder: D) -> ValueHandle<D::Value>
    where
        D::Value: Clone,
    {
        let tag = StateTag::new(TagKind::Value, tag);
        let registration = self
            .core
            .registry
            .register(tag.clone(), Some(StoredDecoder::value(decoder)));
        ValueHandle::new(tag, registration.cell, self.core.clone())
    }

    /// Deferred read of the whole list cell named by `tag`.
    pub fn list_handle<D: Decoder>(&self, tag: Bytes, elem_decoder: D) -> ListHandle<D::Value>
    where
        D::Value: Clone,
    {
        let tag = StateTag::new(TagKind::List, tag);
        let registration = self
            .core
            .registry
            .register(tag.clone(), Some(StoredDecoder::list(elem_decoder)));
        ListHandle::new(tag, registration.cell, self.core.clone())
    }

    /// Deferred read of the earliest watermark hold under `tag`.
    pub fn watermark_handle(&self, tag: Bytes) -> WatermarkHandle {
        let tag = StateTag::new(TagKind::Watermark, tag);
        let registration = self.core.registry.register(tag.clone(), None);
        WatermarkHandle::new(tag, registration.cell, self.core.clone())
    }

    /// Fetch every pending lookup in one round trip.
    ///
    /// A no-op when nothing is pending. Awaiting a handle calls this
    /// implicitly; it is public so a caller can choose when to pay the
    /// round trip.
    pub fn flush(&self) -> error_stack::Result<(), Error> {
        self.core.flush()
    }
}

pub(crate) struct ReaderCore {
    store: Arc<dyn StateStore>,
    /// Name of the logical pipeline stage.
    computation: String,
    /// Key identifying the keyed work unit.
    key: Bytes,
    /// Identifier of the current work lease.
    work_token: i64,
    registry: StateRegistry,
    /// Serializes concurrent flushes; the second flusher drains an empty
    /// queue and returns.
    flush_lock: Mutex<()>,
}

impl ReaderCore {
    pub(crate) fn flush(&self) -> error_stack::Result<(), Error> {
        let _guard = self.flush_lock.lock();

        let drained = self.registry.drain_pending();
        if drained.is_empty() {
            return Ok(());
        }

        // The response carries only tag bytes; this map recovers the
        // registered tag (and with it the kind) for each returned item.
        let mut to_fetch: HashMap<Bytes, StateTag> = drained
            .into_iter()
            .map(|tag| (tag.tag().clone(), tag))
            .collect();

        let span = tracing::debug_span!(
            "Reading state",
            computation = %self.computation,
            work_token = self.work_token
        );
        let _enter = span.enter();
        tracing::debug!(fetches = to_fetch.len(), "fetching batched state");

        let request = self.build_request(to_fetch.values());
        let response = match self.store.get_data(request) {
            Ok(response) => response,
            Err(error) => {
                let failure = Error::Store(self.work_token);
                self.fail_drained(&to_fetch, &failure);
                return Err(error.change_context(failure));
            }
        };

        if let Err(error) = self.consume_response(&response, &mut to_fetch) {
            // Cells whose items were never routed must not hang a later
            // await; fail them with the same terminal error.
            self.fail_drained(&to_fetch, error.current_context());
            return Err(error);
        }
        Ok(())
    }

    fn build_request<'a>(&self, tags: impl Iterator<Item = &'a StateTag>) -> GetDataRequest {
        let (value_fetches, list_fetches): (Vec<_>, Vec<_>) =
            tags.partition_map(|tag| match tag.kind() {
                TagKind::Value => Either::Left(TagValueFetch {
                    tag: tag.tag().clone(),
                }),
                // Watermark holds live in list cells on the wire.
                TagKind::List | TagKind::Watermark => {
                    Either::Right(TagListFetch::unbounded(tag.tag().clone()))
                }
            });

        GetDataRequest {
            computations: vec![ComputationGetDataRequest {
                computation_id: self.computation.clone(),
                keys: vec![KeyedGetDataRequest {
                    key: self.key.clone(),
                    work_token: self.work_token,
                    value_fetches,
                    list_fetches,
                }],
            }],
        }
    }

    fn consume_response(
        &self,
        response: &GetDataResponse,
        to_fetch: &mut HashMap<Bytes, StateTag>,
    ) -> error_stack::Result<(), Error> {
        if response.computations.len() != 1 {
            return Err(report!(Error::ComputationCount(response.computations.len())));
        }
        let computation = &response.computations[0];
        if computation.computation_id != self.computation {
            return Err(report!(Error::ComputationMismatch {
                expected: self.computation.clone(),
                actual: computation.computation_id.clone(),
            }));
        }
        if computation.keys.len() != 1 {
            return Err(report!(Error::KeyCount(computation.keys.len())));
        }
        let keyed = &computation.keys[0];
        if keyed.key != self.key {
            return Err(report!(Error::KeyMismatch));
        }

        // Tags are removed only after their item routes successfully, so
        // that a fatal error still sweeps the unrouted remainder. A tag
        // delivered twice fails the unrequested-tag check on its second
        // appearance.
        for list in &keyed.lists {
            let tag = to_fetch.get(&list.tag).cloned().ok_or_else(|| {
                report!(Error::UnrequestedTag).attach_printable(format!("list tag {:?}", list.tag))
            })?;
            match tag.kind() {
                TagKind::List => self.consume_tag_list(list, &tag)?,
                TagKind::Watermark => self.consume_watermark(list, &tag)?,
                TagKind::Value => return Err(report!(Error::KindMismatch(tag))),
            }
            to_fetch.remove(&list.tag);
        }

        for value in &keyed.values {
            let tag = to_fetch.get(&value.tag).cloned().ok_or_else(|| {
                report!(Error::UnrequestedTag)
                    .attach_printable(format!("value tag {:?}", value.tag))
            })?;
            if tag.kind() != TagKind::Value {
                return Err(report!(Error::KindMismatch(tag)));
            }
            self.consume_tag_value(value, &tag)?;
            to_fetch.remove(&value.tag);
        }

        if !to_fetch.is_empty() {
            let missing = to_fetch.values().map(|tag| tag.to_string()).sorted().join(", ");
            return Err(report!(Error::IncompleteResponse(missing)));
        }
        Ok(())
    }

    fn consume_tag_list(
        &self,
        item: &TagListItem,
        tag: &StateTag,
    ) -> error_stack::Result<(), Error> {
        let cell = self
            .registry
            .cell(tag)
            .ok_or_else(|| report!(Error::MissingHandle(tag.clone())))?;
        let StoredDecoder::List(decode) = self
            .registry
            .take_decoder(tag)
            .ok_or_else(|| report!(Error::MissingDecoder(tag.clone())))?
        else {
            return Err(report!(Error::MissingDecoder(tag.clone())));
        };

        // Present entries carry a single prefix byte ahead of the element
        // bytes; entries with an absent or empty payload are skipped.
        let elements: Vec<&[u8]> = item
            .entries
            .iter()
            .filter_map(|entry| entry.payload().map(|data| &data[1..]))
            .collect();

        match decode(&elements) {
            Ok(outcome) => {
                if !cell.fulfill(outcome) {
                    return Err(report!(Error::DoubleDelivery(tag.clone())));
                }
            }
            Err(error) => {
                // Scoped to this handle; the rest of the flush proceeds.
                tracing::warn!(%tag, error = ?error, "failed to decode list entries");
                cell.fail(Error::Decode(tag.clone()));
            }
        }
        Ok(())
    }

    fn consume_watermark(
        &self,
        item: &TagListItem,
        tag: &StateTag,
    ) -> error_stack::Result<(), Error> {
        let cell = self
            .registry
            .cell(tag)
            .ok_or_else(|| report!(Error::MissingHandle(tag.clone())))?;

        // The effective hold is the earliest timestamp among entries that
        // carry data; the payload bytes themselves are not interpreted.
        let hold = item
            .entries
            .iter()
            .filter(|entry| entry.payload().is_some())
            .map(|entry| HoldTime::from_micros(entry.timestamp))
            .min();

        let outcome: ErasedOutcome = Arc::new(hold);
        if !cell.fulfill(outcome) {
            return Err(report!(Error::DoubleDelivery(tag.clone())));
        }
        Ok(())
    }

    fn consume_tag_value(
        &self,
        item: &TagValueItem,
        tag: &StateTag,
    ) -> error_stack::Result<(), Error> {
        let cell = self
            .registry
            .cell(tag)
            .ok_or_else(|| report!(Error::MissingHandle(tag.clone())))?;
        let StoredDecoder::Value(decode) = self
            .registry
            .take_decoder(tag)
            .ok_or_else(|| report!(Error::MissingDecoder(tag.clone())))?
        else {
            return Err(report!(Error::MissingDecoder(tag.clone())));
        };

        let payload = item
            .value
            .as_ref()
            .and_then(|value| value.payload())
            .map(|data| data.as_ref());

        match decode(payload) {
            Ok(outcome) => {
                if !cell.fulfill(outcome) {
                    return Err(report!(Error::DoubleDelivery(tag.clone())));
                }
            }
            Err(error) => {
                tracing::warn!(%tag, error = ?error, "failed to decode value");
                cell.fail(Error::Decode(tag.clone()));
            }
        }
        Ok(())
    }

    fn fail_drained(&self, to_fetch: &HashMap<Bytes, StateTag>, error: &Error) {
        for tag in to_fetch.values() {
            if let Some(cell) = self.registry.cell(tag) {
                cell.fail(error.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use kestrel_store_api::testing::MockStore;

    use super::*;
    use crate::DecodeError;

    struct NoopDecoder;

    impl Decoder for NoopDecoder {
        type Value = Vec<u8>;

        fn decode(&self, data: &[u8]) -> error_stack::Result<Vec<u8>, DecodeError> {
            Ok(data.to_vec())
        }
    }

    fn reader(store: &Arc<MockStore>) -> StateReader {
        StateReader::new(
            store.clone() as Arc<dyn StateStore>,
            "stage-7",
            Bytes::from_static(b"DATA_KEY"),
            5043,
        )
    }

    #[test]
    fn test_duplicate_registration_enqueues_once() {
        let store = Arc::new(MockStore::new());
        let reader = reader(&store);

        reader.watermark_handle(Bytes::from_static(b"key1"));
        reader.watermark_handle(Bytes::from_static(b"key1"));

        assert_eq!(reader.core.registry.pending_len(), 1);
        assert_eq!(store.request_count(), 0);
    }

    #[test]
    fn test_distinct_kinds_are_distinct_lookups() {
        let store = Arc::new(MockStore::new());
        let reader = reader(&store);

        reader.value_handle(Bytes::from_static(b"key1"), NoopDecoder);
        reader.list_handle(Bytes::from_static(b"key2"), NoopDecoder);
        reader.watermark_handle(Bytes::from_static(b"key3"));

        assert_eq!(reader.core.registry.pending_len(), 3);
    }

    #[test]
    fn test_flush_without_pending_is_noop() {
        let store = Arc::new(MockStore::new());
        let reader = reader(&store);

        reader.flush().unwrap();
        assert_eq!(store.request_count(), 0);
    }

    #[test]
    fn test_request_partitions_by_kind() {
        let store = Arc::new(MockStore::new());
        let reader = reader(&store);

        reader.value_handle(Bytes::from_static(b"v"), NoopDecoder);
        reader.list_handle(Bytes::from_static(b"l"), NoopDecoder);
        reader.watermark_handle(Bytes::from_static(b"w"));

        let drained = reader.core.registry.drain_pending();
        let request = reader.core.build_request(drained.iter());

        assert_eq!(request.computations.len(), 1);
        let computation = &request.computations[0];
        assert_eq!(computation.computation_id, "stage-7");
        assert_eq!(computation.keys.len(), 1);
        let keyed = &computation.keys[0];
        assert_eq!(keyed.key, Bytes::from_static(b"DATA_KEY"));
        assert_eq!(keyed.work_token, 5043);
        assert_eq!(keyed.value_fetches.len(), 1);
        assert_eq!(keyed.value_fetches[0].tag, Bytes::from_static(b"v"));

        let mut list_tags: Vec<_> = keyed
            .list_fetches
            .iter()
            .map(|fetch| fetch.tag.clone())
            .collect();
        list_tags.sort();
        assert_eq!(
            list_tags,
            vec![Bytes::from_static(b"l"), Bytes::from_static(b"w")]
        );
        assert!(keyed
            .list_fetches
            .iter()
            .all(|fetch| fetch.end_timestamp == i64::MAX));
    }
}
