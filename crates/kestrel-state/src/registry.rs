use std::sync::Arc;

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::decoder::StoredDecoder;
use crate::handle::StateCell;
use crate::StateTag;

/// Registry of issued state cells, their decoders and the tags still
/// awaiting transmission.
///
/// One lock covers all three tables, so `was_new` implies the tag is in
/// the pending queue: a flush that observes a registration drains its
/// tag, and a registration that observes an existing cell never
/// re-enqueues.
pub(crate) struct StateRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    cells: HashMap<StateTag, Arc<StateCell>>,
    decoders: HashMap<StateTag, StoredDecoder>,
    pending: Vec<StateTag>,
}

pub(crate) struct Registration {
    pub(crate) cell: Arc<StateCell>,
    pub(crate) was_new: bool,
}

impl StateRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Return the cell registered for `tag`, installing a fresh pending
    /// cell (and recording `decoder`, and enqueueing the tag) if this is
    /// the first registration.
    ///
    /// A later registration's decoder is dropped; the first one wins.
    pub(crate) fn register(&self, tag: StateTag, decoder: Option<StoredDecoder>) -> Registration {
        let mut inner = self.inner.lock();
        let RegistryInner {
            cells,
            decoders,
            pending,
        } = &mut *inner;

        match cells.entry(tag) {
            Entry::Occupied(occupied) => Registration {
                cell: occupied.get().clone(),
                was_new: false,
            },
            Entry::Vacant(vacant) => {
                let tag = vacant.key().clone();
                let cell = StateCell::new();
                vacant.insert(cell.clone());
                if let Some(decoder) = decoder {
                    decoders.insert(tag.clone(), decoder);
                }
                tracing::trace!(%tag, "queued state lookup");
                pending.push(tag);
                Registration {
                    cell,
                    was_new: true,
                }
            }
        }
    }

    /// Take every tag awaiting transmission, in registration order.
    pub(crate) fn drain_pending(&self) -> Vec<StateTag> {
        std::mem::take(&mut self.inner.lock().pending)
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub(crate) fn cell(&self, tag: &StateTag) -> Option<Arc<StateCell>> {
        self.inner.lock().cells.get(tag).cloned()
    }

    /// Remove and return the decoder recorded for `tag`.
    pub(crate) fn take_decoder(&self, tag: &StateTag) -> Option<StoredDecoder> {
        self.inner.lock().decoders.remove(tag)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::decoder::{DecodeError, Decoder};
    use crate::TagKind;

    struct StaticDecoder(i32);

    impl Decoder for StaticDecoder {
        type Value = i32;

        fn decode(&self, _data: &[u8]) -> error_stack::Result<i32, DecodeError> {
            Ok(self.0)
        }
    }

    fn watermark_tag(tag: &'static [u8]) -> StateTag {
        StateTag::new(TagKind::Watermark, Bytes::from_static(tag))
    }

    #[test]
    fn test_register_installs_and_enqueues_once() {
        let registry = StateRegistry::new();
        let tag = watermark_tag(b"key1");

        let first = registry.register(tag.clone(), None);
        assert!(first.was_new);
        assert_eq!(registry.pending_len(), 1);

        let second = registry.register(tag.clone(), None);
        assert!(!second.was_new);
        assert!(Arc::ptr_eq(&first.cell, &second.cell));
        assert_eq!(registry.pending_len(), 1);
    }

    #[test]
    fn test_drain_returns_registration_order() {
        let registry = StateRegistry::new();
        let first = watermark_tag(b"a");
        let second = watermark_tag(b"b");
        registry.register(first.clone(), None);
        registry.register(second.clone(), None);

        assert_eq!(registry.drain_pending(), vec![first, second]);
        assert_eq!(registry.pending_len(), 0);
    }

    #[test]
    fn test_first_decoder_wins() {
        let registry = StateRegistry::new();
        let tag = StateTag::new(TagKind::Value, Bytes::from_static(b"key1"));

        registry.register(tag.clone(), Some(StoredDecoder::value(StaticDecoder(1))));
        registry.register(tag.clone(), Some(StoredDecoder::value(StaticDecoder(2))));

        let decoder = registry.take_decoder(&tag).unwrap();
        let StoredDecoder::Value(decode) = decoder else {
            panic!("expected value decoder");
        };
        let outcome = decode(Some(b"ignored".as_slice())).unwrap();
        assert_eq!(outcome.downcast_ref::<Option<i32>>(), Some(&Some(1)));

        // Consumed on take.
        assert!(registry.take_decoder(&tag).is_none());
    }
}
