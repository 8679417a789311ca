use std::any::Any;
use std::sync::Arc;

/// Failure to decode stored bytes into an element.
#[derive(derive_more::Display, Debug)]
#[display(fmt = "unable to decode stored bytes")]
pub struct DecodeError;

impl error_stack::Context for DecodeError {}

/// Decodes one stored element from its wire bytes.
///
/// Given bytes produced by the corresponding encoder, returns the
/// original element. Implementations must be pure and safe to invoke
/// from whichever thread performs the batched fetch.
pub trait Decoder: Send + Sync + 'static {
    type Value: Send + Sync + 'static;

    fn decode(&self, data: &[u8]) -> error_stack::Result<Self::Value, DecodeError>;
}

/// A resolved outcome with its element type erased.
///
/// `Value` tags resolve to `Option<T>`, `List` tags to `Vec<T>` and
/// `Watermark` tags to `Option<HoldTime>`; the typed handle downcasts
/// back at read time.
pub(crate) type ErasedOutcome = Arc<dyn Any + Send + Sync>;

/// Type-erased decoder recorded at registration time.
///
/// The element type is captured inside the closure, so the registry maps
/// tags to a single monomorphic type while absent markers and empty
/// lists can still be materialized with the right element type.
pub(crate) enum StoredDecoder {
    /// Decodes a value cell; `None` means the cell is absent.
    Value(ErasedValueFn),
    /// Decodes the present entries of a list cell, in store order.
    List(ErasedListFn),
}

type ErasedValueFn =
    Box<dyn Fn(Option<&[u8]>) -> error_stack::Result<ErasedOutcome, DecodeError> + Send + Sync>;
type ErasedListFn =
    Box<dyn Fn(&[&[u8]]) -> error_stack::Result<ErasedOutcome, DecodeError> + Send + Sync>;

impl StoredDecoder {
    pub(crate) fn value<D: Decoder>(decoder: D) -> Self {
        StoredDecoder::Value(Box::new(move |data| {
            let decoded = match data {
                Some(bytes) => Some(decoder.decode(bytes)?),
                None => None,
            };
            let outcome: ErasedOutcome = Arc::new(decoded);
            Ok(outcome)
        }))
    }

    pub(crate) fn list<D: Decoder>(decoder: D) -> Self {
        StoredDecoder::List(Box::new(move |elements| {
            let mut decoded = Vec::with_capacity(elements.len());
            for element in elements {
                decoded.push(decoder.decode(element)?);
            }
            let outcome: ErasedOutcome = Arc::new(decoded);
            Ok(outcome)
        }))
    }
}
