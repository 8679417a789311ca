use bytes::Bytes;

/// Upper bound used when a list is fetched whole.
pub const UNBOUNDED_TIMESTAMP: i64 = i64::MAX;

/// Composite state fetch issued for one unit of work.
///
/// The reader always produces exactly one computation block containing
/// exactly one keyed block; the `Vec`s exist because the wire shape
/// allows batching across computations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetDataRequest {
    pub computations: Vec<ComputationGetDataRequest>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComputationGetDataRequest {
    /// Name of the logical pipeline stage.
    pub computation_id: String,
    pub keys: Vec<KeyedGetDataRequest>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyedGetDataRequest {
    /// Key identifying the keyed work unit.
    pub key: Bytes,
    /// Identifier of the current work lease.
    pub work_token: i64,
    pub value_fetches: Vec<TagValueFetch>,
    pub list_fetches: Vec<TagListFetch>,
}

impl KeyedGetDataRequest {
    pub fn new(key: Bytes, work_token: i64) -> Self {
        Self {
            key,
            work_token,
            value_fetches: Vec::new(),
            list_fetches: Vec::new(),
        }
    }
}

/// Fetch of a single opaque value cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagValueFetch {
    pub tag: Bytes,
}

/// Fetch of a full list cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagListFetch {
    pub tag: Bytes,
    /// Exclusive upper bound on entry timestamps, in microseconds.
    pub end_timestamp: i64,
}

impl TagListFetch {
    /// A fetch of the whole list, with no upper bound.
    pub fn unbounded(tag: Bytes) -> Self {
        Self {
            tag,
            end_timestamp: UNBOUNDED_TIMESTAMP,
        }
    }
}

/// Response to a [`GetDataRequest`], mirroring its block structure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetDataResponse {
    pub computations: Vec<ComputationGetDataResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComputationGetDataResponse {
    pub computation_id: String,
    pub keys: Vec<KeyedGetDataResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyedGetDataResponse {
    pub key: Bytes,
    pub values: Vec<TagValueItem>,
    pub lists: Vec<TagListItem>,
}

/// Returned contents of one value cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagValueItem {
    pub tag: Bytes,
    pub value: Option<StoredValue>,
}

/// Returned contents of one list cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagListItem {
    pub tag: Bytes,
    pub entries: Vec<StoredValue>,
}

/// One stored datum with its timestamp.
///
/// List entries that represent a present element carry the element bytes
/// prefixed with a single zero byte, so that an element which encodes to
/// zero bytes is distinguishable from an absent entry. Value cells carry
/// the element bytes unmodified.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoredValue {
    pub data: Option<Bytes>,
    /// Microseconds since the epoch.
    pub timestamp: i64,
}

impl StoredValue {
    pub fn new(data: Bytes, timestamp: i64) -> Self {
        Self {
            data: Some(data),
            timestamp,
        }
    }

    /// The payload bytes, if present and non-empty.
    ///
    /// Absent and empty payloads are equivalent on the wire.
    pub fn payload(&self) -> Option<&Bytes> {
        self.data.as_ref().filter(|data| !data.is_empty())
    }
}
