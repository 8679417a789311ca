use bytes::Bytes;

/// The kind of state cell a tag refers to.
///
/// `List` and `Watermark` tags are both fetched as list items on the
/// wire; the recorded kind is what tells their responses apart.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TagKind {
    Value,
    List,
    Watermark,
}

impl TagKind {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            TagKind::Value => "value",
            TagKind::List => "list",
            TagKind::Watermark => "watermark",
        }
    }
}

/// Identifier of one state cell under the bound key and work token.
///
/// Two tags are equal iff both the kind and the tag bytes are equal.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StateTag {
    kind: TagKind,
    tag: Bytes,
}

impl StateTag {
    pub fn new(kind: TagKind, tag: Bytes) -> Self {
        Self { kind, tag }
    }

    pub fn kind(&self) -> TagKind {
        self.kind
    }

    pub fn tag(&self) -> &Bytes {
        &self.tag
    }
}

impl std::fmt::Display for StateTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.kind.label())?;
        for byte in self.tag.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::hash::{Hash, Hasher};

    use super::*;

    fn hash_of(tag: &StateTag) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        tag.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equality_over_both_fields() {
        let tag = Bytes::from_static(b"key1");
        let value = StateTag::new(TagKind::Value, tag.clone());
        let list = StateTag::new(TagKind::List, tag.clone());

        assert_eq!(value, StateTag::new(TagKind::Value, tag.clone()));
        assert_ne!(value, list);
        assert_ne!(
            value,
            StateTag::new(TagKind::Value, Bytes::from_static(b"key2"))
        );
    }

    #[test]
    fn test_hash_distinguishes_kind() {
        let tag = Bytes::from_static(b"key1");
        let value = StateTag::new(TagKind::Value, tag.clone());
        let list = StateTag::new(TagKind::List, tag);
        assert_ne!(hash_of(&value), hash_of(&list));
    }

    #[test]
    fn test_display() {
        let tag = StateTag::new(TagKind::Watermark, Bytes::from_static(b"\x01\xab"));
        assert_eq!(tag.to_string(), "watermark:01ab");
    }
}
