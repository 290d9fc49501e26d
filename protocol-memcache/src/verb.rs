//! Storage verbs shared by both framings.

/// The storage commands: `set`, `add`, `replace`, `append`, `prepend`, `cas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreVerb {
    /// Store unconditionally.
    Set,
    /// Store only if the key does not exist.
    Add,
    /// Store only if the key exists.
    Replace,
    /// Append to an existing value. Flags and expiration are ignored.
    Append,
    /// Prepend to an existing value. Flags and expiration are ignored.
    Prepend,
    /// Store only if the item's cas token still matches.
    Cas,
}

impl StoreVerb {
    /// The text protocol command name.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            StoreVerb::Set => b"set",
            StoreVerb::Add => b"add",
            StoreVerb::Replace => b"replace",
            StoreVerb::Append => b"append",
            StoreVerb::Prepend => b"prepend",
            StoreVerb::Cas => b"cas",
        }
    }

    /// Whether the verb carries flags and an expiration on the wire.
    pub fn has_attributes(&self) -> bool {
        !matches!(self, StoreVerb::Append | StoreVerb::Prepend)
    }

    /// The binary opcode for this verb. `Cas` is a `Set` with a cas value.
    #[cfg(feature = "binary")]
    pub fn opcode(&self) -> crate::binary::Opcode {
        use crate::binary::Opcode;
        match self {
            StoreVerb::Set | StoreVerb::Cas => Opcode::Set,
            StoreVerb::Add => Opcode::Add,
            StoreVerb::Replace => Opcode::Replace,
            StoreVerb::Append => Opcode::Append,
            StoreVerb::Prepend => Opcode::Prepend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes() {
        assert!(StoreVerb::Set.has_attributes());
        assert!(StoreVerb::Cas.has_attributes());
        assert!(!StoreVerb::Append.has_attributes());
        assert!(!StoreVerb::Prepend.has_attributes());
    }

    #[cfg(feature = "binary")]
    #[test]
    fn test_opcode() {
        use crate::binary::Opcode;
        assert_eq!(StoreVerb::Cas.opcode(), Opcode::Set);
        assert_eq!(StoreVerb::Prepend.opcode(), Opcode::Prepend);
    }
}
