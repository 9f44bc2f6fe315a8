use serde::{Deserialize, Serialize};

/// Kind of a network-visible type. The discriminant is the canonical tag fed
/// into the checksum, so existing values must never be renumbered.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Struct = 0x01,
    Enum = 0x02,
    Class = 0x03,
    Interface = 0x04,
    Exception = 0x05,
    Dictionary = 0x06,
    Sequence = 0x07,
    Constant = 0x08,
}

impl TypeKind {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0x01 => Some(TypeKind::Struct),
            0x02 => Some(TypeKind::Enum),
            0x03 => Some(TypeKind::Class),
            0x04 => Some(TypeKind::Interface),
            0x05 => Some(TypeKind::Exception),
            0x06 => Some(TypeKind::Dictionary),
            0x07 => Some(TypeKind::Sequence),
            0x08 => Some(TypeKind::Constant),
            _ => None,
        }
    }
}

/// Builtin types a member may reference without a definition.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    Bool = 0x01,
    Byte = 0x02,
    Short = 0x03,
    Int = 0x04,
    Long = 0x05,
    Float = 0x06,
    Double = 0x07,
    String = 0x08,
    Object = 0x09,
    ObjectPrx = 0x0a,
    Value = 0x0b,
}

impl Builtin {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0x01 => Some(Builtin::Bool),
            0x02 => Some(Builtin::Byte),
            0x03 => Some(Builtin::Short),
            0x04 => Some(Builtin::Int),
            0x05 => Some(Builtin::Long),
            0x06 => Some(Builtin::Float),
            0x07 => Some(Builtin::Double),
            0x08 => Some(Builtin::String),
            0x09 => Some(Builtin::Object),
            0x0a => Some(Builtin::ObjectPrx),
            0x0b => Some(Builtin::Value),
            _ => None,
        }
    }

    /// Resolve a type reference spelling. Width aliases collapse onto the
    /// same tag since they encode identically.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(Builtin::Bool),
            "byte" | "uint8" => Some(Builtin::Byte),
            "short" | "int16" => Some(Builtin::Short),
            "int" | "int32" => Some(Builtin::Int),
            "long" | "int64" => Some(Builtin::Long),
            "float" | "float32" => Some(Builtin::Float),
            "double" | "float64" => Some(Builtin::Double),
            "string" => Some(Builtin::String),
            "Object" => Some(Builtin::Object),
            "Object*" | "ObjectPrx" => Some(Builtin::ObjectPrx),
            "Value" => Some(Builtin::Value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_round_trip() {
        for tag in 0x01..=0x08 {
            let kind = TypeKind::from_u8(tag).unwrap();
            assert_eq!(kind as u8, tag);
        }
        assert_eq!(TypeKind::from_u8(0x00), None);
        assert_eq!(TypeKind::from_u8(0x09), None);
    }

    #[test]
    fn test_builtin_aliases() {
        assert_eq!(Builtin::from_name("int32"), Builtin::from_name("int"));
        assert_eq!(Builtin::from_name("float64"), Some(Builtin::Double));
        assert_eq!(Builtin::from_name("Object*"), Some(Builtin::ObjectPrx));
        assert_eq!(Builtin::from_name("::Test::Widget1"), None);
        assert_eq!(Builtin::from_u8(Builtin::Value as u8), Some(Builtin::Value));
    }

    #[test]
    fn test_kind_serde_lowercase() {
        let kind: TypeKind = serde_json::from_str("\"dictionary\"").unwrap();
        assert_eq!(kind, TypeKind::Dictionary);
        assert_eq!(serde_json::to_string(&TypeKind::Struct).unwrap(), "\"struct\"");
    }
}
