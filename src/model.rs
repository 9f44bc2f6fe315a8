//! In-memory description of the types produced by the schema compiler.
//!
//! Only the fields that change the wire contract take part in the checksum.
//! `doc`, `source` and `local` are carried for diagnostics and filtering.

use serde::{Deserialize, Serialize};

use crate::kind::TypeKind;

/// Location of a declaration in its schema source file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

/// A data member, sequence element, dictionary key/value or constant type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    /// Builtin spelling (`int`, `string`, ...) or the scoped name of another type.
    /// A trailing `*` references a proxy to the named interface.
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<i32>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl Member {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            tag: None,
            optional: false,
            doc: None,
        }
    }

    pub fn optional(mut self, tag: i32) -> Self {
        self.optional = true;
        self.tag = Some(tag);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enumerator {
    pub name: String,
    /// Explicit value. When absent the value is the previous one plus one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<i32>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Parameter>,
    /// Return type, `None` for void.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    /// Exceptions the operation may raise. Order is not significant.
    #[serde(default)]
    pub throws: Vec<String>,
    #[serde(default)]
    pub idempotent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Structural description of one network-visible (or local) type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub enumerators: Vec<Enumerator>,
    #[serde(default)]
    pub operations: Vec<Operation>,
    /// Wire-relevant directives such as `format:sliced`.
    #[serde(default)]
    pub metadata: Vec<String>,
    /// Literal of a constant definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    /// Local types never cross the wire and are kept out of the registry.
    #[serde(default)]
    pub local: bool,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            bases: Vec::new(),
            members: Vec::new(),
            enumerators: Vec::new(),
            operations: Vec::new(),
            metadata: Vec::new(),
            value: None,
            doc: None,
            source: None,
            local: false,
        }
    }

    pub fn structure(name: impl Into<String>, members: Vec<Member>) -> Self {
        Self {
            members,
            ..Self::new(name, TypeKind::Struct)
        }
    }

    pub fn sequence(name: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            members: vec![Member::new("element", element)],
            ..Self::new(name, TypeKind::Sequence)
        }
    }

    pub fn dictionary(
        name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            members: vec![Member::new("key", key), Member::new("value", value)],
            ..Self::new(name, TypeKind::Dictionary)
        }
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}
