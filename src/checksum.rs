//! Structure-sensitive checksums for type definitions.
//!
//! A definition is first written into a canonical byte form and the bytes are
//! hashed with 128-bit XXH3. The canonical form covers everything that changes
//! the wire contract (kind, name, bases, members and their order, optionality,
//! tags, enumerator values, operation signatures, wire metadata) and nothing
//! else: documentation, source locations and the locality flag are skipped.
//!
//! Named references embed the referenced type's own checksum, so an edit to a
//! nested type changes every enclosing type. Types that reach each other form
//! a cycle; inside a cycle references are written by name and kind, and each
//! member additionally folds in a digest of the whole cycle.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use xxhash_rust::xxh3::xxh3_128;

use crate::kind::Builtin;
use crate::model::{Operation, TypeDefinition};

/// Bumped whenever the canonical layout below changes.
const CANONICAL_VERSION: u8 = 2;

const REF_BUILTIN: u8 = 0xb0;
const REF_PROXY: u8 = 0xb1;
const REF_BACK: u8 = 0xb2;
const REF_NESTED: u8 = 0xb3;
const REF_OPAQUE: u8 = 0xb4;
const REF_CYCLE: u8 = 0xb5;

/// 128-bit digest of a type's canonical form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; 16]);

impl Checksum {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Hash raw canonical bytes.
    pub fn digest(canonical: &[u8]) -> Self {
        Self(xxh3_128(canonical).to_be_bytes())
    }

    /// Stand-alone checksum of a single definition. Named references are
    /// hashed by name only since no other definitions are available.
    pub fn of(def: &TypeDefinition) -> Self {
        // Every indexed definition is sealed in `new`.
        ChecksumEngine::new([def]).digests[def.name.as_str()]
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", hex::encode(self.0))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Checksum {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid checksum {s:?}: {e}"))?;
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| format!("checksum must be 16 bytes, got {}", v.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Append-only canonical byte writer.
#[derive(Default)]
struct Canonical(Vec<u8>);

impl Canonical {
    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }

    fn u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.0.extend_from_slice(&b);
    }

    fn i32(&mut self, v: i32) {
        let mut b = [0u8; 4];
        LittleEndian::write_i32(&mut b, v);
        self.0.extend_from_slice(&b);
    }

    fn i64(&mut self, v: i64) {
        let mut b = [0u8; 8];
        LittleEndian::write_i64(&mut b, v);
        self.0.extend_from_slice(&b);
    }

    fn bool(&mut self, v: bool) {
        self.u8(v as u8);
    }

    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.0.extend_from_slice(s.as_bytes());
    }

    fn len(&mut self, n: usize) {
        self.u32(n as u32);
    }

    fn tag(&mut self, tag: Option<i32>) {
        match tag {
            Some(t) => {
                self.u8(1);
                self.i32(t);
            }
            None => self.u8(0),
        }
    }
}

/// Computes transitive checksums over a set of definitions.
///
/// The reference graph is condensed into strongly connected components
/// (Tarjan) and every component is sealed once, callees first. Every
/// definition is canonicalized exactly once.
pub struct ChecksumEngine<'a> {
    types: HashMap<&'a str, &'a TypeDefinition>,
    component: HashMap<&'a str, usize>,
    digests: HashMap<&'a str, Checksum>,
}

impl<'a> ChecksumEngine<'a> {
    /// Index and checksum the definitions. Name uniqueness is the caller's
    /// concern; on a repeated name the last definition wins.
    pub fn new(defs: impl IntoIterator<Item = &'a TypeDefinition>) -> Self {
        let types: HashMap<&'a str, &'a TypeDefinition> =
            defs.into_iter().map(|d| (d.name.as_str(), d)).collect();

        let mut nodes: Vec<&'a TypeDefinition> = types.values().copied().collect();
        nodes.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        let position: HashMap<&'a str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, &d)| (d.name.as_str(), i))
            .collect();
        let edges: Vec<Vec<usize>> = nodes
            .iter()
            .map(|d| {
                references(d)
                    .filter_map(|r| position.get(r).copied())
                    .collect()
            })
            .collect();

        let components = strongly_connected(&edges);

        let mut engine = Self {
            types,
            component: HashMap::with_capacity(nodes.len()),
            digests: HashMap::with_capacity(nodes.len()),
        };
        for (id, members) in components.iter().enumerate() {
            for &i in members {
                let def = nodes[i];
                engine.component.insert(def.name.as_str(), id);
            }
        }
        for (id, members) in components.iter().enumerate() {
            let members: Vec<&'a TypeDefinition> = members.iter().map(|&i| nodes[i]).collect();
            engine.seal(id, &members);
        }
        engine
    }

    /// Checksum of the named definition, or `None` if it is not indexed.
    pub fn compute(&self, name: &str) -> Option<Checksum> {
        self.digests.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, Checksum)> + '_ {
        self.digests.iter().map(|(k, v)| (*k, *v))
    }

    /// Digest every member of one component. All components it references
    /// are already sealed.
    fn seal(&mut self, id: usize, members: &[&'a TypeDefinition]) {
        let mut canon: Vec<(&'a str, Vec<u8>)> = members
            .iter()
            .map(|&d| (d.name.as_str(), self.canonical(d, Some(id))))
            .collect();

        if let [(name, bytes)] = canon.as_slice() {
            self.digests.insert(*name, Checksum::digest(bytes));
            return;
        }

        // Members of a cycle reference each other by name only, so each one
        // also folds in a digest of the whole cycle. An edit anywhere in the
        // cycle then reaches every member.
        canon.sort_unstable_by(|a, b| a.0.cmp(b.0));
        let mut ring = Canonical::default();
        ring.len(canon.len());
        for (name, bytes) in &canon {
            ring.str(name);
            ring.0.extend_from_slice(Checksum::digest(bytes).as_bytes());
        }
        let ring = Checksum::digest(&ring.0);

        for (name, mut bytes) in canon {
            bytes.push(REF_CYCLE);
            bytes.extend_from_slice(ring.as_bytes());
            self.digests.insert(name, Checksum::digest(&bytes));
        }
    }

    fn canonical(&self, def: &TypeDefinition, id: Option<usize>) -> Vec<u8> {
        let mut out = Canonical::default();

        out.u8(CANONICAL_VERSION);
        out.u8(def.kind as u8);
        out.str(&def.name);

        let mut bases: Vec<&str> = def.bases.iter().map(String::as_str).collect();
        bases.sort_unstable();
        bases.dedup();
        out.len(bases.len());
        for base in bases {
            self.reference(&mut out, base, id);
        }

        out.len(def.members.len());
        for member in &def.members {
            out.str(&member.name);
            self.reference(&mut out, &member.ty, id);
            out.bool(member.optional);
            out.tag(member.tag);
        }

        out.len(def.enumerators.len());
        let mut next = 0i64;
        for e in &def.enumerators {
            let value = e.value.unwrap_or(next);
            out.str(&e.name);
            out.i64(value);
            next = value.wrapping_add(1);
        }

        out.len(def.operations.len());
        for op in &def.operations {
            self.operation(&mut out, op, id);
        }

        let metadata: BTreeSet<&str> = def.metadata.iter().map(String::as_str).collect();
        out.len(metadata.len());
        for m in metadata {
            out.str(m);
        }

        match &def.value {
            Some(v) => {
                out.u8(1);
                out.str(v);
            }
            None => out.u8(0),
        }

        out.0
    }

    fn operation(&self, out: &mut Canonical, op: &Operation, id: Option<usize>) {
        out.str(&op.name);
        out.bool(op.idempotent);

        match &op.returns {
            Some(ty) => {
                out.u8(1);
                self.reference(out, ty, id);
            }
            None => out.u8(0),
        }

        out.len(op.params.len());
        for p in &op.params {
            out.str(&p.name);
            out.bool(p.out);
            out.bool(p.optional);
            out.tag(p.tag);
            self.reference(out, &p.ty, id);
        }

        let mut throws: Vec<&str> = op.throws.iter().map(String::as_str).collect();
        throws.sort_unstable();
        throws.dedup();
        out.len(throws.len());
        for ex in throws {
            self.reference(out, ex, id);
        }
    }

    fn reference(&self, out: &mut Canonical, ty: &str, id: Option<usize>) {
        if let Some(builtin) = Builtin::from_name(ty) {
            out.u8(REF_BUILTIN);
            out.u8(builtin as u8);
            return;
        }

        // A proxy encodes as an object identity; the interface's operations
        // do not affect its wire form.
        if let Some(target) = ty.strip_suffix('*') {
            out.u8(REF_PROXY);
            out.str(target);
            return;
        }

        let Some(nested) = self.types.get(ty).copied() else {
            out.u8(REF_OPAQUE);
            out.str(ty);
            return;
        };

        if id.is_some() && self.component.get(ty).copied() == id {
            out.u8(REF_BACK);
            out.str(ty);
            out.u8(nested.kind as u8);
            return;
        }

        match self.digests.get(ty) {
            Some(sum) => {
                out.u8(REF_NESTED);
                out.str(ty);
                out.u8(nested.kind as u8);
                out.0.extend_from_slice(sum.as_bytes());
            }
            // Unreachable once components are sealed callees first.
            None => {
                out.u8(REF_OPAQUE);
                out.str(ty);
            }
        }
    }
}

/// Every type name a definition refers to, builtins and proxies included.
fn references(def: &TypeDefinition) -> impl Iterator<Item = &str> {
    let ops = def.operations.iter().flat_map(|op| {
        op.returns
            .iter()
            .map(String::as_str)
            .chain(op.params.iter().map(|p| p.ty.as_str()))
            .chain(op.throws.iter().map(String::as_str))
    });
    def.bases
        .iter()
        .map(String::as_str)
        .chain(def.members.iter().map(|m| m.ty.as_str()))
        .chain(ops)
}

/// Iterative Tarjan. Components come out in reverse topological order:
/// a component is emitted only after everything it reaches.
fn strongly_connected(edges: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let n = edges.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut components = Vec::new();
    let mut next = 0usize;

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = next;
        low[root] = next;
        next += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut work: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(top) = work.last_mut() {
            let (v, i) = *top;
            if let Some(&w) = edges[v].get(i) {
                top.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = next;
                    low[w] = next;
                    next += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    work.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            work.pop();
            if low[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
            if let Some(&(parent, _)) = work.last() {
                low[parent] = low[parent].min(low[v]);
            }
        }
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::TypeKind;
    use crate::model::{Enumerator, Member, Parameter, SourceLocation};

    fn widget1() -> TypeDefinition {
        TypeDefinition::structure(
            "::Test::Widget1",
            vec![Member::new("id", "int"), Member::new("name", "string")],
        )
    }

    #[test]
    fn test_checksum_is_deterministic() {
        assert_eq!(Checksum::of(&widget1()), Checksum::of(&widget1()));
    }

    #[test]
    fn test_cosmetic_fields_are_ignored() {
        let mut decorated = widget1().with_doc("A widget.").with_local(true);
        decorated.source = Some(SourceLocation {
            file: "Test.ice".into(),
            line: 42,
        });
        decorated.members[0].doc = Some("identifier".into());

        assert_eq!(Checksum::of(&widget1()), Checksum::of(&decorated));
    }

    #[test]
    fn test_member_changes_are_detected() {
        let base = Checksum::of(&widget1());

        let mut added = widget1();
        added.members.push(Member::new("price", "double"));
        assert_ne!(base, Checksum::of(&added));

        let mut removed = widget1();
        removed.members.pop();
        assert_ne!(base, Checksum::of(&removed));

        let mut retyped = widget1();
        retyped.members[0].ty = "long".into();
        assert_ne!(base, Checksum::of(&retyped));

        let mut reordered = widget1();
        reordered.members.swap(0, 1);
        assert_ne!(base, Checksum::of(&reordered));

        let mut optional = widget1();
        optional.members[1] = Member::new("name", "string").optional(1);
        assert_ne!(base, Checksum::of(&optional));

        let mut retagged = optional.clone();
        retagged.members[1].tag = Some(2);
        assert_ne!(Checksum::of(&optional), Checksum::of(&retagged));
    }

    #[test]
    fn test_builtin_aliases_hash_alike() {
        let aliased = TypeDefinition::structure(
            "::Test::Widget1",
            vec![Member::new("id", "int32"), Member::new("name", "string")],
        );
        assert_eq!(Checksum::of(&widget1()), Checksum::of(&aliased));
    }

    #[test]
    fn test_kind_is_part_of_checksum() {
        let mut exception = widget1();
        exception.kind = TypeKind::Exception;
        assert_ne!(Checksum::of(&widget1()), Checksum::of(&exception));
    }

    #[test]
    fn test_enumerator_values() {
        let mut implicit = TypeDefinition::new("::Test::Color", TypeKind::Enum);
        implicit.enumerators = vec![
            Enumerator { name: "red".into(), value: None, doc: None },
            Enumerator { name: "green".into(), value: None, doc: None },
        ];
        let mut explicit = implicit.clone();
        explicit.enumerators[1].value = Some(1);
        assert_eq!(Checksum::of(&implicit), Checksum::of(&explicit));

        explicit.enumerators[1].value = Some(5);
        assert_ne!(Checksum::of(&implicit), Checksum::of(&explicit));
    }

    #[test]
    fn test_order_insensitive_sets() {
        let mut a = TypeDefinition::new("::Test::Api", TypeKind::Interface);
        a.bases = vec!["::Test::B".into(), "::Test::A".into()];
        a.metadata = vec!["amd".into(), "format:sliced".into()];
        a.operations = vec![Operation {
            name: "op".into(),
            params: vec![Parameter {
                name: "x".into(),
                ty: "int".into(),
                out: false,
                tag: None,
                optional: false,
            }],
            returns: Some("string".into()),
            throws: vec!["::Test::E1".into(), "::Test::E2".into()],
            idempotent: false,
            doc: None,
        }];

        let mut b = a.clone();
        b.bases.reverse();
        b.metadata.reverse();
        b.operations[0].throws.reverse();
        assert_eq!(Checksum::of(&a), Checksum::of(&b));

        b.operations[0].idempotent = true;
        assert_ne!(Checksum::of(&a), Checksum::of(&b));

        let mut c = a.clone();
        c.operations[0].params[0].out = true;
        assert_ne!(Checksum::of(&a), Checksum::of(&c));
    }

    #[test]
    fn test_nested_change_propagates() {
        let outer = TypeDefinition::structure(
            "::Test::Holder",
            vec![Member::new("w", "::Test::Widget1")],
        );
        let w1 = widget1();
        let mut w2 = widget1();
        w2.members.push(Member::new("price", "double"));

        let before = ChecksumEngine::new([&outer, &w1]).compute("::Test::Holder");
        let after = ChecksumEngine::new([&outer, &w2]).compute("::Test::Holder");
        assert!(before.is_some());
        assert_ne!(before, after);
    }

    fn class(name: &str, refs: &[&str]) -> TypeDefinition {
        TypeDefinition {
            members: refs
                .iter()
                .enumerate()
                .map(|(i, r)| Member::new(format!("m{i}"), *r))
                .collect(),
            ..TypeDefinition::new(name, TypeKind::Class)
        }
    }

    #[test]
    fn test_mutual_recursion_is_order_independent() {
        let a = class("::Test::A", &["::Test::B"]);
        let b = class("::Test::B", &["::Test::A"]);

        let forward = ChecksumEngine::new([&a, &b]);
        let backward = ChecksumEngine::new([&b, &a]);

        let a1 = forward.compute("::Test::A").unwrap();
        let b1 = forward.compute("::Test::B").unwrap();
        assert_eq!(backward.compute("::Test::A"), Some(a1));
        assert_eq!(backward.compute("::Test::B"), Some(b1));
        assert_ne!(a1, b1);
    }

    #[test]
    fn test_change_inside_cycle_reaches_every_member() {
        let a = class("::Test::A", &["::Test::B"]);
        let b = class("::Test::B", &["::Test::A"]);
        let mut b2 = b.clone();
        b2.members.push(Member::new("extra", "int"));

        let before = ChecksumEngine::new([&a, &b]);
        let after = ChecksumEngine::new([&a, &b2]);
        assert_ne!(before.compute("::Test::A"), after.compute("::Test::A"));
        assert_ne!(before.compute("::Test::B"), after.compute("::Test::B"));
    }

    #[test]
    fn test_cycle_change_propagates_to_holder() {
        let holder = class("::Test::Holder", &["::Test::A"]);
        let a = class("::Test::A", &["::Test::B"]);
        let b = class("::Test::B", &["::Test::A"]);
        let b2 = class("::Test::B", &["::Test::A", "string"]);

        let before = ChecksumEngine::new([&holder, &a, &b]).compute("::Test::Holder");
        let after = ChecksumEngine::new([&holder, &a, &b2]).compute("::Test::Holder");
        assert!(before.is_some());
        assert_ne!(before, after);
    }

    #[test]
    fn test_dense_ring_is_fast_and_order_independent() {
        let n = 40;
        let name = |i: usize| format!("::Test::R{}", i % n);
        let defs: Vec<TypeDefinition> = (0..n)
            .map(|i| class(&name(i), &[name(i + 1).as_str(), name(i + 2).as_str()]))
            .collect();

        let started = std::time::Instant::now();
        let forward = ChecksumEngine::new(&defs);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        let backward = ChecksumEngine::new(defs.iter().rev());
        let mut sums = std::collections::HashSet::new();
        for i in 0..n {
            let sum = forward.compute(&name(i)).unwrap();
            assert_eq!(backward.compute(&name(i)), Some(sum));
            sums.insert(sum);
        }
        assert_eq!(sums.len(), n);
    }

    #[test]
    fn test_complete_graph_builds() {
        let n = 30;
        let names: Vec<String> = (0..n).map(|i| format!("::Test::K{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let defs: Vec<TypeDefinition> = names.iter().map(|nm| class(nm, &refs)).collect();

        let engine = ChecksumEngine::new(&defs);
        assert_eq!(engine.iter().count(), n);
    }

    #[test]
    fn test_strongly_connected_order() {
        // 0 -> 1 <-> 2 -> 3, 4 alone
        let edges = vec![vec![1], vec![2], vec![1, 3], vec![], vec![]];
        let mut components = strongly_connected(&edges);
        for c in &mut components {
            c.sort_unstable();
        }
        let pos = |x: usize| components.iter().position(|c| c.contains(&x)).unwrap();

        assert_eq!(components.len(), 4);
        assert_eq!(components[pos(1)], vec![1, 2]);
        assert!(pos(3) < pos(1));
        assert!(pos(1) < pos(0));
    }

    #[test]
    fn test_self_reference() {
        let node = class("::Test::Node", &["::Test::Node"]);
        let engine = ChecksumEngine::new([&node]);
        assert_eq!(engine.compute("::Test::Node"), Some(Checksum::of(&node)));
        assert_eq!(engine.compute("::Test::Missing"), None);
    }

    #[test]
    fn test_display_and_parse() {
        let sum = Checksum::from_bytes([0xab; 16]);
        let text = sum.to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(text.parse::<Checksum>().unwrap(), sum);
        assert_eq!(format!("{:?}", sum), format!("Checksum({})", text));
        assert!("abcd".parse::<Checksum>().is_err());
        assert!("zz".repeat(16).parse::<Checksum>().is_err());
    }
}
