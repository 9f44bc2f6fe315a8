use proptest::prelude::*;
use schema_checksum::*;
use std::collections::BTreeMap;

const TYPES: &[&str] = &["int", "long", "string", "double", "bool", "::Test::Other"];

fn member() -> impl Strategy<Value = Member> {
    (
        "[a-z]{1,8}",
        prop::sample::select(TYPES),
        prop::option::of(0i32..16),
        any::<bool>(),
    )
        .prop_map(|(name, ty, tag, optional)| Member {
            name,
            ty: ty.to_string(),
            tag,
            optional,
            doc: None,
        })
}

fn definition() -> impl Strategy<Value = TypeDefinition> {
    prop::collection::vec(member(), 0..8)
        .prop_map(|members| TypeDefinition::structure("::Test::Generated", members))
}

fn checksum_map() -> impl Strategy<Value = BTreeMap<String, Checksum>> {
    prop::collection::btree_map("[A-D]", any::<[u8; 2]>(), 0..4).prop_map(|m| {
        m.into_iter()
            .map(|(k, v)| (k, Checksum::from_bytes([v[0], v[1], 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0])))
            .collect()
    })
}

proptest! {
    #[test]
    fn checksum_is_deterministic(def in definition()) {
        prop_assert_eq!(Checksum::of(&def), Checksum::of(&def.clone()));
    }

    #[test]
    fn documentation_never_changes_checksum(def in definition(), doc in ".*") {
        let documented = def.clone().with_doc(doc);
        prop_assert_eq!(Checksum::of(&def), Checksum::of(&documented));
    }

    #[test]
    fn appended_member_changes_checksum(def in definition(), extra in member()) {
        let mut grown = def.clone();
        grown.members.push(extra);
        prop_assert_ne!(Checksum::of(&def), Checksum::of(&grown));
    }

    #[test]
    fn local_definitions_never_registered(defs in prop::collection::vec((definition(), any::<bool>()), 0..6)) {
        let defs: Vec<TypeDefinition> = defs
            .into_iter()
            .enumerate()
            .map(|(i, (mut d, local))| {
                d.name = format!("::Test::T{i}");
                d.local = local;
                d
            })
            .collect();
        let registry = Registry::build(defs.clone()).unwrap();
        for d in &defs {
            prop_assert_eq!(registry.contains(&d.name), !d.local);
        }
    }

    #[test]
    fn verifier_classifies_every_remote_name(local in checksum_map(), remote in checksum_map()) {
        let registry = Registry::from_checksums(local.clone());
        let result = verify(&registry, &remote);

        prop_assert_eq!(result.len(), remote.len());
        for (name, theirs) in &remote {
            let expected = match local.get(name) {
                None => Compatibility::Unknown { remote: *theirs },
                Some(ours) if ours == theirs => Compatibility::Match,
                Some(ours) => Compatibility::Mismatch { local: *ours, remote: *theirs },
            };
            prop_assert_eq!(result.get(name), Some(&expected));
        }
    }
}
