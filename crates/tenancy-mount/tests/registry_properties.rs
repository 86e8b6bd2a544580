//! Property tests for mount resolution

use std::sync::Arc;

use proptest::prelude::*;
use tenancy_mount::{MediaType, MountError, MountRegistry, Resource};

struct Tagged(String);

impl Resource for Tagged {
    fn id(&self) -> &str {
        &self.0
    }
}

fn media_type() -> impl Strategy<Value = MediaType> {
    prop_oneof![
        Just(MediaType::JSON),
        Just(MediaType::HTML),
        Just(MediaType::TEXT),
        Just(MediaType::parse("image/png").unwrap()),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Bind(MediaType, bool),
    Unbind(MediaType),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (media_type(), any::<bool>()).prop_map(|(m, d)| Op::Bind(m, d)),
        media_type().prop_map(Op::Unbind),
    ]
}

proptest! {
    /// At most one binding per media type, and an exact hint always finds
    /// the resource bound for it.
    #[test]
    fn exact_hint_finds_its_binding(ops in prop::collection::vec(op(), 1..40)) {
        let registry = MountRegistry::new();
        let mut expected: std::collections::BTreeMap<MediaType, String> = Default::default();

        for (i, op) in ops.into_iter().enumerate() {
            match op {
                Op::Bind(media, default) => {
                    let id = format!("r{i}");
                    let result = registry.bind("/p", media.clone(), Arc::new(Tagged(id.clone())), default);
                    if expected.contains_key(&media) {
                        let rejected = matches!(result, Err(MountError::AlreadyBound { .. }));
                        prop_assert!(rejected);
                    } else {
                        prop_assert!(result.is_ok());
                        expected.insert(media, id);
                    }
                }
                Op::Unbind(media) => {
                    let removed = registry.unbind("/p", &media);
                    prop_assert_eq!(removed.is_some(), expected.remove(&media).is_some());
                }
            }
        }

        prop_assert_eq!(registry.bindings("/p").len(), expected.len());
        for (media, id) in &expected {
            let binding = registry.resolve("/p", Some(media.as_str())).unwrap();
            prop_assert_eq!(binding.resource.id(), id.as_str());
        }
    }

    /// Resolving without a hint yields the default binding or not-found.
    /// Only an explicit default bind sets the default; unbinding it leaves
    /// none, whatever else is bound or bound later.
    #[test]
    fn unhinted_resolution_tracks_default(ops in prop::collection::vec(op(), 1..40)) {
        let registry = MountRegistry::new();
        let mut default: Option<MediaType> = None;
        for (i, op) in ops.into_iter().enumerate() {
            match op {
                Op::Bind(media, make_default) => {
                    let bound = registry
                        .bind("/p", media.clone(), Arc::new(Tagged(format!("r{i}"))), make_default)
                        .is_ok();
                    if bound && make_default {
                        default = Some(media);
                    }
                }
                Op::Unbind(media) => {
                    if registry.unbind("/p", &media).is_some() && default.as_ref() == Some(&media) {
                        default = None;
                    }
                }
            }
        }

        prop_assert_eq!(registry.default_media_type("/p"), default);

        match registry.default_media_type("/p") {
            Some(media) => {
                let binding = registry.resolve("/p", None).unwrap();
                prop_assert_eq!(binding.media_type, media);
                prop_assert!(binding.is_default);
            }
            None => {
                let not_found = matches!(
                    registry.resolve("/p", None),
                    Err(MountError::NotFound { ref path }) if path == "/p"
                );
                prop_assert!(not_found);
            }
        }
    }
}
