//! Property tests for the codecs and the driver selection.

use cardshell::atr::AtrPattern;
use cardshell::error::{EncodingError, TlvFault};
use cardshell::fields::descriptor::FileDescriptor;
use cardshell::fields::security::{KeyRequirement, SecurityAttributes, SecurityRule};
use cardshell::tlv::{self, Context, Node, TagTable};
use cardshell::{Command, Registry};
use proptest::prelude::*;

fn nibble_mask() -> impl Strategy<Value = u8> {
    prop_oneof![Just(0x00u8), Just(0x0F), Just(0xF0), Just(0xFF)]
}

fn pattern_and_atr() -> impl Strategy<Value = (Vec<u8>, Vec<u8>, Vec<u8>)> {
    (1usize..33).prop_flat_map(|len| {
        (
            prop::collection::vec(any::<u8>(), len),
            prop::collection::vec(nibble_mask(), len),
            prop::collection::vec(any::<u8>(), len),
        )
    })
}

fn command() -> impl Strategy<Value = Command> {
    (
        any::<[u8; 4]>(),
        prop::collection::vec(any::<u8>(), 0..=255),
        any::<Option<u8>>(),
    )
        .prop_map(|([cla, ins, p1, p2], payload, le)| Command {
            cla,
            ins,
            p1,
            p2,
            payload,
            le,
        })
}

/// Trees of single-octet tags: primitive `80`..`9E` and constructed `A0`..`BE`.
fn node() -> impl Strategy<Value = Node> {
    let leaf = (0x80u32..=0x9E, prop::collection::vec(any::<u8>(), 0..300))
        .prop_map(|(tag, value)| Node::primitive(tag, value));

    leaf.prop_recursive(3, 24, 4, |inner| {
        (0xA0u32..=0xBE, prop::collection::vec(inner, 0..4))
            .prop_map(|(tag, children)| Node::constructed(tag, children))
    })
}

/// Templates with four-octet lengths, one inside the other, around `80 00`.
fn nested_templates(tags: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(tags.len() * 6 + 2);
    for (level, tag) in tags.iter().enumerate() {
        let length = (2 + 6 * (tags.len() - 1 - level)) as u32;
        bytes.extend_from_slice(&[*tag, 0x84]);
        bytes.extend_from_slice(&length.to_be_bytes());
    }
    bytes.extend_from_slice(&[0x80, 0x00]);
    bytes
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_atr_matches_fixed_nibbles((value, mask, atr) in pattern_and_atr()) {
        let pattern = AtrPattern::with_mask(&value, &mask);
        let expected = atr
            .iter()
            .zip(value.iter().zip(&mask))
            .all(|(a, (v, m))| a & m == v & m);

        prop_assert_eq!(expected, pattern.matches(&atr));
        prop_assert!(AtrPattern::with_mask(&value, &mask).matches(
            &value.iter().zip(&atr).zip(&mask).map(|((v, a), m)| (v & m) | (a & !m)).collect::<Vec<_>>()
        ));
    }

    #[test]
    fn prop_atr_length_must_match(value in prop::collection::vec(any::<u8>(), 1..33), extra in any::<u8>()) {
        let pattern = AtrPattern::with_mask(&value, &vec![0x00; value.len()]);
        let mut longer = value.clone();
        longer.push(extra);

        prop_assert!(pattern.matches(&value));
        prop_assert!(!pattern.matches(&longer));
        prop_assert!(!pattern.matches(&value[1..]));
    }

    #[test]
    fn prop_selection_is_deterministic(atr in prop::collection::vec(any::<u8>(), 0..33)) {
        let registry = Registry::builtin().unwrap();
        let first = registry.select(&atr).map(|d| d.name).ok();
        let second = registry.select(&atr).map(|d| d.name).ok();

        prop_assert_eq!(first, second);
        if let Some(name) = first {
            let best = registry
                .drivers()
                .iter()
                .filter_map(|d| d.matches(&atr))
                .max();
            prop_assert_eq!(best, registry.by_name(name).unwrap().matches(&atr));
        }
    }

    #[test]
    fn prop_command_layout(command in command()) {
        let bytes = command.to_bytes().unwrap();
        let expected_len = 4
            + match command.payload.len() {
                0 => 0,
                n => n + 1,
            }
            + command.le.is_some() as usize;

        prop_assert_eq!(expected_len, bytes.len());
        prop_assert_eq!(&[command.cla, command.ins, command.p1, command.p2][..], &bytes[..4]);
        if !command.payload.is_empty() {
            prop_assert_eq!(command.payload.len(), bytes[4] as usize);
        }
        prop_assert_eq!(command.clone(), Command::parse(&bytes).unwrap());
    }

    #[test]
    fn prop_oversized_payload_is_rejected(len in 256usize..1024) {
        let command = Command::template(0xD6).with_payload(vec![0u8; len]);

        prop_assert_eq!(Err(EncodingError::PayloadTooLong(len)), command.to_bytes());
    }

    #[test]
    fn prop_tlv_round_trip(nodes in prop::collection::vec(node(), 0..5)) {
        let bytes = tlv::encode(&nodes);
        let decoding = tlv::decode(&bytes, Context::Top, &TagTable::new());

        prop_assert!(decoding.is_complete());
        prop_assert_eq!(nodes, decoding.nodes);
    }

    #[test]
    fn prop_tlv_truncation(nodes in prop::collection::vec(node(), 1..5), cut in any::<prop::sample::Index>()) {
        let bytes = tlv::encode(&nodes);
        let cut = cut.index(bytes.len());

        // Offsets at which each top-level object starts.
        let starts: Vec<usize> = nodes
            .iter()
            .scan(0, |offset, node| {
                let start = *offset;
                *offset += node.to_bytes().len();
                Some(start)
            })
            .collect();
        let complete = starts.iter().filter(|s| **s <= cut).count() - 1;

        let decoding = tlv::decode(&bytes[..cut], Context::Top, &TagTable::new());

        match cut == starts[complete] {
            true => {
                prop_assert!(decoding.is_complete());
                prop_assert_eq!(&nodes[..complete], &decoding.nodes[..]);
            }
            _ => {
                let error = decoding.error.unwrap();
                prop_assert_eq!(starts[complete], error.offset);
                prop_assert_eq!(&nodes[..complete], &decoding.nodes[..]);
            }
        }
    }

    #[test]
    fn prop_truncated_value_offset(
        prefix in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..100), 0..4),
        value in prop::collection::vec(any::<u8>(), 1..100),
        missing in 1usize..100,
    ) {
        let mut nodes: Vec<Node> = prefix.into_iter().map(|v| Node::primitive(0x80, v)).collect();
        let offset = tlv::encode(&nodes).len();
        let missing = missing.min(value.len());
        nodes.push(Node::primitive(0x81, value.clone()));

        let bytes = tlv::encode(&nodes);
        let decoding = tlv::decode(&bytes[..bytes.len() - missing], Context::Top, &TagTable::new());
        let error = decoding.error.unwrap();

        prop_assert_eq!(offset, error.offset);
        prop_assert_eq!(
            TlvFault::TruncatedValue { declared: value.len(), available: value.len() - missing },
            error.fault
        );
        prop_assert_eq!(nodes.len() - 1, decoding.nodes.len());
    }

    #[test]
    fn prop_nesting_is_bounded(tags in prop::collection::vec(0xA0u8..=0xBE, 1..300)) {
        let decoding = tlv::decode(&nested_templates(&tags), Context::Top, &TagTable::new());

        prop_assert_eq!(1, decoding.nodes.len());
        match tags.len() < tlv::MAX_DEPTH {
            true => prop_assert!(decoding.is_complete()),
            _ => {
                let error = decoding.error.unwrap();
                prop_assert_eq!((tlv::MAX_DEPTH - 1) * 6, error.offset);
                prop_assert_eq!(TlvFault::TooDeep, error.fault);
            }
        }
    }

    #[test]
    fn prop_unsupported_length_offset(
        prefix in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..100), 0..4),
        length in prop_oneof![Just(0x80u8), 0x85u8..=0xFF],
        rest in prop::collection::vec(any::<u8>(), 0..16),
    ) {
        let nodes: Vec<Node> = prefix.into_iter().map(|v| Node::primitive(0x80, v)).collect();
        let mut bytes = tlv::encode(&nodes);
        let offset = bytes.len();
        bytes.extend_from_slice(&[0x81, length]);
        bytes.extend_from_slice(&rest);

        let decoding = tlv::decode(&bytes, Context::Top, &TagTable::new());
        let error = decoding.error.unwrap();

        prop_assert_eq!(offset, error.offset);
        prop_assert_eq!(TlvFault::UnsupportedLength, error.fault);
        prop_assert_eq!(nodes, decoding.nodes);
    }

    #[test]
    fn prop_tlv_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let decoding = tlv::decode(&bytes, Context::Top, &TagTable::new());

        if let Some(error) = decoding.error {
            prop_assert!(error.offset < bytes.len());
        }
    }

    #[test]
    fn prop_bit_fields_are_total(octets in prop::collection::vec(any::<u8>(), 0..16)) {
        let descriptor = FileDescriptor::decode(&octets);
        prop_assert_eq!(&octets, &descriptor.raw);
        if let Some(status) = &descriptor.status {
            prop_assert!(!status.lines.is_empty());
        }
        let _ = descriptor.summary();
        let _ = descriptor.to_string();

        let attributes = SecurityAttributes::decode(&octets);
        prop_assert_eq!(octets.len() / 6, attributes.rules.len());
        prop_assert_eq!(octets.len() % 6, attributes.trailing.len());
        let _ = attributes.to_string();
    }

    #[test]
    fn prop_rules_decode_any_octets(raw in any::<[u8; 6]>()) {
        let rule = SecurityRule::decode(raw);

        prop_assert_eq!(raw, rule.raw);
        prop_assert!(!rule.to_string().is_empty());
        prop_assert!(!KeyRequirement::decode(raw[0]).to_string().is_empty());
    }
}

#[test]
fn test_ten_thousand_nested_templates() {
    let bytes = nested_templates(&[0xA0; 10_000]);
    let decoding = tlv::decode(&bytes, Context::Top, &TagTable::new());

    assert_eq!(
        Some(TlvFault::TooDeep),
        decoding.error.map(|error| error.fault)
    );
}
