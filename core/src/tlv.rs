//! BER-TLV support for file control information and friends.
//!
//! The same tag can mean different things depending on the template it is nested in, so decoding
//! carries a [`Context`] down the tree and looks tags up in a [`TagTable`] by context first.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::error::{MalformedTlv, TlvFault};
use crate::fields::descriptor::FileDescriptor;
use crate::fields::security::SecurityAttributes;

/// The template a TLV object appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Context {
    /// Outside of any known template.
    Top,
    /// File control parameters (`62`).
    Fcp,
    /// File control information (`6F`).
    Fci,
    /// File management data (`64`).
    Fmd,
}

impl std::str::FromStr for Context {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "fcp" => Ok(Self::Fcp),
            "fci" => Ok(Self::Fci),
            "fmd" => Ok(Self::Fmd),
            _ => Err(format!("unknown TLV context: {}", s)),
        }
    }
}

/// A BER tag, stored as its encoded octets read big-endian (`0x9F38` for a two-octet tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Tag(pub u32);

impl Tag {
    /// Whether the tag denotes a constructed object.
    pub fn is_constructed(&self) -> bool {
        self.to_bytes()[0] & 0x20 == 0x20
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let bytes = self.0.to_be_bytes();
        let skip = bytes.iter().take(3).take_while(|b| **b == 0).count();

        bytes[skip..].to_vec()
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode_upper(self.to_bytes()))
    }
}

/// What a decoder made of a value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Decoded {
    /// No decoder is registered; the raw value.
    Hex(String),
    Text(String),
    FileDescriptor(FileDescriptor),
    SecurityAttributes(SecurityAttributes),
}

impl Decoded {
    pub fn raw(value: &[u8]) -> Self {
        Self::Hex(hex::encode_upper(value))
    }
}

impl Display for Decoded {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Decoded::Hex(hex) => f.write_str(hex),
            Decoded::Text(text) => f.write_str(text),
            Decoded::FileDescriptor(fd) => Display::fmt(fd, f),
            Decoded::SecurityAttributes(sa) => Display::fmt(sa, f),
        }
    }
}

pub type Decoder = fn(&[u8]) -> Decoded;

/// How to interpret one tag.
#[derive(Clone, Copy)]
pub struct TagSpec {
    /// `None` registers the tag in every context.
    pub context: Option<Context>,
    pub tag: u32,
    pub name: &'static str,
    pub decoder: Option<Decoder>,
    /// Context for the children of a constructed tag; they inherit the parent's otherwise.
    pub nested: Option<Context>,
}

impl TagSpec {
    pub const fn named(context: Option<Context>, tag: u32, name: &'static str) -> Self {
        Self {
            context,
            tag,
            name,
            decoder: None,
            nested: None,
        }
    }

    pub const fn decoded(
        context: Option<Context>,
        tag: u32,
        name: &'static str,
        decoder: Decoder,
    ) -> Self {
        Self {
            context,
            tag,
            name,
            decoder: Some(decoder),
            nested: None,
        }
    }

    pub const fn template(
        context: Option<Context>,
        tag: u32,
        name: &'static str,
        nested: Context,
    ) -> Self {
        Self {
            context,
            tag,
            name,
            decoder: None,
            nested: Some(nested),
        }
    }
}

impl std::fmt::Debug for TagSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagSpec")
            .field("context", &self.context)
            .field("tag", &Tag(self.tag))
            .field("name", &self.name)
            .field("decoder", &self.decoder.is_some())
            .field("nested", &self.nested)
            .finish()
    }
}

/// Tags known to a driver, merged from the fragments of its tiers.
#[derive(Debug, Clone, Default)]
pub struct TagTable {
    specs: BTreeMap<(Option<Context>, u32), TagSpec>,
}

impl TagTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds the specs, replacing ones registered before for the same context and tag.
    pub fn merge(&mut self, specs: &[TagSpec]) {
        for spec in specs {
            self.specs.insert((spec.context, spec.tag), *spec);
        }
    }

    /// Finds the spec for the tag, preferring the one registered for the context.
    pub fn lookup(&self, context: Context, tag: Tag) -> Option<&TagSpec> {
        self.specs
            .get(&(Some(context), tag.0))
            .or_else(|| self.specs.get(&(None, tag.0)))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// A decoded TLV object.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Node {
    pub tag: Tag,
    pub name: Option<&'static str>,
    pub value: Vec<u8>,
    pub decoded: Decoded,
    pub children: Vec<Node>,
}

impl Node {
    pub fn primitive(tag: u32, value: Vec<u8>) -> Self {
        Self {
            tag: Tag(tag),
            name: None,
            decoded: Decoded::raw(&value),
            value,
            children: Vec::new(),
        }
    }

    pub fn constructed(tag: u32, children: Vec<Node>) -> Self {
        let value = encode(&children);

        Self {
            tag: Tag(tag),
            name: None,
            decoded: Decoded::raw(&value),
            value,
            children,
        }
    }

    /// Encodes the object with a minimal length field.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = self.tag.to_bytes();
        let length = self.value.len();
        if length < 0x80 {
            buffer.push(length as u8);
        } else {
            let octets = (length as u32).to_be_bytes();
            let skip = octets.iter().take_while(|b| **b == 0).count();
            buffer.push(0x80 | (4 - skip) as u8);
            buffer.extend_from_slice(&octets[skip..]);
        }
        buffer.extend_from_slice(&self.value);

        buffer
    }

    /// Finds the first object with the tag in this subtree, depth first.
    pub fn find(&self, tag: u32) -> Option<&Node> {
        if self.tag.0 == tag {
            return Some(self);
        }

        self.children.iter().find_map(|child| child.find(tag))
    }
}

/// Encodes a sequence of objects.
pub fn encode(nodes: &[Node]) -> Vec<u8> {
    nodes.iter().flat_map(Node::to_bytes).collect()
}

/// The result of decoding: every object read before a fault, and the fault if any.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Decoding {
    pub nodes: Vec<Node>,
    pub error: Option<MalformedTlv>,
}

impl Decoding {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Turns a partial decoding into an error.
    pub fn into_result(self) -> Result<Vec<Node>, MalformedTlv> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.nodes),
        }
    }

    /// Finds the first object with the tag, depth first.
    pub fn find(&self, tag: u32) -> Option<&Node> {
        self.nodes.iter().find_map(|node| node.find(tag))
    }
}

impl Display for Decoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&render(&self.nodes))?;
        if let Some(e) = &self.error {
            write!(f, "{}", e)?;
        }

        Ok(())
    }
}

/// Levels of objects a decoding descends into. A constructed object on the last level
/// ends the decoding with [`TlvFault::TooDeep`].
pub const MAX_DEPTH: usize = 64;

/// Decodes the octets as a sequence of TLV objects in the context.
/// Decoding stops at the first malformed object, keeping everything read before.
pub fn decode(bytes: &[u8], context: Context, table: &TagTable) -> Decoding {
    let mut nodes = Vec::new();
    let error = decode_into(bytes, 0, 0, context, table, &mut nodes).err();

    Decoding { nodes, error }
}

fn decode_into(
    bytes: &[u8],
    base: usize,
    depth: usize,
    context: Context,
    table: &TagTable,
    nodes: &mut Vec<Node>,
) -> Result<(), MalformedTlv> {
    let mut reader = Reader::new(bytes);

    while !reader.is_empty() {
        let offset = base + reader.cursor;
        let fault = |fault| MalformedTlv { offset, fault };

        let tag = reader.read_tag().ok_or(fault(TlvFault::TruncatedTag))?;
        let length = reader.read_length().map_err(fault)?;
        let value_offset = base + reader.cursor;
        let value = reader
            .read(length)
            .ok_or(fault(TlvFault::TruncatedValue {
                declared: length,
                available: reader.remaining(),
            }))?;

        let spec = table.lookup(context, tag);
        let decoded = match spec.and_then(|s| s.decoder) {
            Some(decoder) => decoder(value),
            None => Decoded::raw(value),
        };

        let mut node = Node {
            tag,
            name: spec.map(|s| s.name),
            value: value.to_vec(),
            decoded,
            children: Vec::new(),
        };

        let result = match tag.is_constructed() {
            true if depth + 1 >= MAX_DEPTH => Err(fault(TlvFault::TooDeep)),
            true => {
                let nested = spec.and_then(|s| s.nested).unwrap_or(context);
                decode_into(
                    value,
                    value_offset,
                    depth + 1,
                    nested,
                    table,
                    &mut node.children,
                )
            }
            _ => Ok(()),
        };

        nodes.push(node);
        result?;
    }

    Ok(())
}

/// Renders the objects as an indented listing, one object per line.
pub fn render(nodes: &[Node]) -> String {
    let mut out = String::new();
    render_into(&mut out, nodes, 0);
    out
}

fn render_into(out: &mut String, nodes: &[Node], depth: usize) {
    let indent = "    ".repeat(depth);

    for node in nodes {
        out.push_str(&format!("{}{} ", indent, node.tag));
        if let Some(name) = node.name {
            out.push_str(&format!("({}) ", name));
        }
        out.push_str(&format!("[{}]", node.value.len()));

        if node.children.is_empty() || !matches!(node.decoded, Decoded::Hex(_)) {
            let text = node.decoded.to_string();
            let mut lines = text.lines();
            if let Some(first) = lines.next() {
                out.push_str(&format!(": {}", first));
            }
            for line in lines {
                out.push_str(&format!("\n{}    {}", indent, line));
            }
        }
        out.push('\n');

        render_into(out, &node.children, depth + 1);
    }
}

/// Bounded, cursor-based reader over a TLV stream.
struct Reader<'a> {
    buffer: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Reads a next octet and seeks the cursor.
    fn next(&mut self) -> Option<u8> {
        let byte = *self.buffer.get(self.cursor)?;
        self.cursor += 1;
        Some(byte)
    }

    /// Reads data of specified size and seeks the cursor.
    fn read(&mut self, length: usize) -> Option<&'a [u8]> {
        let end = self.cursor.checked_add(length)?;
        let bytes = self.buffer.get(self.cursor..end)?;
        self.cursor = end;
        Some(bytes)
    }

    /// Reads a tag: one octet, or more if its low five bits are all set.
    fn read_tag(&mut self) -> Option<Tag> {
        let first = self.next()?;
        let mut tag = first as u32;

        if first & 0x1F == 0x1F {
            loop {
                let byte = self.next()?;
                tag = (tag << 8) | byte as u32;
                if byte & 0x80 == 0 || tag > 0x00FF_FFFF {
                    break;
                }
            }
        }

        Some(Tag(tag))
    }

    /// Reads a length field in short or long form.
    fn read_length(&mut self) -> Result<usize, TlvFault> {
        let head = self.next().ok_or(TlvFault::TruncatedLength)? as usize;
        if head & 0x80 == 0 {
            return Ok(head);
        }

        let count = head & 0x7F;
        if count == 0 || count > 4 {
            return Err(TlvFault::UnsupportedLength);
        }

        let mut size = 0usize;
        for _ in 0..count {
            size <<= 8;
            size |= self.next().ok_or(TlvFault::TruncatedLength)? as usize;
        }

        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_decoded(value: &[u8]) -> Decoded {
        Decoded::Text(format!("{} octets", value.len()))
    }

    fn table() -> TagTable {
        let mut table = TagTable::new();
        table.merge(&[
            TagSpec::template(None, 0x62, "FCP template", Context::Fcp),
            TagSpec::named(Some(Context::Fcp), 0x83, "File identifier"),
            TagSpec::named(None, 0x83, "Generic 83"),
            TagSpec::decoded(Some(Context::Fcp), 0x85, "Proprietary", hex_decoded),
        ]);
        table
    }

    #[test]
    fn test_tag() {
        assert!(Tag(0x62).is_constructed());
        assert!(!Tag(0x83).is_constructed());
        assert_eq!(vec![0x9F, 0x38], Tag(0x9F38).to_bytes());
        assert_eq!(vec![0x00], Tag(0x00).to_bytes());
    }

    #[test]
    fn test_decode_nested_context() {
        let bytes = hex::decode("6208830200018502AABB8300").unwrap();
        let decoding = decode(&bytes, Context::Top, &table());

        assert!(decoding.is_complete());
        assert_eq!(2, decoding.nodes.len());

        let fcp = &decoding.nodes[0];
        assert_eq!(Some("FCP template"), fcp.name);
        assert_eq!(2, fcp.children.len());
        assert_eq!(Some("File identifier"), fcp.children[0].name);
        assert_eq!(Decoded::Hex("0001".into()), fcp.children[0].decoded);
        assert_eq!(Decoded::Text("2 octets".into()), fcp.children[1].decoded);

        // outside the template, the context-independent registration applies
        assert_eq!(Some("Generic 83"), decoding.nodes[1].name);
        assert!(decoding.nodes[1].value.is_empty());
    }

    #[test]
    fn test_decode_long_forms() {
        let mut bytes = vec![0x9F, 0x38, 0x81, 0x80];
        bytes.extend_from_slice(&[0x55; 0x80]);
        let decoding = decode(&bytes, Context::Top, &TagTable::new());

        assert!(decoding.is_complete());
        assert_eq!(Tag(0x9F38), decoding.nodes[0].tag);
        assert_eq!(0x80, decoding.nodes[0].value.len());
        assert_eq!(bytes, encode(&decoding.nodes));
    }

    #[test]
    fn test_truncated_value() {
        let bytes = hex::decode("8301AA6205830400").unwrap();
        let decoding = decode(&bytes, Context::Top, &table());

        assert_eq!(
            Some(MalformedTlv {
                offset: 3,
                fault: TlvFault::TruncatedValue {
                    declared: 5,
                    available: 3
                }
            }),
            decoding.error
        );
        assert_eq!(1, decoding.nodes.len());
    }

    #[test]
    fn test_truncated_inside_template() {
        let bytes = hex::decode("620483010183").unwrap();
        let decoding = decode(&bytes, Context::Top, &table());

        assert_eq!(
            Some(MalformedTlv {
                offset: 5,
                fault: TlvFault::TruncatedLength
            }),
            decoding.error
        );
        assert_eq!(1, decoding.nodes.len());
        assert_eq!(1, decoding.nodes[0].children.len());
    }

    #[test]
    fn test_unsupported_length() {
        let decoding = decode(&[0x80, 0x80, 0x00], Context::Top, &TagTable::new());

        assert_eq!(
            Some(MalformedTlv {
                offset: 0,
                fault: TlvFault::UnsupportedLength
            }),
            decoding.error
        );
        assert!(decoding.into_result().is_err());
    }

    #[test]
    fn test_five_length_octets() {
        let decoding = decode(
            &[0x80, 0x01, 0x00, 0x81, 0x85, 0x00, 0x00, 0x00, 0x00, 0x01, 0xFF],
            Context::Top,
            &TagTable::new(),
        );

        assert_eq!(1, decoding.nodes.len());
        assert_eq!(
            Some(MalformedTlv {
                offset: 3,
                fault: TlvFault::UnsupportedLength
            }),
            decoding.error
        );
    }

    /// `layers` templates with four-octet lengths wrapped around `80 00`.
    fn nested(layers: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(layers * 6 + 2);
        for level in 0..layers {
            let length = (2 + 6 * (layers - 1 - level)) as u32;
            bytes.extend_from_slice(&[0xA0, 0x84]);
            bytes.extend_from_slice(&length.to_be_bytes());
        }
        bytes.extend_from_slice(&[0x80, 0x00]);
        bytes
    }

    fn depth_of(nodes: &[Node]) -> usize {
        nodes
            .iter()
            .map(|node| 1 + depth_of(&node.children))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_nesting_up_to_limit() {
        let decoding = decode(&nested(MAX_DEPTH - 1), Context::Top, &TagTable::new());

        assert!(decoding.is_complete());
        assert_eq!(MAX_DEPTH, depth_of(&decoding.nodes));
    }

    #[test]
    fn test_nesting_too_deep() {
        let decoding = decode(&nested(10_000), Context::Top, &TagTable::new());

        assert_eq!(
            Some(MalformedTlv {
                offset: (MAX_DEPTH - 1) * 6,
                fault: TlvFault::TooDeep
            }),
            decoding.error
        );
        assert_eq!(1, decoding.nodes.len());
        assert_eq!(MAX_DEPTH, depth_of(&decoding.nodes));
    }

    #[test]
    fn test_truncated_tag() {
        let decoding = decode(&[0x5F], Context::Top, &TagTable::new());

        assert_eq!(
            Some(MalformedTlv {
                offset: 0,
                fault: TlvFault::TruncatedTag
            }),
            decoding.error
        );
    }

    #[test]
    fn test_render() {
        let bytes = hex::decode("62048302000185012A").unwrap();
        let text = render(&decode(&bytes, Context::Top, &table()).nodes);

        assert_eq!(
            "62 (FCP template) [4]\n    83 (File identifier) [2]: 0001\n85 [1]: 2A\n",
            text
        );
    }
}
