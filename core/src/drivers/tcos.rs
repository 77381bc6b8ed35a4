//! TCOS (TeleSec Chipcard Operating System) cards.

use crate::driver::{expect_args, Driver, Fragment, Operation, PayloadFormat};
use crate::drivers::iso;
use crate::error::Result;
use crate::fields::descriptor::FileDescriptor;
use crate::fields::security::SecurityAttributes;
use crate::frame::Command;
use crate::tlv::{Context, Decoded, TagSpec};

pub const NAME: &str = "TCOS";

pub const ATRS: &[&str] = &["3bba96008131865d0064........31809000.."];

const CLA_PROPRIETARY: u8 = 0x80;
const INS_LIST: u8 = 0xAA;
const LIST_DF: u8 = 0x01;
const LIST_EF: u8 = 0x02;

fn list(kind: u8) -> Command {
    Command::new(CLA_PROPRIETARY, INS_LIST, kind, 0x00).with_le(0x00)
}

fn build_list_dirs(args: &[&str]) -> Result<Vec<Command>> {
    expect_args("list_dirs", args, 0)?;

    Ok(vec![list(LIST_DF)])
}

fn build_list_files(args: &[&str]) -> Result<Vec<Command>> {
    expect_args("list_files", args, 0)?;

    Ok(vec![list(LIST_EF)])
}

fn build_ls(args: &[&str]) -> Result<Vec<Command>> {
    expect_args("ls", args, 0)?;

    Ok(vec![list(LIST_DF), list(LIST_EF)])
}

/// Renders the identifiers returned by the listing command, two octets each.
fn render_listing(command: &Command, data: &[u8]) -> String {
    let kind = match command.p1 {
        LIST_DF => "DFs",
        LIST_EF => "EFs",
        _ => "Files",
    };
    let ids = data
        .chunks(2)
        .map(|id| hex::encode_upper(id))
        .collect::<Vec<_>>()
        .join(", ");

    format!("{}: {}", kind, ids)
}

static OPERATIONS: &[Operation] = &[
    Operation {
        name: "list_dirs",
        usage: "",
        summary: "List the DFs in the current DF.",
        build: build_list_dirs,
        format: PayloadFormat::Custom(render_listing),
    },
    Operation {
        name: "list_files",
        usage: "",
        summary: "List the EFs in the current DF.",
        build: build_list_files,
        format: PayloadFormat::Custom(render_listing),
    },
    Operation {
        name: "ls",
        usage: "",
        summary: "List all files in the current DF.",
        build: build_ls,
        format: PayloadFormat::Custom(render_listing),
    },
];

fn decode_file_descriptor_extension(value: &[u8]) -> Decoded {
    Decoded::FileDescriptor(FileDescriptor::decode(value))
}

fn decode_security_attributes(value: &[u8]) -> Decoded {
    Decoded::SecurityAttributes(SecurityAttributes::decode(value))
}

static TAGS: &[TagSpec] = &[
    TagSpec::decoded(
        Some(Context::Fcp),
        0x85,
        "File descriptor extension",
        decode_file_descriptor_extension,
    ),
    TagSpec::decoded(
        Some(Context::Fcp),
        0x86,
        "Security attributes",
        decode_security_attributes,
    ),
    TagSpec::decoded(
        Some(Context::Fci),
        0x85,
        "File descriptor extension",
        decode_file_descriptor_extension,
    ),
    TagSpec::decoded(
        Some(Context::Fci),
        0x86,
        "Security attributes",
        decode_security_attributes,
    ),
];

pub static FRAGMENT: Fragment = Fragment {
    name: "TCOS",
    operations: OPERATIONS,
    status: None,
    tags: TAGS,
};

pub fn driver() -> Result<Driver> {
    ATRS.iter()
        .fold(Driver::builder(NAME), |builder, atr| builder.atr(*atr))
        .fragment(&iso::FRAGMENT)
        .fragment(&FRAGMENT)
        .get_response("61??", iso::GET_RESPONSE)
        .build()
}
