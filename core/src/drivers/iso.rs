//! ISO 7816-4 interindustry commands, status words and file control parameters.
//! Every other dialect builds on this tier.

use crate::driver::{
    byte_argument, expect_args, hex_argument, number_argument, Driver, Fragment, Operation,
    PayloadFormat,
};
use crate::error::{Error, Result};
use crate::fields::{BitRow, BitTable};
use crate::frame::Command;
use crate::status::{StatusEntry, StatusTable};
use crate::tlv::{Context, Decoded, TagSpec};

pub const NAME: &str = "ISO7816-4";

const INS_SELECT_FILE: u8 = 0xA4;
const INS_READ_BINARY: u8 = 0xB0;
const INS_UPDATE_BINARY: u8 = 0xD6;
const INS_VERIFY: u8 = 0x20;
const INS_GET_RESPONSE: u8 = 0xC0;

const SELECT_P1_FID: u8 = 0x00;
const SELECT_P1_DF_NAME: u8 = 0x04;

pub const GET_RESPONSE: Command = Command::template(INS_GET_RESPONSE);

/// SELECT FILE by file identifier, no response data requested.
pub fn select_file(fid: &[u8]) -> Command {
    Command::template(INS_SELECT_FILE).with_payload(fid)
}

/// UPDATE BINARY at offset 0.
pub fn update_binary(data: &[u8]) -> Command {
    Command::template(INS_UPDATE_BINARY).with_payload(data)
}

fn build_select_file(args: &[&str]) -> Result<Vec<Command>> {
    let id = hex_argument("select_file", args)?;
    let p1 = match id.len() {
        2 => SELECT_P1_FID,
        _ => SELECT_P1_DF_NAME,
    };

    Ok(vec![Command::template(INS_SELECT_FILE)
        .with_p1(p1)
        .with_payload(id)
        .with_le(0x00)])
}

fn build_read_binary(args: &[&str]) -> Result<Vec<Command>> {
    let (offset, length): (u16, u8) = match args {
        [] => (0, 0),
        [offset] => (number_argument("read_binary", offset)?, 0),
        [offset, length] => (
            number_argument("read_binary", offset)?,
            byte_argument("read_binary", length)?,
        ),
        _ => return Err(too_many("read_binary", 2)),
    };
    if offset > 0x7FFF {
        return Err(Error::InvalidArgument {
            command: "read_binary",
            reason: format!("offset {} exceeds 15 bits", offset),
        });
    }

    let [p1, p2] = offset.to_be_bytes();

    Ok(vec![Command::template(INS_READ_BINARY)
        .with_p1(p1)
        .with_p2(p2)
        .with_le(length)])
}

fn build_update_binary(args: &[&str]) -> Result<Vec<Command>> {
    Ok(vec![update_binary(&hex_argument("update_binary", args)?)])
}

fn build_verify(args: &[&str]) -> Result<Vec<Command>> {
    expect_args("verify", args, 2)?;

    Ok(vec![Command::template(INS_VERIFY)
        .with_p2(byte_argument("verify", args[0])?)
        .with_payload(args[1].as_bytes())])
}

fn build_get_response(args: &[&str]) -> Result<Vec<Command>> {
    expect_args("get_response", args, 1)?;

    Ok(vec![GET_RESPONSE.with_le(byte_argument("get_response", args[0])?)])
}

fn build_send_apdu(args: &[&str]) -> Result<Vec<Command>> {
    let frame = hex_argument("send_apdu", args)?;

    Ok(vec![Command::parse(&frame)?])
}

fn too_many(command: &'static str, max: usize) -> Error {
    Error::InvalidArgument {
        command,
        reason: format!("expected at most {} argument(s)", max),
    }
}

static OPERATIONS: &[Operation] = &[
    Operation {
        name: "select_file",
        usage: "<fid or DF name, hex>",
        summary: "Select a file by its identifier, or a DF by its name, and show its FCI.",
        build: build_select_file,
        format: PayloadFormat::Tlv(Context::Top),
    },
    Operation {
        name: "read_binary",
        usage: "[offset] [length]",
        summary: "Read from the currently selected transparent file.",
        build: build_read_binary,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "update_binary",
        usage: "<data, hex>",
        summary: "Write to the currently selected transparent file.",
        build: build_update_binary,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "verify",
        usage: "<reference> <pin>",
        summary: "Verify a PIN.",
        build: build_verify,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "get_response",
        usage: "<length>",
        summary: "Fetch pending response data.",
        build: build_get_response,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "send_apdu",
        usage: "<frame, hex>",
        summary: "Send a raw command frame.",
        build: build_send_apdu,
        format: PayloadFormat::Raw,
    },
];

fn bytes_left(_: u8, sw2: u8) -> String {
    format!("{} (0x{:02x}) bytes of response data left", sw2, sw2)
}

fn verification_failed(_: u8, sw2: u8) -> String {
    format!("Verification failed, {} retries left", sw2 & 0x0F)
}

fn wrong_le(_: u8, sw2: u8) -> String {
    format!("Wrong length Le, {} (0x{:02x}) bytes available", sw2, sw2)
}

pub static STATUS: StatusTable = StatusTable {
    name: "ISO 7816-4",
    entries: &[
        StatusEntry::computed("61??", bytes_left),
        StatusEntry::text("6200", "Warning: no information given, non-volatile memory unchanged"),
        StatusEntry::text("6281", "Part of returned data may be corrupted"),
        StatusEntry::text("6282", "End of file or record reached before reading Le bytes"),
        StatusEntry::text("6283", "Selected file invalidated"),
        StatusEntry::text("6284", "FCI not formatted according to ISO 7816-4"),
        StatusEntry::text("62??", "Warning: non-volatile memory unchanged"),
        StatusEntry::text("6300", "Warning: no information given, non-volatile memory changed"),
        StatusEntry::text("6381", "File filled up by the last write"),
        StatusEntry::computed("63C?", verification_failed),
        StatusEntry::text("63??", "Warning: non-volatile memory changed"),
        StatusEntry::text("6400", "Execution error, non-volatile memory unchanged"),
        StatusEntry::text("6581", "Memory failure"),
        StatusEntry::text("65??", "Execution error, non-volatile memory changed"),
        StatusEntry::text("6700", "Wrong length"),
        StatusEntry::text("6881", "Logical channel not supported"),
        StatusEntry::text("6882", "Secure messaging not supported"),
        StatusEntry::text("68??", "Functions in CLA not supported"),
        StatusEntry::text("6981", "Command incompatible with file structure"),
        StatusEntry::text("6982", "Security status not satisfied"),
        StatusEntry::text("6983", "Authentication method blocked"),
        StatusEntry::text("6984", "Referenced data invalidated"),
        StatusEntry::text("6985", "Conditions of use not satisfied"),
        StatusEntry::text("6986", "Command not allowed (no current EF)"),
        StatusEntry::text("6987", "Expected secure messaging data objects missing"),
        StatusEntry::text("6988", "Secure messaging data objects incorrect"),
        StatusEntry::text("69??", "Command not allowed"),
        StatusEntry::text("6A80", "Incorrect parameters in the data field"),
        StatusEntry::text("6A81", "Function not supported"),
        StatusEntry::text("6A82", "File not found"),
        StatusEntry::text("6A83", "Record not found"),
        StatusEntry::text("6A84", "Not enough memory space in the file"),
        StatusEntry::text("6A85", "Lc inconsistent with TLV structure"),
        StatusEntry::text("6A86", "Incorrect parameters P1-P2"),
        StatusEntry::text("6A87", "Lc inconsistent with P1-P2"),
        StatusEntry::text("6A88", "Referenced data not found"),
        StatusEntry::text("6A??", "Wrong parameter(s) P1-P2"),
        StatusEntry::text("6B00", "Wrong parameter(s) P1-P2"),
        StatusEntry::computed("6C??", wrong_le),
        StatusEntry::text("6D00", "Instruction code not supported or invalid"),
        StatusEntry::text("6E00", "Class not supported"),
        StatusEntry::text("6F00", "No precise diagnosis"),
    ],
};

static EF_TYPE: BitTable = BitTable {
    rows: &[
        BitRow::is(0x38, 0x00, "Working EF"),
        BitRow::is(0x38, 0x08, "Internal EF"),
        BitRow::is_not(0x30, 0x00, "Proprietary EF type"),
        BitRow::is(0x07, 0x00, "No information given"),
        BitRow::is(0x07, 0x01, "Transparent structure"),
        BitRow::is(0x07, 0x02, "Linear structure, fixed size"),
        BitRow::is(0x07, 0x03, "Linear structure, fixed size, TLV"),
        BitRow::is(0x07, 0x04, "Linear structure, variable size"),
        BitRow::is(0x07, 0x05, "Linear structure, variable size, TLV"),
        BitRow::is(0x07, 0x06, "Cyclic structure"),
        BitRow::is(0x07, 0x07, "Cyclic structure, TLV"),
    ],
    fallback: "Undefined EF type",
};

static ISO_FILE_DESCRIPTOR: BitTable = BitTable {
    rows: &[
        BitRow::is(0x40, 0x40, "Shareable file"),
        BitRow::is(0x40, 0x00, "Not shareable file"),
        BitRow::is(0x38, 0x38, "DF"),
        BitRow::is_not(0x38, 0x38, "EF").then(&EF_TYPE),
    ],
    fallback: "Undefined file descriptor",
};

static FILE_DESCRIPTOR_BYTE: BitTable = BitTable {
    rows: &[
        BitRow::is(0x80, 0x00, "File descriptor").then(&ISO_FILE_DESCRIPTOR),
        BitRow::is(0x80, 0x80, "Proprietary"),
    ],
    fallback: "Undefined file descriptor",
};

static LIFE_CYCLE_STATUS: BitTable = BitTable {
    rows: &[
        BitRow::is(0xFF, 0x00, "No information given"),
        BitRow::is(0xFF, 0x01, "Creation state"),
        BitRow::is(0xFF, 0x03, "Initialisation state"),
        BitRow::is(0xFD, 0x05, "Operational state (activated)"),
        BitRow::is(0xFD, 0x04, "Operational state (deactivated)"),
        BitRow::is(0xFC, 0x0C, "Termination state"),
        BitRow::is_not(0xF0, 0x00, "Proprietary"),
    ],
    fallback: "RFU",
};

fn describe(table: &BitTable, octet: u8) -> Vec<String> {
    table.evaluate(octet).iter().map(|l| l.to_string()).collect()
}

fn decode_size(value: &[u8]) -> Decoded {
    match value.len() {
        1..=4 => {
            let size = value.iter().fold(0u32, |acc, b| acc << 8 | *b as u32);
            Decoded::Text(format!("{} bytes", size))
        }
        _ => Decoded::raw(value),
    }
}

fn decode_descriptor_byte(value: &[u8]) -> Decoded {
    let Some((&descriptor, rest)) = value.split_first() else {
        return Decoded::raw(value);
    };

    let mut lines = describe(&FILE_DESCRIPTOR_BYTE, descriptor);
    if let Some(coding) = rest.first() {
        lines.push(format!("Data coding byte: {:02X}", coding));
    }
    match rest.get(1..) {
        Some([size]) => lines.push(format!("Maximum record size: {}", size)),
        Some([hi, lo]) => lines.push(format!(
            "Maximum record size: {}",
            u16::from_be_bytes([*hi, *lo])
        )),
        Some([hi, lo, records @ ..]) if !records.is_empty() => {
            lines.push(format!(
                "Maximum record size: {}",
                u16::from_be_bytes([*hi, *lo])
            ));
            lines.push(format!(
                "Number of records: {}",
                records.iter().fold(0u32, |acc, b| acc << 8 | *b as u32)
            ));
        }
        _ => {}
    }

    Decoded::Text(lines.join("\n"))
}

fn decode_life_cycle(value: &[u8]) -> Decoded {
    match value {
        [octet] => Decoded::Text(describe(&LIFE_CYCLE_STATUS, *octet).join("\n")),
        _ => Decoded::raw(value),
    }
}

fn decode_name(value: &[u8]) -> Decoded {
    match value.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        true if !value.is_empty() => Decoded::Text(format!(
            "{} ({})",
            hex::encode_upper(value),
            String::from_utf8_lossy(value)
        )),
        _ => Decoded::raw(value),
    }
}

pub static TAGS: &[TagSpec] = &[
    TagSpec::template(None, 0x62, "FCP template", Context::Fcp),
    TagSpec::template(None, 0x64, "FMD template", Context::Fmd),
    TagSpec::template(None, 0x6F, "FCI template", Context::Fci),
    TagSpec::decoded(
        None,
        0x80,
        "Number of data bytes in the file, excluding structural information",
        decode_size,
    ),
    TagSpec::decoded(
        None,
        0x81,
        "Number of data bytes in the file, including structural information",
        decode_size,
    ),
    TagSpec::decoded(None, 0x82, "File descriptor byte", decode_descriptor_byte),
    TagSpec::named(None, 0x83, "File identifier"),
    TagSpec::decoded(None, 0x84, "DF name", decode_name),
    TagSpec::named(None, 0x85, "Proprietary information"),
    TagSpec::named(None, 0x86, "Security attributes (proprietary format)"),
    TagSpec::named(
        None,
        0x87,
        "Identifier of an EF containing an extension of the FCI",
    ),
    TagSpec::named(None, 0x88, "Short EF identifier"),
    TagSpec::decoded(None, 0x8A, "Life cycle status byte", decode_life_cycle),
    TagSpec::named(None, 0xA5, "Proprietary information"),
];

pub static FRAGMENT: Fragment = Fragment {
    name: "ISO 7816-4",
    operations: OPERATIONS,
    status: Some(&STATUS),
    tags: TAGS,
};

/// The plain ISO driver. It claims no ATR and is only used when asked for by name.
pub fn driver() -> Result<Driver> {
    Driver::builder(NAME)
        .fragment(&FRAGMENT)
        .get_response("61??", GET_RESPONSE)
        .build()
}
