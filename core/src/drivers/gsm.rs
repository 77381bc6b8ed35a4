//! GSM SIM cards (GSM 11.11), including the SIM application toolkit commands of GSM 11.14.

use crate::driver::{
    byte_argument, expect_args, hex_argument, Driver, Fragment, Operation, PayloadFormat,
};
use crate::drivers::iso;
use crate::error::{Error, Result};
use crate::frame::{Command, CLA_DEFAULT};
use crate::status::{StatusEntry, StatusTable};

pub const NAME: &str = "GSM";

pub const CLA: u8 = 0xA0;

pub const ATRS: &[&str] = &[
    "3bff9500ffc00a1f438031e073f62113574a334861324147d6",
    "3b9a940092027593110001020200",
    "3b989400939114010c020102",
];

const INS_RUN_GSM_ALGORITHM: u8 = 0x88;
const INS_VERIFY_CHV: u8 = 0x20;
const INS_STATUS: u8 = 0xF2;
const INS_TERMINAL_PROFILE: u8 = 0x10;
const INS_ENVELOPE: u8 = 0xC2;
const INS_FETCH: u8 = 0x12;
const INS_TERMINAL_RESPONSE: u8 = 0x14;

const CHALLENGE_SIZE: usize = 16;
const CHV_SIZE: usize = 8;

pub const MF: [u8; 2] = [0x3F, 0x00];
pub const DF_GSM: [u8; 2] = [0x7F, 0x20];
pub const DF_TELECOM: [u8; 2] = [0x7F, 0x10];

/// An elementary file at the GSM application level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementaryFile {
    pub name: &'static str,
    pub fid: [u8; 2],
    pub description: &'static str,
}

const fn ef(name: &'static str, fid: u16, description: &'static str) -> ElementaryFile {
    ElementaryFile {
        name,
        fid: fid.to_be_bytes(),
        description,
    }
}

pub static ELEMENTARY_FILES: &[ElementaryFile] = &[
    ef("LP", 0x6F05, "Language preference"),
    ef("IMSI", 0x6F07, "IMSI"),
    ef("Kc", 0x6F20, "Ciphering key Kc"),
    ef("PLMNsel", 0x6F30, "PLMN selector"),
    ef("HPPLMN", 0x6F31, "Higher priority PLMN search period"),
    ef("ACMmax", 0x6F37, "ACM maximum value"),
    ef("SST", 0x6F38, "SIM service table"),
    ef("ACM", 0x6F39, "Accumulated call meter"),
    ef("GID1", 0x6F3E, "Group identifier level 1"),
    ef("GID2", 0x6F3F, "Group identifier level 2"),
    ef("SPN", 0x6F46, "Service provider name"),
    ef("PUCT", 0x6F41, "Price per unit and currency table"),
    ef("CBMI", 0x6F45, "Cell broadcast message identifier selection"),
    ef("BCCH", 0x6F74, "Broadcast control channels"),
    ef("ACC", 0x6F78, "Access control class"),
    ef("FPLMN", 0x6F7B, "Forbidden PLMNs"),
    ef("LOCI", 0x6F7E, "Location information"),
    ef("AD", 0x6FAD, "Administrative data"),
    ef("Phase", 0x6FAE, "Phase identification"),
    ef("VGCS", 0x6FB1, "Voice group call service"),
    ef("VGCSS", 0x6FB2, "Voice group call service status"),
    ef("VBS", 0x6FB3, "Voice broadcast service"),
    ef("VBSS", 0x6FB4, "Voice broadcast service status"),
    ef("eMLPP", 0x6FB5, "Enhanced multi level pre-emption and priority"),
    ef("AAeM", 0x6FB6, "Automatic answer for eMLPP service"),
    ef("CBMID", 0x6F48, "Cell broadcast message identifier for data download"),
    ef("ECC", 0x6FB7, "Emergency call codes"),
    ef("CBMIR", 0x6F50, "Cell broadcast message identifier range selection"),
    ef("DCK", 0x6F2C, "De-personalization control keys"),
    ef("CNL", 0x6F32, "Co-operative network list"),
    ef("NIA", 0x6F51, "Network's indication of alerting"),
    ef("KcGPRS", 0x6F52, "GPRS ciphering key KcGPRS"),
    ef("LOCIGPRS", 0x6F53, "GPRS location information"),
    ef("SUME", 0x6F54, "SetUpMenu elements"),
    ef("PLMNwAcT", 0x6F60, "User controlled PLMN selector with access technology"),
    ef("OPLMNwAcT", 0x6F61, "Operator controlled PLMN selector with access technology"),
    ef("HPLMNwAcT", 0x6F62, "HPLMN selector with access technology"),
    ef("CPBCCH", 0x6F63, "CPBCCH information"),
    ef("InvScan", 0x6F64, "Investigation scan"),
];

/// Finds a well-known file by name, ignoring case.
pub fn elementary_file(name: &str) -> Option<&'static ElementaryFile> {
    ELEMENTARY_FILES
        .iter()
        .find(|ef| ef.name.eq_ignore_ascii_case(name))
}

/// Puts the GSM class byte on commands that carry the default one.
pub fn with_gsm_class(command: Command) -> Command {
    match command.cla {
        CLA_DEFAULT => command.with_cla(CLA),
        _ => command,
    }
}

/// RUN GSM ALGORITHM with the 16-octet random challenge.
pub fn run_gsm_algo(challenge: &[u8]) -> Result<Command> {
    if challenge.len() != CHALLENGE_SIZE {
        return Err(Error::InvalidArgument {
            command: "gsm_run_algo",
            reason: format!(
                "RAND needs exactly {} octets, got {}",
                CHALLENGE_SIZE,
                challenge.len()
            ),
        });
    }

    Ok(Command::template(INS_RUN_GSM_ALGORITHM).with_payload(challenge))
}

fn build_run_gsm_algo(args: &[&str]) -> Result<Vec<Command>> {
    let joined: String = args.concat();
    let challenge = match joined.len() {
        CHALLENGE_SIZE => joined.into_bytes(),
        _ => hex_argument("gsm_run_algo", args)?,
    };

    Ok(vec![run_gsm_algo(&challenge)?])
}

fn build_cd_df_gsm(_: &[&str]) -> Result<Vec<Command>> {
    Ok(vec![iso::select_file(&DF_GSM)])
}

fn build_status(_: &[&str]) -> Result<Vec<Command>> {
    Ok(vec![Command::template(INS_STATUS).with_le(0xFF)])
}

fn build_select_file(args: &[&str]) -> Result<Vec<Command>> {
    let fid = match args {
        [name] if name.eq_ignore_ascii_case("MF") => MF.to_vec(),
        [name] if name.eq_ignore_ascii_case("DF.GSM") => DF_GSM.to_vec(),
        [name] if name.eq_ignore_ascii_case("DF.TELECOM") => DF_TELECOM.to_vec(),
        [name] => match elementary_file(name) {
            Some(ef) => ef.fid.to_vec(),
            None => hex_argument("gsm_select_file", args)?,
        },
        _ => hex_argument("gsm_select_file", args)?,
    };

    Ok(vec![iso::select_file(&fid)])
}

/// Pads with `FF` up to `size` octets; longer input is rejected.
pub(crate) fn pad(command: &'static str, data: &[u8], size: usize) -> Result<Vec<u8>> {
    if data.len() > size {
        return Err(Error::InvalidArgument {
            command,
            reason: format!("at most {} octets allowed, got {}", size, data.len()),
        });
    }

    let mut padded = data.to_vec();
    padded.resize(size, 0xFF);

    Ok(padded)
}

fn build_verify_chv(args: &[&str]) -> Result<Vec<Command>> {
    expect_args("gsm_verify_chv", args, 2)?;

    let chv = byte_argument("gsm_verify_chv", args[0])?;
    let pin = pad("gsm_verify_chv", args[1].as_bytes(), CHV_SIZE)?;

    Ok(vec![Command::template(INS_VERIFY_CHV)
        .with_p2(chv)
        .with_payload(pin)])
}

fn build_terminal_profile(args: &[&str]) -> Result<Vec<Command>> {
    Ok(vec![Command::template(INS_TERMINAL_PROFILE)
        .with_payload(hex_argument("gsm_terminal_profile", args)?)])
}

fn build_envelope(args: &[&str]) -> Result<Vec<Command>> {
    Ok(vec![Command::template(INS_ENVELOPE)
        .with_payload(hex_argument("gsm_envelope", args)?)])
}

fn build_fetch(args: &[&str]) -> Result<Vec<Command>> {
    expect_args("gsm_fetch", args, 1)?;

    Ok(vec![Command::template(INS_FETCH).with_le(byte_argument("gsm_fetch", args[0])?)])
}

fn build_terminal_response(args: &[&str]) -> Result<Vec<Command>> {
    Ok(vec![Command::template(INS_TERMINAL_RESPONSE)
        .with_payload(hex_argument("gsm_terminal_response", args)?)])
}

fn render_select_response(_: &Command, data: &[u8]) -> String {
    decode_select_response(data)
}

static OPERATIONS: &[Operation] = &[
    Operation {
        name: "gsm_run_algo",
        usage: "<RAND, 16 octets or 32 hex digits>",
        summary: "Perform the GSM A3/A8 algorithm on the random challenge.",
        build: build_run_gsm_algo,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "cd_df_gsm",
        usage: "",
        summary: "Change into DF.GSM.",
        build: build_cd_df_gsm,
        format: PayloadFormat::Custom(render_select_response),
    },
    Operation {
        name: "gsm_status",
        usage: "",
        summary: "Show the status of the current directory.",
        build: build_status,
        format: PayloadFormat::Custom(render_select_response),
    },
    Operation {
        name: "gsm_select_file",
        usage: "<fid, hex, or file name>",
        summary: "Select a file and show its properties.",
        build: build_select_file,
        format: PayloadFormat::Custom(render_select_response),
    },
    Operation {
        name: "gsm_verify_chv",
        usage: "<chv number> <chv>",
        summary: "Verify CHV1 or CHV2.",
        build: build_verify_chv,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "gsm_terminal_profile",
        usage: "<profile, hex>",
        summary: "Send the TERMINAL PROFILE.",
        build: build_terminal_profile,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "gsm_envelope",
        usage: "<data, hex>",
        summary: "Send an ENVELOPE.",
        build: build_envelope,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "gsm_fetch",
        usage: "<length>",
        summary: "FETCH a proactive command.",
        build: build_fetch,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "gsm_terminal_response",
        usage: "<data, hex>",
        summary: "Send a TERMINAL RESPONSE.",
        build: build_terminal_response,
        format: PayloadFormat::Raw,
    },
];

fn response_length(sw1: u8, sw2: u8) -> String {
    match sw1 {
        0x9E => format!(
            "Length '{} (0x{:02x})' of the response data in case of SIM data download error",
            sw2, sw2
        ),
        _ => format!("Length '{} (0x{:02x})' of the response data", sw2, sw2),
    }
}

fn internal_retries(_: u8, sw2: u8) -> String {
    format!(
        "Update successful but after using an internal retry routine '{}' times",
        sw2 % 16
    )
}

pub static STATUS: StatusTable = StatusTable {
    name: "GSM 11.11",
    entries: &[
        StatusEntry::computed("9E??", response_length),
        StatusEntry::computed("9F??", response_length),
        StatusEntry::text("9300", "SIM Application Toolkit busy"),
        StatusEntry::computed("920?", internal_retries),
        StatusEntry::text("9240", "Memory problem"),
        StatusEntry::text("9400", "No EF selected"),
        StatusEntry::text("9402", "Out of range (invalid address)"),
        StatusEntry::text("9404", "- File ID not found\n- Pattern not found"),
        StatusEntry::text("9408", "File is inconsistent with the command"),
        StatusEntry::text("9802", "No CHV initialized"),
        StatusEntry::text(
            "9804",
            "- Access condition not fulfilled\n\
             - Unsuccessful CHV verification, at least one attempt left\n\
             - Unsuccessful UNBLOCK CHV verification, at least one attempt left\n\
             - Authentication failed",
        ),
        StatusEntry::text("9808", "In contradiction with CHV status"),
        StatusEntry::text("9810", "In contradiction with invalidation status"),
        StatusEntry::text(
            "9840",
            "- Unsuccessful CHV verification, no attempt left\n\
             - Unsuccessful UNBLOCK CHV verification, no attempt left\n\
             - CHV blocked\n\
             - UNBLOCK CHV blocked",
        ),
        StatusEntry::text("9850", "Increase cannot be performed, max value reached"),
        StatusEntry::text("6700", "Incorrect parameter P3 (ISO: Wrong length)"),
        StatusEntry::text("67??", "Incorrect parameter P3"),
        StatusEntry::text(
            "6B00",
            "Incorrect parameter P1 or P2 (ISO: Wrong parameter(s) P1-P2)",
        ),
        StatusEntry::text("6B??", "Incorrect parameter P1 or P2"),
        StatusEntry::text(
            "6D00",
            "Unknown instruction code given in the command (ISO: Instruction code not supported or invalid)",
        ),
        StatusEntry::text("6D??", "Unknown instruction code given in the command"),
        StatusEntry::text(
            "6E00",
            "Wrong instruction class given in the command (ISO: Class not supported)",
        ),
        StatusEntry::text("6E??", "Wrong instruction class given in the command"),
        StatusEntry::text(
            "6F00",
            "Technical problem with no diagnostic given (ISO: No precise diagnosis)",
        ),
        StatusEntry::text("6F??", "Technical problem with no diagnostic given"),
    ],
};

pub static FRAGMENT: Fragment = Fragment {
    name: "GSM 11.11",
    operations: OPERATIONS,
    status: Some(&STATUS),
    tags: &[],
};

pub fn driver() -> Result<Driver> {
    ATRS.iter()
        .fold(Driver::builder(NAME), |builder, atr| builder.atr(*atr))
        .fragment(&iso::FRAGMENT)
        .fragment(&FRAGMENT)
        .before_send(with_gsm_class)
        .get_response("9F??", iso::GET_RESPONSE)
        .build()
}

const TYPE_MF: u8 = 1;
const TYPE_DF: u8 = 2;
const TYPE_EF: u8 = 4;

const STRUCTURE_TRANSPARENT: u8 = 0;
const STRUCTURE_LINEAR_FIXED: u8 = 1;
/// Older cards report transparent EFs with this value.
const STRUCTURE_TRANSPARENT_ALT: u8 = 2;
const STRUCTURE_CYCLIC: u8 = 3;

fn type_of_file(octet: u8) -> &'static str {
    match octet {
        TYPE_MF => "MF",
        TYPE_DF => "DF",
        TYPE_EF => "EF",
        _ => "RFU",
    }
}

fn structure_of_file(octet: u8) -> &'static str {
    match octet {
        STRUCTURE_TRANSPARENT | STRUCTURE_TRANSPARENT_ALT => "transparent",
        STRUCTURE_LINEAR_FIXED => "linear fixed",
        STRUCTURE_CYCLIC => "cyclic",
        _ => "RFU",
    }
}

fn access_condition(nibble: u8) -> String {
    match nibble & 0x0F {
        0 => "ALWAYS".to_string(),
        1 => "CHV1".to_string(),
        2 => "CHV2".to_string(),
        3 => "RFU".to_string(),
        15 => "NEW".to_string(),
        n => format!("ADM{}", n - 3),
    }
}

fn chv_status(octet: u8) -> String {
    format!(
        "Initialized: {}, Retries remaining: {}",
        (octet & 0x80 != 0) as u8,
        octet & 0x0F
    )
}

/// Explains the response to SELECT or STATUS. Short responses are explained as far as they go.
pub fn decode_select_response(data: &[u8]) -> String {
    let at = |index: usize| data.get(index).copied();
    let mut lines = Vec::new();

    if let (Some(hi), Some(lo)) = (at(4), at(5)) {
        lines.push(format!("File ID: {:02X}{:02X}", hi, lo));
    }

    let Some(kind) = at(6) else {
        lines.push(format!("Response too short: {} octets", data.len()));
        return lines.join("\n");
    };
    lines.push(format!("Type of file: {}", type_of_file(kind)));

    match kind {
        TYPE_EF => {
            if let (Some(hi), Some(lo)) = (at(2), at(3)) {
                lines.push(format!("File size: {} bytes", u16::from_be_bytes([hi, lo])));
            }

            let structure = at(13).unwrap_or_default();
            lines.push(format!("Structure of file: {}", structure_of_file(structure)));
            if structure == STRUCTURE_CYCLIC {
                lines.push(match at(7).unwrap_or_default() & 0x40 {
                    0 => "INCREASE not allowed".to_string(),
                    _ => "INCREASE allowed".to_string(),
                });
            }
            if structure == STRUCTURE_LINEAR_FIXED || structure == STRUCTURE_CYCLIC {
                if let Some(size) = at(14) {
                    lines.push(format!("Record size: {} bytes", size));
                }
            }

            if let (Some(a), Some(b), Some(c)) = (at(8), at(9), at(10)) {
                lines.push(format!("Access cond. READ/SEEK   : {}", access_condition(a >> 4)));
                lines.push(format!("Access cond. UPDATE      : {}", access_condition(a)));
                lines.push(format!("Access cond. INCREASE    : {}", access_condition(b >> 4)));
                lines.push(format!("Access cond. REHABILITATE: {}", access_condition(c >> 4)));
                lines.push(format!("Access cond. INVALIDATE  : {}", access_condition(c)));
            }

            if let Some(status) = at(11) {
                lines.push(match (status & 0x01, status & 0x04) {
                    (0x01, _) => "Status: not invalidated".to_string(),
                    (_, 0) => "Status: invalidated, not readable and updatable".to_string(),
                    _ => "Status: invalidated, readable and updatable".to_string(),
                });
            }
        }
        TYPE_MF | TYPE_DF => {
            if let (Some(hi), Some(lo)) = (at(2), at(3)) {
                lines.push(format!(
                    "Total unallocated memory: {} bytes",
                    u16::from_be_bytes([hi, lo])
                ));
            }

            let counts = [
                (14, "Number of DFs"),
                (15, "Number of EFs"),
                (16, "Number of CHVs"),
            ];
            for (index, label) in counts {
                if let Some(n) = at(index) {
                    lines.push(format!("{}: {}", label, n));
                }
            }

            let secrets = [
                (18, "CHV1 status        "),
                (19, "UNBLOCK CHV1 status"),
                (20, "CHV2 status        "),
                (21, "UNBLOCK CHV2 status"),
            ];
            for (index, label) in secrets {
                if let Some(octet) = at(index) {
                    lines.push(format!("{}: {}", label, chv_status(octet)));
                }
            }
        }
        _ => {}
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::StatusWord;

    const RAND: &str = "00112233445566778899aabbccddeeff";

    #[test]
    fn test_run_gsm_algo() {
        let driver = driver().unwrap();
        let commands = driver.build("gsm_run_algo", &[RAND]).unwrap();
        let command = driver.prepare(commands[0].clone());

        assert_eq!(CLA, command.cla);
        assert_eq!(INS_RUN_GSM_ALGORITHM, command.ins);
        assert_eq!(hex::decode(RAND).unwrap(), command.payload);

        let binary = driver.build("gsm_run_algo", &["0123456789abcdef"]).unwrap();
        assert_eq!(b"0123456789abcdef".to_vec(), binary[0].payload);

        assert!(matches!(
            driver.build("gsm_run_algo", &[&RAND[..30]]),
            Err(Error::InvalidArgument { command: "gsm_run_algo", .. })
        ));
        assert!(run_gsm_algo(&[0u8; 15]).is_err());
    }

    #[test]
    fn test_select_by_name() {
        let driver = driver().unwrap();

        assert_eq!(
            vec![0x00, 0xA4, 0x00, 0x00, 0x02, 0x6F, 0x07],
            driver.build("gsm_select_file", &["imsi"]).unwrap()[0]
                .to_bytes()
                .unwrap()
        );
        assert_eq!(
            DF_TELECOM.to_vec(),
            driver.build("gsm_select_file", &["DF.TELECOM"]).unwrap()[0].payload
        );
        assert_eq!(
            vec![0x6F, 0x3A],
            driver.build("gsm_select_file", &["6f3a"]).unwrap()[0].payload
        );
    }

    #[test]
    fn test_hook() {
        let driver = driver().unwrap();
        let status = driver.prepare(driver.build("gsm_status", &[]).unwrap().remove(0));

        assert_eq!(vec![0xA0, 0xF2, 0x00, 0x00, 0xFF], status.to_bytes().unwrap());
        assert_eq!(
            0x80,
            driver.prepare(Command::new(0x80, 0xFE, 0x00, 0x00)).cla
        );
    }

    #[test]
    fn test_verify_chv() {
        let driver = driver().unwrap();
        let command = driver.build("gsm_verify_chv", &["1", "1234"]).unwrap().remove(0);

        assert_eq!(0x01, command.p2);
        assert_eq!(
            vec![0x31, 0x32, 0x33, 0x34, 0xFF, 0xFF, 0xFF, 0xFF],
            command.payload
        );
        assert!(driver.build("gsm_verify_chv", &["1", "123456789"]).is_err());
    }

    #[test]
    fn test_status_words() {
        let driver = driver().unwrap();

        assert!(driver
            .resolve(StatusWord(0x98, 0x04))
            .starts_with("- Access condition not fulfilled\n- Unsuccessful CHV verification"));
        assert_eq!(
            "Length '12 (0x0c)' of the response data",
            driver.resolve(StatusWord(0x9F, 0x0C))
        );
        assert_eq!(
            "Update successful but after using an internal retry routine '3' times",
            driver.resolve(StatusWord(0x92, 0x03))
        );
        assert_eq!(
            "Incorrect parameter P3 (ISO: Wrong length)",
            driver.resolve(StatusWord(0x67, 0x00))
        );
        assert_eq!("Incorrect parameter P3", driver.resolve(StatusWord(0x67, 0x10)));
        assert_eq!("File not found", driver.resolve(StatusWord(0x6A, 0x82)));
        assert_eq!(
            "No message known for status word 90 00",
            driver.resolve(StatusWord(0x90, 0x00))
        );
    }

    #[test]
    fn test_decode_ef() {
        let response = hex::decode("000000096F07040014F44401020000").unwrap();
        let text = decode_select_response(&response);

        assert!(text.contains("File ID: 6F07"));
        assert!(text.contains("Type of file: EF"));
        assert!(text.contains("File size: 9 bytes"));
        assert!(text.contains("Structure of file: transparent"));
        assert!(text.contains("Access cond. READ/SEEK   : CHV1"));
        assert!(text.contains("Access cond. UPDATE      : ADM1"));
        assert!(text.contains("Access cond. INVALIDATE  : ADM1"));
        assert!(text.contains("Status: not invalidated"));
    }

    #[test]
    fn test_decode_ef_structure_two() {
        let response = hex::decode("000000096F07040014F44401020200").unwrap();
        let text = decode_select_response(&response);

        assert!(text.contains("Structure of file: transparent"));
        assert!(!text.contains("Record size"));
        assert_eq!("RFU", structure_of_file(4));
    }

    #[test]
    fn test_decode_df() {
        let response =
            hex::decode("000012347F2002000000000009110417020083838A8A").unwrap();
        let text = decode_select_response(&response);

        assert!(text.contains("Type of file: DF"));
        assert!(text.contains("Total unallocated memory: 4660 bytes"));
        assert!(text.contains("Number of DFs: 4"));
        assert!(text.contains("Number of EFs: 23"));
        assert!(text.contains("Number of CHVs: 2"));
        assert!(text.contains("CHV1 status        : Initialized: 1, Retries remaining: 3"));
        assert!(text.contains("UNBLOCK CHV2 status: Initialized: 1, Retries remaining: 10"));
    }

    #[test]
    fn test_decode_short() {
        assert_eq!("Response too short: 2 octets", decode_select_response(&[0, 0]));
        for len in 0..24 {
            let _ = decode_select_response(&vec![0xFF; len]);
        }
    }
}
