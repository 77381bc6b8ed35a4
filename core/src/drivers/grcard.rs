//! GRCard programmable SIM cards. They speak GSM and add commands to personalize the card.

use crate::driver::{
    byte_argument, expect_args, hex_argument, Driver, Fragment, Operation, PayloadFormat,
};
use crate::drivers::{gsm, iso};
use crate::error::Result;
use crate::frame::Command;

pub const NAME: &str = "GRCard";

pub const ATRS: &[&str] = &["3b991800118822334455667760"];

const CLA_PROPRIETARY: u8 = 0x80;
const INS_ERASE_CARD: u8 = 0xFE;
const INS_SET_SECRET: u8 = 0xD4;
const P1_KI: u8 = 0x02;

const DF_ALGORITHM: [u8; 2] = [0x27, 0x00];
const EF_ALGORITHM: [u8; 2] = [0x6F, 0x70];

const PIN_SIZE: usize = 8;

/// The ERASE command erases every DF and EF on the card.
const ERASE_PAYLOAD: [u8; 20] = [
    b'1', b'2', b'3', b'4', b'5', b'6', 0x00, 0x00, 0x13, 0x01, 0xFF, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0xEA,
];

fn build_set_algo(args: &[&str]) -> Result<Vec<Command>> {
    let algorithm = hex_argument("grcard_set_algo", args)?;

    Ok(vec![
        iso::select_file(&DF_ALGORITHM),
        iso::select_file(&EF_ALGORITHM),
        iso::update_binary(&algorithm),
    ])
}

fn build_erase_card(args: &[&str]) -> Result<Vec<Command>> {
    expect_args("grcard_erase_card", args, 0)?;

    Ok(vec![Command::new(CLA_PROPRIETARY, INS_ERASE_CARD, 0x00, 0x00)
        .with_payload(ERASE_PAYLOAD)])
}

fn build_set_ki(args: &[&str]) -> Result<Vec<Command>> {
    Ok(vec![Command::new(CLA_PROPRIETARY, INS_SET_SECRET, P1_KI, 0x00)
        .with_payload(hex_argument("grcard_set_ki", args)?)])
}

fn build_set_pin_puk(args: &[&str]) -> Result<Vec<Command>> {
    expect_args("grcard_set_pin_puk", args, 3)?;

    let number = byte_argument("grcard_set_pin_puk", args[0])?;
    let mut payload = gsm::pad("grcard_set_pin_puk", args[1].as_bytes(), PIN_SIZE)?;
    payload.extend(gsm::pad("grcard_set_pin_puk", args[2].as_bytes(), PIN_SIZE)?);

    Ok(vec![Command::new(CLA_PROPRIETARY, INS_SET_SECRET, 0x00, number)
        .with_payload(payload)])
}

static OPERATIONS: &[Operation] = &[
    Operation {
        name: "grcard_set_algo",
        usage: "<algorithm, hex>",
        summary: "Set the COMP128 version used as A3/A8 algorithm.",
        build: build_set_algo,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "grcard_erase_card",
        usage: "",
        summary: "Erase the entire card including all DFs and EFs.",
        build: build_erase_card,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "grcard_set_ki",
        usage: "<Ki, hex>",
        summary: "Set the Ki used by the A3/A8 algorithm.",
        build: build_set_ki,
        format: PayloadFormat::Raw,
    },
    Operation {
        name: "grcard_set_pin_puk",
        usage: "<1|2> <pin> <puk>",
        summary: "Set PIN and PUK 1 or 2.",
        build: build_set_pin_puk,
        format: PayloadFormat::Raw,
    },
];

pub static FRAGMENT: Fragment = Fragment {
    name: "GRCard",
    operations: OPERATIONS,
    status: None,
    tags: &[],
};

pub fn driver() -> Result<Driver> {
    ATRS.iter()
        .fold(Driver::builder(NAME), |builder, atr| builder.atr(*atr))
        .fragment(&iso::FRAGMENT)
        .fragment(&gsm::FRAGMENT)
        .fragment(&FRAGMENT)
        .before_send(gsm::with_gsm_class)
        .get_response("9F??", iso::GET_RESPONSE)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_set_pin_puk() {
        let driver = driver().unwrap();
        let command = driver
            .build("grcard_set_pin_puk", &["0x01", "1234", "12345678"])
            .unwrap()
            .remove(0);

        assert_eq!(
            hex::decode("80D400011031323334FFFFFFFF3132333435363738").unwrap(),
            driver.prepare(command).to_bytes().unwrap()
        );
    }

    #[test]
    fn test_set_algo() {
        let driver = driver().unwrap();
        let commands: Vec<_> = driver
            .build("grcard_set_algo", &["03"])
            .unwrap()
            .into_iter()
            .map(|c| driver.prepare(c).to_bytes().unwrap())
            .collect();

        assert_eq!(
            vec![
                hex::decode("A0A40000022700").unwrap(),
                hex::decode("A0A40000026F70").unwrap(),
                hex::decode("A0D600000103").unwrap(),
            ],
            commands
        );
    }

    #[test]
    fn test_erase_card() {
        let driver = driver().unwrap();
        let bytes = driver
            .prepare(driver.build("grcard_erase_card", &[]).unwrap().remove(0))
            .to_bytes()
            .unwrap();

        assert_eq!([0x80u8, 0xFE, 0x00, 0x00, 0x14], bytes[..5]);
        assert_eq!(b"123456"[..], bytes[5..11]);
        assert_eq!(Some(&0xEA), bytes.last());
    }

    #[test]
    fn test_erase_card_takes_no_arguments() {
        let driver = driver().unwrap();

        assert!(matches!(
            driver.build("grcard_erase_card", &["now"]),
            Err(Error::InvalidArgument {
                command: "grcard_erase_card",
                ..
            })
        ));
    }

    #[test]
    fn test_inherits_gsm() {
        let driver = driver().unwrap();

        assert!(driver.operation("gsm_run_algo").is_ok());
        assert!(driver.operation("select_file").is_ok());
        assert_eq!(gsm::STATUS.name, driver.status_tables()[0].name);
    }
}
