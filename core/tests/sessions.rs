//! Full sessions against a scripted card.

use std::collections::VecDeque;

use cardshell::error::EncodingError;
use cardshell::session::Payload;
use cardshell::tlv::Decoded;
use cardshell::{Error, Registry, Session, SessionOptions, Transport, TransportError};

const GSM_ATR: &str = "3b9a940092027593110001020200";
const GRCARD_ATR: &str = "3b991800118822334455667760";
const TCOS_ATR: &str = "3bba96008131865d0064057b0102318090000a";

const RAND: &str = "00112233445566778899aabbccddeeff";

/// Plays back expected command frames and their responses.
struct ScriptedCard {
    atr: Vec<u8>,
    script: VecDeque<(Vec<u8>, Vec<u8>)>,
    sent: Vec<Vec<u8>>,
    connected: bool,
}

impl ScriptedCard {
    fn new(atr: &str) -> Self {
        Self {
            atr: hex::decode(atr).unwrap(),
            script: VecDeque::new(),
            sent: Vec::new(),
            connected: false,
        }
    }

    fn expect(mut self, command: &str, response: &str) -> Self {
        self.script
            .push_back((hex::decode(command).unwrap(), hex::decode(response).unwrap()));
        self
    }
}

impl Transport for ScriptedCard {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    fn announcement(&self) -> Vec<u8> {
        match self.connected {
            true => self.atr.clone(),
            _ => Vec::new(),
        }
    }

    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }

        self.sent.push(command.to_vec());

        let (expected, response) = self
            .script
            .pop_front()
            .ok_or_else(|| TransportError::Backend("script exhausted".to_string()))?;
        assert_eq!(
            hex::encode_upper(&expected),
            hex::encode_upper(command),
            "unexpected command"
        );

        Ok(response)
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

#[test]
fn test_gsm_run_algo() {
    let registry = Registry::builtin().unwrap();
    let card = ScriptedCard::new(GSM_ATR)
        .expect(&format!("A088000010{}", RAND), "9F0C")
        .expect("A0C000000C", "0102030405060708090A0B0C9000");

    let mut session = Session::open(card, &registry).unwrap();
    assert_eq!("GSM", session.driver().name);

    let replies = session.run("gsm_run_algo", &[RAND]).unwrap();
    assert_eq!(1, replies.len());

    let reply = &replies[0];
    assert_eq!(0x88, reply.command.ins);
    assert_eq!(hex::decode(RAND).unwrap(), reply.command.payload);
    assert_eq!(12, reply.response.payload().len());
    assert_eq!("No message known for status word 90 00", reply.status);

    let card = session.close();
    assert!(card.script.is_empty());
    assert!(!card.connected);
}

#[test]
fn test_short_challenge_is_not_sent() {
    let registry = Registry::builtin().unwrap();
    let mut session = Session::open(ScriptedCard::new(GSM_ATR), &registry).unwrap();

    let result = session.run("gsm_run_algo", &[&RAND[..30]]);

    assert!(matches!(
        result,
        Err(Error::InvalidArgument {
            command: "gsm_run_algo",
            ..
        })
    ));
    assert!(session.close().sent.is_empty());
}

#[test]
fn test_tcos_select_decodes_fcp() {
    let registry = Registry::builtin().unwrap();
    let fcp = "621782010183025031850601C1020803038606B0000000FFFF";
    let card = ScriptedCard::new(TCOS_ATR)
        .expect("00A4000002503100", "6119")
        .expect("00C0000019", &format!("{}9000", fcp));

    let mut session = Session::open(card, &registry).unwrap();
    assert_eq!("TCOS", session.driver().name);

    let replies = session.run("select_file", &["5031"]).unwrap();
    let decoding = match &replies[0].payload {
        Some(Payload::Tlv(decoding)) => decoding,
        other => panic!("unexpected payload: {:?}", other),
    };

    assert!(decoding.is_complete());
    match &decoding.find(0x85).unwrap().decoded {
        Decoded::FileDescriptor(fd) => assert_eq!(
            "category: key, purpose: authenticate, status: not invalidated",
            fd.summary()
        ),
        other => panic!("unexpected: {:?}", other),
    }

    let text = replies[0].to_string();
    assert!(text.starts_with("> 00 A4 00 00 [02] 5031 Le=00\n"));
    assert!(text.contains("(File descriptor extension)"));
}

#[test]
fn test_failure_stops_the_run() {
    let registry = Registry::builtin().unwrap();
    let card = ScriptedCard::new(GRCARD_ATR).expect("A0A40000022700", "9804");

    let mut session = Session::open(card, &registry).unwrap();
    assert_eq!("GRCard", session.driver().name);

    let replies = session.run("grcard_set_algo", &["03"]).unwrap();

    assert_eq!(1, replies.len());
    assert!(!replies[0].is_ok());
    assert!(replies[0]
        .status
        .starts_with("- Access condition not fulfilled\n- Unsuccessful CHV verification"));
}

#[test]
fn test_get_response_can_be_disabled() {
    let registry = Registry::builtin().unwrap();
    let card = ScriptedCard::new(GSM_ATR).expect("A0A40000027F20", "9F16");

    let mut session = Session::open(card, &registry)
        .unwrap()
        .with_options(SessionOptions {
            auto_get_response: false,
        });
    let replies = session.run("cd_df_gsm", &[]).unwrap();

    assert_eq!("Length '22 (0x16)' of the response data", replies[0].status);
    assert_eq!(None, replies[0].payload);
}

#[test]
fn test_forced_driver() {
    let registry = Registry::builtin().unwrap();
    let card = ScriptedCard::new("3b00").expect("00B0000010", "6982");

    let driver = registry.by_name("ISO7816-4").unwrap();
    let mut session = Session::with_driver(card, driver).unwrap();
    let replies = session.run("read_binary", &["0", "16"]).unwrap();

    assert_eq!("Security status not satisfied", replies[0].status);
}

#[test]
fn test_reply_without_status_word() {
    let registry = Registry::builtin().unwrap();
    let card = ScriptedCard::new("3b00").expect("00B0000010", "90");

    let driver = registry.by_name("ISO7816-4").unwrap();
    let mut session = Session::with_driver(card, driver).unwrap();

    assert!(matches!(
        session.run("read_binary", &["0", "16"]),
        Err(Error::Encoding(EncodingError::ResponseTooShort(1)))
    ));
}

#[test]
fn test_unknown_atr() {
    let registry = Registry::builtin().unwrap();

    match Session::open(ScriptedCard::new("3b00"), &registry) {
        Err(Error::NoDriverFound(atr)) => assert_eq!(vec![0x3B, 0x00], atr),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("a driver was selected"),
    }
}

#[test]
fn test_transport_errors_surface() {
    let registry = Registry::builtin().unwrap();
    let mut session = Session::open(ScriptedCard::new(GSM_ATR), &registry).unwrap();

    assert!(matches!(
        session.run("gsm_status", &[]),
        Err(Error::Transport(TransportError::Backend(_)))
    ));
    assert!(matches!(
        session.run("no_such_command", &[]),
        Err(Error::UnknownCommand(_))
    ));
}
