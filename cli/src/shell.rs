use cardshell::{Session, Transport};
use dialoguer::Input;
use tracing::debug;

use crate::{print_replies, Result};

const PROMPT: &str = "cardshell";

/// What the user asked for on one line.
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Empty,
    Exit,
    Help,
    Atr,
    Command(&'a str, Vec<&'a str>),
}

fn parse(line: &str) -> Line<'_> {
    let mut words = line.split_whitespace();

    match words.next() {
        None => Line::Empty,
        Some("exit" | "quit") => Line::Exit,
        Some("help" | "?") => Line::Help,
        Some("atr") => Line::Atr,
        Some(name) => Line::Command(name, words.collect()),
    }
}

/// Reads commands until `exit`. Failing commands are reported and the loop goes on.
pub fn run<T: Transport>(mut session: Session<'_, T>, json: bool) -> Result<()> {
    println!(
        "Talking to the card as {}. Type `help` for the commands.",
        session.driver().name
    );

    loop {
        let line: String = Input::new()
            .with_prompt(PROMPT)
            .allow_empty(true)
            .interact_text()?;

        match parse(&line) {
            Line::Empty => continue,
            Line::Exit => break,
            Line::Help => {
                for operation in session.driver().operations() {
                    println!("{} {}\n    {}", operation.name, operation.usage, operation.summary);
                }
            }
            Line::Atr => println!("{}", hex::encode_upper(session.announcement())),
            Line::Command(name, args) => match session.run(name, &args) {
                Ok(replies) => print_replies(&replies, json)?,
                Err(e) => eprintln!("{}", e),
            },
        }
    }

    debug!("Leaving the shell");

    session.close();

    Ok(())
}
