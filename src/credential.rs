//! Proxy credential negotiation
//!
//! `-U user:password` is split on the first colon. `-U user` asks for the
//! password on the terminal without echoing it.

use console::{Key, Term};
use std::fmt;
use std::io::{self, BufRead};
use tracing::debug;

/// ProxyCredential holds SOCKS5 username/password credentials
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// PasswordSource supplies a password when none was given inline
pub trait PasswordSource {
    fn read_password(&mut self) -> io::Result<String>;
}

/// negotiate turns the raw `user[:password]` value into a credential,
/// consulting `source` only when the password is missing
pub fn negotiate<S: PasswordSource>(
    raw: Option<&str>,
    source: &mut S,
) -> io::Result<Option<ProxyCredential>> {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(None),
    };

    let (username, password) = match raw.split_once(':') {
        // no username means no authentication
        Some(("", _)) => return Ok(None),
        Some((user, password)) => (user.to_string(), password.to_string()),
        None => {
            debug!("no inline proxy password, prompting");
            (raw.to_string(), source.read_password()?)
        }
    };

    Ok(Some(ProxyCredential { username, password }))
}

/// KeyEvent is the subset of keystrokes the masked reader cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Char(char),
    Backspace,
    Enter,
    Other,
}

impl From<Key> for KeyEvent {
    fn from(key: Key) -> Self {
        match key {
            Key::Enter => KeyEvent::Enter,
            Key::Backspace => KeyEvent::Backspace,
            Key::Char(c) => KeyEvent::Char(c),
            _ => KeyEvent::Other,
        }
    }
}

/// MaskedInput accumulates keystrokes until Enter
#[derive(Debug, Default)]
pub struct MaskedInput {
    buffer: String,
}

impl MaskedInput {
    /// feed consumes one key; returns the finished password on Enter
    pub fn feed(&mut self, key: KeyEvent) -> Option<String> {
        match key {
            KeyEvent::Enter => return Some(std::mem::take(&mut self.buffer)),
            KeyEvent::Backspace => {
                self.buffer.pop();
            }
            KeyEvent::Char(c) if !c.is_control() => self.buffer.push(c),
            // control characters and special keys are dropped
            KeyEvent::Char(_) | KeyEvent::Other => (),
        }
        None
    }
}

/// read_masked drives a MaskedInput over a key stream
pub fn read_masked<I>(keys: I) -> io::Result<String>
where
    I: IntoIterator<Item = io::Result<KeyEvent>>,
{
    let mut input = MaskedInput::default();
    for key in keys {
        if let Some(password) = input.feed(key?) {
            return Ok(password);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "input ended before Enter",
    ))
}

/// TerminalPrompt prints `Password:` and reads keys without echo
pub struct TerminalPrompt {
    term: Term,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordSource for TerminalPrompt {
    fn read_password(&mut self) -> io::Result<String> {
        self.term.write_str("Password:")?;

        // Piped input has no key events, take one line instead
        if !self.term.is_term() {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            self.term.write_line("")?;
            return Ok(line.trim_end_matches(['\r', '\n']).to_string());
        }

        let term = &self.term;
        let password = read_masked(std::iter::repeat_with(|| {
            term.read_key().map(KeyEvent::from)
        }))?;
        self.term.write_line("")?;
        Ok(password)
    }
}
