use std::fmt;

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};

const TOKEN_BYTES: usize = 32;

/// Which flow a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Remember,
    Activation,
    Reset,
}

/// Plaintext secret handed to the client. Only its digest is ever stored.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Random URL-safe token, 256 bits from the OS RNG.
pub fn new_token() -> Token {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Token(Base64UrlUnpadded::encode_string(&bytes))
}
