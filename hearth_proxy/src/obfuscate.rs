// Reversible obfuscation for values relayed through in-game chat/commands.
//
// The key is hashed with MD5 to a fixed 16-byte pad; the message is XORed
// with the repeating pad and encoded as URL-safe base64 so the result only
// contains characters the game's command parser accepts. This hides values
// such as xuids from casual observers; it is not encryption.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use md5::{Digest, Md5};

#[derive(Debug, thiserror::Error)]
pub enum RevealError {
    #[error("not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("revealed bytes are not utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

fn xor_with_key(data: &[u8], key: &str) -> Vec<u8> {
    let pad = Md5::digest(key.as_bytes());
    data.iter()
        .zip(pad.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

pub fn obfuscate(message: &str, key: &str) -> String {
    URL_SAFE.encode(xor_with_key(message.as_bytes(), key))
}

pub fn reveal(encoded: &str, key: &str) -> Result<String, RevealError> {
    let bytes = URL_SAFE.decode(encoded)?;
    Ok(String::from_utf8(xor_with_key(&bytes, key))?)
}
