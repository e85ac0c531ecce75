use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use oci_client::secrets::RegistryAuth;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token is not valid UTF-8")]
    Utf8,
    #[error("token is not in username:password form")]
    MissingSeparator,
}

/// Turn a registry authorization token into basic credentials.
///
/// The token is base64 of `username:password`; the password may itself
/// contain colons.
pub fn decode_token(token: &str) -> Result<RegistryAuth, Error> {
    let decoded = STANDARD.decode(token.trim())?;
    let decoded = String::from_utf8(decoded).map_err(|_| Error::Utf8)?;
    let (username, password) = decoded.split_once(':').ok_or(Error::MissingSeparator)?;
    Ok(RegistryAuth::Basic(username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn basic(auth: RegistryAuth) -> (String, String) {
        match auth {
            RegistryAuth::Basic(username, password) => (username, password),
            _ => panic!("expected basic auth"),
        }
    }

    #[test]
    fn decodes_username_and_password() {
        let token = STANDARD.encode("AWS:secret:with:colons");
        let (username, password) = basic(decode_token(&token).unwrap());
        assert_eq!(username, "AWS");
        assert_eq!(password, "secret:with:colons");
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(matches!(decode_token("***"), Err(Error::Base64(_))));
    }

    #[test]
    fn rejects_missing_separator() {
        let token = STANDARD.encode("no-separator");
        assert_eq!(decode_token(&token).unwrap_err(), Error::MissingSeparator);
    }

    #[test]
    fn rejects_non_utf8() {
        let token = STANDARD.encode([0xff, 0xfe, b':', b'x']);
        assert_eq!(decode_token(&token).unwrap_err(), Error::Utf8);
    }
}
