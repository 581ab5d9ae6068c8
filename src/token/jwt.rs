use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;

use super::error::Error;

type HmacSha256 = Hmac<Sha256>;

const ALG_HS256: &str = "HS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub alg: String,
    pub typ: String,
}

impl Header {
    fn hs256() -> Self {
        Self {
            alg: ALG_HS256.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims with an `exp` (unix seconds) checked on verification.
pub trait Expiring {
    fn expires_at(&self) -> i64;
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: DeserializeOwned>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn split(token: &str) -> Result<(&str, &str, &str), Error> {
    let mut parts = token.trim().split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok((header, payload, signature))
        }
        _ => Err(Error::TokenFormat),
    }
}

fn mac(secret: &[u8], signing_input: &str) -> Result<HmacSha256, Error> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| Error::Key)?;
    mac.update(signing_input.as_bytes());
    Ok(mac)
}

/// Encode `claims` as an HS256 JWT signed with `secret`.
///
/// # Errors
/// Returns an error if the claims cannot be serialized.
pub fn sign<T: Serialize>(secret: &[u8], claims: &T) -> Result<String, Error> {
    let header = b64e_json(&Header::hs256())?;
    let payload = b64e_json(claims)?;
    let signing_input = format!("{header}.{payload}");
    let signature = mac(secret, &signing_input)?.finalize().into_bytes();
    Ok(format!(
        "{signing_input}.{}",
        Base64UrlUnpadded::encode_string(&signature)
    ))
}

/// Verify an HS256 JWT and return its claims.
///
/// The signature is checked before the payload is parsed, and `exp` is
/// compared against `now_unix`.
///
/// # Errors
/// Returns an error on malformed input, a foreign algorithm, a bad signature
/// or an expired token.
pub fn verify<T>(secret: &[u8], token: &str, now_unix: i64) -> Result<T, Error>
where
    T: DeserializeOwned + Expiring,
{
    let (header_b64, payload_b64, signature_b64) = split(token)?;
    let header: Header = b64d_json(header_b64)?;
    if header.alg != ALG_HS256 {
        return Err(Error::UnsupportedAlg(header.alg));
    }

    let signature = Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| Error::Base64)?;
    mac(secret, &format!("{header_b64}.{payload_b64}"))?
        .verify_slice(&signature)
        .map_err(|_| Error::InvalidSignature)?;

    let claims: T = b64d_json(payload_b64)?;
    if claims.expires_at() <= now_unix {
        return Err(Error::Expired);
    }
    Ok(claims)
}

/// Decode claims WITHOUT checking the signature.
///
/// Only used to find which key should verify the token; never trust the result.
///
/// # Errors
/// Returns an error on malformed input.
pub fn peek<T: DeserializeOwned>(token: &str) -> Result<T, Error> {
    let (_, payload_b64, _) = split(token)?;
    b64d_json(payload_b64)
}
