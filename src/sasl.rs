//! SASL PLAIN payload encoding (RFC 4616).
//!
//! # Reference
//! - RFC 4616: <https://tools.ietf.org/html/rfc4616>

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Encode credentials for the PLAIN mechanism with an explicit authzid.
///
/// The payload is `authzid NUL authcid NUL password`, base64-encoded. The
/// bot authenticates with authzid equal to authcid.
pub(crate) fn encode_plain_with_authzid(authzid: &str, authcid: &str, password: &str) -> String {
    let payload = format!("{}\0{}\0{}", authzid, authcid, password);
    BASE64.encode(payload.as_bytes())
}
