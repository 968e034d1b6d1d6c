use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::{DeserializeOwned, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::skip_serializing_none;

use std::fmt::{Debug, Display, Formatter, Result as FormatterResult};
use std::marker::PhantomData;


new_type![
    /// JWS signing algorithm named in the `alg` header parameter (e.g., `RS256`).
    #[derive(Deserialize, Hash, Ord, PartialOrd, Serialize)]
    JsonWebTokenAlgorithm(String)
];

new_type![
    #[derive(Deserialize, Hash, Ord, PartialOrd, Serialize)]
    JsonWebTokenContentType(String)
];

new_type![
    #[derive(Deserialize, Hash, Ord, PartialOrd, Serialize)]
    JsonWebTokenType(String)
];

new_type![
    /// Identifier of the key the provider signed the token with.
    #[derive(Deserialize, Hash, Ord, PartialOrd, Serialize)]
    JsonWebKeyId(String)
];

/// JOSE header of a compact-serialized JSON Web Token.
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct JsonWebTokenHeader {
    pub alg: JsonWebTokenAlgorithm,
    pub cty: Option<JsonWebTokenContentType>,
    pub kid: Option<JsonWebKeyId>,
    pub typ: Option<JsonWebTokenType>,
}

/// Read access to the contents of a JSON Web Token whose signature has NOT been checked.
pub trait JsonWebTokenAccess<P>
where
    P: Debug + DeserializeOwned + Serialize,
{
    type ReturnType;

    fn unverified_header(&self) -> &JsonWebTokenHeader;
    fn unverified_payload(self) -> Self::ReturnType;
    fn unverified_payload_ref(&self) -> &P;
}

/// Compact-serialized JSON Web Token (JWS), decoded but not signature-checked.
///
/// jAccount does not publish a key set for its ID tokens, so this type only exposes the
/// `unverified_*` accessors. Values are trustworthy only to the extent that the token was
/// received directly from the provider's token endpoint over TLS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonWebToken<P>
where
    P: Debug + DeserializeOwned + Serialize,
{
    header: JsonWebTokenHeader,
    payload: P,
    signature: Vec<u8>,
    signing_input: String,
}
impl<P> JsonWebToken<P>
where
    P: Debug + DeserializeOwned + Serialize,
{
    /// Decode a compact serialization (`header.payload.signature`).
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::String(raw.to_string()))
    }

    /// Returns the `header.payload` portion that the signature covers.
    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }

    /// Returns the decoded (and unchecked) signature bytes.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}
// Owned JWT.
impl<P> JsonWebTokenAccess<P> for JsonWebToken<P>
where
    P: Debug + DeserializeOwned + Serialize,
{
    type ReturnType = P;
    fn unverified_header(&self) -> &JsonWebTokenHeader {
        &self.header
    }
    fn unverified_payload(self) -> Self::ReturnType {
        self.payload
    }
    fn unverified_payload_ref(&self) -> &P {
        &self.payload
    }
}
// Borrowed JWT.
impl<'a, P> JsonWebTokenAccess<P> for &'a JsonWebToken<P>
where
    P: Debug + DeserializeOwned + Serialize,
{
    type ReturnType = &'a P;
    fn unverified_header(&self) -> &JsonWebTokenHeader {
        &self.header
    }
    fn unverified_payload(self) -> Self::ReturnType {
        &self.payload
    }
    fn unverified_payload_ref(&self) -> &P {
        &self.payload
    }
}
impl<'de, P> Deserialize<'de> for JsonWebToken<P>
where
    P: Debug + DeserializeOwned + Serialize,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct JsonWebTokenVisitor<P: Debug + DeserializeOwned + Serialize>(PhantomData<P>);
        impl<'de, P> Visitor<'de> for JsonWebTokenVisitor<P>
        where
            P: Debug + DeserializeOwned + Serialize,
        {
            type Value = JsonWebToken<P>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("JsonWebToken")
            }

            fn visit_str<DE>(self, v: &str) -> Result<Self::Value, DE>
            where
                DE: serde::de::Error,
            {
                let parts = v.split('.').collect::<Vec<_>>();

                // NB: We avoid including the full payload encoding in the error output to avoid
                // clients potentially logging sensitive values.
                if parts.len() != 3 {
                    return Err(DE::custom(format!(
                        "Invalid JSON web token: found {} parts (expected 3)",
                        parts.len()
                    )));
                }

                let header_json = BASE64_URL_SAFE_NO_PAD.decode(parts[0]).map_err(|err| {
                    DE::custom(format!("Invalid base64url header encoding: {:?}", err))
                })?;
                let header: JsonWebTokenHeader =
                    serde_json::from_slice(&header_json).map_err(|err| {
                        DE::custom(format!("Failed to parse header JSON: {:?}", err))
                    })?;

                let raw_payload = BASE64_URL_SAFE_NO_PAD.decode(parts[1]).map_err(|err| {
                    DE::custom(format!("Invalid base64url payload encoding: {:?}", err))
                })?;
                let payload: P = serde_path_to_error::deserialize(
                    &mut serde_json::Deserializer::from_slice(&raw_payload),
                )
                .map_err(|err| {
                    DE::custom(format!(
                        "Failed to parse payload JSON at `{}`: {}",
                        err.path(),
                        err.inner()
                    ))
                })?;

                let signature = BASE64_URL_SAFE_NO_PAD.decode(parts[2]).map_err(|err| {
                    DE::custom(format!("Invalid base64url signature encoding: {:?}", err))
                })?;

                Ok(JsonWebToken {
                    header,
                    payload,
                    signature,
                    signing_input: format!("{}.{}", parts[0], parts[1]),
                })
            }
        }
        deserializer.deserialize_str(JsonWebTokenVisitor(PhantomData))
    }
}
impl<P> Serialize for JsonWebToken<P>
where
    P: Debug + DeserializeOwned + Serialize,
{
    fn serialize<SE>(&self, serializer: SE) -> Result<SE::Ok, SE::Error>
    where
        SE: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
impl<P> Display for JsonWebToken<P>
where
    P: Debug + DeserializeOwned + Serialize,
{
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        let signature_base64 = BASE64_URL_SAFE_NO_PAD.encode(&self.signature);
        write!(f, "{}.{}", self.signing_input, signature_base64)
    }
}
