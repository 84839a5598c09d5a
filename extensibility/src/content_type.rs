//! Wire formats that extension messages may be exchanged in.

use std::{fmt, str::FromStr};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error as ThisError;

/// The serialization format negotiated for an extension when it was registered with the platform.
///
/// Parsed from its upper-case name, i.e. `JSON` or `XML`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// `application/json`.
    Json,
    /// `application/xml`.
    Xml,
}

impl ContentType {
    /// The MIME type set as the `content_type` property on replies.
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        }
    }

    /// Decodes a message body.
    ///
    /// # Errors
    /// Returns `Err` if the bytes are not a valid encoding of `T` in this format.
    pub fn decode<T: DeserializeOwned>(self, data: &[u8]) -> Result<T, DecodeError> {
        match self {
            Self::Json => Ok(serde_json::from_slice(data)?),
            Self::Xml => Ok(quick_xml::de::from_str(std::str::from_utf8(data)?)
                .map_err(DecodeError::Xml)?),
        }
    }

    /// Encodes a message body.
    ///
    /// XML documents use the serde name of `T` as their root element.
    ///
    /// # Errors
    /// Returns `Err` if `T` cannot be represented in this format.
    pub fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>, EncodeError> {
        match self {
            Self::Json => Ok(serde_json::to_vec(value)?),
            Self::Xml => Ok(quick_xml::se::to_string(value)
                .map_err(EncodeError::Xml)?
                .into_bytes()),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("JSON"),
            Self::Xml => f.write_str("XML"),
        }
    }
}

impl FromStr for ContentType {
    type Err = UnknownContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JSON" => Ok(Self::Json),
            "XML" => Ok(Self::Xml),
            other => Err(UnknownContentType(other.to_string())),
        }
    }
}

/// A content type name that is not one of `JSON` or `XML`.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("unknown content type {0:?}, expected one of: JSON, XML")]
pub struct UnknownContentType(pub String);

/// A message body could not be decoded.
#[derive(Debug, ThisError)]
pub enum DecodeError {
    /// Invalid JSON, or JSON of the wrong shape.
    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),
    /// XML bodies must be UTF-8.
    #[error("XML message is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    /// Invalid XML, or XML of the wrong shape.
    #[error("invalid XML message: {0}")]
    Xml(quick_xml::DeError),
}

/// A reply could not be encoded.
#[derive(Debug, ThisError)]
pub enum EncodeError {
    /// Serializing to JSON failed.
    #[error("could not encode reply as JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Serializing to XML failed.
    #[error("could not encode reply as XML: {0}")]
    Xml(quick_xml::DeError),
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename = "Greeting", rename_all = "camelCase")]
    struct Greeting {
        greeted_name: String,
        times: u32,
    }

    #[test]
    fn parses_upper_case_names_only() {
        assert_eq!("JSON".parse::<ContentType>(), Ok(ContentType::Json));
        assert_eq!("XML".parse::<ContentType>(), Ok(ContentType::Xml));
        assert_eq!(
            "json".parse::<ContentType>(),
            Err(UnknownContentType("json".into()))
        );
        assert!("PROTOBUF".parse::<ContentType>().is_err());
        assert_eq!(ContentType::Xml.to_string(), "XML");
    }

    #[test]
    fn decodes_json() {
        let greeting: Greeting = ContentType::Json
            .decode(br#"{"greetedName":"world","times":2}"#)
            .unwrap();
        assert_eq!(
            greeting,
            Greeting {
                greeted_name: "world".into(),
                times: 2
            }
        );
    }

    #[test]
    fn decodes_xml() {
        let greeting: Greeting = ContentType::Xml
            .decode(b"<Greeting><greetedName>world</greetedName><times>2</times></Greeting>")
            .unwrap();
        assert_eq!(greeting.greeted_name, "world");
        assert_eq!(greeting.times, 2);
    }

    #[test]
    fn encodes_xml_with_the_type_name_as_root() {
        let xml = ContentType::Xml
            .encode(&Greeting {
                greeted_name: "world".into(),
                times: 1,
            })
            .unwrap();
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.starts_with("<Greeting>"), "{xml}");
        assert!(xml.contains("<greetedName>world</greetedName>"), "{xml}");
    }

    #[test]
    fn reports_decode_errors() {
        let err = ContentType::Json.decode::<Greeting>(b"{").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));

        let err = ContentType::Xml
            .decode::<Greeting>(&[0xff, 0xfe])
            .unwrap_err();
        assert!(matches!(err, DecodeError::Utf8(_)));
    }
}
