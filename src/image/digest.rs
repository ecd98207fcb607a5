use crate::errors::ImageError;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::ops::Range;

static SHA256_STR: &str = "sha256";

/// A digest identifies the exact bytes of a piece of content
///
/// The serialized form is `format:hex`. Every digest this crate computes uses
/// `sha256`, but any well-formed format is accepted when parsing, since
/// digests also arrive from manifests and request paths.
///
/// A content digest is independent of where the content is stored; the
/// store's own content identifiers are a separate addressing scheme.
#[derive(Clone)]
pub struct ContentDigest {
    serialized: String,
    format_pos: Range<usize>,
    hex_pos: Range<usize>,
}

serialized_identity!(ContentDigest);

impl ContentDigest {
    /// Returns the string representation, always `format:hex`
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Digest `content_bytes` with `sha256`
    ///
    /// ```
    /// # use ripfs::ContentDigest;
    /// let digest = ContentDigest::from_content(b"cat");
    /// assert_eq!(digest.as_str(), "sha256:77af778b51abd4a3c51c5ddd97204a9c3ae614ebccb75a606c3b6865aed6744e");
    /// ```
    pub fn from_content(content_bytes: &[u8]) -> Self {
        let serialized = format!("{}:{:x}", SHA256_STR, Sha256::digest(content_bytes));
        let hex_start = SHA256_STR.len() + 1;
        ContentDigest {
            format_pos: 0..SHA256_STR.len(),
            hex_pos: hex_start..serialized.len(),
            serialized,
        }
    }

    /// Parse a [prim@str] as a [ContentDigest]
    ///
    /// ```
    /// # use ripfs::ContentDigest;
    /// let digest = ContentDigest::parse("format:00112233445566778899aabbccddeeff").unwrap();
    /// assert_eq!(digest.format_str(), "format");
    /// assert_eq!(digest.hex_str(), "00112233445566778899aabbccddeeff")
    /// ```
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", ContentDigest::regex_str())).unwrap();
        }
        let captures = RE
            .captures(s)
            .ok_or_else(|| ImageError::InvalidReferenceFormat(s.to_owned()))?;
        match (captures.name("dig_f"), captures.name("dig_h")) {
            (Some(format), Some(hex)) => Ok(ContentDigest {
                serialized: s.to_owned(),
                format_pos: format.range(),
                hex_pos: hex.range(),
            }),
            _ => Err(ImageError::InvalidReferenceFormat(s.to_owned())),
        }
    }

    /// The algorithm portion, before the colon
    pub fn format_str(&self) -> &str {
        &self.serialized[self.format_pos.clone()]
    }

    /// The hexadecimal portion, at least 32 lowercase hex digits
    pub fn hex_str(&self) -> &str {
        &self.serialized[self.hex_pos.clone()]
    }

    /// Check that `content_bytes` hash to this digest
    pub fn verify(&self, content_bytes: &[u8]) -> Result<(), ImageError> {
        if self.format_str() != SHA256_STR {
            return Err(ImageError::UnsupportedDigestFormat(
                self.format_str().to_owned(),
            ));
        }
        let found = ContentDigest::from_content(content_bytes);
        if &found == self {
            Ok(())
        } else {
            Err(ImageError::ContentDigestMismatch {
                expected: self.clone(),
                found,
            })
        }
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<dig>",
            /*  */ "(?P<dig_f>",
            /* -- */ "[a-zA-Z][a-zA-Z0-9]*", // first format component
            /* -- */ "(?:[-_+.][a-zA-Z][a-zA-Z0-9]*)*", // separated components
            /*  */ ")",
            /*  */ "[:]",
            /*  */ "(?P<dig_h>[a-f0-9]{32,})",
            ")",
        )
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentDigest::parse(&s).map_err(de::Error::custom)
    }
}
