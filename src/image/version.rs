use crate::{
    errors::ImageError,
    image::{ContentDigest, Tag},
};
use std::fmt;

/// Either an image tag or a content digest
///
/// This is what the distribution API accepts as the `reference` segment of a
/// manifest request. An [crate::image::ImageName] resolves to its most
/// specific version: the digest when there is one, otherwise the tag, and
/// otherwise `latest`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ImageVersion {
    Tag(Tag),
    ContentDigest(ContentDigest),
}

impl ImageVersion {
    pub fn as_str(&self) -> &str {
        match self {
            ImageVersion::Tag(tag) => tag.as_str(),
            ImageVersion::ContentDigest(digest) => digest.as_str(),
        }
    }

    /// Digests always contain a colon and tags never do
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        if s.contains(':') {
            Ok(ImageVersion::ContentDigest(ContentDigest::parse(s)?))
        } else {
            Ok(ImageVersion::Tag(Tag::parse(s)?))
        }
    }

    pub fn content_digest(&self) -> Option<&ContentDigest> {
        match self {
            ImageVersion::Tag(_) => None,
            ImageVersion::ContentDigest(digest) => Some(digest),
        }
    }
}

impl std::str::FromStr for ImageVersion {
    type Err = ImageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageVersion::parse(s)
    }
}

impl fmt::Display for ImageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ImageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
