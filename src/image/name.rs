use crate::{
    errors::ImageError,
    image::{ContentDigest, DefaultRegistry, ImageVersion, Registry, Repository, Tag},
};
use regex::Regex;
use std::ops::Range;

/// Parsed Docker-style image reference
///
/// An owned reference to an image, optionally at a specific version, in the
/// format `docker pull` accepts including its quirks.
///
/// A complete image name contains a [Registry], [Repository], [Tag], and
/// [ContentDigest] in that order. Only the [Repository] component is
/// mandatory.
///
/// The [Tag] always begins with a `:` and the [ContentDigest] with an `@`.
/// Telling the optional [Registry] apart from the first section of the
/// [Repository] takes a heuristic: when that section contains a dot or a
/// colon, or is exactly `localhost`, it names a registry.
///
/// The same reference can be spelled several ways (`busybox`,
/// `docker.io/library/busybox:latest`, ...). [ImageName::canonical] picks one
/// spelling for use as a lookup key.
#[derive(Clone)]
pub struct ImageName {
    serialized: String,
    registry_pos: Option<Range<usize>>,
    repository_pos: Range<usize>,
    tag_pos: Option<Range<usize>>,
    digest_pos: Option<Range<usize>>,
}

serialized_identity!(ImageName);

impl ImageName {
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse an [ImageName] from its component pieces
    ///
    /// Fails if any component is invalid, or if the combined string would
    /// parse differently than intended (a registry that reads as the first
    /// repository segment, for example).
    pub fn from_parts(
        registry: Option<&str>,
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Result<Self, ImageError> {
        let mut combined = String::new();
        if let Some(registry) = registry {
            combined.push_str(registry);
            combined.push('/');
        }
        combined.push_str(repository);
        if let Some(tag) = tag {
            combined.push(':');
            combined.push_str(tag);
        }
        if let Some(digest) = digest {
            combined.push('@');
            combined.push_str(digest);
        }
        let parsed = ImageName::parse(&combined)?;
        if parsed.as_parts() == (registry, repository, tag, digest) {
            Ok(parsed)
        } else {
            Err(ImageError::InvalidReferenceFormat(combined))
        }
    }

    /// Return references to the parsed components within this [ImageName]
    pub fn as_parts(&self) -> (Option<&str>, &str, Option<&str>, Option<&str>) {
        (
            self.registry_str(),
            self.repository_str(),
            self.tag_str(),
            self.content_digest_str(),
        )
    }

    /// Returns the most specific available version
    ///
    /// The digest if there is one, otherwise the tag, otherwise `latest`.
    pub fn version(&self) -> ImageVersion {
        if let Some(digest) = self.content_digest() {
            ImageVersion::ContentDigest(digest)
        } else if let Some(tag) = self.tag() {
            ImageVersion::Tag(tag)
        } else {
            ImageVersion::Tag(Tag::latest())
        }
    }

    /// Parse a [prim@str] as an [ImageName]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref HAS_REGISTRY: Regex = Regex::new(concat!(
                "^",
                "(?:",
                /* */ "(?:", // a domain with at least one dot
                /* -- */ "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])",
                /* -- */ "(?:\\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))+",
                /* -- */ "(?::[0-9]+)?",
                /* */ ")",
                /* */ "|(?:", // no dots, but a port number
                /* -- */ "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])",
                /* -- */ "(?::[0-9]+)",
                /* */ ")",
                /* */ "|(?:localhost(?::[0-9]+)?)",
                ")",
                "/",
            ))
            .unwrap();
            static ref WITH_REGISTRY: Regex = Regex::new(&format!(
                "^{}/{}(?::{})?(?:@{})?$",
                Registry::regex_str(),
                Repository::regex_str(),
                Tag::regex_str(),
                ContentDigest::regex_str()
            ))
            .unwrap();
            static ref NO_REGISTRY: Regex = Regex::new(&format!(
                "^{}(?::{})?(?:@{})?$",
                Repository::regex_str(),
                Tag::regex_str(),
                ContentDigest::regex_str()
            ))
            .unwrap();
        }
        let invalid = || ImageError::InvalidReferenceFormat(s.to_owned());
        let has_registry = HAS_REGISTRY.is_match(s);
        let pattern: &Regex = if has_registry {
            &WITH_REGISTRY
        } else {
            &NO_REGISTRY
        };
        let captures = pattern.captures(s).ok_or_else(invalid)?;
        let registry_pos = if has_registry {
            Some(captures.name("reg").ok_or_else(invalid)?.range())
        } else {
            None
        };
        Ok(ImageName {
            serialized: s.to_owned(),
            registry_pos,
            repository_pos: captures.name("repo").ok_or_else(invalid)?.range(),
            tag_pos: captures.name("tag").map(|m| m.range()),
            digest_pos: captures.name("dig").map(|m| m.range()),
        })
    }

    pub fn registry_str(&self) -> Option<&str> {
        self.registry_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    pub fn repository_str(&self) -> &str {
        &self.serialized[self.repository_pos.clone()]
    }

    pub fn tag_str(&self) -> Option<&str> {
        self.tag_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    pub fn content_digest_str(&self) -> Option<&str> {
        self.digest_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    pub fn registry(&self) -> Option<Registry> {
        self.registry_str().and_then(|s| Registry::parse(s).ok())
    }

    pub fn repository(&self) -> Repository {
        // The repository pattern is a strict subset of the name pattern
        match Repository::parse(self.repository_str()) {
            Ok(repository) => repository,
            Err(_) => unreachable!("repository already validated"),
        }
    }

    pub fn tag(&self) -> Option<Tag> {
        self.tag_str().and_then(|s| Tag::parse(s).ok())
    }

    pub fn content_digest(&self) -> Option<ContentDigest> {
        self.content_digest_str()
            .and_then(|s| ContentDigest::parse(s).ok())
    }

    /// The one spelling of this reference used as a name map key
    ///
    /// Always `registry/repository` followed by either `@digest` or `:tag`.
    /// Registry aliases and the library prefix come from `defaults`, and a
    /// digest takes precedence over a tag.
    ///
    /// ```
    /// # use ripfs::image::{DefaultRegistry, ImageName};
    /// let defaults = DefaultRegistry::new();
    /// let name = ImageName::parse("busybox").unwrap();
    /// assert_eq!(name.canonical(&defaults), "index.docker.io/library/busybox:latest");
    /// ```
    pub fn canonical(&self, defaults: &DefaultRegistry) -> String {
        let (registry, repository) = defaults.canonical_parts(self);
        match self.version() {
            ImageVersion::ContentDigest(digest) => {
                format!("{}/{}@{}", registry, repository, digest)
            }
            ImageVersion::Tag(tag) => format!("{}/{}:{}", registry, repository, tag),
        }
    }
}
