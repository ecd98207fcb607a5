use crate::errors::ImageError;
use regex::Regex;

/// Name of an image repository within a registry
///
/// Path-like groupings of lowercase alphanumeric segments separated by
/// slashes. Inside a segment, components may be joined by a single period, a
/// single or double underscore, or any number of dashes.
#[derive(Clone)]
pub struct Repository {
    serialized: String,
}

serialized_identity!(Repository);

impl Repository {
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Repository]
    ///
    /// ```
    /// # use ripfs::image::Repository;
    /// let repo = Repository::parse("some/path").unwrap();
    /// assert_eq!(repo.segments().collect::<Vec<_>>(), vec!["some", "path"]);
    /// ```
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Repository::regex_str())).unwrap();
        }
        if RE.is_match(s) {
            Ok(Repository {
                serialized: s.to_owned(),
            })
        } else {
            Err(ImageError::InvalidReferenceFormat(s.to_owned()))
        }
    }

    /// Slash-separated segments of the repository path
    pub fn segments(&self) -> std::str::Split<'_, char> {
        self.serialized.split('/')
    }

    /// Prefix this path with another, forming a new repository path
    pub fn prefixed_by(&self, prefix: &Repository) -> Self {
        Repository {
            serialized: format!("{}/{}", prefix.serialized, self.serialized),
        }
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<repo>",
            /*  */ "[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*", // first segment
            /*  */ "(?:/[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*)*", // more segments
            ")"
        )
    }
}
