//! Image references, content digests, and image sources

/// Identity, ordering, and string conversions for types that keep their
/// validated `serialized` form
macro_rules! serialized_identity {
    ($name:ident) => {
        impl Eq for $name {}

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.serialized.eq(&other.serialized)
            }
        }

        impl std::hash::Hash for $name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.serialized.hash(state);
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.serialized.cmp(&other.serialized)
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::errors::ImageError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::parse(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.serialized)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.serialized)
            }
        }
    };
}


mod default;
mod digest;
mod name;
mod registry;
mod repository;
pub mod source;
mod tag;
mod version;

pub use default::DefaultRegistry;
pub use digest::ContentDigest;
pub use name::ImageName;
pub use registry::Registry;
pub use repository::Repository;
pub use source::{ImageArchive, ImageSource, Layer, MemoryImage, OciLayout};
pub use tag::Tag;
pub use version::ImageVersion;
