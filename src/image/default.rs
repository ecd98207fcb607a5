use crate::image::{ImageName, Registry, Repository};

/// Compatibility rules for the registry used by names without one
///
/// If you don't need the additional options, you can convert a plain
/// [Registry] [Into] a [DefaultRegistry]
#[derive(Clone, Debug)]
pub struct DefaultRegistry {
    /// Connect to the registry under this name
    pub network_name: Registry,
    /// Spell the registry this way in canonical references
    pub canonical_name: Registry,
    /// This registry is also known under additional names
    pub also_known_as: Vec<Registry>,
    /// Use this prefix for repositories with only a single path component
    pub library_prefix: Option<Repository>,
}

impl From<Registry> for DefaultRegistry {
    fn from(network_name: Registry) -> Self {
        DefaultRegistry {
            canonical_name: network_name.clone(),
            network_name,
            also_known_as: vec![],
            library_prefix: None,
        }
    }
}

impl Default for DefaultRegistry {
    fn default() -> Self {
        DefaultRegistry::new()
    }
}

fn known(s: &'static str) -> Registry {
    match Registry::parse(s) {
        Ok(registry) => registry,
        Err(_) => unreachable!("built-in registry name {}", s),
    }
}

impl DefaultRegistry {
    /// Docker Hub
    pub fn new() -> Self {
        DefaultRegistry {
            network_name: known("registry-1.docker.io"),
            canonical_name: known("index.docker.io"),
            also_known_as: vec![known("docker.io"), known("index.docker.io")],
            library_prefix: Repository::parse("library").ok(),
        }
    }

    /// Returns true if the given registry is None or if it matches any of
    /// our names
    pub fn is_default(&self, registry: &Option<Registry>) -> bool {
        match registry {
            None => true,
            Some(registry) => {
                registry == &self.network_name
                    || registry == &self.canonical_name
                    || self.also_known_as.contains(registry)
            }
        }
    }

    fn complete_repository(&self, image: &ImageName) -> Repository {
        let repository = image.repository();
        if repository.segments().nth(1).is_some() {
            return repository;
        }
        match &self.library_prefix {
            None => repository,
            Some(prefix) => repository.prefixed_by(prefix),
        }
    }

    /// The actual network server and repository path for an image
    pub fn resolve_image_name(&self, image: &ImageName) -> (Registry, Repository) {
        match image.registry() {
            Some(registry) if !self.is_default(&Some(registry.clone())) => {
                (registry, image.repository())
            }
            _ => (self.network_name.clone(), self.complete_repository(image)),
        }
    }

    /// The registry and repository spelled for a canonical reference
    pub(crate) fn canonical_parts(&self, image: &ImageName) -> (Registry, Repository) {
        match image.registry() {
            Some(registry) if !self.is_default(&Some(registry.clone())) => {
                (registry, image.repository())
            }
            _ => (self.canonical_name.clone(), self.complete_repository(image)),
        }
    }
}
