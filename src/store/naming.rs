//! Key naming for artifact storage.
//!
//! ```text
//! {prefix}/{name}
//! ```
//!
//! The prefix namespaces this service's objects inside a shared bucket. The
//! name becomes a single path part, so it is percent-encoded by
//! `object_store` if it carries characters the backend cannot store as-is.

use object_store::path::{Path, PathPart};

use crate::domain::ArtifactName;

#[derive(Debug, Clone)]
pub struct KeyBuilder {
    base: Path,
}

impl KeyBuilder {
    /// Create a key builder rooted at `prefix`. Leading, trailing and repeated
    /// slashes are ignored.
    pub fn new(prefix: &str) -> Self {
        let base = prefix
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(Path::default(), |path, segment| {
                path.child(PathPart::from(segment))
            });
        Self { base }
    }

    pub fn artifact_key(&self, name: &ArtifactName) -> Path {
        self.base.child(PathPart::from(name.as_str()))
    }

    pub fn prefix(&self) -> &Path {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> ArtifactName {
        ArtifactName::parse(raw).expect("valid name")
    }

    #[test]
    fn empty_prefix_places_names_at_root() {
        let keys = KeyBuilder::new("");
        assert_eq!(keys.artifact_key(&name("greet")).as_ref(), "greet");
    }

    #[test]
    fn prefix_is_normalized() {
        let keys = KeyBuilder::new("/tenants//templates/");
        assert_eq!(keys.prefix().as_ref(), "tenants/templates");
        assert_eq!(
            keys.artifact_key(&name("greet")).as_ref(),
            "tenants/templates/greet"
        );
    }

    #[test]
    fn names_stay_a_single_part() {
        let keys = KeyBuilder::new("tpl");
        let key = keys.artifact_key(&name("a b"));
        assert_eq!(key.parts().count(), 2);
        assert!(key.as_ref().starts_with("tpl/"));
    }
}
