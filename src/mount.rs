//! Host path to guest mount point derivation.
//!
//! The guest path is a pure function of the host path, so a binding can be
//! re-derived on every invocation instead of being stored anywhere.

use std::path::{Component, Path, PathBuf};

/// Directory inside the guest under which host directories are mounted.
pub const GUEST_MOUNT_ROOT: &str = "/mnt";

/// Replaces path separators in the flattened mount directory name.
const JOIN_CHAR: char = '-';

/// Derive the guest mount point for a host path.
///
/// `/home/user/project` becomes `/mnt/home-user-project`. The root directory
/// maps to the mount root itself. Distinct host paths whose components contain
/// `-` may collide (`/a-b/c` and `/a/b-c`); no collision detection is done.
pub fn guest_mount_path(host: &Path) -> PathBuf {
    let flattened = host
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(&JOIN_CHAR.to_string());

    if flattened.is_empty() {
        PathBuf::from(GUEST_MOUNT_ROOT)
    } else {
        PathBuf::from(format!("{}/{}", GUEST_MOUNT_ROOT, flattened))
    }
}

/// A host directory shared into an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountBinding {
    pub instance: String,
    pub host_path: PathBuf,
    pub guest_path: PathBuf,
}

impl MountBinding {
    pub fn derive(instance: &str, host_path: &Path) -> Self {
        Self {
            instance: instance.to_string(),
            guest_path: guest_mount_path(host_path),
            host_path: host_path.to_path_buf(),
        }
    }

    /// `<instance>:<guest path>` as accepted by `multipass mount` and `docker cp`.
    pub fn target(&self) -> String {
        format!("{}:{}", self.instance, self.guest_path.display())
    }

    /// `<host>:<guest>` volume spec for `docker create -v`.
    pub fn volume_spec(&self) -> String {
        format!("{}:{}", self.host_path.display(), self.guest_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_absolute_path() {
        assert_eq!(
            guest_mount_path(Path::new("/home/user/project")),
            PathBuf::from("/mnt/home-user-project")
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let p = Path::new("/Users/me/code/agentvm");
        assert_eq!(guest_mount_path(p), guest_mount_path(p));
    }

    #[test]
    fn trailing_separator_is_ignored() {
        assert_eq!(
            guest_mount_path(Path::new("/srv/data/")),
            guest_mount_path(Path::new("/srv/data"))
        );
    }

    #[test]
    fn root_maps_to_mount_root() {
        assert_eq!(guest_mount_path(Path::new("/")), PathBuf::from("/mnt"));
    }

    #[test]
    fn spaces_are_preserved() {
        assert_eq!(
            guest_mount_path(Path::new("/Users/me/My Project")),
            PathBuf::from("/mnt/Users-me-My Project")
        );
    }

    #[test]
    fn separator_collision_is_accepted() {
        assert_eq!(
            guest_mount_path(Path::new("/a-b/c")),
            guest_mount_path(Path::new("/a/b-c"))
        );
    }

    #[test]
    fn binding_target_and_volume_spec() {
        let binding = MountBinding::derive("coding-agent", Path::new("/home/u/proj"));
        assert_eq!(binding.guest_path, PathBuf::from("/mnt/home-u-proj"));
        assert_eq!(binding.target(), "coding-agent:/mnt/home-u-proj");
        assert_eq!(binding.volume_spec(), "/home/u/proj:/mnt/home-u-proj");
    }
}
