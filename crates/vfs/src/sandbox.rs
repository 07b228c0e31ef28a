use std::path::{Path, PathBuf};

use sfap_protocol::AccessResult;

use crate::error::{Result, SandboxError};
use crate::path_util::{remove_ending_slash, strip_virtual_root, weakly_canonical};

/// Joins a virtual-absolute base (e.g. `/` or `/etc`) with a relative
/// remainder, without producing a doubled `/` when `base` is the bare root.
fn virtual_join(base: &str, rest: &str) -> String {
    let base = base.trim_end_matches('/');
    if rest.is_empty() {
        return format!("{base}/");
    }
    format!("{base}/{rest}")
}

/// A path-rewriting sandbox rooted at a host directory.
///
/// Holds `root` as a canonical host path, and `home`/`cwd` as their virtual
/// projections (strings rooted at `/`, with `~` resolving to `home`). This
/// mirrors the original implementation, which stores the same two fields as
/// virtual strings and recomputes the host path on demand through
/// [`Sandbox::to_system`] — there is no separate cached host-side `home`/
/// `cwd`, since it is fully determined by `root` plus the virtual value.
pub struct Sandbox {
    root: PathBuf,
    home: String,
    cwd: String,
}

impl Sandbox {
    /// Builds a sandbox rooted at `root`.
    ///
    /// # Errors
    /// Returns [`SandboxError::InvalidRoot`] if `root` is not an absolute,
    /// existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();

        if !root.is_absolute() || !root.is_dir() {
            return Err(SandboxError::InvalidRoot(root.to_path_buf()));
        }

        let root = weakly_canonical(root)?;

        Ok(Self {
            root,
            home: "/".to_string(),
            cwd: "/".to_string(),
        })
    }

    /// The canonical host path the sandbox is rooted at.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The current virtual home directory (`/` until set by the auth
    /// middleware).
    #[must_use]
    pub fn home(&self) -> &str {
        &self.home
    }

    /// The current virtual working directory.
    #[must_use]
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Checks whether `host_path` stays within `root`, without requiring it
    /// to exist.
    ///
    /// Containment is decided purely on canonical path components: every
    /// component of `root` must be a prefix of `host_path`'s canonical
    /// components. Symlinks are resolved by canonicalization before the
    /// comparison, so a symlink target outside `root` cannot be used to
    /// escape the sandbox.
    ///
    /// # Errors
    /// Propagates I/O failures from canonicalizing `host_path`.
    pub fn check_access(&self, host_path: &Path) -> Result<AccessResult> {
        let canonical = weakly_canonical(host_path)?;

        let mut root_components = self.root.components();
        let mut path_components = canonical.components();

        loop {
            match (root_components.next(), path_components.next()) {
                (Some(r), Some(p)) if r == p => {}
                (Some(_), _) => return Ok(AccessResult::OutsideRoot),
                (None, _) => return Ok(AccessResult::Ok),
            }
        }
    }

    /// Translates a virtual path into its host path, per the `~`/`/`/
    /// relative rules.
    ///
    /// # Errors
    /// Propagates I/O failures from canonicalization.
    pub fn to_system(&self, virtual_path: &str) -> Result<PathBuf> {
        let buffer = if let Some(remainder) = virtual_path.strip_prefix('~') {
            virtual_join(&self.home, strip_virtual_root(remainder))
        } else if virtual_path.starts_with('/') {
            virtual_path.to_string()
        } else {
            virtual_join(&self.cwd, virtual_path)
        };

        let buffer = remove_ending_slash(&buffer);
        let relative = strip_virtual_root(buffer);

        weakly_canonical(&self.root.join(relative)).map_err(Into::into)
    }

    /// Translates a host path into its virtual projection.
    ///
    /// # Errors
    /// Returns [`SandboxError::OutsideRoot`]/[`SandboxError::AccessDenied`]
    /// if `host_path` is not inside `root`, or propagates I/O failures.
    pub fn to_virtual(&self, host_path: &Path) -> Result<String> {
        match self.check_access(host_path)? {
            AccessResult::Ok => {}
            AccessResult::OutsideRoot => return Err(SandboxError::OutsideRoot),
            _ => return Err(SandboxError::AccessDenied),
        }

        let canonical = weakly_canonical(host_path)?;

        if canonical == self.root {
            return Ok("/".to_string());
        }

        let relative = canonical
            .strip_prefix(&self.root)
            .map_err(|_| SandboxError::OutsideRoot)?;

        let relative = relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
        let relative = remove_ending_slash(&relative);

        Ok(format!("/{relative}"))
    }

    /// Same as [`Sandbox::to_virtual`], but reports failure as `None`
    /// instead of an error — used where the caller only needs a best-effort
    /// projection (e.g. `LS` entries).
    #[must_use]
    pub fn try_to_virtual(&self, host_path: &Path) -> Option<String> {
        self.to_virtual(host_path).ok()
    }

    /// `to_virtual(to_system(path))` — resolves a virtual path (possibly
    /// with `~` or relative components) to its normalized absolute virtual
    /// form.
    ///
    /// # Errors
    /// Propagates any [`SandboxError`] from either step.
    pub fn normalize(&self, virtual_path: &str) -> Result<String> {
        self.to_virtual(&self.to_system(virtual_path)?)
    }

    /// Same as [`Sandbox::normalize`], but reports failure as `None`.
    #[must_use]
    pub fn try_normalize(&self, virtual_path: &str) -> Option<String> {
        self.normalize(virtual_path).ok()
    }

    /// Changes the current working directory, resolving through
    /// [`Sandbox::normalize`]. Any translation error surfaces as
    /// [`AccessResult::AccessDenied`], never a raw filesystem error.
    pub fn cd(&mut self, virtual_path: &str) -> AccessResult {
        match self.normalize(virtual_path) {
            Ok(normalized) => {
                self.cwd = normalized;
                AccessResult::Ok
            }
            Err(_) => AccessResult::AccessDenied,
        }
    }

    /// Sets the home directory, resolving through [`Sandbox::normalize`].
    pub fn set_home(&mut self, virtual_path: &str) -> AccessResult {
        match self.normalize(virtual_path) {
            Ok(normalized) => {
                self.home = normalized;
                AccessResult::Ok
            }
            Err(_) => AccessResult::AccessDenied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn new_rejects_relative_root() {
        assert!(Sandbox::new("relative/path").is_err());
    }

    #[test]
    fn fresh_sandbox_has_root_home_and_cwd_at_virtual_slash() {
        let dir = tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();

        assert_eq!(sandbox.home(), "/");
        assert_eq!(sandbox.cwd(), "/");
    }

    #[test]
    fn to_system_resolves_absolute_relative_and_tilde() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("etc")).unwrap();
        let mut sandbox = Sandbox::new(dir.path()).unwrap();

        assert_eq!(sandbox.to_system("/etc").unwrap(), sandbox.root().join("etc"));

        assert_eq!(sandbox.cd("/etc"), AccessResult::Ok);
        assert_eq!(sandbox.cwd(), "/etc");
        assert_eq!(sandbox.to_system("x").unwrap(), sandbox.root().join("etc/x"));

        assert_eq!(sandbox.to_system("~").unwrap(), sandbox.root());
    }

    #[test]
    fn cd_escaping_root_is_denied_and_cwd_unchanged() {
        let dir = tempdir().unwrap();
        let mut sandbox = Sandbox::new(dir.path()).unwrap();

        let result = sandbox.cd("../../..");

        assert_eq!(result, AccessResult::AccessDenied);
        assert_eq!(sandbox.cwd(), "/");
    }

    #[test]
    fn to_system_then_to_virtual_round_trips_for_in_root_paths() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();

        let host = sandbox.to_system("/sub").unwrap();
        assert_eq!(sandbox.check_access(&host).unwrap(), AccessResult::Ok);
        assert_eq!(sandbox.to_virtual(&host).unwrap(), "/sub");
    }

    #[test]
    fn check_access_rejects_path_outside_root() {
        let dir = tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();

        assert_eq!(
            sandbox.check_access(Path::new("/definitely/not/the/root")).unwrap(),
            AccessResult::OutsideRoot
        );
    }
}
