//! Confinement of script-supplied paths to a root directory.
//!
//! Scripts address files with absolute virtual paths such as `/etc/app.conf`.
//! The [`Resolver`] normalises the virtual path, runs the host's
//! authorisation predicates against it, and joins it onto the root. Any
//! symlink met along the way is followed only when its target, read relative
//! to the directory holding the link, is itself inside the root; the target
//! is then resolved again as a fresh virtual path with the same checks.

use std::fmt;
use std::fs;
use std::ops::BitOr;
use std::path::{Component, Path, PathBuf};

use corral_script::{ConfinementKind, HostError, ScriptError};
use tracing::warn;

const RESOLVE_TARGET: &str = "corral_content::resolve";

/// Symlinks followed before a resolution is declared a loop.
pub const MAX_SYMLINK_HOPS: usize = 40;

/// Host predicate consulted with the normalised virtual path.
pub type PathCheck = Box<dyn Fn(&str) -> Result<(), HostError>>;

/// Which authorisation predicates apply to a resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Check(u8);

impl Check {
    /// No predicate runs.
    pub const NONE: Self = Self(0);
    /// The read predicate runs.
    pub const READ: Self = Self(1);
    /// The write predicate runs.
    pub const WRITE: Self = Self(1 << 1);

    /// Returns `true` when `flag` is set.
    #[must_use]
    pub const fn includes(self, flag: Self) -> bool {
        self.0 & flag.0 != 0
    }
}

impl BitOr for Check {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Normalises an absolute virtual path.
///
/// `.` components and repeated separators are dropped and `..` removes the
/// preceding component. A trailing separator survives so directory-style
/// paths stay distinguishable, except for `/` itself.
///
/// # Errors
///
/// Returns [`ScriptError::Usage`] for relative paths and
/// [`ScriptError::Confinement`] when a `..` would climb above `/`.
pub fn normalise(path: &str) -> Result<String, ScriptError> {
    if !path.starts_with('/') {
        return Err(ScriptError::usage(format!(
            "content path must be absolute, got: {path}"
        )));
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(confinement(path, ConfinementKind::Path));
                }
            }
            name => parts.push(name),
        }
    }
    let mut normalised = String::with_capacity(path.len());
    for part in &parts {
        normalised.push('/');
        normalised.push_str(part);
    }
    if normalised.is_empty() || path.ends_with('/') {
        normalised.push('/');
    }
    Ok(normalised)
}

fn confinement(path: &str, kind: ConfinementKind) -> ScriptError {
    warn!(target: RESOLVE_TARGET, path, %kind, "content path rejected");
    ScriptError::Confinement {
        path: path.to_owned(),
        kind,
    }
}

/// Maps virtual paths onto a root directory.
pub struct Resolver {
    root: PathBuf,
    read_check: Option<PathCheck>,
    write_check: Option<PathCheck>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("root", &self.root)
            .field("read_check", &self.read_check.is_some())
            .field("write_check", &self.write_check.is_some())
            .finish()
    }
}

impl Resolver {
    /// Resolver confined to `root`, with no predicates.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_check: None,
            write_check: None,
        }
    }

    /// Installs the predicate consulted for [`Check::READ`].
    #[must_use]
    pub fn with_read_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&str) -> Result<(), HostError> + 'static,
    {
        self.read_check = Some(Box::new(check));
        self
    }

    /// Installs the predicate consulted for [`Check::WRITE`].
    #[must_use]
    pub fn with_write_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&str) -> Result<(), HostError> + 'static,
    {
        self.write_check = Some(Box::new(check));
        self
    }

    /// Confinement root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` to a real path inside the root.
    ///
    /// # Errors
    ///
    /// - [`ScriptError::Internal`] when the root is relative.
    /// - [`ScriptError::Usage`] when `path` is relative.
    /// - [`ScriptError::Host`] when a predicate refuses the path.
    /// - [`ScriptError::Confinement`] when the path or a symlink on it leaves
    ///   the root, or the symlink chain is too long.
    pub fn resolve(&self, path: &str, checks: Check) -> Result<PathBuf, ScriptError> {
        if !self.root.is_absolute() {
            return Err(ScriptError::Internal {
                message: format!(
                    "content defined with relative root: {}",
                    self.root.display()
                ),
            });
        }
        self.resolve_hop(path, path, checks, 0)
    }

    fn resolve_hop(
        &self,
        requested: &str,
        path: &str,
        checks: Check,
        hops: usize,
    ) -> Result<PathBuf, ScriptError> {
        let normalised = normalise(path)?;
        self.authorise(&normalised, checks)?;
        let relative = normalised.trim_start_matches('/');
        let real = self.root.join(relative);
        if !real.starts_with(&self.root) {
            return Err(confinement(requested, ConfinementKind::Path));
        }
        let parts: Vec<&str> = relative.split('/').filter(|part| !part.is_empty()).collect();
        let mut prefix = self.root.clone();
        for (position, part) in parts.iter().enumerate() {
            prefix.push(part);
            let Ok(metadata) = fs::symlink_metadata(&prefix) else {
                break;
            };
            if !metadata.file_type().is_symlink() {
                continue;
            }
            if hops >= MAX_SYMLINK_HOPS {
                return Err(confinement(requested, ConfinementKind::SymlinkLoop));
            }
            let remainder = parts.get(position + 1..).unwrap_or_default();
            let redirected = self.follow_link(requested, &prefix, remainder, &normalised)?;
            return self.resolve_hop(requested, &redirected, checks, hops + 1);
        }
        Ok(real)
    }

    fn authorise(&self, normalised: &str, checks: Check) -> Result<(), ScriptError> {
        if checks.includes(Check::READ) {
            if let Some(check) = &self.read_check {
                check(normalised).map_err(ScriptError::host)?;
            }
        }
        if checks.includes(Check::WRITE) {
            if let Some(check) = &self.write_check {
                check(normalised).map_err(ScriptError::host)?;
            }
        }
        Ok(())
    }

    /// Rewrites the virtual path so that the link at `link` is replaced by
    /// its target, keeping the components that followed it.
    fn follow_link(
        &self,
        requested: &str,
        link: &Path,
        remainder: &[&str],
        normalised: &str,
    ) -> Result<String, ScriptError> {
        let target = fs::read_link(link).map_err(|error| ScriptError::io(requested, error))?;
        let base = link.parent().unwrap_or(&self.root);
        let absolute = lexical_clean(&base.join(target));
        let Ok(inside) = absolute.strip_prefix(&self.root) else {
            return Err(confinement(requested, ConfinementKind::Symlink));
        };
        let mut redirected = String::from("/");
        for component in inside.components() {
            let Component::Normal(name) = component else {
                return Err(confinement(requested, ConfinementKind::Symlink));
            };
            let Some(name) = name.to_str() else {
                return Err(confinement(requested, ConfinementKind::Symlink));
            };
            if !redirected.ends_with('/') {
                redirected.push('/');
            }
            redirected.push_str(name);
        }
        for part in remainder {
            if !redirected.ends_with('/') {
                redirected.push('/');
            }
            redirected.push_str(part);
        }
        if normalised.ends_with('/') && !redirected.ends_with('/') {
            redirected.push('/');
        }
        Ok(redirected)
    }
}

/// Collapses `.` and `..` without consulting the filesystem.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("/", "/")]
    #[case("/a/b", "/a/b")]
    #[case("/a//b/./c", "/a/b/c")]
    #[case("/a/b/", "/a/b/")]
    #[case("/a/b/..", "/a")]
    #[case("/a/b/../", "/a/")]
    #[case("/a/..", "/")]
    #[case("/a/../", "/")]
    #[case("/.", "/")]
    fn normalises_virtual_paths(#[case] input: &str, #[case] expected: &str) {
        let normalised = normalise(input).expect("normalise");
        assert_eq!(normalised, expected);
        assert_eq!(normalise(&normalised).expect("idempotent"), normalised);
    }

    #[rstest]
    #[case("/..")]
    #[case("/../../etc/passwd")]
    #[case("/a/../../b")]
    fn climbing_above_the_root_is_confinement(#[case] input: &str) {
        assert!(matches!(
            normalise(input),
            Err(ScriptError::Confinement {
                kind: ConfinementKind::Path,
                ..
            })
        ));
    }

    #[rstest]
    #[case("")]
    #[case("a/b")]
    #[case("./a")]
    fn relative_paths_are_usage_errors(#[case] input: &str) {
        assert!(matches!(normalise(input), Err(ScriptError::Usage { .. })));
    }

    #[test]
    fn check_flags_combine() {
        let both = Check::READ | Check::WRITE;
        assert!(both.includes(Check::READ));
        assert!(both.includes(Check::WRITE));
        assert!(!Check::READ.includes(Check::WRITE));
        assert!(!Check::NONE.includes(Check::READ));
    }

    #[test]
    fn lexical_clean_drops_dot_components() {
        assert_eq!(
            lexical_clean(Path::new("/root/a/./b/../c")),
            PathBuf::from("/root/a/c")
        );
    }
}
