//! Version and build information embedded by `build.rs`

use std::fmt;

use serde::Serialize;

/// Build information embedded at compile time
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Short git commit hash
    pub git_hash: &'static str,
    pub git_branch: &'static str,
    /// "true", "false" or "unknown" outside a git checkout
    pub git_dirty: &'static str,
    pub build_timestamp: &'static str,
    /// Target triple, e.g. x86_64-unknown-linux-gnu
    pub target: &'static str,
    pub profile: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("DASHSYNC_GIT_HASH"),
            git_branch: env!("DASHSYNC_GIT_BRANCH"),
            git_dirty: env!("DASHSYNC_GIT_DIRTY"),
            build_timestamp: env!("DASHSYNC_BUILD_TIMESTAMP"),
            target: env!("DASHSYNC_TARGET"),
            profile: env!("DASHSYNC_PROFILE"),
            rustc_version: env!("DASHSYNC_RUSTC_VERSION"),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.git_dirty == "true"
    }

    /// Version with commit, e.g. "0.1.0-abc12345" or "0.1.0-abc12345-dirty"
    pub fn full_version(&self) -> String {
        if self.is_dirty() {
            format!("{}-{}-dirty", self.version, self.git_hash)
        } else {
            format!("{}-{}", self.version, self.git_hash)
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f)?;
        writeln!(f, "  Branch:   {}", self.git_branch)?;
        writeln!(f, "  Built:    {} ({})", self.build_timestamp, self.profile)?;
        writeln!(f, "  Target:   {}", self.target)?;
        writeln!(f, "  Compiler: {}", self.rustc_version)
    }
}

/// Print version information to stdout
pub fn print_version() {
    print!("{}", BuildInfo::current());
}
