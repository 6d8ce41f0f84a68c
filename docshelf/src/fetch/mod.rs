use crate::error::{DocShelfError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Brings the local working copy up to date with a remote location.
///
/// Returns the collaborator's log output. On error the working copy must be
/// left as it was before the call.
pub trait Fetcher: Send + Sync {
    fn fetch_latest(&self, remote: &str, local: &Path) -> Result<String>;
}

impl<F> Fetcher for F
where
    F: Fn(&str, &Path) -> Result<String> + Send + Sync,
{
    fn fetch_latest(&self, remote: &str, local: &Path) -> Result<String> {
        self(remote, local)
    }
}

/// Shallow git checkout: clone when there is no working copy yet, update it otherwise.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    git: PathBuf,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GitFetcher {
    pub fn new() -> Self {
        GitFetcher {
            git: PathBuf::from("git"),
        }
    }

    /// Use a specific git executable instead of the one on `PATH`.
    pub fn with_binary(git: impl Into<PathBuf>) -> Self {
        GitFetcher { git: git.into() }
    }

    fn run(&self, command: &mut Command, what: &str) -> Result<String> {
        let output = command.output().map_err(|e| {
            DocShelfError::Fetch(format!("failed to run {}: {e}", self.git.display()))
        })?;

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));
        let log = log.trim().to_string();

        if !output.status.success() {
            return Err(DocShelfError::Fetch(format!(
                "git {what} failed ({}): {log}",
                output.status
            )));
        }
        Ok(log)
    }

    /// Fetch the remote's HEAD shallowly and move the working copy onto it.
    /// A shallow fetch cuts the new commit from its parents, so it is applied
    /// with a hard reset rather than a merge.
    fn update(&self, local: &Path) -> Result<String> {
        log::info!("Fetching latest revision into {}", local.display());
        let mut log = self.run(
            Command::new(&self.git)
                .arg("-C")
                .arg(local)
                .args(["fetch", "--depth", "1", "origin", "HEAD"]),
            "fetch",
        )?;
        let reset = self.run(
            Command::new(&self.git)
                .arg("-C")
                .arg(local)
                .args(["reset", "--hard", "FETCH_HEAD"]),
            "reset",
        )?;
        if !log.is_empty() {
            log.push('\n');
        }
        log.push_str(&reset);
        Ok(log)
    }

    /// Clone into a staging directory next to `local` and move it into place,
    /// so a failed clone leaves nothing behind at `local`.
    fn clone_into(&self, remote: &str, local: &Path) -> Result<String> {
        if local.exists() {
            let is_empty_dir = local.is_dir() && fs::read_dir(local)?.next().is_none();
            if !is_empty_dir {
                return Err(DocShelfError::Fetch(format!(
                    "{} exists and is not a git working copy",
                    local.display()
                )));
            }
        }

        let parent = local
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        log::info!("Cloning {remote} into {}", local.display());
        let staging = tempfile::Builder::new()
            .prefix(".docshelf-clone-")
            .tempdir_in(parent)?;
        let checkout = staging.path().join("checkout");

        let log = self.run(
            Command::new(&self.git)
                .args(["clone", "--depth", "1", remote])
                .arg(&checkout),
            "clone",
        )?;

        if local.exists() {
            fs::remove_dir(local)?;
        }
        fs::rename(&checkout, local)?;
        Ok(log)
    }
}

impl Fetcher for GitFetcher {
    fn fetch_latest(&self, remote: &str, local: &Path) -> Result<String> {
        if local.join(".git").exists() {
            self.update(local)
        } else {
            self.clone_into(remote, local)
        }
    }
}

/// For trees that are kept up to date by something outside this process.
/// Fetching only checks that the tree is there.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl Fetcher for LocalFetcher {
    fn fetch_latest(&self, _remote: &str, local: &Path) -> Result<String> {
        if local.is_dir() {
            Ok(format!("using local tree at {}", local.display()))
        } else {
            Err(DocShelfError::Fetch(format!(
                "{} is not a directory",
                local.display()
            )))
        }
    }
}

/// The fetcher chosen from configuration.
#[derive(Debug, Clone)]
pub enum SourceFetcher {
    Git(GitFetcher),
    Local(LocalFetcher),
}

impl Fetcher for SourceFetcher {
    fn fetch_latest(&self, remote: &str, local: &Path) -> Result<String> {
        match self {
            SourceFetcher::Git(git) => git.fetch_latest(remote, local),
            SourceFetcher::Local(local_fetcher) => local_fetcher.fetch_latest(remote, local),
        }
    }
}
