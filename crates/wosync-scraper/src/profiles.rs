//! Persistent browser profiles, one directory per identity and instance.
//!
//! Layout: `<root>/<identity_hash>/p<N>`. Instance 0 is the base profile that
//! carries the second-factor trust. Instances `N >= 1` are copies of the base
//! taken while no browser holds it open, so they inherit that trust.

use crate::error::{Result, ScrapeError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use wosync_core::IdentityHash;

/// File written into a profile once a login through it has succeeded.
pub const TRUST_MARKER: &str = ".wosync-trusted";

/// Files a running Chrome keeps in its profile. Their presence means the
/// profile is in use; they are never copied into a clone.
const LOCK_ARTIFACTS: &[&str] = &["SingletonLock", "SingletonSocket", "SingletonCookie", "lockfile"];

/// One on-disk profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    /// Owner of the profile
    pub identity_hash: IdentityHash,
    /// 0 for the base profile, the worker index otherwise
    pub instance_id: u32,
    /// Chrome user data directory
    pub storage_path: PathBuf,
    /// A login through this profile has succeeded before
    pub authenticated: bool,
}

/// Creates and clones profiles under a single root directory.
#[derive(Debug, Clone)]
pub struct ProfileManager {
    root: PathBuf,
}

impl ProfileManager {
    /// Manager for profiles under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding every identity's profiles.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for `instance_id` of the given identity.
    pub fn instance_path(&self, identity: &IdentityHash, instance_id: u32) -> PathBuf {
        self.root
            .join(identity.as_str())
            .join(format!("p{instance_id}"))
    }

    /// Whether a browser currently holds the profile at `path`.
    pub fn is_locked(path: &Path) -> bool {
        LOCK_ARTIFACTS
            .iter()
            .any(|name| path.join(name).symlink_metadata().is_ok())
    }

    /// Make sure the base profile directory exists.
    pub fn ensure_base(&self, identity: &IdentityHash) -> Result<SessionProfile> {
        let path = self.instance_path(identity, 0);
        if !path.is_dir() {
            fs::create_dir_all(&path)?;
            info!("Created base profile at {}", path.display());
        }
        Ok(self.describe(identity, 0))
    }

    /// Make sure instance `instance_id` exists, copying it from the base if not.
    ///
    /// Idempotent: an existing instance is left untouched. The copy is staged
    /// in a sibling directory and renamed into place, so a crash never leaves
    /// a half-copied profile under the final name.
    ///
    /// # Errors
    /// `BaseProfileMissing` when there is nothing to copy from, `ProfileLocked`
    /// when a browser still holds the base open.
    pub fn ensure_clone(&self, identity: &IdentityHash, instance_id: u32) -> Result<SessionProfile> {
        if instance_id == 0 {
            return self.ensure_base(identity);
        }

        let target = self.instance_path(identity, instance_id);
        if target.is_dir() {
            debug!("Profile p{} already present", instance_id);
            return Ok(self.describe(identity, instance_id));
        }

        let base = self.instance_path(identity, 0);
        if !base.is_dir() {
            return Err(ScrapeError::BaseProfileMissing(base));
        }
        if Self::is_locked(&base) {
            return Err(ScrapeError::ProfileLocked(base));
        }
        if !base.join(TRUST_MARKER).is_file() {
            warn!(
                "Cloning an untrusted base profile; p{} will need second-factor approval",
                instance_id
            );
        }

        let staging = target.with_file_name(format!(
            ".p{instance_id}.partial-{}",
            uuid::Uuid::new_v4()
        ));
        let copied = match copy_profile(&base, &staging) {
            Ok(copied) => copied,
            Err(e) => {
                discard_staging(&staging);
                return Err(e.into());
            }
        };

        if let Err(e) = fs::rename(&staging, &target) {
            discard_staging(&staging);
            // A concurrent caller finished the same clone first.
            if target.is_dir() {
                return Ok(self.describe(identity, instance_id));
            }
            return Err(e.into());
        }

        info!(
            "Cloned base profile into p{} ({} files)",
            instance_id, copied
        );
        Ok(self.describe(identity, instance_id))
    }

    /// Base for instance 0, clone otherwise.
    pub fn ensure(&self, identity: &IdentityHash, instance_id: u32) -> Result<SessionProfile> {
        if instance_id == 0 {
            self.ensure_base(identity)
        } else {
            self.ensure_clone(identity, instance_id)
        }
    }

    /// Record that a login through `profile` succeeded.
    pub fn mark_authenticated(&self, profile: &SessionProfile) -> Result<()> {
        fs::write(
            profile.storage_path.join(TRUST_MARKER),
            chrono::Utc::now().to_rfc3339(),
        )?;
        Ok(())
    }

    fn describe(&self, identity: &IdentityHash, instance_id: u32) -> SessionProfile {
        let storage_path = self.instance_path(identity, instance_id);
        let authenticated = storage_path.join(TRUST_MARKER).is_file();
        SessionProfile {
            identity_hash: identity.clone(),
            instance_id,
            storage_path,
            authenticated,
        }
    }
}

/// Remove an abandoned clone. A failure leaves a stray `.pN.partial-*`
/// directory behind, which is harmless but worth knowing about.
fn discard_staging(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(
                "Could not remove staging directory {}: {}",
                staging.display(),
                e
            );
        }
    }
}

/// Recursive copy that skips lock artifacts and symlinks. Returns files copied.
fn copy_profile(src: &Path, dst: &Path) -> io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if LOCK_ARTIFACTS.iter().any(|lock| name == *lock) {
            continue;
        }

        let file_type = entry.file_type()?;
        let from = entry.path();
        let to = dst.join(&name);
        if file_type.is_dir() {
            copied += copy_profile(&from, &to)?;
        } else if file_type.is_file() {
            fs::copy(&from, &to)?;
            copied += 1;
        } else {
            debug!("Skipping {} while cloning profile", from.display());
        }
    }

    Ok(copied)
}
