//! Library version tracking and updates for Grimoire.
//!
//! A library is a versioned collection of data files published as GitHub
//! releases. This crate provides:
//! - The three-component [`Version`] used by library releases.
//! - Release discovery against a [`ReleaseSource`] (GitHub by default).
//! - The [`Library`] entity with its background upgrade check and download.
//! - The [`Libraries`] registry with concurrent batch update checks.

pub mod archive;
mod library;
mod natural;
mod registry;
mod release;
mod version;

#[cfg(test)]
mod test_support;

/// Library entity, its error type, upgrade policy, and built-in identities.
pub use library::{
    Library, LibraryError, MASTER_ACCOUNT, MASTER_REPO, MASTER_TITLE, USER_REPO, USER_TITLE,
    UpgradePolicy, library_key,
};
/// Human-friendly string ordering used for library listings.
pub use natural::natural_cmp;
/// Registry of every known library.
pub use registry::{Libraries, RegistryError};
/// Release model, GitHub client, and release discovery.
pub use release::{
    GitHubClient, GitHubRelease, LOCAL_ONLY_ACCOUNT, Release, ReleaseError, ReleaseSource,
    UpdateStatus, load_releases,
};
/// Library version value.
pub use version::{Version, VersionParseError};
