use std::fmt::Write as _;
use std::path::Path;

use grimoire_core::{
    Libraries, Library, LibraryError, RegistryError, Release, ReleaseSource, UpdateStatus,
    UpgradePolicy, Version, load_releases,
};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::cli::Command;
use crate::error::AppError;
use crate::http;
use crate::settings::AppSettings;

pub async fn run(command: Command, settings: &mut AppSettings) -> Result<(), AppError> {
    match command {
        Command::List => {
            print!("{}", render_list(&settings.libraries));
            Ok(())
        }
        Command::Check => check(settings).await,
        Command::Download { key, version } => download(settings, &key, version).await,
        Command::SetPath { key, path } => {
            let library = set_library_path(&mut settings.libraries, &key, &path)?;
            println!("{key} now lives in {}", library.path().display());
            save(settings)
        }
        Command::Add {
            account,
            repo,
            title,
            path,
        } => {
            let key = add_library(&mut settings.libraries, &title, &account, &repo, &path)?;
            println!("Registered {title} as {key}");
            save(settings)
        }
        Command::Remove { key } => {
            let removed = settings.libraries.remove(&key)?;
            println!(
                "Removed {} ({key}); files in {} were kept",
                removed.title(),
                removed.path().display()
            );
            save(settings)
        }
    }
}

fn save(settings: &AppSettings) -> Result<(), AppError> {
    settings.save().map_err(AppError::SaveSettings)
}

fn not_found(key: &str) -> RegistryError {
    RegistryError::NotFound {
        key: key.to_string(),
    }
}

async fn check(settings: &AppSettings) -> Result<(), AppError> {
    let source = http::github_client(settings.http_timeout(), settings.github_api_base.as_deref())
        .map_err(AppError::HttpClient)?;
    let cancel = CancellationToken::new();

    settings
        .libraries
        .perform_update_checks(
            &source,
            &settings.policy(),
            settings.update_check_timeout(),
            &cancel,
        )
        .await;

    print!("{}", render_summary(&settings.libraries));
    Ok(())
}

async fn download(
    settings: &mut AppSettings,
    key: &str,
    version: Option<Version>,
) -> Result<(), AppError> {
    let api_base = settings.github_api_base.as_deref();
    let checker =
        http::github_client(settings.http_timeout(), api_base).map_err(AppError::HttpClient)?;
    let fetcher =
        http::github_client(settings.download_timeout(), api_base).map_err(AppError::HttpClient)?;
    let policy = settings.policy();
    let cancel = CancellationToken::new();

    let library = settings.libraries.get(key).ok_or_else(|| not_found(key))?;
    let Some(release) = resolve_release(library, &checker, &policy, version, &cancel).await? else {
        println!("{} ({key}) is already up to date", library.title());
        return Ok(());
    };
    library.download(&fetcher, &release, &cancel).await?;

    println!(
        "Installed {} v{} into {}",
        library.title(),
        release.version,
        library.path().display()
    );
    if !release.notes.trim().is_empty() {
        println!("\n{}", release.notes.trim());
    }

    if let Some(library) = settings.libraries.get_mut(key) {
        library.mark_seen();
    }
    save(settings)
}

/// Pick the release to install: the named `version` if given, otherwise
/// whatever an update check offers. `None` means nothing newer exists.
async fn resolve_release(
    library: &Library,
    source: &dyn ReleaseSource,
    policy: &UpgradePolicy,
    version: Option<Version>,
    cancel: &CancellationToken,
) -> Result<Option<Release>, AppError> {
    let key = library.key();
    if library.is_user() {
        return Err(AppError::LocalOnly { key });
    }

    if let Some(wanted) = version {
        info!("Looking up {key} v{wanted}");
        let releases = load_releases(
            source,
            library.account(),
            library.repo(),
            Version::ZERO,
            cancel,
            |_, _| false,
        )
        .await?;
        return releases
            .into_iter()
            .find(|release| release.version == wanted)
            .map(Some)
            .ok_or(AppError::NoSuchRelease {
                key,
                version: wanted,
            });
    }

    library
        .check_for_available_upgrade(source, policy, cancel)
        .await;
    match library.available_update() {
        Some(release) if release.has_update() => Ok(Some(release)),
        Some(release) if release.check_failed => Err(AppError::CheckFailed { key }),
        _ => Ok(None),
    }
}

fn set_library_path<'a>(
    libraries: &'a mut Libraries,
    key: &str,
    path: &Path,
) -> Result<&'a Library, AppError> {
    let library = libraries.get_mut(key).ok_or_else(|| not_found(key))?;
    library.set_path(path)?;
    Ok(library)
}

fn add_library(
    libraries: &mut Libraries,
    title: &str,
    account: &str,
    repo: &str,
    path: &Path,
) -> Result<String, AppError> {
    if path.as_os_str().is_empty() {
        return Err(LibraryError::EmptyPath.into());
    }
    let mut library = Library::new(title.trim(), account.trim(), repo.trim(), path);
    library.set_path(path)?;
    let key = library.key();
    libraries.insert(library)?;
    Ok(key)
}

fn describe_version(version: Version) -> String {
    if version.is_zero() {
        "not installed".to_string()
    } else {
        format!("v{version}")
    }
}

fn render_list(libraries: &Libraries) -> String {
    let mut out = String::new();
    for library in libraries.list() {
        let _ = writeln!(out, "{} ({})", library.title(), library.key());
        let _ = writeln!(out, "    path:      {}", library.path().display());
        let _ = writeln!(
            out,
            "    on disk:   {}",
            describe_version(library.version_on_disk())
        );
        let _ = writeln!(
            out,
            "    last seen: {}",
            describe_version(library.last_seen())
        );
    }
    out
}

fn render_summary(libraries: &Libraries) -> String {
    let mut out = String::new();
    let mut any_available = false;
    for (key, title, status) in libraries.update_summary() {
        any_available |= matches!(status, UpdateStatus::Available(_));
        let _ = writeln!(out, "{title} ({key}): {status}");
    }
    if any_available {
        out.push_str("\nRun `grimoire download <key>` to install an update.\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use grimoire_core::{
        GitHubRelease, Libraries, Library, ReleaseError, ReleaseSource, UpgradePolicy, Version,
    };
    use tokio_util::sync::CancellationToken;

    use super::{add_library, render_list, render_summary, resolve_release, set_library_path};
    use crate::error::AppError;

    struct StaticSource {
        releases: Result<Vec<GitHubRelease>, u16>,
        requested: Mutex<Vec<String>>,
    }

    impl StaticSource {
        fn new(tags: &[&str]) -> Self {
            Self {
                releases: Ok(tags
                    .iter()
                    .map(|tag| GitHubRelease {
                        tag_name: (*tag).to_string(),
                        body: Some(format!("notes for {tag}")),
                        zipball_url: format!("https://example.invalid/{tag}.zip"),
                    })
                    .collect()),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                releases: Err(status),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().expect("lock should not be poisoned").clone()
        }
    }

    #[async_trait]
    impl ReleaseSource for StaticSource {
        async fn list_releases(
            &self,
            account: &str,
            repo: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<GitHubRelease>, ReleaseError> {
            self.requested
                .lock()
                .expect("lock should not be poisoned")
                .push(format!("{account}/{repo}"));
            match &self.releases {
                Ok(releases) => Ok(releases.clone()),
                Err(status) => Err(ReleaseError::HttpStatus {
                    url: format!("https://example.invalid/{account}/{repo}"),
                    status: reqwest::StatusCode::from_u16(*status)
                        .expect("test status should be valid"),
                    body_snippet: String::new(),
                }),
            }
        }

        async fn fetch_archive(
            &self,
            url: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<u8>, ReleaseError> {
            Err(ReleaseError::HttpStatus {
                url: url.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
                body_snippet: String::new(),
            })
        }
    }

    fn extras(root: &std::path::Path) -> Library {
        Library::new("Extras", "alice", "extras", root.join("Extras"))
    }

    #[tokio::test]
    async fn resolve_release_offers_combined_upgrade() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let library = extras(temp.path());
        let source = StaticSource::new(&["v4.1", "v5.0", "v3.9"]);

        let release = resolve_release(
            &library,
            &source,
            &UpgradePolicy::default(),
            None,
            &CancellationToken::new(),
        )
        .await
        .expect("check should succeed")
        .expect("an upgrade should be offered");

        assert_eq!(release.version, Version::new(5, 0, 0));
        assert!(release.notes.contains("## Version 4.1"));
        assert!(!release.notes.contains("v3.9"));
        assert_eq!(source.requested(), vec!["alice/extras".to_string()]);
    }

    #[tokio::test]
    async fn resolve_release_reports_nothing_when_up_to_date() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let library = extras(temp.path());
        let source = StaticSource::new(&[]);

        let release = resolve_release(
            &library,
            &source,
            &UpgradePolicy::default(),
            None,
            &CancellationToken::new(),
        )
        .await
        .expect("check should succeed");

        assert!(release.is_none());
    }

    #[tokio::test]
    async fn resolve_release_surfaces_failed_checks() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let library = extras(temp.path());
        let source = StaticSource::failing(502);

        let result = resolve_release(
            &library,
            &source,
            &UpgradePolicy::default(),
            None,
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(AppError::CheckFailed { .. })));
    }

    #[tokio::test]
    async fn resolve_release_finds_a_named_version_outside_the_policy() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let library = extras(temp.path());
        let source = StaticSource::new(&["v3.2", "v5.0"]);

        let release = resolve_release(
            &library,
            &source,
            &UpgradePolicy::default(),
            Some(Version::new(3, 2, 0)),
            &CancellationToken::new(),
        )
        .await
        .expect("lookup should succeed")
        .expect("named release should be found");

        assert_eq!(release.version, Version::new(3, 2, 0));
        assert_eq!(release.notes, "notes for v3.2");
    }

    #[tokio::test]
    async fn resolve_release_rejects_unknown_named_version() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let library = extras(temp.path());
        let source = StaticSource::new(&["v5.0"]);

        let result = resolve_release(
            &library,
            &source,
            &UpgradePolicy::default(),
            Some(Version::new(9, 9, 0)),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            result,
            Err(AppError::NoSuchRelease { version, .. }) if version == Version::new(9, 9, 0)
        ));
    }

    #[tokio::test]
    async fn resolve_release_refuses_the_local_user_library() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let library = Library::user(temp.path());
        let source = StaticSource::new(&["v5.0"]);

        let result = resolve_release(
            &library,
            &source,
            &UpgradePolicy::default(),
            None,
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(AppError::LocalOnly { .. })));
        assert!(source.requested().is_empty());
    }

    #[test]
    fn add_library_registers_an_absolute_path() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let mut libraries = Libraries::new(temp.path());

        let key = add_library(
            &mut libraries,
            " Extras ",
            "alice",
            "extras",
            &temp.path().join("Extras"),
        )
        .expect("library should be added");

        assert_eq!(key, "alice/extras");
        let library = libraries.get(&key).expect("library should be registered");
        assert_eq!(library.title(), "Extras");
        assert!(library.path().is_absolute());
        assert!(matches!(
            add_library(&mut libraries, "Again", "alice", "extras", temp.path()),
            Err(AppError::Registry(_))
        ));
    }

    #[test]
    fn add_library_rejects_empty_path() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let mut libraries = Libraries::new(temp.path());

        let result = add_library(
            &mut libraries,
            "Extras",
            "alice",
            "extras",
            std::path::Path::new(""),
        );

        assert!(matches!(result, Err(AppError::Library(_))));
        assert_eq!(libraries.len(), 2);
    }

    #[test]
    fn set_library_path_moves_known_libraries_only() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let mut libraries = Libraries::new(temp.path());
        let target = temp.path().join("Elsewhere");

        let moved = set_library_path(&mut libraries, "richardwilkes/gcs_master_library", &target)
            .expect("master library should move");
        assert_eq!(moved.path(), target);

        assert!(matches!(
            set_library_path(&mut libraries, "nobody/nothing", &target),
            Err(AppError::Registry(_))
        ));
    }

    #[test]
    fn list_shows_user_library_first_and_install_state() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let libraries = Libraries::new(temp.path());

        let listing = render_list(&libraries);

        let user_at = listing
            .find("User Library (*/gcs_user_library)")
            .expect("user library should be listed");
        let master_at = listing
            .find("Master Library (richardwilkes/gcs_master_library)")
            .expect("master library should be listed");
        assert!(user_at < master_at);
        assert!(listing.contains("on disk:   not installed"));
    }

    #[tokio::test]
    async fn summary_reports_each_state_and_download_hint() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let libraries = Libraries::from_entries(vec![extras(temp.path())], temp.path());
        let source = StaticSource::new(&["v5.0"]);

        libraries
            .perform_update_checks(
                &source,
                &UpgradePolicy::default(),
                std::time::Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await;
        let summary = render_summary(&libraries);

        assert!(summary.contains("User Library (*/gcs_user_library): up to date"));
        assert!(summary.contains("Extras (alice/extras): update available to v5.0"));
        assert!(summary.contains("grimoire download"));
    }
}
