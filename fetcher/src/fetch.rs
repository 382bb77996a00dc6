//! Release fetch orchestration.
//!
//! A fetch runs these steps against one release:
//!
//! 1. the backend confirms every file is obtainable,
//! 2. the download dataset is created when absent and the full file set is
//!    fetched into it,
//! 3. files are verified against `MANIFEST`; faulty ones are fetched once
//!    more and everything is verified again, with any second fault fatal,
//! 4. the release dataset is created and mounted,
//! 5. each archive is extracted into the release root,
//! 6. the root is patched unless disabled or the lineage patches itself.
//!
//! An existing download that still verifies causes no transfers.

use crate::dataset::{DOWNLOAD_COMPRESSION, DatasetLayout, DatasetStore};
use crate::error::Result;
use crate::extract::ArchiveExtractor;
use crate::patch::Patcher;
use crate::transport::{FileSet, ReleaseTransport};
use crate::verify::{VerifyPass, verify};
use cagefetch_common::{MenuEntry, Release, Selection, menu_entries, resolve_release};
use camino::Utf8Path;

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// The release to fetch.
    pub release: Release,
    /// Files making up the release.
    pub files: FileSet,
    /// Whether to patch after extraction.
    pub update: bool,
}

impl FetchRequest {
    /// A request for the standard file set of `release`, with patching.
    #[must_use]
    pub fn new(release: Release) -> Self {
        let files = FileSet::standard().for_lineage(release.is_hardened());
        Self {
            release,
            files,
            update: true,
        }
    }
}

/// What a fetch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Whether the download dataset was created by this run.
    pub fresh_download: bool,
    /// Files fetched a second time after failing verification.
    pub refetched: Vec<String>,
    /// Optional files the backend did not offer.
    pub dropped: Vec<String>,
    /// Archives extracted, in order.
    pub extracted: Vec<String>,
    /// Whether the patch step ran.
    pub patched: bool,
}

/// Drives one release fetch.
pub struct Fetcher<'a> {
    transport: &'a dyn ReleaseTransport,
    store: &'a dyn DatasetStore,
    layout: &'a DatasetLayout,
    extractor: &'a dyn ArchiveExtractor,
    patcher: &'a dyn Patcher,
}

impl<'a> Fetcher<'a> {
    /// Wire a fetcher from its collaborators.
    #[must_use]
    pub fn new(
        transport: &'a dyn ReleaseTransport,
        store: &'a dyn DatasetStore,
        layout: &'a DatasetLayout,
        extractor: &'a dyn ArchiveExtractor,
        patcher: &'a dyn Patcher,
    ) -> Self {
        Self {
            transport,
            store,
            layout,
            extractor,
            patcher,
        }
    }

    /// Fetch, verify, extract, and optionally patch a release.
    ///
    /// # Errors
    ///
    /// Returns the first unrecoverable error. Datasets created before the
    /// failure are left in place for the next run to repair.
    pub fn fetch(&self, request: &FetchRequest) -> Result<FetchReport> {
        let release = &request.release;
        let mut files = request.files.clone();
        let mut report = FetchReport::default();

        self.transport.preflight(release, &files)?;

        let download = self.layout.download_dir(release);
        if !self.store.exists(&download) {
            let dataset = self.layout.download_dataset(release);
            self.store
                .create(&dataset, &download, DOWNLOAD_COMPRESSION)?;
            self.store.mount(&dataset, false)?;
            report.fresh_download = true;

            log::info!("fetching {release} via {}", self.transport.name());
            let outcome = self.transport.fetch(release, files.files(), &download)?;
            files.drop_optional(&outcome.dropped);
            report.dropped.extend(outcome.dropped);
        }

        let refetch = verify(
            self.transport,
            release,
            &archives(&files),
            &download,
            VerifyPass::Initial,
        )?;
        if !refetch.is_empty() {
            let outcome = self.transport.fetch(release, &refetch, &download)?;
            files.drop_optional(&outcome.dropped);
            report.dropped.extend(outcome.dropped);
            verify(
                self.transport,
                release,
                &archives(&files),
                &download,
                VerifyPass::Recheck,
            )?;
            report.refetched = refetch;
        }

        let root = self.layout.release_root(release);
        self.ensure_release_dataset(release, &root)?;
        for archive in archives(&files) {
            self.extractor.extract(&download.join(&archive), &root)?;
            report.extracted.push(archive);
        }

        if request.update && !release.is_hardened() {
            self.patcher.patch(release, &root)?;
            report.patched = true;
        }

        log::info!("{release} fetched");
        Ok(report)
    }

    fn ensure_release_dataset(&self, release: &Release, root: &Utf8Path) -> Result<()> {
        let dataset = self.layout.release_dataset(release);
        if !self.store.exists(root) {
            self.store.create(&dataset, root, DOWNLOAD_COMPRESSION)?;
        }
        self.store.mount(&dataset, true)
    }
}

fn archives(files: &FileSet) -> Vec<String> {
    files.archives().map(str::to_owned).collect()
}

/// Reads an answer to the release menu.
#[cfg_attr(test, mockall::automock)]
pub trait ReleasePrompt {
    /// Show `menu` and return the raw answer; `default` is the host release.
    ///
    /// # Errors
    ///
    /// Returns an error if the answer cannot be read.
    fn ask(&self, menu: &[MenuEntry], default: Option<Release>) -> Result<String>;
}

/// The numbered release menu, with end-of-life releases marked.
///
/// # Errors
///
/// Returns a transport error if the backend cannot list releases.
pub fn release_menu(transport: &dyn ReleaseTransport, eol: &[Release]) -> Result<Vec<MenuEntry>> {
    let releases = transport.list_releases()?;
    Ok(menu_entries(&releases, eol))
}

/// List releases, ask which to fetch, and resolve the answer.
///
/// # Errors
///
/// Returns a transport error from listing, or a selection error when the
/// answer names nothing on the menu.
pub fn choose_release(
    transport: &dyn ReleaseTransport,
    eol: &[Release],
    host: Option<&Release>,
    prompt: &dyn ReleasePrompt,
) -> Result<Selection<Release>> {
    let menu = release_menu(transport, eol)?;
    let candidates: Vec<Release> = menu.iter().map(|entry| entry.release.clone()).collect();
    let answer = prompt.ask(&menu, host.cloned())?;
    Ok(resolve_release(&candidates, &answer, host)?)
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
