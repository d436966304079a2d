use std::rc::Rc;

use futures::FutureExt;
use futures::executor::block_on;
use glancer::error::Error;
use glancer::resources::loader::{
    AssetProvider, FileLoader, LoaderStatus, PackageFile, PackageManifest, RequestState,
};

use crate::common::test_utils::{MemoryProvider, build_utf, file, folder};

mod common;

fn file_loader(provider: MemoryProvider) -> (Rc<MemoryProvider>, FileLoader) {
    let provider = Rc::new(provider);
    let shared: Rc<dyn AssetProvider> = provider.clone();
    (provider, FileLoader::new(shared))
}

#[test]
fn completed_loads_fill_the_progress_bar() {
    let (provider, loader) =
        file_loader(MemoryProvider::new().with_file("a.txt", b"alpha".to_vec()));

    assert_eq!(loader.status(), LoaderStatus::Idle);
    let text = block_on(loader.load_text("a.txt")).unwrap();

    assert_eq!(text, "alpha");
    assert_eq!(provider.fetches("a.txt"), 1);
    assert_eq!(loader.request_state("a.txt"), Some(RequestState::Done));
    assert_eq!(loader.progress_max(), Some(1.0));
    assert_eq!(loader.progress(), 1.0);
    assert_eq!(loader.status(), LoaderStatus::Idle);
    assert_eq!(loader.status_text(), "Sequence completed!");
}

#[test]
fn pending_loads_are_counted() {
    let provider = MemoryProvider::new().with_stalled("slow.bin").with_file("fast.bin", vec![1]);
    let (_, loader) = file_loader(provider);

    let mut slow = Box::pin(loader.load("slow.bin", 3.0));
    assert!((&mut slow).now_or_never().is_none());
    assert_eq!(loader.status(), LoaderStatus::Loading);
    assert_eq!(loader.request_state("slow.bin"), Some(RequestState::Loading));
    assert_eq!(loader.progress_max(), Some(3.0));

    block_on(loader.load("fast.bin", 1.0)).unwrap();
    assert_eq!(loader.queued_count(), 2);
    assert_eq!(loader.completed_count(), 1);
    assert_eq!(loader.loading_count(), 1);
    assert_eq!(loader.progress(), 1.0);
    assert_eq!(loader.progress_max(), Some(4.0));
    assert_eq!(loader.status_text(), "Only 1 more to go\u{2026}");
    assert_eq!(loader.status(), LoaderStatus::Loading);
}

#[test]
fn abort_fails_requests_in_flight() {
    let (_, loader) = file_loader(MemoryProvider::new().with_stalled("slow.bin"));

    let mut slow = Box::pin(loader.load("slow.bin", 1.0));
    assert!((&mut slow).now_or_never().is_none());

    loader.abort("stopped by user");
    let error = block_on(slow).unwrap_err();
    assert!(error.to_string().ends_with("aborted"), "{error}");
    assert_eq!(loader.status_text(), "stopped by user");
    assert_eq!(loader.status(), LoaderStatus::Idle);
    assert_eq!(loader.queued_count(), 0);
}

#[test]
fn a_failed_load_aborts_the_queue() {
    let (_, loader) = file_loader(MemoryProvider::new().with_stalled("slow.bin"));

    let mut slow = Box::pin(loader.load("slow.bin", 1.0));
    assert!((&mut slow).now_or_never().is_none());

    assert!(block_on(loader.load("missing.bin", 1.0)).is_err());
    assert!(loader.status_text().starts_with("missing.bin: "));
    assert!(block_on(slow).is_err());
}

#[test]
fn containers_keep_their_file_name() {
    let bytes = build_utf(vec![folder("Data", vec![file("x", vec![1])])]);
    let provider = MemoryProvider::new()
        .with_file("ships/ship.cmp", bytes)
        .with_file("bad.cmp", vec![0; 8]);
    let (_, loader) = file_loader(provider);

    let reader = block_on(loader.load_utf("ships/ship.cmp", 1.0)).unwrap();
    assert_eq!(reader.filename(), Some("ships/ship.cmp"));

    let error = block_on(loader.load_utf("bad.cmp", 1.0)).unwrap_err();
    assert!(matches!(error.downcast_ref::<Error>(), Some(Error::Range(_))), "{error:#}");
}

fn manifest(sizes: &[(&str, usize)]) -> PackageManifest {
    PackageManifest {
        url: "bundle.pkg".to_string(),
        files: sizes
            .iter()
            .map(|&(name, size)| PackageFile {
                name: name.to_string(),
                size,
            })
            .collect(),
    }
}

#[test]
fn packages_split_by_manifest() {
    let (_, loader) =
        file_loader(MemoryProvider::new().with_file("bundle.pkg", b"abcdefg".to_vec()));

    let manifest = manifest(&[("one", 2), ("two", 0), ("three", 5)]);
    let files = block_on(loader.load_package(&manifest)).unwrap();
    assert_eq!(files["one"], b"ab");
    assert!(files["two"].is_empty());
    assert_eq!(files["three"], b"cdefg");
    assert_eq!(loader.progress_max(), Some(7.0));
}

#[test]
fn short_packages_are_range_errors() {
    let (_, loader) = file_loader(MemoryProvider::new().with_file("bundle.pkg", b"abc".to_vec()));

    let error = block_on(loader.load_package(&manifest(&[("one", 2), ("two", 2)]))).unwrap_err();
    assert!(matches!(error.downcast_ref::<Error>(), Some(Error::Range(_))));
}
