use std::io::{Cursor, Write};
use std::sync::Arc;

use gamesdk_host::platform::SDK_LIBRARY;
use gamesdk_host::stage::{MemoryResources, StageError};
use gamesdk_host::{ArchConvention, Platform, Stager, TempRegistry};

fn vendor_archive() -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    zip.add_directory("lib/x86_64/", options).unwrap();
    zip.start_file("lib/x86_64/discord_game_sdk.so", options).unwrap();
    zip.write_all(b"\x7fELF x86_64 payload").unwrap();
    zip.start_file("lib/arm/discord_game_sdk.so", options).unwrap();
    zip.write_all(b"\x7fELF arm payload").unwrap();
    zip.start_file("README.md", options).unwrap();
    zip.write_all(b"readme").unwrap();
    zip.finish().unwrap().into_inner()
}

fn stager(root: &std::path::Path) -> Stager {
    Stager::new(Arc::new(MemoryResources::new()))
        .with_registry(Arc::new(TempRegistry::new()))
        .with_temp_root(root)
}

#[test]
fn test_archive_extracts_only_matching_entry() {
    let scratch = tempfile::tempdir().unwrap();
    let stager = stager(scratch.path());
    let platform = Platform::resolve("Linux", "amd64").unwrap();
    let entry = platform.sdk_archive_entry(SDK_LIBRARY, ArchConvention::Vendor);
    assert_eq!(entry, "lib/x86_64/discord_game_sdk.so");

    let staged = stager
        .stage_from_archive(Cursor::new(vendor_archive()), &entry, "discord_game_sdk.so")
        .unwrap();

    assert_eq!(staged.file_name().unwrap(), "discord_game_sdk.so");
    assert_eq!(std::fs::read(&staged).unwrap(), b"\x7fELF x86_64 payload");
    let dir = staged.parent().unwrap();
    assert!(dir.starts_with(scratch.path()));
    assert_eq!(std::fs::read_dir(dir).unwrap().count(), 1);
    assert!(stager.registry().contains(dir));
    assert!(stager.registry().contains(&staged));
}

#[test]
fn test_archive_without_matching_entry_is_not_found() {
    let scratch = tempfile::tempdir().unwrap();
    let stager = stager(scratch.path());
    let platform = Platform::resolve("Linux", "aarch64").unwrap();
    let entry = platform.sdk_archive_entry(SDK_LIBRARY, ArchConvention::Vendor);

    let err = stager
        .stage_from_archive(Cursor::new(vendor_archive()), &entry, "discord_game_sdk.so")
        .unwrap_err();
    assert!(matches!(err, StageError::EntryNotFound(e) if e == "lib/aarch64/discord_game_sdk.so"));
    assert!(stager.registry().is_empty());
}

#[test]
fn test_normalized_arch_does_not_match_vendor_archive() {
    let scratch = tempfile::tempdir().unwrap();
    let stager = stager(scratch.path());
    let platform = Platform::resolve("Linux", "x86_64").unwrap();
    // The bundled convention would look for lib/amd64/..., which the archive lacks.
    let entry = platform.sdk_archive_entry(SDK_LIBRARY, ArchConvention::Normalized);

    let err = stager
        .stage_from_archive(Cursor::new(vendor_archive()), &entry, "discord_game_sdk.so")
        .unwrap_err();
    assert!(matches!(err, StageError::EntryNotFound(_)));
}

#[test]
fn test_not_a_zip() {
    let scratch = tempfile::tempdir().unwrap();
    let stager = stager(scratch.path());
    let err = stager
        .stage_from_archive(Cursor::new(b"plain bytes".to_vec()), "lib/x86_64/a.so", "a.so")
        .unwrap_err();
    assert!(matches!(err, StageError::Archive(_)));
}

#[test]
fn test_drain_removes_staged_artifacts() {
    let scratch = tempfile::tempdir().unwrap();
    let stager = stager(scratch.path());
    let staged = stager
        .stage_from_archive(
            Cursor::new(vendor_archive()),
            "lib/arm/discord_game_sdk.so",
            "discord_game_sdk.so",
        )
        .unwrap();
    let dir = staged.parent().unwrap().to_path_buf();

    let report = stager.registry().drain();
    assert_eq!(report.removed, 2);
    assert!(report.failed.is_empty());
    assert!(!staged.exists());
    assert!(!dir.exists());
    assert!(stager.registry().is_empty());
}
