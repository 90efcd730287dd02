//! Helpers for building collection descriptors.

use super::{CollectionDescriptor, CollectionEntry};
use crate::{ResourceHandle, ResourceManager};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Add one entry per file under `folder` (recursive) whose extension matches.
///
/// The resource id is the file path with `strip_prefix` removed and
/// `prepend_prefix` put in front, using forward slashes. Byte sizes come
/// from file metadata. Returns the number of entries added.
pub fn add_files(
    descriptor: &mut CollectionDescriptor,
    asset_type: &str,
    folder: &Path,
    extension: &str,
    strip_prefix: &str,
    prepend_prefix: &str,
) -> io::Result<usize> {
    let extension = extension.trim_start_matches('.');
    let strip_prefix = clean_path(strip_prefix);
    let mut added = 0;

    for entry in WalkDir::new(folder).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !matches {
            continue;
        }

        let full_path = clean_path(&entry.path().to_string_lossy());
        let relative = full_path
            .strip_prefix(strip_prefix.as_str())
            .unwrap_or(&full_path);
        let resource_id = clean_path(&format!("{prepend_prefix}{relative}"));

        descriptor.entries.push(
            CollectionEntry::new(asset_type, resource_id).with_byte_size(entry.metadata()?.len()),
        );
        added += 1;
    }

    tracing::debug!(%asset_type, folder = %folder.display(), added, "added files to collection");
    Ok(added)
}

/// Append every input entry whose resource id is not in `result` yet.
/// The first occurrence of an id wins.
pub fn merge_collections<'a, I>(result: &mut CollectionDescriptor, inputs: I)
where
    I: IntoIterator<Item = &'a CollectionDescriptor>,
{
    let mut seen: HashSet<String> = result
        .entries
        .iter()
        .map(|e| e.resource_id.clone())
        .collect();

    for input in inputs {
        for entry in &input.entries {
            if seen.insert(entry.resource_id.clone()) {
                result.entries.push(entry.clone());
            }
        }
    }
}

pub fn dedup_entries(result: &mut CollectionDescriptor, input: &CollectionDescriptor) {
    merge_collections(result, [input]);
}

/// Add an entry for a live handle. Invalid handles are ignored.
///
/// When `folder` is given, the resource id's root (`:root/`) is replaced by
/// it to find the file and record its size.
pub fn add_resource_handle(
    descriptor: &mut CollectionDescriptor,
    manager: &dyn ResourceManager,
    handle: ResourceHandle,
    asset_type: &str,
    folder: Option<&Path>,
) -> bool {
    if !handle.is_valid() {
        return false;
    }
    let Some(resource_id) = manager.resource_id(handle) else {
        return false;
    };

    let byte_size = folder
        .and_then(|folder| fs::metadata(folder.join(strip_root(&resource_id))).ok())
        .filter(|meta| meta.is_file())
        .map_or(0, |meta| meta.len());

    descriptor
        .entries
        .push(CollectionEntry::new(asset_type, resource_id).with_byte_size(byte_size));
    true
}

/// `:project/Textures/a.dds` -> `Textures/a.dds`; other paths lose leading slashes.
fn strip_root(resource_id: &str) -> &str {
    match resource_id.strip_prefix(':') {
        Some(rooted) => rooted.split_once('/').map_or("", |(_, rest)| rest),
        None => resource_id.trim_start_matches('/'),
    }
}

/// Forward slashes, no repeated separators.
fn clean_path(path: &str) -> String {
    let mut cleaned = String::with_capacity(path.len());
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' && cleaned.ends_with('/') {
            continue;
        }
        cleaned.push(c);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryResourceManager;

    fn write(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; len]).unwrap();
    }

    #[test]
    fn add_files_filters_and_rewrites_ids() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("Textures/a.dds"), 10);
        write(&dir.path().join("Textures/nested/B.DDS"), 20);
        write(&dir.path().join("Textures/readme.txt"), 5);

        let mut descriptor = CollectionDescriptor::default();
        let root = dir.path().to_string_lossy().into_owned();
        let added = add_files(
            &mut descriptor,
            "Texture2D",
            &dir.path().join("Textures"),
            ".dds",
            &format!("{root}/"),
            ":project/",
        )
        .unwrap();

        assert_eq!(added, 2);
        let ids: Vec<_> = descriptor.entries.iter().map(|e| e.resource_id.as_str()).collect();
        assert_eq!(ids, [":project/Textures/a.dds", ":project/Textures/nested/B.DDS"]);
        assert_eq!(descriptor.entries[0].byte_size, 10);
        assert_eq!(descriptor.entries[1].byte_size, 20);
        assert!(descriptor.entries.iter().all(|e| e.asset_type == "Texture2D"));
    }

    #[test]
    fn add_files_missing_folder_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = CollectionDescriptor::default();
        let result = add_files(&mut descriptor, "Mesh", &dir.path().join("nope"), "mesh", "", "");
        assert!(result.is_err());
        assert!(descriptor.is_empty());
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let mut result =
            CollectionDescriptor::new(vec![CollectionEntry::new("Mesh", "a").with_byte_size(1)]);
        let first = CollectionDescriptor::new(vec![
            CollectionEntry::new("Mesh", "a").with_byte_size(2),
            CollectionEntry::new("Mesh", "b").with_byte_size(3),
        ]);
        let second = CollectionDescriptor::new(vec![
            CollectionEntry::new("Mesh", "b").with_byte_size(4),
            CollectionEntry::new("Sound", "c"),
        ]);

        merge_collections(&mut result, [&first, &second]);

        let summary: Vec<_> = result
            .entries
            .iter()
            .map(|e| (e.resource_id.as_str(), e.byte_size))
            .collect();
        assert_eq!(summary, [("a", 1), ("b", 3), ("c", 0)]);
    }

    #[test]
    fn dedup_single_input() {
        let mut result = CollectionDescriptor::default();
        let input = CollectionDescriptor::new(vec![
            CollectionEntry::new("Mesh", "x"),
            CollectionEntry::new("Mesh", "x"),
            CollectionEntry::new("Mesh", "y"),
        ]);
        dedup_entries(&mut result, &input);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn add_resource_handle_reads_size_from_folder() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("Sounds/step.wav"), 64);

        let manager = MemoryResourceManager::new();
        let handle = manager.load("Sound", ":project/Sounds/step.wav");
        let mut descriptor = CollectionDescriptor::default();

        assert!(add_resource_handle(&mut descriptor, &manager, handle, "Sound", Some(dir.path())));
        assert!(!add_resource_handle(
            &mut descriptor,
            &manager,
            ResourceHandle::INVALID,
            "Sound",
            None
        ));
        assert_eq!(descriptor.len(), 1);
        assert_eq!(descriptor.entries[0].resource_id, ":project/Sounds/step.wav");
        assert_eq!(descriptor.entries[0].byte_size, 64);
    }

    #[test]
    fn clean_path_normalizes_separators() {
        assert_eq!(clean_path(r"C:\data\\textures//a.dds"), "C:/data/textures/a.dds");
        assert_eq!(strip_root(":project/a/b.dds"), "a/b.dds");
        assert_eq!(strip_root("/a/b.dds"), "a/b.dds");
    }
}
