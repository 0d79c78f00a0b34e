//! Filesystem moves shared by quarantine and restore.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Move `from` to `to`, falling back to copy + remove across filesystems.
///
/// Symlinks are moved as links, never followed.
pub fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_recursive(from, to)?;
            remove_path(from)
        }
        Err(e) => Err(e),
    }
}

/// Remove a file, symlink, or directory tree at `path`.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// First free sibling name for `target`: `name.restored-1`, `name.restored-2`, ...
pub fn unique_restore_path(target: &Path) -> PathBuf {
    unique_variant(target, |name, n| format!("{name}.restored-{n}"))
}

/// `dir/name`, or `dir/name~N` when `name` is already taken.
pub fn unique_child(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !exists_no_follow(&first) {
        return first;
    }
    unique_variant(&first, |name, n| format!("{name}~{n}"))
}

/// Existence check that does not follow a final symlink.
pub fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn unique_variant(target: &Path, make: impl Fn(&str, u32) -> String) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = target.parent().unwrap_or_else(|| Path::new(""));
    let mut n = 1_u32;
    loop {
        let candidate = parent.join(make(&name, n));
        if !exists_no_follow(&candidate) {
            return candidate;
        }
        n = n.saturating_add(1);
    }
}

fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(from)?;
    let ft = meta.file_type();
    if ft.is_symlink() {
        return copy_symlink(from, to);
    }
    if !ft.is_dir() {
        fs::copy(from, to)?;
        return Ok(());
    }
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let target = fs::read_link(from)?;
    std::os::unix::fs::symlink(target, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let target = fs::read_link(from)?;
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, to)
    } else {
        std::os::windows::fs::symlink_file(target, to)
    }
}
