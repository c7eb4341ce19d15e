// SPDX-FileCopyrightText: 2026 The mermaid-sessions Authors
// SPDX-License-Identifier: LicenseRef-MermaidSessions-Proprietary
//
// All rights reserved.
//
// This file is part of mermaid-sessions and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

/// Index embedded in an artifact file name: `iteration_<n>_...`.
fn parse_iteration_index(file_name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(ITERATION_ARTIFACT_PREFIX)?;
    let digits_end = rest.find(|ch: char| !ch.is_ascii_digit())?;
    if digits_end == 0 || !rest[digits_end..].starts_with('_') {
        return None;
    }
    rest[..digits_end].parse().ok()
}

fn is_iteration_artifact_name(file_name: &str) -> bool {
    file_name.starts_with(ITERATION_ARTIFACT_PREFIX)
}

fn list_iteration_artifacts_in(session_dir: &Path) -> Result<Vec<IterationArtifact>, StoreError> {
    let entries = fs::read_dir(session_dir).map_err(|source| StoreError::Io {
        path: session_dir.to_path_buf(),
        source,
    })?;

    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Io {
            path: session_dir.to_path_buf(),
            source,
        })?;
        let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !is_iteration_artifact_name(&file_name) {
            continue;
        }
        let file_type = entry.file_type().map_err(|source| StoreError::Io {
            path: entry.path(),
            source,
        })?;
        if !file_type.is_file() {
            continue;
        }

        artifacts.push(IterationArtifact {
            index: parse_iteration_index(&file_name),
            artifact_ref: ArtifactRef::new(file_name),
        });
    }

    // Parseable indices first in numeric order, then the rest by name.
    artifacts.sort_by(|a, b| match (a.index, b.index) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.artifact_ref.cmp(&b.artifact_ref)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.artifact_ref.cmp(&b.artifact_ref),
    });
    Ok(artifacts)
}

fn read_json_if_exists<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn rename_overwrite(from: &Path, to: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::AlreadyExists | io::ErrorKind::PermissionDenied
                ) =>
            {
                let _ = fs::remove_file(to);
                fs::rename(from, to)
            }
            Err(err) => Err(err),
        }
    }

    #[cfg(not(windows))]
    {
        fs::rename(from, to)
    }
}

/// Writes `contents` to `dir/file_name` through a dot-prefixed temp file and a rename.
///
/// Readers listing `dir` either see the complete file or nothing; the temp name never matches
/// the iteration artifact prefix.
fn write_atomic_in_dir(
    dir: &Path,
    file_name: &str,
    contents: &[u8],
    durability: WriteDurability,
) -> Result<(), StoreError> {
    match fs::symlink_metadata(dir) {
        Ok(md) if md.file_type().is_symlink() => {
            return Err(StoreError::SymlinkRefused {
                path: dir.to_path_buf(),
            })
        }
        Ok(md) if md.is_dir() => {}
        Ok(_) => {
            return Err(StoreError::Io {
                path: dir.to_path_buf(),
                source: io::Error::new(io::ErrorKind::AlreadyExists, "expected directory"),
            })
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    }

    let path = dir.join(file_name);
    match fs::symlink_metadata(&path) {
        Ok(md) if md.file_type().is_symlink() => {
            return Err(StoreError::SymlinkRefused { path });
        }
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(StoreError::Io { path, source }),
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let tmp_path = dir.join(format!("{TEMP_FILE_PREFIX}{file_name}.{nanos}"));

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)
        .map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;

    if let Err(source) = file.write_all(contents) {
        drop(file);
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Io {
            path: tmp_path,
            source,
        });
    }

    if durability == WriteDurability::Durable {
        if let Err(source) = file.sync_all() {
            drop(file);
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Io {
                path: tmp_path,
                source,
            });
        }
    }
    drop(file);

    if let Err(source) = rename_overwrite(&tmp_path, &path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Io { path, source });
    }

    if durability == WriteDurability::Durable {
        #[cfg(unix)]
        {
            let handle = fs::File::open(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            handle.sync_all().map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
    }

    Ok(())
}
