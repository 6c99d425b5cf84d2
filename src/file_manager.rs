//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file usate dal protocollo
//! di ottimizzazione.
//!
//! ## Responsabilità:
//! - Dimensione e modification time dei file
//! - Copia dei metadati (permessi, timestamp) dall'originale al file ottimizzato
//! - Sostituzione atomica tramite rename nella stessa directory
//! - Cancellazione tollerante ("not found" non è un errore)
//! - Utilità per calcoli dimensioni e percentuali
//!
//! ## Sicurezza operazioni:
//! - Il rename avviene sempre tra file della stessa directory, quindi sullo
//!   stesso volume: dall'esterno si osserva un singolo cambiamento istantaneo
//! - I timestamp vengono scritti prima dei permessi, così un originale
//!   read-only non impedisce l'aggiornamento dei tempi sul file temporaneo
//!
//! ## Esempio:
//! ```rust,ignore
//! FileManager::copy_stat(&original, &optimized).await?;
//! FileManager::atomic_replace(&optimized, &original).await?;
//! ```

use std::fs::{FileTimes, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// File operations shared by the optimizer protocol and the batch driver
pub struct FileManager;

impl FileManager {
    /// Size of a file, treating any stat failure as an empty file
    pub async fn size_or_zero(path: &Path) -> u64 {
        fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
    }

    /// Copy permission bits and access/modification times from `source` onto `target`
    pub async fn copy_stat(source: &Path, target: &Path) -> io::Result<()> {
        let metadata = fs::metadata(source).await?;

        let mut times = FileTimes::new().set_modified(metadata.modified()?);
        if let Ok(accessed) = metadata.accessed() {
            times = times.set_accessed(accessed);
        }
        OpenOptions::new().write(true).open(target)?.set_times(times)?;

        fs::set_permissions(target, metadata.permissions()).await?;
        debug!("Copied stat from {} to {}", source.display(), target.display());
        Ok(())
    }

    /// Move `from` over `to`. Both paths must live in the same directory.
    pub async fn atomic_replace(from: &Path, to: &Path) -> io::Result<()> {
        debug_assert_eq!(from.parent(), to.parent());
        fs::rename(from, to).await
    }

    /// Delete a file, returning `Ok(false)` if it was already gone
    pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Expand directories into the files below them accepted by `accept`.
    /// Plain file arguments are kept as given, whatever their extension.
    pub fn expand_paths(paths: &[PathBuf], accept: fn(&Path) -> bool) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for path in paths {
            if !path.is_dir() {
                files.push(path.clone());
                continue;
            }
            files.extend(
                WalkDir::new(path)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && accept(e.path()))
                    .map(|e| e.into_path()),
            );
        }
        files
    }

    /// JPEG or PNG by extension
    pub fn is_supported_image(path: &Path) -> bool {
        Self::is_jpeg(path) || Self::is_png(path)
    }

    /// Check if a file looks like a JPEG by extension
    pub fn is_jpeg(path: &Path) -> bool {
        Self::has_extension(path, &["jpg", "jpeg"])
    }

    /// Check if a file looks like a PNG by extension
    pub fn is_png(path: &Path) -> bool {
        Self::has_extension(path, &["png"])
    }

    fn has_extension(path: &Path, candidates: &[&str]) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| candidates.contains(&ext.as_str()))
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(2048), "2.00 KB");
        assert_eq!(FileManager::format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_calculate_reduction() {
        assert_eq!(FileManager::calculate_reduction(0, 10), 0.0);
        assert_eq!(FileManager::calculate_reduction(200, 150), 25.0);
    }

    #[test]
    fn test_extension_checks() {
        assert!(FileManager::is_jpeg(Path::new("a/b/photo.JPG")));
        assert!(FileManager::is_jpeg(Path::new("photo.jpeg")));
        assert!(FileManager::is_png(Path::new("icon.png")));
        assert!(!FileManager::is_png(Path::new("icon")));
    }

    #[test]
    fn test_expand_paths_walks_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(nested.join("b.png"), b"x").unwrap();
        std::fs::write(nested.join("notes.txt"), b"x").unwrap();
        let explicit = dir.path().join("explicit.gif");

        let files = FileManager::expand_paths(
            &[dir.path().to_path_buf(), explicit.clone()],
            FileManager::is_supported_image,
        );
        assert_eq!(files, vec![dir.path().join("a.jpg"), nested.join("b.png"), explicit]);
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("victim.tmp");
        std::fs::write(&path, b"x").unwrap();

        assert!(FileManager::remove_if_exists(&path).unwrap());
        assert!(!FileManager::remove_if_exists(&path).unwrap());
    }

    #[tokio::test]
    async fn test_copy_stat_transfers_mtime() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.bin");
        let target = dir.path().join("target.bin");
        std::fs::write(&source, b"source").unwrap();
        std::fs::write(&target, b"target").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3600 * 24 * 30);
        std::fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(past)
            .unwrap();

        FileManager::copy_stat(&source, &target).await.unwrap();

        let src_mtime = std::fs::metadata(&source).unwrap().modified().unwrap();
        let dst_mtime = std::fs::metadata(&target).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dst_mtime);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_stat_transfers_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.bin");
        let target = dir.path().join("target.bin");
        std::fs::write(&source, b"source").unwrap();
        std::fs::write(&target, b"target").unwrap();
        std::fs::set_permissions(&source, std::fs::Permissions::from_mode(0o640)).unwrap();

        FileManager::copy_stat(&source, &target).await.unwrap();

        let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[tokio::test]
    async fn test_atomic_replace() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("new.jpg");
        let to = dir.path().join("old.jpg");
        std::fs::write(&from, b"new").unwrap();
        std::fs::write(&to, b"old").unwrap();

        FileManager::atomic_replace(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"new");
    }
}
