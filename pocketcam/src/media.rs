//! Saved stills and clips on disk.
use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use log::{debug, info};

const MEDIA_EXTENSIONS: [&str; 3] = ["jpg", "h264", "mp4"];

pub trait MediaStore: Debug {
    /// Saved media, newest first.
    fn list(&self) -> io::Result<Vec<PathBuf>>;

    fn delete(&mut self, path: &Path) -> io::Result<()>;
}

#[derive(Debug)]
pub struct DirMediaStore {
    root: PathBuf,
}

impl DirMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirMediaStore { root: root.into() }
    }
}

fn is_media(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MEDIA_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(ext)))
}

impl MediaStore for DirMediaStore {
    fn list(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut items: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let metadata = entry.metadata()?;
            if !metadata.is_file() || !is_media(&path) {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            items.push((modified, path));
        }

        items.sort_by(|(a_time, a_path), (b_time, b_path)| {
            b_time.cmp(a_time).then_with(|| b_path.cmp(a_path))
        });
        debug!("{} media item(s) in {}", items.len(), self.root.display());
        Ok(items.into_iter().map(|(_, path)| path).collect())
    }

    fn delete(&mut self, path: &Path) -> io::Result<()> {
        if path.parent() != Some(self.root.as_path()) || !is_media(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is not in {}", path.display(), self.root.display()),
            ));
        }

        fs::remove_file(path)?;
        let sidecar = path.with_extension("wav");
        match fs::remove_file(&sidecar) {
            Ok(()) => debug!("Removed {}", sidecar.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        info!("Deleted {}", path.display());
        Ok(())
    }
}
