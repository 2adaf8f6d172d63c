//! What the UI asks the screen to show. Blitting to the framebuffer lives elsewhere.
use std::path::{Path, PathBuf};
use log::info;
use pocketcam_gpio::debounce::Timestamp;
use crate::settings::{SettingField, Settings};

/// A snapshot of the UI for one redraw.
#[derive(Debug)]
pub enum View<'a> {
    Preview {
        settings: &'a Settings,
        last_capture: Option<&'a Path>,
    },
    Menu {
        cursor: usize,
        draft: &'a Settings,
    },
    Gallery {
        items: &'a [PathBuf],
        index: usize,
        confirm_delete: bool,
    },
    Recording {
        since: Timestamp,
        clip: &'a Path,
    },
}

impl View<'_> {
    /// Lines of text describing the view, as a status display would show them.
    pub fn lines(&self) -> Vec<String> {
        match self {
            View::Preview { settings, last_capture } => {
                let mut lines = vec![format!(
                    "LIVE  {}  {:?}",
                    SettingField::EvCompensation.value(settings),
                    settings.video_quality
                )];
                if let Some(path) = last_capture {
                    lines.push(format!("saved {}", file_name(path)));
                }
                lines
            }
            View::Menu { cursor, draft } => SettingField::ALL
                .iter()
                .enumerate()
                .map(|(i, field)| {
                    let marker = if i == *cursor { '>' } else { ' ' };
                    format!("{} {}: {}", marker, field, field.value(draft))
                })
                .collect(),
            View::Gallery { items, index, confirm_delete } => match items.get(*index) {
                None => vec!["No media".to_string()],
                Some(item) if *confirm_delete => vec![
                    format!("Delete {}?", file_name(item)),
                    "DELETE/OK: yes, other: no".to_string(),
                ],
                Some(item) => vec![format!("{}/{} {}", index + 1, items.len(), file_name(item))],
            },
            View::Recording { since, clip } => {
                vec![format!("REC since {}  {}", since, file_name(clip))]
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub trait Screen {
    fn render(&mut self, view: &View<'_>) -> std::io::Result<()>;
}

/// Writes each redraw to the log instead of a panel.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl Screen for LogDisplay {
    fn render(&mut self, view: &View<'_>) -> std::io::Result<()> {
        for line in view.lines() {
            info!("[screen] {}", line);
        }
        Ok(())
    }
}
