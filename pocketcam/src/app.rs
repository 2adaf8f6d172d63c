//! The module for the camera UI state and logic.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use log::{debug, info, warn};
use thiserror::Error;
use pocketcam_gpio::debounce::{ButtonEvent, EventKind, InputControl, Timestamp};
use pocketcam_gpio::keypad::Button;
use crate::camera::{Camera, CameraError};
use crate::dispatch::EventHandler;
use crate::display::{Screen, View};
use crate::media::MediaStore;
use crate::settings::{SettingField, Settings, SettingsError, SettingsStore};
use crate::utils::wrap_step;

/// How long shutdown waits for the camera to close its files.
pub const FINALISE_DEADLINE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("media store: {0}")]
    Media(#[source] io::Error),
    #[error("settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("screen: {0}")]
    Screen(#[source] io::Error),
}

/// The current mode of the UI.
#[derive(Clone, Debug, PartialEq)]
pub enum Mode {
    /// Live view. The camera's default state.
    Preview,
    /// The settings overlay, editing a copy of the settings.
    Menu {
        cursor: usize,
        draft: Settings,
    },
    /// Browsing saved media.
    Gallery {
        items: Vec<PathBuf>,
        index: usize,
        /// Whether the next DELETE/OK unlinks the current item.
        confirm_delete: bool,
    },
    /// A clip is being recorded.
    Recording {
        since: Timestamp,
        clip: PathBuf,
    },
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Preview => "Preview",
            Mode::Menu { .. } => "Menu",
            Mode::Gallery { .. } => "Gallery",
            Mode::Recording { .. } => "Recording",
        }
    }

    fn view<'a>(&'a self, settings: &'a Settings, last_capture: Option<&'a Path>) -> View<'a> {
        match self {
            Mode::Preview => View::Preview { settings, last_capture },
            Mode::Menu { cursor, draft } => View::Menu { cursor: *cursor, draft },
            Mode::Gallery { items, index, confirm_delete } => View::Gallery {
                items,
                index: *index,
                confirm_delete: *confirm_delete,
            },
            Mode::Recording { since, clip } => View::Recording { since: *since, clip },
        }
    }
}

/// The main app state struct.
pub struct App {
    /// The current mode.
    mode: Mode,
    /// The committed settings.
    settings: Settings,
    /// Where committed settings are saved.
    store: SettingsStore,
    camera: Box<dyn Camera>,
    media: Box<dyn MediaStore>,
    screen: Box<dyn Screen>,
    /// The most recent still or clip, shown in the preview.
    last_capture: Option<PathBuf>,
}

impl App {
    pub fn new(
        settings: Settings,
        store: SettingsStore,
        camera: Box<dyn Camera>,
        media: Box<dyn MediaStore>,
        screen: Box<dyn Screen>,
    ) -> App {
        App {
            mode: Mode::Preview,
            settings,
            store,
            camera,
            media,
            screen,
            last_capture: None,
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn last_capture(&self) -> Option<&Path> {
        self.last_capture.as_deref()
    }

    /// Redraws the screen for the current mode.
    pub fn render(&mut self) -> Result<(), HandlerError> {
        let view = self.mode.view(&self.settings, self.last_capture.as_deref());
        self.screen.render(&view).map_err(HandlerError::Screen)
    }

    /// Stops any recording and waits up to `deadline` for the camera to finish writing.
    pub fn shutdown(&mut self, deadline: Duration) {
        if let Mode::Recording { clip, .. } = &self.mode {
            info!("Stopping recording of {} for shutdown.", clip.display());
            self.enter(Mode::Preview);
        }
        if let Err(e) = self.camera.finalise(deadline) {
            warn!("Camera did not finish cleanly: {}", e);
        }
    }

    fn enter(&mut self, mode: Mode) {
        if self.mode.name() != mode.name() {
            info!("{} -> {}", self.mode.name(), mode.name());
        }
        self.mode = mode;
    }

    /// Returns whether anything visible changed.
    fn handle_preview(&mut self, event: &ButtonEvent, input: &mut dyn InputControl) -> Result<bool, HandlerError> {
        if event.kind != EventKind::Press {
            return Ok(false);
        }
        match event.button {
            Button::Menu => {
                self.enter(Mode::Menu { cursor: 0, draft: self.settings });
            }
            Button::Ok => {
                let path = self.camera.capture_still(&self.settings)?;
                info!("Capturing {}", path.display());
                self.last_capture = Some(path);
            }
            Button::Record => {
                let clip = self.camera.start_recording(&self.settings)?;
                input.set_repeat_enabled(false);
                self.enter(Mode::Recording { since: event.timestamp, clip });
            }
            Button::Videos => {
                let items = self.media.list().map_err(HandlerError::Media)?;
                self.enter(Mode::Gallery { items, index: 0, confirm_delete: false });
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn handle_menu(&mut self, event: &ButtonEvent) -> Result<bool, HandlerError> {
        let Mode::Menu { cursor, draft } = &mut self.mode else {
            return Ok(false);
        };
        let fields = SettingField::ALL.len();
        match (event.kind, event.button) {
            (EventKind::Release, _) => return Ok(false),
            (_, Button::Up) => *cursor = wrap_step(*cursor, -1, fields),
            (_, Button::Down) => *cursor = wrap_step(*cursor, 1, fields),
            (_, Button::Plus) => SettingField::ALL[*cursor].adjust(draft, 1),
            (_, Button::Minus) => SettingField::ALL[*cursor].adjust(draft, -1),
            (EventKind::Press, Button::Ok) => {
                self.settings = *draft;
                self.enter(Mode::Preview);
                self.store.save(&self.settings)?;
                debug!("Saved settings to {}", self.store.path().display());
            }
            (EventKind::Press, Button::Menu) => self.enter(Mode::Preview),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn handle_gallery(&mut self, event: &ButtonEvent) -> Result<bool, HandlerError> {
        let Mode::Gallery { items, index, confirm_delete } = &mut self.mode else {
            return Ok(false);
        };
        if event.kind == EventKind::Release {
            return Ok(false);
        }

        if *confirm_delete {
            *confirm_delete = false;
            let confirmed = event.kind == EventKind::Press
                && matches!(event.button, Button::Delete | Button::Ok);
            if !confirmed {
                debug!("Delete cancelled.");
                return Ok(true);
            }
            if let Some(path) = items.get(*index) {
                self.media.delete(path).map_err(HandlerError::Media)?;
                items.remove(*index);
                *index = (*index).min(items.len().saturating_sub(1));
            }
            return Ok(true);
        }

        match (event.kind, event.button) {
            (_, Button::Left) if !items.is_empty() => *index = wrap_step(*index, -1, items.len()),
            (_, Button::Right) if !items.is_empty() => *index = wrap_step(*index, 1, items.len()),
            (EventKind::Press, Button::Delete) if !items.is_empty() => *confirm_delete = true,
            (EventKind::Press, Button::Menu) => self.enter(Mode::Preview),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn handle_recording(&mut self, event: &ButtonEvent, input: &mut dyn InputControl) -> Result<bool, HandlerError> {
        if !event.is_press_of(Button::Record) {
            return Ok(false);
        }
        let stopped = self.camera.stop_recording();
        input.set_repeat_enabled(true);
        self.enter(Mode::Preview);
        let clip = stopped?;
        info!("Finalising {}", clip.display());
        self.last_capture = Some(clip);
        Ok(true)
    }
}

impl EventHandler for App {
    type Error = HandlerError;

    fn handle(&mut self, event: &ButtonEvent, input: &mut dyn InputControl) -> Result<(), HandlerError> {
        let outcome = match self.mode {
            Mode::Preview => self.handle_preview(event, input),
            Mode::Menu { .. } => self.handle_menu(event),
            Mode::Gallery { .. } => self.handle_gallery(event),
            Mode::Recording { .. } => self.handle_recording(event, input),
        };
        match outcome {
            Ok(false) => Ok(()),
            Ok(true) => self.render(),
            Err(e) => {
                if let Err(render) = self.render() {
                    warn!("Failed to redraw: {}", render);
                }
                Err(e)
            }
        }
    }

    fn on_tick(&mut self, _now: Timestamp) {
        self.camera.poll();
    }

    fn shutdown(&mut self) {
        App::shutdown(self, FINALISE_DEADLINE);
    }
}
