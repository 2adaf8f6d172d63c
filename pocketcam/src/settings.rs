//! User settings, persisted as a flat JSON object.
use std::env::var_os;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to write {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl VideoQuality {
    const ALL: [VideoQuality; 3] = [VideoQuality::Low, VideoQuality::Medium, VideoQuality::High];

    /// Frame size and bitrate passed to the encoder.
    pub fn encoder_params(self) -> (u32, u32, u32) {
        match self {
            VideoQuality::Low => (640, 480, 2_000_000),
            VideoQuality::Medium => (1280, 720, 5_000_000),
            VideoQuality::High => (1920, 1080, 10_000_000),
        }
    }

    fn step(self, delta: i8) -> Self {
        let index = Self::ALL.iter().position(|&q| q == self).unwrap_or(1);
        Self::ALL[crate::utils::wrap_step(index, delta as isize, Self::ALL.len())]
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Exposure compensation in steps of 1/2 EV.
    pub ev_compensation: i8,
    pub video_quality: VideoQuality,
    /// Microphone gain, percent.
    pub audio_gain: u8,
}

impl Settings {
    pub const EV_RANGE: std::ops::RangeInclusive<i8> = -10..=10;
    pub const MAX_AUDIO_GAIN: u8 = 100;

    /// Pulls hand-edited values back into the ranges the menu allows.
    pub fn clamped(self) -> Self {
        Settings {
            ev_compensation: self.ev_compensation.clamp(*Self::EV_RANGE.start(), *Self::EV_RANGE.end()),
            audio_gain: self.audio_gain.min(Self::MAX_AUDIO_GAIN),
            ..self
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ev_compensation: 0,
            video_quality: VideoQuality::Medium,
            audio_gain: 50,
        }
    }
}

/// The fields editable from the settings menu, in cursor order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SettingField {
    EvCompensation,
    VideoQuality,
    AudioGain,
}

impl SettingField {
    pub const ALL: [SettingField; 3] = [
        SettingField::EvCompensation,
        SettingField::VideoQuality,
        SettingField::AudioGain,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            SettingField::EvCompensation => "Exposure",
            SettingField::VideoQuality => "Video quality",
            SettingField::AudioGain => "Mic gain",
        }
    }

    /// Moves the field by `delta` steps. Numeric fields saturate at their bounds;
    /// the quality cycles.
    pub fn adjust(self, settings: &mut Settings, delta: i8) {
        match self {
            SettingField::EvCompensation => {
                settings.ev_compensation = settings
                    .ev_compensation
                    .saturating_add(delta)
                    .clamp(*Settings::EV_RANGE.start(), *Settings::EV_RANGE.end());
            }
            SettingField::VideoQuality => {
                settings.video_quality = settings.video_quality.step(delta);
            }
            SettingField::AudioGain => {
                let gain = settings.audio_gain as i16 + delta as i16 * 5;
                settings.audio_gain = gain.clamp(0, Settings::MAX_AUDIO_GAIN as i16) as u8;
            }
        }
    }

    pub fn value(self, settings: &Settings) -> String {
        match self {
            SettingField::EvCompensation => format!("{:+.1} EV", settings.ev_compensation as f32 / 2.0),
            SettingField::VideoQuality => format!("{:?}", settings.video_quality),
            SettingField::AudioGain => format!("{}%", settings.audio_gain),
        }
    }
}

impl Display for SettingField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the settings live on disk.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SettingsStore { path: path.into() }
    }

    /// Uses `CONFIG_FILE`, or `config.json` in the working directory.
    pub fn from_env() -> Self {
        let path = var_os("CONFIG_FILE").unwrap_or_else(|| "config.json".into());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_load(&self) -> Option<Settings> {
        if !self.path.exists() {
            return None;
        }
        let file = File::open(&self.path).ok()?;
        match serde_json::from_reader::<_, Settings>(BufReader::new(file)) {
            Ok(settings) => {
                let clamped = settings.clamped();
                if clamped != settings {
                    warn!("Settings in {} out of range, clamped to {:?}", self.path.display(), clamped);
                }
                Some(clamped)
            }
            Err(e) => {
                warn!("Ignoring unreadable settings in {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let file = File::create(&self.path).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, settings)?;
        writer.flush().map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_saturates_and_cycles() {
        let mut s = Settings::default();
        for _ in 0..30 {
            SettingField::EvCompensation.adjust(&mut s, 1);
        }
        assert_eq!(s.ev_compensation, 10);
        SettingField::AudioGain.adjust(&mut s, -1);
        assert_eq!(s.audio_gain, 45);
        for _ in 0..30 {
            SettingField::AudioGain.adjust(&mut s, 1);
        }
        assert_eq!(s.audio_gain, 100);
        SettingField::VideoQuality.adjust(&mut s, 1);
        assert_eq!(s.video_quality, VideoQuality::High);
        SettingField::VideoQuality.adjust(&mut s, 1);
        assert_eq!(s.video_quality, VideoQuality::Low);
        SettingField::VideoQuality.adjust(&mut s, -1);
        assert_eq!(s.video_quality, VideoQuality::High);
    }

    #[test]
    fn values_render() {
        let s = Settings { ev_compensation: -3, ..Settings::default() };
        assert_eq!(SettingField::EvCompensation.value(&s), "-1.5 EV");
        assert_eq!(SettingField::AudioGain.value(&s), "50%");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("config.json"));
        assert_eq!(store.try_load(), None);
        let settings = Settings { ev_compensation: 4, video_quality: VideoQuality::High, audio_gain: 70 };
        store.save(&settings).unwrap();
        assert_eq!(store.try_load(), Some(settings));
    }

    #[test]
    fn file_is_a_flat_object_and_missing_keys_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "audio_gain": 20 }"#).unwrap();
        let store = SettingsStore::new(&path);
        let loaded = store.try_load().unwrap();
        assert_eq!(loaded.audio_gain, 20);
        assert_eq!(loaded.video_quality, VideoQuality::Medium);

        store.save(&loaded).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["video_quality"], "medium");
        assert!(raw.as_object().unwrap().values().all(|v| !v.is_object()));
    }

    #[test]
    fn out_of_range_values_are_clamped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "ev_compensation": 100, "audio_gain": 250 }"#).unwrap();
        let loaded = SettingsStore::new(&path).try_load().unwrap();
        assert_eq!(loaded.ev_compensation, 10);
        assert_eq!(loaded.audio_gain, 100);

        std::fs::write(&path, r#"{ "ev_compensation": -128 }"#).unwrap();
        assert_eq!(SettingsStore::new(&path).try_load().unwrap().ev_compensation, -10);
    }

    #[test]
    fn garbage_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(SettingsStore::new(&path).try_load(), None);
    }
}
