//! The camera and recorder, driven as child processes of the platform camera stack.
//!
//! Nothing here blocks the run loop except [Camera::finalise], which is only called on
//! shutdown and is bounded by its deadline.
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use thiserror::Error;
use time::OffsetDateTime;
use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to start {program}: {source}")]
    Spawn { program: &'static str, #[source] source: io::Error },
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("no recording in progress")]
    NotRecording,
    #[error("{0} capture process(es) did not finish within {1:?}")]
    FinaliseTimeout(usize, Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub trait Camera: Debug {
    /// Starts capturing a still. Returns the path the image will be written to.
    fn capture_still(&mut self, settings: &Settings) -> Result<PathBuf, CameraError>;

    /// Starts recording video and audio. Returns the path of the video stream.
    fn start_recording(&mut self, settings: &Settings) -> Result<PathBuf, CameraError>;

    /// Asks the running recording to stop. The clip is finalised in the background.
    fn stop_recording(&mut self) -> Result<PathBuf, CameraError>;

    fn is_recording(&self) -> bool;

    /// Reaps finished background work. Called once per tick.
    fn poll(&mut self) {}

    /// Waits for all background work, giving up after `deadline`.
    fn finalise(&mut self, deadline: Duration) -> Result<(), CameraError>;
}

struct Job {
    program: &'static str,
    child: Child,
    output: PathBuf,
}

impl Job {
    fn spawn(program: &'static str, args: &[String], output: PathBuf) -> Result<Self, CameraError> {
        debug!("Spawning {} {:?}", program, args);
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CameraError::Spawn { program, source })?;
        Ok(Job { program, child, output })
    }

    fn try_finish(&mut self) -> io::Result<Option<ExitStatus>> {
        let status = self.child.try_wait()?;
        if let Some(status) = status {
            if status.success() {
                info!("{} finished: {}", self.program, self.output.display());
            } else {
                warn!("{} exited with {} for {}", self.program, status, self.output.display());
            }
        }
        Ok(status)
    }

    /// Asks the process to wrap up (SIGINT makes the encoders close their files cleanly).
    fn interrupt(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            let pid = self.child.id() as libc::pid_t;
            // SAFETY: plain syscall on a pid we own and have not reaped yet.
            if unsafe { libc::kill(pid, libc::SIGINT) } != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            self.child.kill()
        }
    }
}

/// A [Camera] backed by `rpicam-still`, `rpicam-vid` and `arecord`.
pub struct CommandCamera {
    media_dir: PathBuf,
    recording: Option<(Job, Job)>,
    background: Vec<Job>,
    /// Names handed out whose files may not exist yet.
    reserved: Vec<PathBuf>,
}

impl Debug for CommandCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CommandCamera({}, recording: {}, {} pending)",
            self.media_dir.display(),
            self.recording.is_some(),
            self.background.len()
        )
    }
}

impl CommandCamera {
    pub fn new(media_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let media_dir = media_dir.into();
        std::fs::create_dir_all(&media_dir)?;
        Ok(CommandCamera {
            media_dir,
            recording: None,
            background: Vec::new(),
            reserved: Vec::new(),
        })
    }

    fn output_path(&mut self, prefix: &str, extension: &str) -> PathBuf {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let reserved = &self.reserved;
        let path = media_file_name(&self.media_dir, prefix, now, extension, |p| {
            p.exists() || reserved.iter().any(|r| r == p)
        });
        self.reserved.push(path.clone());
        path
    }

    fn pending_outputs(&self) -> impl Iterator<Item = &Path> {
        self.recording
            .iter()
            .flat_map(|(video, audio)| [video, audio])
            .chain(&self.background)
            .map(|job| job.output.as_path())
    }
}

/// `<dir>/<prefix>_YYYYMMDD_HHMMSS.<ext>`, with a counter appended while `taken` says the
/// name is in use.
pub fn media_file_name(
    dir: &Path,
    prefix: &str,
    at: OffsetDateTime,
    extension: &str,
    taken: impl Fn(&Path) -> bool,
) -> PathBuf {
    let stem = format!(
        "{}_{:04}{:02}{:02}_{:02}{:02}{:02}",
        prefix,
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    );
    let mut path = dir.join(format!("{}.{}", stem, extension));
    let mut n = 1;
    while taken(&path) {
        path = dir.join(format!("{}_{}.{}", stem, n, extension));
        n += 1;
    }
    path
}

impl Camera for CommandCamera {
    fn capture_still(&mut self, settings: &Settings) -> Result<PathBuf, CameraError> {
        let path = self.output_path("IMG", "jpg");
        let args = vec![
            "--nopreview".to_string(),
            "--immediate".to_string(),
            "--ev".to_string(),
            format!("{:.1}", settings.ev_compensation as f32 / 2.0),
            "-o".to_string(),
            path.display().to_string(),
        ];
        self.background.push(Job::spawn("rpicam-still", &args, path.clone())?);
        Ok(path)
    }

    fn start_recording(&mut self, settings: &Settings) -> Result<PathBuf, CameraError> {
        if self.recording.is_some() {
            return Err(CameraError::AlreadyRecording);
        }

        let video_path = self.output_path("VID", "h264");
        let audio_path = video_path.with_extension("wav");
        let (width, height, bitrate) = settings.video_quality.encoder_params();

        let video_args = vec![
            "--nopreview".to_string(),
            "-t".to_string(),
            "0".to_string(),
            "--width".to_string(),
            width.to_string(),
            "--height".to_string(),
            height.to_string(),
            "--bitrate".to_string(),
            bitrate.to_string(),
            "--ev".to_string(),
            format!("{:.1}", settings.ev_compensation as f32 / 2.0),
            "-o".to_string(),
            video_path.display().to_string(),
        ];
        let mut video = Job::spawn("rpicam-vid", &video_args, video_path.clone())?;

        let audio_args = vec![
            "-q".to_string(),
            "-f".to_string(),
            "cd".to_string(),
            "-t".to_string(),
            "wav".to_string(),
            audio_path.display().to_string(),
        ];
        let audio = match Job::spawn("arecord", &audio_args, audio_path) {
            Ok(audio) => audio,
            Err(e) => {
                _ = video.child.kill();
                _ = video.child.wait();
                return Err(e);
            }
        };

        info!("Recording to {} (mic gain {}%)", video_path.display(), settings.audio_gain);
        self.recording = Some((video, audio));
        Ok(video_path)
    }

    fn stop_recording(&mut self) -> Result<PathBuf, CameraError> {
        let (mut video, mut audio) = self.recording.take().ok_or(CameraError::NotRecording)?;
        let path = video.output.clone();
        let interrupted = video.interrupt().and(audio.interrupt());
        self.background.push(video);
        self.background.push(audio);
        interrupted?;
        Ok(path)
    }

    fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    fn poll(&mut self) {
        self.background.retain_mut(|job| match job.try_finish() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                warn!("Lost track of {}: {}", job.program, e);
                false
            }
        });
        // A finished job's file is on disk now, or was never written.
        let pending: Vec<PathBuf> = self.pending_outputs().map(Path::to_path_buf).collect();
        self.reserved.retain(|path| pending.contains(path));
    }

    fn finalise(&mut self, deadline: Duration) -> Result<(), CameraError> {
        if self.recording.is_some() {
            self.stop_recording()?;
        }

        let start = Instant::now();
        loop {
            self.poll();
            if self.background.is_empty() {
                return Ok(());
            }
            if start.elapsed() >= deadline {
                break;
            }
            sleep(Duration::from_millis(10));
        }

        let pending = self.background.len();
        for mut job in self.background.drain(..) {
            warn!("Killing {} writing {}", job.program, job.output.display());
            _ = job.child.kill();
            _ = job.child.wait();
        }
        Err(CameraError::FinaliseTimeout(pending, deadline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Month};

    #[test]
    fn file_names_are_timestamped_and_unique() {
        let dir = tempfile::tempdir().unwrap();
        let at = Date::from_calendar_date(2026, Month::March, 7)
            .unwrap()
            .with_hms(9, 5, 1)
            .unwrap()
            .assume_utc();
        let first = media_file_name(dir.path(), "IMG", at, "jpg", |p| p.exists());
        assert_eq!(first, dir.path().join("IMG_20260307_090501.jpg"));
        std::fs::write(&first, b"").unwrap();
        let second = media_file_name(dir.path(), "IMG", at, "jpg", |p| p.exists());
        assert_eq!(second, dir.path().join("IMG_20260307_090501_1.jpg"));
    }

    #[test]
    fn names_are_unique_before_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut camera = CommandCamera::new(dir.path()).unwrap();
        let first = camera.output_path("IMG", "jpg");
        let second = camera.output_path("IMG", "jpg");
        let third = camera.output_path("IMG", "jpg");
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);
        assert!(!first.exists());

        // Nothing is pending, so the reservations lapse.
        camera.poll();
        assert!(camera.reserved.is_empty());
    }

    #[test]
    fn stop_without_recording_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut camera = CommandCamera::new(dir.path()).unwrap();
        assert!(matches!(camera.stop_recording(), Err(CameraError::NotRecording)));
        assert!(!camera.is_recording());
        camera.finalise(Duration::from_millis(10)).unwrap();
    }
}
