// 🔊 Speech Capabilities - speech-to-text and text-to-speech backends
//
// Backends are chosen once from Config and passed around explicitly.
// A missing backend is a normal state: callers check `is_available()`
// and the calculator keeps working without audio.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::config::{is_allowed_audio_file, Config};

// ============================================================================
// CAPABILITIES
// ============================================================================

pub trait Transcriber: Send + Sync {
    /// Name of the backend, None when nothing is configured
    fn backend(&self) -> Option<&str>;

    fn is_available(&self) -> bool {
        self.backend().is_some()
    }

    /// Turn recorded audio into text. `extension` is the uploaded file's
    /// extension (wav, mp3, ...).
    fn transcribe(&self, audio: &[u8], extension: &str) -> Result<String>;
}

pub trait Synthesizer: Send + Sync {
    fn backend(&self) -> Option<&str>;

    fn is_available(&self) -> bool {
        self.backend().is_some()
    }

    /// Speak `text`; returns WAV bytes
    fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Stands in for either capability when no backend is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl Transcriber for Unavailable {
    fn backend(&self) -> Option<&str> {
        None
    }

    fn transcribe(&self, _audio: &[u8], _extension: &str) -> Result<String> {
        bail!("No speech recognition backend available")
    }
}

impl Synthesizer for Unavailable {
    fn backend(&self) -> Option<&str> {
        None
    }

    fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
        bail!("No text-to-speech backend available")
    }
}

// ============================================================================
// EXTERNAL COMMAND BACKENDS
// ============================================================================

/// Runs `program` to completion and returns its stdout. `input`, when
/// given, is fed to the child's stdin; otherwise stdin is closed.
fn run_command(program: &str, args: &[String], input: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to run {}", program))?;

    // Written from its own thread so a chatty child can't block on a full stdout pipe
    let writer = match (input, child.stdin.take()) {
        (Some(bytes), Some(mut stdin)) => {
            let bytes = bytes.to_vec();
            Some(thread::spawn(move || match stdin.write_all(&bytes) {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }))
        }
        _ => None,
    };

    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for {}", program))?;

    if let Some(writer) = writer {
        match writer.join() {
            Ok(result) => result.with_context(|| format!("Failed to write input to {}", program))?,
            Err(_) => bail!("Input writer for {} panicked", program),
        }
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} exited with {}: {}", program, output.status, stderr.trim());
    }

    Ok(output.stdout)
}

/// Runs `<program> <args...> <audio path>` and reads the transcript from stdout
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    program: String,
    args: Vec<String>,
}

impl CommandTranscriber {
    /// `command` is program followed by its arguments; None if empty
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(CommandTranscriber {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Transcriber for CommandTranscriber {
    fn backend(&self) -> Option<&str> {
        Some(&self.program)
    }

    fn transcribe(&self, audio: &[u8], extension: &str) -> Result<String> {
        let path = std::env::temp_dir().join(format!("temp_{}.{}", uuid::Uuid::new_v4(), extension));
        fs::write(&path, audio).with_context(|| format!("Failed to write {:?}", path))?;

        let mut args = self.args.clone();
        args.push(path.to_string_lossy().into_owned());
        let result = run_command(&self.program, &args, None);

        if let Err(e) = fs::remove_file(&path) {
            warn!("Could not remove temporary audio {:?}: {}", path, e);
        }

        let transcript = String::from_utf8(result?).context("Transcript is not valid UTF-8")?;
        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            bail!("Could not understand audio");
        }

        info!("Transcribed: {}", transcript);
        Ok(transcript)
    }
}

/// Runs `<program> <args...>` with the text on stdin and reads audio bytes
/// from stdout. The text never reaches argv, so it can't be read as a flag.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
}

impl CommandSynthesizer {
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(CommandSynthesizer {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Synthesizer for CommandSynthesizer {
    fn backend(&self) -> Option<&str> {
        Some(&self.program)
    }

    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            bail!("Empty text provided");
        }

        let audio = run_command(&self.program, &self.args, Some(text.as_bytes()))?;
        if audio.is_empty() {
            bail!("{} produced no audio", self.program);
        }

        debug!("Synthesized {} bytes of audio", audio.len());
        Ok(audio)
    }
}

/// The pair of backends the service runs with
#[derive(Clone)]
pub struct SpeechServices {
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl SpeechServices {
    pub fn unavailable() -> Self {
        SpeechServices {
            transcriber: Arc::new(Unavailable),
            synthesizer: Arc::new(Unavailable),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let transcriber: Arc<dyn Transcriber> = match config
            .stt_command
            .as_deref()
            .and_then(CommandTranscriber::new)
        {
            Some(backend) => Arc::new(backend),
            None => Arc::new(Unavailable),
        };

        let synthesizer: Arc<dyn Synthesizer> = match config
            .tts_command
            .as_deref()
            .and_then(CommandSynthesizer::new)
        {
            Some(backend) => Arc::new(backend),
            None => Arc::new(Unavailable),
        };

        match transcriber.backend() {
            Some(name) => info!("Speech recognition backend: {}", name),
            None => warn!("No speech recognition backend configured"),
        }
        match synthesizer.backend() {
            Some(name) => info!("Text-to-speech backend: {}", name),
            None => warn!("No text-to-speech backend configured"),
        }

        SpeechServices {
            transcriber,
            synthesizer,
        }
    }
}

// ============================================================================
// AUDIO FILES
// ============================================================================

pub struct AudioStore {
    dir: PathBuf,
    max_age: Duration,
}

impl AudioStore {
    pub fn new(dir: impl Into<PathBuf>, max_age_hours: u64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create audio directory {:?}", dir))?;

        Ok(AudioStore {
            dir,
            max_age: Duration::from_secs(max_age_hours.saturating_mul(3600)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name for the spoken result of a history entry
    pub fn result_filename(history_id: i64) -> String {
        format!("result_{}.wav", history_id)
    }

    /// Name for free-form text: `tts_<unix seconds>_<sha256 prefix>.wav`
    pub fn tts_filename(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        format!("tts_{}_{}.wav", now, &digest[..8])
    }

    pub fn save(&self, filename: &str, audio: &[u8]) -> Result<PathBuf> {
        let path = self
            .resolve(filename)
            .with_context(|| format!("Refusing to store audio as {:?}", filename))?;
        fs::write(&path, audio).with_context(|| format!("Failed to write {:?}", path))?;

        info!("Saved audio {}", filename);
        Ok(path)
    }

    /// Path inside the store for a requested name. Names must be plain file
    /// names with an allowed audio extension.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let plain = !filename.is_empty()
            && !filename.contains(['/', '\\'])
            && !filename.starts_with('.')
            && filename != "..";

        if plain && is_allowed_audio_file(filename) {
            Some(self.dir.join(filename))
        } else {
            None
        }
    }

    /// Read a stored file; Ok(None) when it does not exist
    pub fn load(&self, filename: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.resolve(filename) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }

        let bytes = fs::read(&path).with_context(|| format!("Failed to read {:?}", path))?;
        Ok(Some(bytes))
    }

    /// Delete audio files older than the configured age; returns how many
    /// were removed. A file that can't be inspected or removed is logged and skipped.
    pub fn cleanup_old_files(&self) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read audio directory {:?}", self.dir))?;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable audio directory entry: {}", e);
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_allowed_audio_file(&name) {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("Could not stat audio file {}: {}", name, e);
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or_default();

            if age > self.max_age {
                match fs::remove_file(entry.path()) {
                    Ok(()) => {
                        info!("Cleaned up old audio file: {}", name);
                        removed += 1;
                    }
                    Err(e) => warn!("Could not remove old audio file {}: {}", name, e),
                }
            }
        }

        Ok(removed)
    }
}

// ============================================================================
// LANGUAGES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

const LANGUAGES: &[(&str, &str)] = &[
    ("en-US", "English (US)"),
    ("en-GB", "English (UK)"),
    ("es-ES", "Spanish (Spain)"),
    ("es-MX", "Spanish (Mexico)"),
    ("fr-FR", "French (France)"),
    ("de-DE", "German (Germany)"),
    ("it-IT", "Italian (Italy)"),
    ("pt-BR", "Portuguese (Brazil)"),
    ("ja-JP", "Japanese (Japan)"),
    ("ko-KR", "Korean (South Korea)"),
    ("zh-CN", "Chinese (Simplified)"),
    ("hi-IN", "Hindi (India)"),
];

/// Recognition languages offered to clients. Voice normalization itself
/// only understands English.
pub fn supported_languages() -> Vec<Language> {
    LANGUAGES
        .iter()
        .map(|&(code, name)| Language { code, name })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(max_age_hours: u64) -> AudioStore {
        let dir = std::env::temp_dir().join(format!("calc_audio_{}", uuid::Uuid::new_v4()));
        AudioStore::new(dir, max_age_hours).unwrap()
    }

    #[test]
    fn test_unavailable_backends() {
        let speech = SpeechServices::unavailable();
        assert!(!speech.transcriber.is_available());
        assert!(!speech.synthesizer.is_available());
        assert!(speech.synthesizer.synthesize("hi").is_err());
        assert!(speech.transcriber.transcribe(b"RIFF", "wav").is_err());
    }

    #[test]
    fn test_from_config_selects_commands() {
        let config = Config {
            tts_command: Some(vec!["espeak-ng".to_string(), "--stdout".to_string()]),
            ..Config::default()
        };
        let speech = SpeechServices::from_config(&config);

        assert_eq!(speech.synthesizer.backend(), Some("espeak-ng"));
        assert!(!speech.transcriber.is_available());
        assert!(CommandSynthesizer::new(&[]).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_backends_use_stdout() {
        // `cat` echoes the text it is fed back as the "audio"
        let tts = CommandSynthesizer::new(&["cat".to_string()]).unwrap();
        assert_eq!(tts.synthesize("  hello ").unwrap(), b"hello".to_vec());
        assert!(tts.synthesize("   ").is_err());

        // `cat <path>` echoes the uploaded bytes back as the transcript
        let stt = CommandTranscriber::new(&["cat".to_string()]).unwrap();
        assert_eq!(stt.transcribe(b"five plus three\n", "wav").unwrap(), "five plus three");
        assert!(stt.transcribe(b"   ", "wav").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_synthesized_text_is_not_a_flag() {
        let tts = CommandSynthesizer::new(&["cat".to_string()]).unwrap();
        assert_eq!(tts.synthesize("--version").unwrap(), b"--version".to_vec());
        assert_eq!(tts.synthesize("-n 5").unwrap(), b"-n 5".to_vec());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_backend_reports_stderr() {
        let command = ["sh", "-c", "echo broken >&2; exit 3"].map(String::from);
        let tts = CommandSynthesizer::new(&command).unwrap();
        let err = tts.synthesize("seven").unwrap_err().to_string();
        assert!(err.contains("broken"), "{}", err);
    }

    #[test]
    fn test_filenames() {
        assert_eq!(AudioStore::result_filename(42), "result_42.wav");

        let name = AudioStore::tts_filename("The result is 14");
        assert!(name.starts_with("tts_"));
        assert!(name.ends_with(".wav"));
        assert!(is_allowed_audio_file(&name));
    }

    #[test]
    fn test_resolve_rejects_paths_and_extensions() {
        let store = temp_store(24);
        assert!(store.resolve("result_1.wav").is_some());
        assert!(store.resolve("../secret.wav").is_none());
        assert!(store.resolve("a/b.wav").is_none());
        assert!(store.resolve("notes.txt").is_none());
        assert!(store.resolve("").is_none());
        fs::remove_dir_all(store.dir()).ok();
    }

    #[test]
    fn test_save_load_and_cleanup() {
        let store = temp_store(0);
        store.save("result_7.wav", b"RIFF").unwrap();
        fs::write(store.dir().join("keep.txt"), b"x").unwrap();

        assert_eq!(store.load("result_7.wav").unwrap(), Some(b"RIFF".to_vec()));
        assert_eq!(store.load("missing.wav").unwrap(), None);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.cleanup_old_files().unwrap(), 1);
        assert_eq!(store.load("result_7.wav").unwrap(), None);
        assert!(store.dir().join("keep.txt").exists());
        fs::remove_dir_all(store.dir()).ok();
    }

    #[test]
    fn test_cleanup_skips_entries_it_cannot_remove() {
        let store = temp_store(0);
        store.save("result_1.wav", b"RIFF").unwrap();
        // Matches the audio extensions but remove_file fails on a directory
        fs::create_dir(store.dir().join("stuck.wav")).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.cleanup_old_files().unwrap(), 1);
        assert_eq!(store.load("result_1.wav").unwrap(), None);
        assert!(store.dir().join("stuck.wav").is_dir());
        fs::remove_dir_all(store.dir()).ok();
    }

    #[test]
    fn test_huge_max_age_keeps_everything() {
        let store = temp_store(u64::MAX);
        store.save("result_2.wav", b"RIFF").unwrap();

        assert_eq!(store.cleanup_old_files().unwrap(), 0);
        assert_eq!(store.load("result_2.wav").unwrap(), Some(b"RIFF".to_vec()));
        fs::remove_dir_all(store.dir()).ok();
    }

    #[test]
    fn test_languages() {
        let languages = supported_languages();
        assert_eq!(languages.len(), 12);
        assert_eq!(languages[0].code, "en-US");
    }
}
