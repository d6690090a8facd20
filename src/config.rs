// ⚙️ Configuration - environment driven, with defaults for local runs

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

pub const ALLOWED_AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "flac"];

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub audio_dir: PathBuf,
    pub web_dir: PathBuf,
    pub export_dir: PathBuf,
    pub max_upload_bytes: usize,

    /// Program + args; the text to speak goes to stdin, audio is read from stdout
    pub tts_command: Option<Vec<String>>,

    /// Program + args; the audio file path is appended, transcript is read from stdout
    pub stt_command: Option<Vec<String>>,

    pub audio_max_age_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0:5000".to_string(),
            db_path: PathBuf::from("calculator_history.db"),
            audio_dir: PathBuf::from("static/voice"),
            web_dir: PathBuf::from("frontend"),
            export_dir: PathBuf::from("history"),
            max_upload_bytes: 16 * 1024 * 1024,
            tts_command: None,
            stt_command: None,
            audio_max_age_hours: 24,
        }
    }
}

impl Config {
    /// Load from `CALC_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key lookup (tests pass a map instead of the process env)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(addr) = lookup("CALC_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(path) = lookup("CALC_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("CALC_AUDIO_DIR") {
            config.audio_dir = PathBuf::from(path);
        }
        if let Some(path) = lookup("CALC_WEB_DIR") {
            config.web_dir = PathBuf::from(path);
        }
        if let Some(path) = lookup("CALC_EXPORT_DIR") {
            config.export_dir = PathBuf::from(path);
        }
        if let Some(raw) = lookup("CALC_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = raw
                .trim()
                .parse()
                .with_context(|| format!("CALC_MAX_UPLOAD_BYTES is not a number: {:?}", raw))?;
        }
        if let Some(raw) = lookup("CALC_AUDIO_MAX_AGE_HOURS") {
            config.audio_max_age_hours = raw
                .trim()
                .parse()
                .with_context(|| format!("CALC_AUDIO_MAX_AGE_HOURS is not a number: {:?}", raw))?;
        }

        config.tts_command = lookup("CALC_TTS_COMMAND").and_then(|raw| split_command(&raw));
        config.stt_command = lookup("CALC_STT_COMMAND").and_then(|raw| split_command(&raw));

        Ok(config)
    }
}

/// Whitespace split; an empty command means "not configured"
fn split_command(raw: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = raw.split_whitespace().map(String::from).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

pub fn is_allowed_audio_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_AUDIO_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.max_upload_bytes, 16 * 1024 * 1024);
        assert!(config.tts_command.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("CALC_BIND_ADDR", "127.0.0.1:8080"),
            ("CALC_MAX_UPLOAD_BYTES", "1024"),
            ("CALC_TTS_COMMAND", "espeak-ng --stdout"),
            ("CALC_STT_COMMAND", "   "),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(
            config.tts_command,
            Some(vec!["espeak-ng".to_string(), "--stdout".to_string()])
        );
        assert!(config.stt_command.is_none());
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[("CALC_AUDIO_MAX_AGE_HOURS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CALC_AUDIO_MAX_AGE_HOURS"));
    }

    #[test]
    fn test_allowed_audio_files() {
        assert!(is_allowed_audio_file("clip.wav"));
        assert!(is_allowed_audio_file("clip.MP3"));
        assert!(!is_allowed_audio_file("clip.exe"));
        assert!(!is_allowed_audio_file("wav"));
        assert!(!is_allowed_audio_file(".wav"));
    }
}
