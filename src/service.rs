// 🧩 Calculator Service - core + history + speech
// Synchronous; the server runs it on the blocking pool.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::calculator::{evaluate_expression, Number};
use crate::config::Config;
use crate::db::{self, NewCalculation};
use crate::error::CalcError;
use crate::export::{export_history, ExportFormat};
use crate::speech::{AudioStore, SpeechServices};
use crate::voice::normalize_voice_text;

/// Either the user's input was rejected, or something behind it broke
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Calculation(#[from] CalcError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default)]
pub struct CalculationRequest {
    pub expression: String,
    /// Spoken text the expression was normalized from
    pub voice_input: Option<String>,
    pub session_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub generate_audio: bool,
}

impl CalculationRequest {
    pub fn new(expression: impl Into<String>) -> Self {
        CalculationRequest {
            expression: expression.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalculationOutcome {
    pub expression: String,
    pub result: Number,
    pub history_id: i64,
    pub audio_filename: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceTranscription {
    pub transcribed_text: String,
    pub expression: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub calculator: bool,
    pub tts: bool,
    pub stt: bool,
    pub database: bool,
}

pub struct CalculatorService {
    db: Arc<Mutex<Connection>>,
    speech: SpeechServices,
    audio: AudioStore,
    export_dir: PathBuf,
}

impl CalculatorService {
    pub fn new(
        conn: Connection,
        speech: SpeechServices,
        audio: AudioStore,
        export_dir: impl Into<PathBuf>,
    ) -> Self {
        CalculatorService {
            db: Arc::new(Mutex::new(conn)),
            speech,
            audio,
            export_dir: export_dir.into(),
        }
    }

    /// Open the database, pick speech backends and prepare directories
    pub fn from_config(config: &Config) -> Result<Self> {
        let conn = db::open_database(&config.db_path)?;
        let speech = SpeechServices::from_config(config);
        let audio = AudioStore::new(&config.audio_dir, config.audio_max_age_hours)?;

        Ok(Self::new(conn, speech, audio, &config.export_dir))
    }

    pub fn speech(&self) -> &SpeechServices {
        &self.speech
    }

    pub fn audio(&self) -> &AudioStore {
        &self.audio
    }

    /// Run `f` with the locked connection
    pub fn with_db<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .db
            .lock()
            .map_err(|_| anyhow!("History database lock poisoned"))?;
        f(&conn)
    }

    /// Evaluate, record in history and optionally speak the result.
    /// Rejected expressions are not recorded.
    pub fn calculate(&self, request: CalculationRequest) -> Result<CalculationOutcome, ServiceError> {
        let expression = request.expression.trim().to_string();

        let started = Instant::now();
        let result = evaluate_expression(&expression)?;
        let elapsed = started.elapsed().as_secs_f64();

        let calc = NewCalculation::new(&expression, result.to_string())
            .with_voice_input(request.voice_input)
            .with_session(request.session_id.clone())
            .with_client(request.user_agent.clone(), request.ip_address.clone())
            .with_execution_time(elapsed);

        let history_id = self.with_db(|conn| {
            if let Some(session_id) = request.session_id.as_deref() {
                if !db::session_exists(conn, session_id)? {
                    db::create_session(
                        conn,
                        session_id,
                        request.user_agent.as_deref(),
                        request.ip_address.as_deref(),
                    )?;
                }
            }
            db::add_calculation(conn, &calc)
        })?;

        let audio_filename = if request.generate_audio {
            let filename = AudioStore::result_filename(history_id);
            match self.synthesize_to(&format!("The result is {}", result), &filename) {
                Ok(()) => Some(filename),
                Err(e) => {
                    warn!("Result audio unavailable for #{}: {:#}", history_id, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(CalculationOutcome {
            expression,
            result,
            history_id,
            audio_filename,
            timestamp: Utc::now(),
        })
    }

    /// Transcribe uploaded audio and rewrite the transcript as an expression
    pub fn voice_to_expression(&self, audio: &[u8], extension: &str) -> Result<VoiceTranscription> {
        let transcriber = &self.speech.transcriber;
        if !transcriber.is_available() {
            bail!("Speech recognition is not available");
        }

        let transcribed_text = transcriber.transcribe(audio, extension)?;
        let expression = normalize_voice_text(&transcribed_text);
        info!("Voice input {:?} -> {:?}", transcribed_text, expression);

        Ok(VoiceTranscription {
            transcribed_text,
            expression,
        })
    }

    /// Synthesize free text into the audio store; returns the file name
    pub fn speak(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            bail!("Text is required");
        }

        let filename = AudioStore::tts_filename(text);
        self.synthesize_to(text, &filename)?;
        Ok(filename)
    }

    fn synthesize_to(&self, text: &str, filename: &str) -> Result<()> {
        let synthesizer = &self.speech.synthesizer;
        if !synthesizer.is_available() {
            bail!("Text-to-speech is not available");
        }

        let audio = synthesizer.synthesize(text)?;
        self.audio.save(filename, &audio)?;
        Ok(())
    }

    pub fn export(&self, format: ExportFormat, session_id: Option<&str>) -> Result<PathBuf> {
        self.with_db(|conn| export_history(conn, &self.export_dir, format, session_id))
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            calculator: true,
            tts: self.speech.synthesizer.is_available(),
            stt: self.speech.transcriber.is_available(),
            database: self.with_db(|conn| Ok(db::is_connected(conn))).unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{Synthesizer, Transcriber};
    use std::fs;

    struct FixedTranscript(&'static str);

    impl Transcriber for FixedTranscript {
        fn backend(&self) -> Option<&str> {
            Some("fixed")
        }

        fn transcribe(&self, _audio: &[u8], _extension: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct EchoSynth;

    impl Synthesizer for EchoSynth {
        fn backend(&self) -> Option<&str> {
            Some("echo")
        }

        fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
            Ok(text.as_bytes().to_vec())
        }
    }

    fn test_service(speech: SpeechServices) -> CalculatorService {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();

        let root = std::env::temp_dir().join(format!("calc_service_{}", uuid::Uuid::new_v4()));
        let audio = AudioStore::new(root.join("voice"), 24).unwrap();
        CalculatorService::new(conn, speech, audio, root.join("history"))
    }

    fn speaking() -> SpeechServices {
        SpeechServices {
            transcriber: Arc::new(FixedTranscript("what is twenty-five times two")),
            synthesizer: Arc::new(EchoSynth),
        }
    }

    #[test]
    fn test_calculate_records_history() {
        let service = test_service(SpeechServices::unavailable());
        let mut request = CalculationRequest::new(" 2+3*4 ");
        request.session_id = Some("s1".to_string());

        let outcome = service.calculate(request).unwrap();
        assert_eq!(outcome.result, Number::Integer(14));
        assert_eq!(outcome.expression, "2+3*4");
        assert!(outcome.audio_filename.is_none());

        let record = service
            .with_db(|conn| db::get_calculation(conn, outcome.history_id))
            .unwrap()
            .unwrap();
        assert_eq!(record.result, "14");
        assert!(record.execution_time.is_some());

        let stats = service
            .with_db(|conn| db::get_session_stats(conn, "s1"))
            .unwrap()
            .unwrap();
        assert_eq!(stats.calculation_count, 1);
    }

    #[test]
    fn test_rejected_expressions_are_not_recorded() {
        let service = test_service(SpeechServices::unavailable());

        let err = service.calculate(CalculationRequest::new("10/0")).unwrap_err();
        assert!(matches!(err, ServiceError::Calculation(CalcError::DivisionByZero)));

        let count = service.with_db(|conn| db::get_history_count(conn, None)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_result_audio() {
        let service = test_service(speaking());
        let mut request = CalculationRequest::new("sqrt(16)");
        request.generate_audio = true;

        let outcome = service.calculate(request).unwrap();
        let filename = outcome.audio_filename.unwrap();
        assert_eq!(filename, format!("result_{}.wav", outcome.history_id));
        assert_eq!(
            service.audio().load(&filename).unwrap(),
            Some(b"The result is 4".to_vec())
        );
        fs::remove_dir_all(service.audio().dir()).ok();
    }

    #[test]
    fn test_audio_failure_does_not_fail_calculation() {
        let service = test_service(SpeechServices::unavailable());
        let mut request = CalculationRequest::new("1+1");
        request.generate_audio = true;

        let outcome = service.calculate(request).unwrap();
        assert_eq!(outcome.result, Number::Integer(2));
        assert!(outcome.audio_filename.is_none());
    }

    #[test]
    fn test_voice_to_expression() {
        let service = test_service(speaking());
        let voice = service.voice_to_expression(b"RIFF", "wav").unwrap();
        assert_eq!(voice.transcribed_text, "what is twenty-five times two");
        assert_eq!(voice.expression, "25*2");

        let silent = test_service(SpeechServices::unavailable());
        assert!(silent.voice_to_expression(b"RIFF", "wav").is_err());
    }

    #[test]
    fn test_speak() {
        let service = test_service(speaking());
        let filename = service.speak("hello there").unwrap();
        assert!(filename.starts_with("tts_"));
        assert!(service.speak("   ").is_err());
        fs::remove_dir_all(service.audio().dir()).ok();
    }

    #[test]
    fn test_health() {
        let health = test_service(speaking()).health();
        assert!(health.calculator && health.tts && health.stt && health.database);

        let health = test_service(SpeechServices::unavailable()).health();
        assert!(!health.tts && !health.stt);
    }
}
