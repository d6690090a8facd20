// Voice Calculator - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod calculator;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod service;
pub mod speech;
pub mod vocabulary;
pub mod voice;

// Re-export commonly used types
pub use calculator::{evaluate_expression, parse_expression, Expr, Number};
pub use config::{is_allowed_audio_file, Config, ALLOWED_AUDIO_EXTENSIONS};
pub use db::{
    CalculationRecord, HistoryStatistics, NewCalculation, SessionStats,
    setup_database, open_database, add_calculation, get_history, get_history_count,
    get_calculation, delete_calculation, clear_history, get_all_history,
    create_session, get_session_stats, get_settings, set_setting, get_statistics,
    is_connected,
};
pub use error::{CalcError, CalcResult};
pub use export::{export_history, ExportFormat};
pub use service::{
    CalculationOutcome, CalculationRequest, CalculatorService, HealthStatus, ServiceError,
    VoiceTranscription,
};
pub use speech::{
    supported_languages, AudioStore, CommandSynthesizer, CommandTranscriber, Language,
    SpeechServices, Synthesizer, Transcriber, Unavailable,
};
pub use vocabulary::{constants_list, functions_list, ConstantInfo, FunctionInfo};
pub use voice::{normalize_voice_text, VoiceNormalizer, VoiceRule};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
