use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the websocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Maximum new websocket connections accepted per second.
    #[arg(long, env = "CONNECTION_RATE", default_value = "10")]
    pub connection_rate: u32,

    // --- Chat Backend Args ---
    /// Chat webhook endpoint that streams answers (SSE, NDJSON or plain lines).
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: String,

    /// Connect timeout for the chat webhook in seconds. 0 disables it; the
    /// streamed body itself is never timed out.
    #[arg(long, env = "WEBHOOK_TIMEOUT_SECS", default_value = "0")]
    pub webhook_timeout_secs: u64,

    /// Number of previous turns sent as `context` with each question.
    #[arg(long, env = "CONTEXT_TURNS", default_value = "0")]
    pub context_turns: usize,

    // --- Place Analysis Args ---
    /// LLM provider used to extract places from answers (gemini, openai, ollama, anthropic, deepseek, xai, groq)
    #[arg(long, env = "ANALYSIS_LLM_TYPE", default_value = "gemini")]
    pub analysis_llm_type: String,

    /// API key for the analysis provider.
    #[arg(long, env = "ANALYSIS_API_KEY", default_value = "")]
    pub analysis_api_key: String,

    /// Model name for place analysis (defaults per provider, e.g. gemini-2.5-flash)
    #[arg(long, env = "ANALYSIS_MODEL")]
    pub analysis_model: Option<String>,

    /// Base URL override for the analysis provider.
    #[arg(long, env = "ANALYSIS_BASE_URL")]
    pub analysis_base_url: Option<String>,

    /// Path to the analysis prompt override file.
    #[arg(long, env = "PROMPTS_PATH", default_value = "json/prompts.json")]
    pub prompts_path: String,

    // --- Geocoding Args ---
    /// Google Geocoding API key. Without it places keep only model-supplied coordinates.
    #[arg(long, env = "GEOCODING_API_KEY", default_value = "")]
    pub geocoding_api_key: String,

    /// Geocoding endpoint.
    #[arg(long, env = "GEOCODING_URL")]
    pub geocoding_url: Option<String>,

    /// Region appended to addresses that do not already name it.
    #[arg(long, env = "GEOCODING_BIAS", default_value = "Austin, TX")]
    pub geocoding_bias: String,

    // --- Session Args ---
    /// File holding the session identity reused across restarts.
    #[arg(long, env = "SESSION_FILE", default_value = ".fiora_session")]
    pub session_file: String,
}
