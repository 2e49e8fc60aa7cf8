pub mod backend;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;
pub mod stream;

use backend::WebhookBackend;
use cli::Args;
use config::prompt;
use conversation::ConversationController;
use conversation::controller::ControllerOptions;
use llm::analysis::LlmAnalyzer;
use llm::extractor::PlaceExtractor;
use llm::geocode::{ Geocoder, GoogleGeocoder };
use llm::{ LlmConfig, LlmType };
use log::{ info, warn };
use server::Server;
use session::SessionIdentity;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

fn build_extractor(args: &Args) -> Result<PlaceExtractor, Box<dyn Error + Send + Sync>> {
    let llm_type: LlmType = args.analysis_llm_type
        .parse()
        .map_err(|e| format!("Invalid analysis LLM type: {}", e))?;
    let llm_config = LlmConfig {
        llm_type,
        api_key: Some(args.analysis_api_key.clone()).filter(|k| !k.is_empty()),
        model: args.analysis_model.clone(),
        base_url: args.analysis_base_url.clone(),
        ..LlmConfig::default()
    };
    let prompts = prompt::load_prompts(&args.prompts_path)?;

    let geocoder: Option<Arc<dyn Geocoder>> = if args.geocoding_api_key.is_empty() {
        warn!("GEOCODING_API_KEY not set; places without model coordinates stay off the map");
        None
    } else {
        Some(
            Arc::new(
                GoogleGeocoder::new(
                    args.geocoding_api_key.clone(),
                    args.geocoding_url.clone(),
                    Some(args.geocoding_bias.clone())
                )
            )
        )
    };

    let analyzer = LlmAnalyzer::from_config(&llm_config, prompts, geocoder)?;
    info!(
        "Analysis client configured: Type={:?}, Model={}, BaseURL={:?}",
        llm_type,
        llm_config.model_or_default(),
        llm_config.base_url.as_deref().unwrap_or("adapter default")
    );
    Ok(PlaceExtractor::new(Arc::new(analyzer)))
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Webhook URL: {}", args.webhook_url);
    info!("Webhook Connect Timeout: {}s", args.webhook_timeout_secs);
    info!("Context Turns: {}", args.context_turns);
    info!("Analysis LLM Type: {}", args.analysis_llm_type);
    info!("Prompts Path: {}", args.prompts_path);
    info!("Geocoding Enabled: {}", !args.geocoding_api_key.is_empty());
    info!("Session File: {}", args.session_file);
    info!("-------------------------");

    let session = SessionIdentity::load_or_create(&args.session_file)?;
    let timeout = (args.webhook_timeout_secs > 0).then(|| Duration::from_secs(args.webhook_timeout_secs));
    let backend = WebhookBackend::new(&args.webhook_url, timeout)?;
    let extractor = build_extractor(&args)?;

    let controller = ConversationController::new(
        Arc::new(backend),
        extractor,
        session,
        ControllerOptions {
            context_turns: args.context_turns,
        }
    );

    info!("Starting server on: {}", args.server_addr);
    let server = Server::new(args.server_addr.clone(), controller, args.connection_rate);
    server.run().await?;

    Ok(())
}
