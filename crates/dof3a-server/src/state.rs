use std::sync::Arc;

use dof3a_ai::AiService;
use dof3a_core::{Config, PlatformStore, SqlitePlatformStore, StoreResult};
use dof3a_llm::{GeminiProvider, LLMProvider};

pub struct AppState {
    pub store: Arc<dyn PlatformStore>,
    pub ai: AiService,
    pub questions_enabled: bool,
}

impl AppState {
    pub fn new(store: Arc<dyn PlatformStore>, llm: Arc<dyn LLMProvider>, config: &Config) -> Self {
        let ai = AiService::new(store.clone(), llm).with_tutor_daily_limit(config.tutor_daily_limit);
        Self {
            store,
            ai,
            questions_enabled: config.enable_questions,
        }
    }

    /// Opens the SQLite database named in `config` and wires the Gemini
    /// provider.
    pub async fn from_config(config: &Config) -> StoreResult<Self> {
        log::info!("Initializing storage at: {:?}", config.database_path);
        let store = Arc::new(SqlitePlatformStore::new(&config.database_path));
        store.init().await?;

        let llm = GeminiProvider::from_config(config);
        if llm.is_configured() {
            log::info!("Using Gemini model {}", config.model);
        } else {
            log::warn!("GOOGLE_API_KEY is not set; AI endpoints will report the service as unavailable");
        }

        Ok(Self::new(store, Arc::new(llm), config))
    }
}
