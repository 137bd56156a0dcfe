use std::sync::Arc;

use log::info;
use stockinsight_ai::{AnthropicProvider, InsightGenerator, LlmProvider, LlmRouter, OpenAiProvider};
use stockinsight_core::{
    AppConfig, CircuitBreakerConfig, FinnhubAdapter, HttpClient, KrxDirectorySource,
    MarketDirectory, QuoteService, ReqwestHttpClient, SymbolResolver, YahooDomesticAdapter,
};
use stockinsight_payment::{gate_from_config, PaymentGate};
use stockinsight_warehouse::{InsightStore, Warehouse, WarehouseConfig};

use crate::error::StartupError;
use crate::pipeline::AnalysisPipeline;

/// Long-lived services shared by every request handler.
pub struct AppState {
    pub resolver: Arc<SymbolResolver>,
    pub store: Arc<dyn InsightStore>,
    pub generator: Arc<InsightGenerator>,
    pub gate: Arc<PaymentGate>,
    pub pipeline: AnalysisPipeline,
    pub max_history: usize,
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(
        resolver: Arc<SymbolResolver>,
        store: Arc<dyn InsightStore>,
        generator: Arc<InsightGenerator>,
        gate: Arc<PaymentGate>,
        max_history: usize,
    ) -> Self {
        let pipeline = AnalysisPipeline::new(
            Arc::clone(&resolver),
            Arc::clone(&generator),
            Arc::clone(&gate),
        );
        Self {
            resolver,
            store,
            generator,
            gate,
            pipeline,
            max_history,
            cors_origins: Vec::new(),
        }
    }

    /// Origins allowed by the CORS layer. Empty means same-origin only.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Wires every service from configuration. Opens (and migrates) the
    /// database; nothing touches the network until the first request.
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
        let market = &config.market_data;

        let directory = Arc::new(MarketDirectory::new(
            Arc::new(KrxDirectorySource::new(Arc::clone(&http))),
            market.directory_ttl,
        ));
        let finnhub = Arc::new(FinnhubAdapter::new(
            Arc::clone(&http),
            market.finnhub_api_key.clone(),
        ));
        let resolver = Arc::new(
            SymbolResolver::new(Arc::clone(&directory)).with_ticker_search(finnhub.clone()),
        );
        let quotes = Arc::new(QuoteService::new(
            Arc::new(YahooDomesticAdapter::new(Arc::clone(&http))),
            finnhub,
            market.quote_ttl,
        ));

        let llm = &config.llm;
        let providers: Vec<Arc<dyn LlmProvider>> = vec![
            Arc::new(OpenAiProvider::new(
                Arc::clone(&http),
                llm.openai_api_key.clone(),
                llm.openai_model.clone(),
            )),
            Arc::new(AnthropicProvider::new(
                Arc::clone(&http),
                llm.anthropic_api_key.clone(),
                llm.anthropic_model.clone(),
            )),
        ];
        let router = Arc::new(LlmRouter::new(
            llm.primary,
            providers,
            CircuitBreakerConfig::new(llm.breaker_threshold, llm.breaker_recovery),
        ));

        let warehouse = Warehouse::open(WarehouseConfig::new(config.storage.db_path.clone()))?;
        info!("insight store at {}", config.storage.db_path.display());
        let store: Arc<dyn InsightStore> = Arc::new(warehouse);

        let generator = Arc::new(InsightGenerator::new(quotes, router, Arc::clone(&store)));
        let gate = Arc::new(gate_from_config(&config.payment, http));

        Ok(
            Self::new(resolver, store, generator, gate, config.storage.max_history)
                .with_cors_origins(config.server.cors_origins.clone()),
        )
    }
}
