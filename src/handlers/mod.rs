pub mod assistant;
pub mod service_orders;
pub mod users;

use std::sync::Arc;

use crate::{
    assistant::{AssistantService, TextGenerator},
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db::DbPool,
    services::{
        service_orders::ServiceOrderService, statistics::StatisticsService, users::UserService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub service_orders: Arc<ServiceOrderService>,
    pub statistics: Arc<StatisticsService>,
    pub users: Arc<UserService>,
    pub assistant: Arc<AssistantService>,
    pub auth: Arc<AuthService>,
}

impl AppServices {
    /// Wires every service against one pool; `generator` answers assistant prompts.
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let statistics = StatisticsService::new(db_pool.clone());
        let service_orders = ServiceOrderService::new(db_pool.clone())
            .with_page_limits(
                u64::from(config.api_default_page_size),
                u64::from(config.api_max_page_size),
            );

        Self {
            service_orders: Arc::new(service_orders),
            statistics: Arc::new(statistics.clone()),
            users: Arc::new(UserService::new(db_pool.clone())),
            assistant: Arc::new(AssistantService::new(statistics, generator)),
            auth: Arc::new(AuthService::new(AuthConfig::from(config), db_pool)),
        }
    }
}
