use std::sync::Arc;
use std::time::Duration;

use crate::auth::password::{BcryptHasher, PasswordHasher};
use crate::auth::service::AuthService;
use crate::auth::token::TokenService;
use crate::config::AppConfig;
use crate::db::collection::Collections;
use crate::db::link_repository::LinkRepository;
use crate::db::loader::Loaders;
use crate::db::node_repository::NodeRepository;
use crate::db::user_repository::UserRepository;
use crate::db::vote_repository::VoteRepository;
use crate::events::EventBus;

/// Process-wide state. Cheap to clone; holds no per-request caches.
#[derive(Clone)]
pub struct AppState {
    pub collections: Collections,
    pub events: EventBus,
    pub hasher: Arc<dyn PasswordHasher>,
    pub auth: AuthService,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, collections: Collections) -> Self {
        let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptHasher::new(config.bcrypt_cost));
        Self::with_hasher(config, collections, hasher)
    }

    pub fn with_hasher(
        config: AppConfig,
        collections: Collections,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        let tokens = TokenService::new(&config.jwt_secret, config.token_ttl_secs);
        Self {
            collections,
            events: EventBus::with_capacity(config.event_buffer),
            auth: AuthService::new(hasher.clone(), tokens),
            hasher,
            config,
        }
    }

    /// State over empty in-process collections.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(config, Collections::in_memory())
    }

    /// Connect to MongoDB and make sure the indexes exist.
    #[cfg(feature = "mongo")]
    pub async fn connect(config: AppConfig) -> Result<Self, crate::error::AppError> {
        use crate::db::mongo_collection::ensure_indexes;
        use crate::error::AppError;

        let client = mongodb::Client::with_uri_str(&config.mongodb_uri)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let db = client.database(&config.mongodb_database);
        ensure_indexes(&db).await?;

        tracing::info!(
            uri = %config.mongodb_uri,
            database = %config.mongodb_database,
            "Connected to MongoDB"
        );
        Ok(Self::new(config, Collections::mongo(&db)))
    }

    /// Repositories for one request or operation, with fresh loaders.
    pub fn unit_of_work(&self) -> UnitOfWork {
        let loaders = Arc::new(Loaders::new(
            &self.collections,
            Duration::from_millis(self.config.loader_delay_ms),
        ));

        UnitOfWork {
            nodes: NodeRepository::new(
                self.collections.nodes.clone(),
                loaders.clone(),
                self.events.clone(),
            ),
            links: LinkRepository::new(
                self.collections.links.clone(),
                loaders.clone(),
                self.events.clone(),
            ),
            votes: VoteRepository::new(
                self.collections.votes.clone(),
                loaders.clone(),
                self.events.clone(),
            ),
            users: UserRepository::new(
                self.collections.users.clone(),
                loaders,
                self.events.clone(),
                self.hasher.clone(),
            ),
        }
    }
}

/// The repositories for one unit of work. Drop it when the work is done;
/// its loader caches go with it.
pub struct UnitOfWork {
    pub nodes: NodeRepository,
    pub links: LinkRepository,
    pub votes: VoteRepository,
    pub users: UserRepository,
}
