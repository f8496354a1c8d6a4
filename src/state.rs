use std::sync::Arc;

use super::{
    claims::ClaimService,
    config::Config,
    database::{MongoStore, init_mongo},
};

pub struct AppState {
    pub config: Config,
    pub claims: ClaimService,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let db = init_mongo(&config.mongo_url, &config.mongo_db).await;
        let store = Arc::new(MongoStore::new(&db));

        // The Mongo backend serves both seams: records and identity lookups.
        let claims = ClaimService::new(store.clone(), store);

        Arc::new(Self { config, claims })
    }
}
