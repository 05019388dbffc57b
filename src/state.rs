use std::sync::Arc;

use crate::{
    auth::{tokens::SessionPolicy, SecretSigner},
    config::Config,
    db,
    errors::AppError,
    ledger::{MemoryLedger, MongoLedger, RefreshTokenLedger},
    password::{Argon2Hasher, PasswordHasher},
    principal::{MemoryPrincipalStore, MongoPrincipalStore, PrincipalStore},
    services::auth_service::SessionGateway,
};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub gateway: SessionGateway,
}

impl AppState {
    /// MongoDB when `MONGODB_URI` is set, in-process stores otherwise.
    pub async fn new(cfg: &Config) -> Result<Self, AppError> {
        cfg.validate()?;

        let principals: Arc<dyn PrincipalStore>;
        let ledger: Arc<dyn RefreshTokenLedger>;
        match &cfg.mongodb_uri {
            Some(uri) => {
                let (client, database) = db::connect(uri, cfg).await?;
                tracing::info!(db = %cfg.db_name, "using mongodb session store");
                principals = Arc::new(MongoPrincipalStore::new(&database));
                ledger = Arc::new(MongoLedger::new(client, &database));
            }
            None => {
                tracing::warn!(
                    "MONGODB_URI not set; using in-memory session store (single process only)"
                );
                principals = Arc::new(MemoryPrincipalStore::new());
                ledger = Arc::new(MemoryLedger::new());
            }
        }

        Ok(Self::from_parts(
            cfg.clone(),
            principals,
            Arc::new(Argon2Hasher::new()),
            ledger,
        ))
    }

    pub fn from_parts(
        cfg: Config,
        principals: Arc<dyn PrincipalStore>,
        hasher: Arc<dyn PasswordHasher>,
        ledger: Arc<dyn RefreshTokenLedger>,
    ) -> Self {
        let signer = Arc::new(SecretSigner::from_config(&cfg));
        let gateway = SessionGateway::new(
            principals,
            hasher,
            ledger,
            signer,
            SessionPolicy::from_config(&cfg),
        );
        Self {
            cfg: Arc::new(cfg),
            gateway,
        }
    }
}
