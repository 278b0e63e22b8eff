//! Application state.

use std::sync::Arc;

use nova_billing::{DebitEngine, DedupScanner, PurchaseEngine, Reconciler};
use nova_delivery::{EmailSender, PushSender};
use nova_firestore::{
    CreationsRepository, DocumentStore, FirestoreClient, InMemoryStore, LedgerRepository,
};
use nova_models::Catalog;
use nova_storage::GcsClient;
use tracing::{info, warn};

use crate::auth::JwksCache;
use crate::config::{ApiConfig, StoreBackend};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn DocumentStore>,
    pub ledger: LedgerRepository,
    pub creations: CreationsRepository,
    pub catalog: Arc<Catalog>,
    pub debit: Arc<DebitEngine>,
    pub purchases: Arc<PurchaseEngine>,
    pub reconciler: Arc<Reconciler>,
    pub dedup: Arc<DedupScanner>,
    pub storage: Option<Arc<GcsClient>>,
    pub push: Option<Arc<PushSender>>,
    pub email: Option<Arc<EmailSender>>,
    pub jwks: Arc<JwksCache>,
}

impl AppState {
    /// Create new application state.
    ///
    /// The document store is required; the delivery collaborators are
    /// optional and disabled with a warning when their environment is
    /// absent, so a local instance can run with nothing but the store.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn DocumentStore> = match config.store_backend {
            StoreBackend::Memory => {
                info!("Using in-memory document store");
                Arc::new(InMemoryStore::new())
            }
            StoreBackend::Firestore => Arc::new(FirestoreClient::from_env().await?),
        };

        let ledger = LedgerRepository::new(Arc::clone(&store));
        let creations = CreationsRepository::new(Arc::clone(&store));
        let catalog = Arc::new(Catalog::default());

        let debit = Arc::new(DebitEngine::new(ledger.clone()));
        let purchases = Arc::new(PurchaseEngine::new(ledger.clone(), Arc::clone(&catalog)));
        let reconciler = Arc::new(Reconciler::new(ledger.clone()));
        let dedup = Arc::new(DedupScanner::new(creations.clone()));

        let storage = match GcsClient::from_env() {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("Object storage disabled: {}", e);
                None
            }
        };

        let push = match PushSender::from_env() {
            Ok(sender) => Some(Arc::new(sender)),
            Err(e) => {
                warn!("Push delivery disabled: {}", e);
                None
            }
        };

        let email = match EmailSender::from_env() {
            Ok(sender) => Some(Arc::new(sender)),
            Err(e) => {
                warn!("Email delivery disabled: {}", e);
                None
            }
        };

        let project_id = std::env::var("FIREBASE_PROJECT_ID")
            .or_else(|_| std::env::var("GCP_PROJECT_ID"))
            .unwrap_or_else(|_| {
                if config.debug_auth_active() {
                    "dev".to_string()
                } else {
                    String::new()
                }
            });
        if project_id.is_empty() {
            return Err("FIREBASE_PROJECT_ID is required for token verification".into());
        }
        let jwks = Arc::new(JwksCache::new(project_id)?);

        Ok(Self {
            config,
            store,
            ledger,
            creations,
            catalog,
            debit,
            purchases,
            reconciler,
            dedup,
            storage,
            push,
            email,
            jwks,
        })
    }
}
