pub mod app_config;
pub mod database;
pub mod inventory_repo;
pub mod order_repo;
pub mod payment_repo;
pub mod shipment_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use inventory_repo::PgInventoryStore;
pub use order_repo::PgOrderStore;
pub use payment_repo::{PgPaymentStore, PgWebhookEventStore};
pub use shipment_repo::PgShipmentStore;

pub(crate) fn pg_err(err: sqlx::Error) -> croft_core::Error {
    croft_core::Error::persistence(err.to_string())
}
