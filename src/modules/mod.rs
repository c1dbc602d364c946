//! Application modules.

use std::sync::Arc;

use biblio_kernel::ledger::Ledger;
use biblio_kernel::notify::NotificationSink;
use biblio_kernel::settings::Settings;
use biblio_kernel::ModuleRegistry;

pub mod accounts;
pub mod catalog;
pub mod lending;
pub mod stats;

/// Register every module with the registry. Order matters only for
/// migrations and startup logging; routing is order-independent.
pub fn register_all(
    registry: &mut ModuleRegistry,
    settings: &Settings,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn NotificationSink>,
) {
    registry.register(Arc::new(accounts::AccountsModule::new(ledger.clone())));
    registry.register(Arc::new(catalog::CatalogModule::new(ledger.clone())));
    registry.register(Arc::new(stats::StatsModule::new(ledger.clone())));
    registry.register(Arc::new(lending::LendingModule::new(
        settings, ledger, notifier,
    )));
}
