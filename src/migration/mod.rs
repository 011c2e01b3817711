// ABOUTME: Relational migration core
// ABOUTME: Catalog discovery, transfer ordering, constraint gating, and table copying

pub mod catalog;
pub mod copier;
pub mod gate;
pub mod orchestrator;
pub mod planner;
pub mod session;

pub use copier::{copy_table, TableReport};
pub use gate::ConstraintGate;
pub use orchestrator::{migrate_database, migrate_databases, DatabaseReport, MigrationSummary};
pub use planner::{plan_transfer_order, DependencyEdge, TransferPlan};
pub use session::{DestinationSession, ReplicationRole, SessionFactory, SourceSession, TextRow};
