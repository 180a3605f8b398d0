//! SQLite persistence: connection pool and repositories.
//!
//! All persistent state is SQLite-backed with one writer per database
//! file. Transactions wrap multi-step state changes; the ticket store is
//! the synchronization point between the monitor and agent daemons.

pub mod action_repo;
pub mod audit_repo;
pub mod connection;
pub mod eval_repo;
pub mod ticket_repo;
pub mod utils;

pub use action_repo::ActionRepository;
pub use audit_repo::AuditLogRepository;
pub use connection::DatabaseConnection;
pub use eval_repo::EvalRepository;
pub use ticket_repo::TicketRepository;
