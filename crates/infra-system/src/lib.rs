// Conduit Infrastructure - System Adapters
// Implements: ItemHandler (external command), ConnectivityProbe (TCP)

pub mod command_handler;
pub mod reachability;

pub use command_handler::{CommandHandler, CommandSpec, EXIT_TEMPFAIL};
pub use reachability::TcpReachability;
