//! Concrete collaborators injected into the engine APIs: the block-explorer verifier and the log-only notifier.

pub mod explorer;
pub mod notifier;

pub use explorer::ExplorerVerifier;
pub use notifier::LogNotifier;
