// Playlist Import Infrastructure - System Adapters
// Implements: PlaylistImporter (external importer process)

pub mod subprocess_importer;

pub use subprocess_importer::{ImporterCommand, SubprocessImporter, DEFAULT_ENV_ALLOWLIST};
