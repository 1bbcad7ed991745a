/// Package name.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
/// Default configuration file name.
pub const CONFIG_NAME: &str = "config.toml";
/// File names that mark a directory as a deployable compose stack.
pub const DESCRIPTOR_FILES: [&str; 4] = [
    "compose.yml",
    "compose.yaml",
    "docker-compose.yml",
    "docker-compose.yaml",
];
/// Timestamp embedded in archive file names.
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M";
/// Service kind assigned to discovered compose stacks.
pub const COMPOSE_KIND: &str = "compose";
