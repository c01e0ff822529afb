use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub path: String,
    pub seed_test_data: bool,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    /// Directory image uploads are written under
    pub root: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub database: Database,
    pub storage: Storage,
}

impl Settings {
    /// Layered load: built-in defaults, then an optional
    /// settings.toml, then environment variables on top.
    pub fn new() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.path", "melon.db")?
            .set_default("database.seed_test_data", false)?
            .set_default("storage.root", "uploads")?;

        // settings.toml may sit next to the binary, or inside the
        // crate directory when running from the workspace root
        for candidate in ["settings.toml", "melon-server/settings.toml"] {
            let path = PathBuf::from(candidate);
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        for (key, var) in [
            ("server.host", "HOST"),
            ("server.port", "PORT"),
            ("database.path", "DATABASE_PATH"),
            ("storage.root", "STORAGE_ROOT"),
        ] {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }
        if let Ok(seed) = std::env::var("SEED_TEST_DATA") {
            builder =
                builder.set_override("database.seed_test_data", seed == "1" || seed == "true")?;
        }

        builder.build()?.try_deserialize()
    }
}
