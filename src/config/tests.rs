use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let original_config = Config {
            embedding: EmbeddingConfig {
                model: "voyage-3".to_string(),
                dimension: 1024,
                ..EmbeddingConfig::default()
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            ..Config::default()
        };

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [server
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        let invalid_toml = r#"
            [retrieval]
            top_k = "three"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn complete_valid_config() {
        let valid_toml = r#"
            [embedding]
            base_url = "https://api.voyageai.com"
            model = "voyage-3-lite"
            dimension = 512
            batch_size = 32
            api_key_env = "VOYAGE_API_KEY"
            timeout_seconds = 30
            rate_limit_retries = 3
            backoff_base_ms = 1000

            [generation]
            base_url = "https://api.anthropic.com"
            model = "claude-sonnet-4-5-20250929"
            max_tokens = 512
            temperature = 0.2
            api_key_env = "ANTHROPIC_API_KEY"
            timeout_seconds = 60
            rate_limit_retries = 0
            backoff_base_ms = 1000

            [chunking]
            window_size = 800
            overlap = 100

            [retrieval]
            top_k = 3
            upcoming_only = true

            [sessions]
            ttl_seconds = 600
            max_history_turns = 6

            [server]
            host = "0.0.0.0"
            port = 8000
        "#;

        let config: Config = toml::from_str(valid_toml).expect("should parse toml successfully");
        assert!(config.validate().is_ok());
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.generation.max_tokens, 512);
        assert!(config.retrieval.upcoming_only);
        assert_eq!(config.sessions.ttl_seconds, 600);
        assert_eq!(config.catalog, CatalogConfig::default());
    }

    #[test]
    fn base_url_validation_edge_cases() {
        let cases = [
            ("https://api.voyageai.com", true),
            ("http://127.0.0.1:8080", true),
            ("api.voyageai.com", false),
            ("ftp://api.voyageai.com", false),
            ("", false),
        ];

        for (url, valid) in cases {
            let config = EmbeddingConfig {
                base_url: url.to_string(),
                ..EmbeddingConfig::default()
            };
            assert_eq!(config.validate().is_ok(), valid, "url {url:?}");
        }
    }

    #[test]
    fn config_directory_is_created_on_save() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let home = temp_dir.path().join(".events-rag");

        let config = Config {
            base_dir: home.clone(),
            ..Config::default()
        };

        assert!(!home.exists());
        config.save().expect("should save config");
        assert!(home.join("config.toml").is_file());
    }
}
