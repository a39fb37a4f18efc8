use std::env;

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub ndfc_url: String,
    pub ndfc_user: String,
    pub ndfc_password: String,
    pub ndfc_domain: String,
    pub ndfc_timeout_secs: u64,
    pub ndfc_verify_tls: bool,
    pub ssh_user: String,
    pub ssh_pass: String,
    pub ssh_timeout_secs: u64,
    pub forks: usize,
    pub inventory_path: String,
    pub fabrics_path: String,
    pub artifact_dir: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self {
            ndfc_url: get_env("NDFC_URL", "https://ndfc.local"),
            ndfc_user: get_env("NDFC_USER", "admin"),
            ndfc_password: get_env("NDFC_PASSWORD", ""),
            ndfc_domain: get_env("NDFC_DOMAIN", "local"),
            // NDFC bulk operations can take many minutes on large fabrics
            ndfc_timeout_secs: get_env("NDFC_TIMEOUT_SECS", "1000")
                .parse()
                .unwrap_or(1000),
            ndfc_verify_tls: parse_bool(&get_env("NDFC_VERIFY_TLS", "false")),
            ssh_user: get_env("SSH_USER", "admin"),
            ssh_pass: get_env("SSH_PASS", ""),
            ssh_timeout_secs: get_env("SSH_TIMEOUT_SECS", "30")
                .parse()
                .unwrap_or(30),
            forks: get_env("FORKS", "5").parse().unwrap_or(5).max(1),
            inventory_path: get_env("INVENTORY_PATH", "inventory.yml"),
            fabrics_path: get_env("FABRICS_PATH", "fabrics.yml"),
            artifact_dir: get_env("ARTIFACT_DIR", "host_vars"),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Accepts the usual truthy spellings; anything else is false
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" YES "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
        assert!(!parse_bool("maybe"));
    }
}
