//! Compose file generation
//!
//! Wires the suite environment together: a containerized echo upstream and
//! the proxy under test, built from the suite's parent directory. The suite's
//! optional `config.yml` contributes network aliases for the upstream (so
//! declared host names resolve inside the network) and environment entries
//! for the proxy.

use crate::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Image used for the containerized echo upstream.
const MOCK_IMAGE: &str = "mendhak/http-https-echo:18";

/// Optional suite configuration, read from `<suite>/config.yml`.
#[derive(Debug, Default, Deserialize)]
pub struct SuiteEnvironment {
    #[serde(default)]
    mock: Option<MockSection>,
    #[serde(default)]
    nginx: Option<ProxySection>,
}

#[derive(Debug, Default, Deserialize)]
struct MockSection {
    #[serde(default)]
    network_aliases: Option<OneOrMany>,
}

#[derive(Debug, Default, Deserialize)]
struct ProxySection {
    #[serde(default)]
    environment: Option<serde_yaml::Value>,
}

/// A YAML field that accepts either a single scalar or a sequence.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// The generated orchestration description.
#[derive(Debug, Serialize, PartialEq)]
pub struct ComposeFile {
    pub version: String,
    pub services: Services,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Services {
    pub mock: MockService,
    pub nginx: ProxyService,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MockService {
    pub container_name: String,
    pub image: String,
    pub environment: Vec<String>,
    pub networks: MockNetworks,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MockNetworks {
    pub default: AliasBlock,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AliasBlock {
    pub aliases: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ProxyService {
    pub container_name: String,
    pub build: BuildSpec,
    pub ports: Vec<String>,
    pub networks: Vec<String>,
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<serde_yaml::Value>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct BuildSpec {
    pub context: String,
    pub dockerfile: String,
}

/// Builds the compose description for the suite at `suite_dir`.
///
/// Fails when the suite directory is missing or when its parent lacks the
/// `Dockerfile` the proxy service is built from. An absent or empty
/// `config.yml` means no aliases and no extra environment.
pub fn generate(suite_dir: &Path) -> Result<ComposeFile> {
    if !suite_dir.is_dir() {
        return Err(HarnessError::Config(format!(
            "suite directory not found: {}",
            suite_dir.display()
        )));
    }
    let suite_dir = suite_dir.canonicalize()?;
    let parent = suite_dir.parent().ok_or_else(|| {
        HarnessError::Config(format!(
            "suite directory {} has no parent",
            suite_dir.display()
        ))
    })?;
    let dockerfile = parent.join("Dockerfile");
    if !dockerfile.is_file() {
        return Err(HarnessError::Config(format!(
            "Dockerfile not found at expected location: {}",
            dockerfile.display()
        )));
    }

    let config = load_suite_config(&suite_dir.join("config.yml"))?;
    let aliases = config
        .mock
        .and_then(|mock| mock.network_aliases)
        .map(OneOrMany::into_vec)
        .unwrap_or_default();
    let environment = config
        .nginx
        .and_then(|nginx| nginx.environment)
        .and_then(validate_environment)
        .transpose()?;

    Ok(ComposeFile {
        version: "3.9".to_string(),
        services: Services {
            mock: MockService {
                container_name: "httptests_mock".to_string(),
                image: MOCK_IMAGE.to_string(),
                environment: vec!["HTTP_PORT=80".to_string(), "HTTPS_PORT=443".to_string()],
                networks: MockNetworks {
                    default: AliasBlock { aliases },
                },
            },
            nginx: ProxyService {
                container_name: "httptests_nginx".to_string(),
                build: BuildSpec {
                    context: parent.display().to_string(),
                    dockerfile: "Dockerfile".to_string(),
                },
                ports: vec!["80:80".to_string()],
                networks: vec!["default".to_string()],
                depends_on: vec!["mock".to_string()],
                environment,
            },
        },
    })
}

fn load_suite_config(path: &Path) -> Result<SuiteEnvironment> {
    if !path.is_file() {
        debug!(path = %path.display(), "No suite config, using defaults");
        return Ok(SuiteEnvironment::default());
    }
    let content = fs::read_to_string(path)?;
    let parsed: Option<SuiteEnvironment> = serde_yaml::from_str(&content)
        .map_err(|e| HarnessError::Config(format!("malformed {}: {e}", path.display())))?;
    Ok(parsed.unwrap_or_default())
}

/// The proxy's environment may be a mapping or a sequence, as compose
/// accepts both; anything else is rejected. Explicit null means absent.
fn validate_environment(
    value: serde_yaml::Value,
) -> Option<Result<serde_yaml::Value>> {
    match value {
        serde_yaml::Value::Null => None,
        serde_yaml::Value::Mapping(_) | serde_yaml::Value::Sequence(_) => Some(Ok(value)),
        other => Some(Err(HarnessError::Config(format!(
            "nginx environment must be a mapping or a sequence, got {other:?}"
        )))),
    }
}

/// Serializes the compose description as YAML at `output`, creating parent
/// directories as needed.
pub fn write(compose: &ComposeFile, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(compose)
        .map_err(|e| HarnessError::Config(format!("failed to serialize compose file: {e}")))?;
    fs::write(output, yaml)?;
    info!(output = %output.display(), "Wrote docker compose file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Lays out `<root>/Dockerfile` and `<root>/.httptests/` with an
    /// optional `config.yml`.
    fn suite_with_config(config: Option<&str>) -> (TempDir, std::path::PathBuf) {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("Dockerfile"), "FROM nginx:alpine\n").unwrap();
        let suite = root.path().join(".httptests");
        fs::create_dir(&suite).unwrap();
        if let Some(config) = config {
            fs::write(suite.join("config.yml"), config).unwrap();
        }
        (root, suite)
    }

    #[test]
    fn missing_suite_directory_fails() {
        let err = generate(Path::new("no/such/suite")).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn missing_dockerfile_fails() {
        let root = tempfile::tempdir().unwrap();
        let suite = root.path().join(".httptests");
        fs::create_dir(&suite).unwrap();
        let err = generate(&suite).unwrap_err();
        assert!(matches!(err, HarnessError::Config(message) if message.contains("Dockerfile")));
    }

    #[test]
    fn absent_config_yields_bare_services() {
        let (_root, suite) = suite_with_config(None);
        let compose = generate(&suite).unwrap();
        assert_eq!(compose.version, "3.9");
        assert_eq!(compose.services.mock.image, MOCK_IMAGE);
        assert!(compose.services.mock.networks.default.aliases.is_empty());
        assert!(compose.services.nginx.environment.is_none());
        assert_eq!(compose.services.nginx.depends_on, ["mock"]);
    }

    #[test]
    fn scalar_network_alias_is_accepted() {
        let (_root, suite) = suite_with_config(Some("mock:\n  network_aliases: backend\n"));
        let compose = generate(&suite).unwrap();
        assert_eq!(compose.services.mock.networks.default.aliases, ["backend"]);
    }

    #[test]
    fn alias_sequence_is_kept_in_order() {
        let (_root, suite) = suite_with_config(Some(
            "mock:\n  network_aliases:\n    - backend\n    - api.internal\n",
        ));
        let compose = generate(&suite).unwrap();
        assert_eq!(
            compose.services.mock.networks.default.aliases,
            ["backend", "api.internal"]
        );
    }

    #[test]
    fn proxy_environment_accepts_mapping_and_sequence() {
        let (_root, mapping) = suite_with_config(Some("nginx:\n  environment:\n    DEBUG: \"1\"\n"));
        assert!(generate(&mapping).unwrap().services.nginx.environment.is_some());

        let (_root, sequence) =
            suite_with_config(Some("nginx:\n  environment:\n    - DEBUG=1\n"));
        assert!(generate(&sequence).unwrap().services.nginx.environment.is_some());
    }

    #[test]
    fn scalar_proxy_environment_is_rejected() {
        let (_root, suite) = suite_with_config(Some("nginx:\n  environment: DEBUG\n"));
        let err = generate(&suite).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn empty_config_file_is_treated_as_defaults() {
        let (_root, suite) = suite_with_config(Some(""));
        assert!(generate(&suite).is_ok());
    }

    #[test]
    fn null_sections_are_treated_as_defaults() {
        let (_root, suite) = suite_with_config(Some("mock:\nnginx:\n"));
        let compose = generate(&suite).unwrap();
        assert!(compose.services.mock.networks.default.aliases.is_empty());
    }

    #[test]
    fn written_file_round_trips_as_yaml() {
        let (_root, suite) = suite_with_config(Some("mock:\n  network_aliases: backend\n"));
        let compose = generate(&suite).unwrap();
        let output = suite.join("out/docker-compose.yml");
        write(&compose, &output).unwrap();

        let parsed: serde_yaml::Value =
            serde_yaml::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(parsed["services"]["mock"]["container_name"], "httptests_mock");
        assert_eq!(
            parsed["services"]["mock"]["networks"]["default"]["aliases"][0],
            "backend"
        );
        assert_eq!(parsed["services"]["nginx"]["ports"][0], "80:80");
    }
}
