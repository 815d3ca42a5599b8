//! File-based secret staging for the restic environment.
//!
//! Restic and its storage backends are configured entirely through
//! environment variables. On top of the variables restic honors natively,
//! this crate supports a `*_FILE` twin for each credential: the variable
//! names a mounted file (typically a Docker secret under `/run/secrets`)
//! whose first line is read and surfaced under the unsuffixed name,
//! restricted to the child process environment. Secret values never touch
//! the command line.
//!
//! Every function that consults the environment takes it as a parameter;
//! the `*_from_env` wrappers capture the process environment once at the
//! call site, so tests never mutate process state.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Suffix marking a variable as a file-based secret.
const FILE_SUFFIX: &str = "_FILE";

/// Errors from staging the restic environment.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// Neither the repository variable nor its file twin is set.
    #[error("either 'RESTIC_REPOSITORY' or 'RESTIC_REPOSITORY_FILE' needs to be set")]
    MissingRepository,

    /// Neither the password variable nor its file twin is set.
    #[error("either 'RESTIC_PASSWORD' or 'RESTIC_PASSWORD_FILE' needs to be set")]
    MissingPassword,

    /// A referenced secret file could not be read.
    #[error("could not read secret '{name}' from '{path}'")]
    UnreadableSecret {
        name: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The supported file-based secrets and their descriptions.
///
/// Each entry names a `*_FILE` variable whose referenced file is read and
/// exposed under the unsuffixed name.
pub fn supported_secrets() -> &'static [(&'static str, &'static str)] {
    &[
        ("RESTIC_REPOSITORY_FILE", "Name of file containing the repository location"),
        ("RESTIC_PASSWORD_FILE", "Name of file containing the restic password"),
        ("AWS_ACCESS_KEY_ID_FILE", "Name of file containing the Amazon S3 access key ID"),
        ("AWS_SECRET_ACCESS_KEY_FILE", "Name of file containing the Amazon S3 secret access key"),
        ("ST_USER_FILE", "Name of file containing the Username for keystone v1 authentication"),
        ("ST_KEY_FILE", "Name of file containing the Password for keystone v1 authentication"),
        ("OS_USERNAME_FILE", "Name of file containing the Username for keystone authentication"),
        ("OS_PASSWORD_FILE", "Name of file containing the Password for keystone authentication"),
        ("OS_TENANT_ID_FILE", "Name of file containing the Tenant ID for keystone v2 authentication"),
        ("OS_TENANT_NAME_FILE", "Name of file containing the Tenant name for keystone v2 authentication"),
        ("OS_USER_DOMAIN_NAME_FILE", "Name of file containing the User domain name for keystone authentication"),
        ("OS_PROJECT_NAME_FILE", "Name of file containing the Project name for keystone authentication"),
        ("OS_PROJECT_DOMAIN_NAME_FILE", "Name of file containing the Project domain name for keystone authentication"),
        ("OS_APPLICATION_CREDENTIAL_ID_FILE", "Name of file containing the Application Credential ID (keystone v3)"),
        ("OS_APPLICATION_CREDENTIAL_NAME_FILE", "Name of file containing the Application Credential Name (keystone v3)"),
        ("OS_APPLICATION_CREDENTIAL_SECRET_FILE", "Name of file containing the Application Credential Secret (keystone v3)"),
        ("OS_AUTH_TOKEN_FILE", "Name of file containing the Auth token for token authentication"),
        ("B2_ACCOUNT_ID_FILE", "Name of file containing the Account ID or applicationKeyId for Backblaze B2"),
        ("B2_ACCOUNT_KEY_FILE", "Name of file containing the Account Key or applicationKey for Backblaze B2"),
        ("AZURE_ACCOUNT_NAME_FILE", "Name of file containing the Account name for Azure"),
        ("AZURE_ACCOUNT_KEY_FILE", "Name of file containing the Account key for Azure"),
        ("GOOGLE_PROJECT_ID_FILE", "Name of file containing the Project ID for Google Cloud Storage"),
    ]
}

/// The environment variables restic honors natively.
pub fn supported_variables() -> &'static [(&'static str, &'static str)] {
    &[
        ("RESTIC_LOGLEVEL", "Level of logging to use: error, warn, info, debug, trace"),
        ("RESTIC_LOGFORMAT", "Log format to use: default, pretty, json"),
        ("RESTIC_BACKUP_PATH", "Local path to backup"),
        ("RESTIC_HOST", "Hostname to use in backups (defaults to $HOSTNAME)"),
        ("RESTIC_REPOSITORY", "Location of the repository"),
        ("RESTIC_PASSWORD", "The actual password for the repository"),
        ("RESTIC_PASSWORD_COMMAND", "Command printing the password for the repository to stdout"),
        ("RESTIC_KEY_HINT", "ID of key to try decrypting first, before other keys"),
        ("RESTIC_CACHE_DIR", "Location of the cache directory"),
        ("RESTIC_PROGRESS_FPS", "Frames per second by which the progress bar is updated"),
        ("TMPDIR", "Location for temporary files"),
        ("AWS_ACCESS_KEY_ID", "Amazon S3 access key ID"),
        ("AWS_SECRET_ACCESS_KEY", "Amazon S3 secret access key"),
        ("AWS_DEFAULT_REGION", "Amazon S3 default region"),
        ("ST_AUTH", "Auth URL for keystone v1 authentication"),
        ("ST_USER", "Username for keystone v1 authentication"),
        ("ST_KEY", "Password for keystone v1 authentication"),
        ("OS_AUTH_URL", "Auth URL for keystone authentication"),
        ("OS_REGION_NAME", "Region name for keystone authentication"),
        ("OS_USERNAME", "Username for keystone authentication"),
        ("OS_PASSWORD", "Password for keystone authentication"),
        ("OS_TENANT_ID", "Tenant ID for keystone v2 authentication"),
        ("OS_TENANT_NAME", "Tenant name for keystone v2 authentication"),
        ("OS_USER_DOMAIN_NAME", "User domain name for keystone authentication"),
        ("OS_PROJECT_NAME", "Project name for keystone authentication"),
        ("OS_PROJECT_DOMAIN_NAME", "Project domain name for keystone authentication"),
        ("OS_APPLICATION_CREDENTIAL_ID", "Application Credential ID (keystone v3)"),
        ("OS_APPLICATION_CREDENTIAL_NAME", "Application Credential Name (keystone v3)"),
        ("OS_APPLICATION_CREDENTIAL_SECRET", "Application Credential Secret (keystone v3)"),
        ("OS_STORAGE_URL", "Storage URL for token authentication"),
        ("OS_AUTH_TOKEN", "Auth token for token authentication"),
        ("B2_ACCOUNT_ID", "Account ID or applicationKeyId for Backblaze B2"),
        ("B2_ACCOUNT_KEY", "Account Key or applicationKey for Backblaze B2"),
        ("AZURE_ACCOUNT_NAME", "Account name for Azure"),
        ("AZURE_ACCOUNT_KEY", "Account key for Azure"),
        ("GOOGLE_PROJECT_ID", "Project ID for Google Cloud Storage"),
        ("GOOGLE_APPLICATION_CREDENTIALS", "Application Credentials for Google Cloud Storage"),
        ("RCLONE_BWLIMIT", "rclone bandwidth limit"),
    ]
}

/// A row in the variable overview produced by [`list_variables`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableStatus {
    pub name: &'static str,
    pub set: bool,
    pub description: &'static str,
}

/// Capture the process environment as a map, preserving key case.
pub fn env_map() -> HashMap<String, String> {
    std::env::vars().collect()
}

fn is_supported_secret(key: &str) -> bool {
    supported_secrets()
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case(key))
}

fn env_has(env: &HashMap<String, String>, name: &str) -> bool {
    env.keys().any(|key| key.eq_ignore_ascii_case(name))
}

/// Read a secret value from a file: the first line, without the newline.
pub async fn read_secret(path: &Path) -> std::io::Result<String> {
    let content = fs::read_to_string(path).await?;
    Ok(content.lines().next().unwrap_or_default().to_string())
}

/// Resolve every supported `*_FILE` secret present in `env` to a
/// `NAME=value` pair, with the `_FILE` suffix stripped from the name.
///
/// An unreadable secret file is an error; secrets are never silently
/// skipped.
pub async fn init_secrets(
    env: &HashMap<String, String>,
) -> Result<Vec<(String, String)>, SecretsError> {
    let mut secrets = Vec::new();
    for (key, path) in env {
        if !is_supported_secret(key) {
            continue;
        }
        let value =
            read_secret(Path::new(path))
                .await
                .map_err(|source| SecretsError::UnreadableSecret {
                    name: key.clone(),
                    path: path.clone(),
                    source,
                })?;
        let upper = key.to_uppercase();
        let name = upper.strip_suffix(FILE_SUFFIX).unwrap_or(&upper).to_string();
        debug!(secret = %name, "staged secret from file");
        secrets.push((name, value));
    }
    Ok(secrets)
}

/// Validate that both a repository and a password are configured, either
/// directly or through their file twins.
pub fn validate_prerequisites(env: &HashMap<String, String>) -> Result<(), SecretsError> {
    if !env_has(env, "RESTIC_REPOSITORY") && !env_has(env, "RESTIC_REPOSITORY_FILE") {
        return Err(SecretsError::MissingRepository);
    }
    if !env_has(env, "RESTIC_PASSWORD") && !env_has(env, "RESTIC_PASSWORD_FILE") {
        return Err(SecretsError::MissingPassword);
    }
    Ok(())
}

/// Build the child environment for a restic invocation: the given
/// environment minus the `*_FILE` keys themselves, merged with the staged
/// secrets. Prerequisites are validated first.
pub async fn stage_env(
    env: &HashMap<String, String>,
) -> Result<HashMap<String, String>, SecretsError> {
    validate_prerequisites(env)?;
    let secrets = init_secrets(env).await?;

    let mut staged: HashMap<String, String> = env
        .iter()
        .filter(|(key, _)| !is_supported_secret(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    staged.extend(secrets);

    Ok(staged)
}

/// [`stage_env`] over the current process environment.
pub async fn stage_env_from_process() -> Result<HashMap<String, String>, SecretsError> {
    stage_env(&env_map()).await
}

/// Rows of (name, set, description) over both variable tables, sorted by
/// name. Unset variables are included only when `all` is set.
pub fn list_variables(env: &HashMap<String, String>, all: bool) -> Vec<VariableStatus> {
    let mut rows: Vec<VariableStatus> = supported_secrets()
        .iter()
        .chain(supported_variables())
        .map(|&(name, description)| VariableStatus {
            name,
            set: env_has(env, name),
            description,
        })
        .filter(|row| row.set || all)
        .collect();
    rows.sort_by_key(|row| row.name);
    rows
}
