use thiserror::Error;

use crate::config::{HostingConfig, Source};

pub const MAIN_STACK_PREFIX: &str = "hosting-main";
pub const CONNECTION_STACK_PREFIX: &str = "hosting-connection";

const MAX_STACK_NAME_LENGTH: usize = 128;
const MAX_PIPELINE_NAME_LENGTH: usize = 100;
const MAX_BUILD_NAME_LENGTH: usize = 150;
const MAX_ACTION_NAME_LENGTH: usize = 100;
const MAX_PROVIDER_CONNECTION_LENGTH: usize = 32;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid repository URL: {0}")]
    InvalidRepoUrl(String),
}

/// Owner/name pair extracted from a repository URL.
#[derive(Debug, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
}

/// Parse a GitHub repository URL in either HTTPS (`https://github.com/OWNER/NAME.git`)
/// or SSH (`git@github.com:OWNER/NAME.git`) form.
pub fn parse_repo_url(url: &str) -> Result<RepoCoordinates, Error> {
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("git@github.com:"))
        .ok_or_else(|| Error::InvalidRepoUrl(url.to_string()))?;

    let rest = rest
        .strip_suffix(".git")
        .ok_or_else(|| Error::InvalidRepoUrl(url.to_string()))?;

    match rest.split('/').collect::<Vec<_>>().as_slice() {
        [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(RepoCoordinates {
            owner: owner.to_string(),
            name: name.to_string(),
        }),
        _ => Err(Error::InvalidRepoUrl(url.to_string())),
    }
}

pub fn is_valid_repo_url(url: &str) -> bool {
    parse_repo_url(url).is_ok()
}

/// Sanitize a raw string into a stack-style resource name: every character
/// outside `[A-Za-z0-9]` becomes a hyphen, the result is truncated to
/// `max_length`, trailing hyphens are stripped, and a non-alphabetic first
/// character is replaced with `A`.
fn sanitize(raw: &str, max_length: usize) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    name.truncate(max_length);

    while name.ends_with('-') {
        name.pop();
    }

    match name.chars().next() {
        Some(first) if first.is_ascii_alphabetic() => name,
        Some(_) => {
            name.replace_range(0..1, "A");
            name
        }
        None => "A".to_string(),
    }
}

/// Name of the stack holding the CDN distribution, origin and pipeline.
///
/// Repository sources derive it from the repository and branch names, bucket
/// sources from the bucket name directly. The same configuration always
/// yields the same name, which is what makes re-deploys idempotent.
pub fn main_stack_name(config: &HostingConfig) -> Result<String, Error> {
    let raw = match &config.source {
        Source::Repository {
            repo_url,
            branch_name,
            ..
        } => {
            let repo = parse_repo_url(repo_url)?;
            format!("{}-{}-{}", MAIN_STACK_PREFIX, repo.name, branch_name)
        }
        Source::Bucket { bucket, .. } => bucket.clone(),
    };
    Ok(sanitize(&raw, MAX_STACK_NAME_LENGTH))
}

/// Name of the stack holding the source-repository connection resources.
pub fn connection_stack_name(repo_url: &str, branch_name: &str) -> Result<String, Error> {
    let repo = parse_repo_url(repo_url)?;
    let raw = format!(
        "{}-{}-{}-{}",
        CONNECTION_STACK_PREFIX, repo.name, branch_name, repo.owner
    );
    Ok(sanitize(&raw, MAX_STACK_NAME_LENGTH))
}

pub fn pipeline_name(config: &HostingConfig) -> Result<String, Error> {
    Ok(sanitize(&main_stack_name(config)?, MAX_PIPELINE_NAME_LENGTH))
}

pub fn build_project_name(config: &HostingConfig) -> Result<String, Error> {
    Ok(sanitize(&main_stack_name(config)?, MAX_BUILD_NAME_LENGTH))
}

pub fn action_name(raw: &str) -> String {
    sanitize(raw, MAX_ACTION_NAME_LENGTH)
}

/// Name for the provider-side repository connection. The provider imposes a
/// hard 32-character limit and accepts characters stack names do not, so this
/// is a plain truncation with no sanitization.
pub fn provider_connection_name(repo_url: &str, branch_name: &str) -> Result<String, Error> {
    let repo = parse_repo_url(repo_url)?;
    let mut name = format!("{}-{}-{}", repo.name, branch_name, repo.owner);
    if let Some((idx, _)) = name.char_indices().nth(MAX_PROVIDER_CONNECTION_LENGTH) {
        name.truncate(idx);
    }
    Ok(name)
}

/// Keys published to the parameter store by the provisioning backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    DomainName,
    PipelineName,
    ConnectionArn,
    ConnectionName,
    ConnectionRegion,
}

impl Parameter {
    pub fn key(&self) -> &'static str {
        match self {
            Parameter::DomainName => "DomainName",
            Parameter::PipelineName => "PipelineName",
            Parameter::ConnectionArn => "ConnectionArn",
            Parameter::ConnectionName => "ConnectionName",
            Parameter::ConnectionRegion => "ConnectionRegion",
        }
    }

    fn is_connection_scoped(&self) -> bool {
        matches!(
            self,
            Parameter::ConnectionArn | Parameter::ConnectionName | Parameter::ConnectionRegion
        )
    }
}

/// Full parameter-store path for a key: `/<stack>/<key>`. Connection keys are
/// namespaced under the connection stack for repository sources; everything
/// else lives under the main stack.
pub fn parameter_path(config: &HostingConfig, parameter: Parameter) -> Result<String, Error> {
    let stack = match &config.source {
        Source::Repository {
            repo_url,
            branch_name,
            ..
        } if parameter.is_connection_scoped() => connection_stack_name(repo_url, branch_name)?,
        _ => main_stack_name(config)?,
    };
    Ok(format!("/{}/{}", stack, parameter.key()))
}

/// Pair a domain name with its `www.`-toggled counterpart. Certificates and
/// DNS checks always consider both forms together.
pub fn domain_variants(domain_name: &str) -> [String; 2] {
    match domain_name.strip_prefix("www.") {
        Some(bare) => [domain_name.to_string(), bare.to_string()],
        None => [domain_name.to_string(), format!("www.{domain_name}")],
    }
}

pub fn is_valid_domain_name(domain_name: &str) -> bool {
    let lowered = domain_name.to_ascii_lowercase();
    let Some((body, tld)) = lowered.rsplit_once('.') else {
        return false;
    };
    if !(2..=6).contains(&tld.len()) || !tld.bytes().all(|b| b.is_ascii_alphabetic()) {
        return false;
    }
    if body.is_empty() {
        return false;
    }
    // body: alphanumeric labels joined by single '-' or '.'
    let mut expect_label = true;
    for c in body.chars() {
        if c.is_ascii_alphanumeric() {
            expect_label = false;
        } else if (c == '-' || c == '.') && !expect_label {
            expect_label = true;
        } else {
            return false;
        }
    }
    !expect_label
}

/// Storage-bucket naming rules, matching the provider's published constraints.
pub fn is_valid_bucket_name(bucket_name: &str) -> bool {
    let len = bucket_name.len();
    if !(3..=63).contains(&len) {
        return false;
    }
    if !bucket_name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return false;
    }
    let first = bucket_name.as_bytes()[0];
    let last = bucket_name.as_bytes()[len - 1];
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return false;
    }
    if bucket_name.contains("..") {
        return false;
    }
    if is_ip_address(bucket_name) {
        return false;
    }
    if bucket_name.starts_with("xn--") || bucket_name.starts_with("sthree-") {
        return false;
    }
    if bucket_name.ends_with("-s3alias") || bucket_name.ends_with("--ol-s3") {
        return false;
    }
    true
}

fn is_ip_address(s: &str) -> bool {
    let octets: Vec<&str> = s.split('.').collect();
    octets.len() == 4
        && octets
            .iter()
            .all(|o| !o.is_empty() && o.bytes().all(|b| b.is_ascii_digit()))
}

/// Bucket path prefixes must not start or end with a separator.
pub fn is_valid_path_prefix(prefix: &str) -> bool {
    !prefix.starts_with('/') && !prefix.ends_with('/')
}
