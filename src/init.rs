use std::path::Path;

use log::{debug, info};
use thiserror::Error;

use crate::config::{self, HostingConfig, Source};
use crate::naming;
use crate::prompt::{self, Prompter};

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration: {0}")]
    Config(#[from] config::Error),

    #[error(transparent)]
    Prompt(#[from] prompt::Error),

    #[error("kept the existing configuration")]
    Declined,
}

/// Interactive setup: detect what we can from the working tree, ask about the
/// rest, and write the configuration file. Always writes a complete record.
pub fn run(project_dir: &Path, use_bucket: bool, prompter: &dyn Prompter) -> Result<HostingConfig, Error> {
    if config::exists(project_dir) {
        let overwrite = prompter.confirm(
            "A hosting configuration already exists here. Replace it?",
            false,
        )?;
        if !overwrite {
            return Err(Error::Declined);
        }
    }

    let source = if use_bucket {
        ask_bucket_source(prompter)?
    } else {
        ask_repository_source(project_dir, prompter)?
    };

    let (domain_name, hosted_zone_id) = ask_domain(prompter)?;

    let hosting = HostingConfig {
        source,
        domain_name,
        hosted_zone_id,
    };
    config::save(project_dir, &hosting)?;
    info!(
        "wrote hosting configuration to {}",
        config::config_file_path(project_dir).display()
    );
    Ok(hosting)
}

fn ask_repository_source(project_dir: &Path, prompter: &dyn Prompter) -> Result<Source, Error> {
    let detected_url = detect_remote_url(project_dir);
    let detected_branch = detect_branch(project_dir).unwrap_or_else(|| "main".to_string());

    let repo_url = loop {
        let answer = prompter.input("GitHub repository URL", detected_url.as_deref())?;
        if naming::is_valid_repo_url(&answer) {
            break answer;
        }
        println!(
            "Expected https://github.com/OWNER/NAME.git or git@github.com:OWNER/NAME.git."
        );
    };

    let branch_name = prompter.input("Branch to deploy", Some(&detected_branch))?;

    let detected_framework = detect_framework(project_dir);
    let framework = prompter.input("Frontend framework", Some(&detected_framework))?;

    Ok(Source::Repository {
        repo_url,
        branch_name,
        framework,
    })
}

fn ask_bucket_source(prompter: &dyn Prompter) -> Result<Source, Error> {
    let bucket = loop {
        let answer = prompter.input("Bucket holding your site archive", None)?;
        if naming::is_valid_bucket_name(&answer) {
            break answer;
        }
        println!("That is not a valid bucket name.");
    };

    let path_prefix = loop {
        let answer = prompter.input("Path to the archive inside the bucket", Some(""))?;
        if naming::is_valid_path_prefix(&answer) {
            break answer;
        }
        println!("The path must not start or end with '/'.");
    };

    Ok(Source::Bucket {
        bucket,
        path_prefix,
    })
}

fn ask_domain(prompter: &dyn Prompter) -> Result<(Option<String>, Option<String>), Error> {
    if !prompter.confirm("Serve the site on a custom domain?", false)? {
        return Ok((None, None));
    }

    let domain_name = loop {
        let answer = prompter.input("Domain name (e.g. www.example.com)", None)?;
        if naming::is_valid_domain_name(&answer) {
            break answer;
        }
        println!("That is not a valid domain name.");
    };

    let hosted_zone_id = if prompter.confirm(
        "Is the domain managed by a Route 53 hosted zone in this account?",
        false,
    )? {
        Some(prompter.input("Hosted zone ID", None)?)
    } else {
        None
    };

    Ok((Some(domain_name), hosted_zone_id))
}

/// Origin remote URL from `.git/config`, when the project is a git checkout.
fn detect_remote_url(project_dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(project_dir.join(".git/config")).ok()?;
    let mut in_origin = false;
    for line in raw.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_origin = line == "[remote \"origin\"]";
            continue;
        }
        if in_origin {
            if let Some(url) = line.strip_prefix("url") {
                let url = url.trim_start().strip_prefix('=')?.trim();
                debug!("detected origin remote {url}");
                return Some(url.to_string());
            }
        }
    }
    None
}

/// Currently checked-out branch from `.git/HEAD`.
fn detect_branch(project_dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(project_dir.join(".git/HEAD")).ok()?;
    let branch = raw.trim().strip_prefix("ref: refs/heads/")?.to_string();
    debug!("detected branch {branch}");
    Some(branch)
}

/// Best-effort framework detection from `package.json` dependencies. Projects
/// without one are plain static sites.
fn detect_framework(project_dir: &Path) -> String {
    let Ok(raw) = std::fs::read_to_string(project_dir.join("package.json")) else {
        return "basic".to_string();
    };
    let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return "basic".to_string();
    };

    let has_dependency = |name: &str| {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|section| manifest.get(section).and_then(|deps| deps.get(name)).is_some())
    };

    if has_dependency("next") {
        "nextjs".to_string()
    } else if has_dependency("react") {
        "reactjs".to_string()
    } else if has_dependency("vue") {
        "vuejs".to_string()
    } else if has_dependency("@angular/core") {
        "angular".to_string()
    } else {
        "basic".to_string()
    }
}
