use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;
use tokio::sync::watch;

use crate::aws::{self, AliasLookup, ConnectionState, ControlPlane};
use crate::certificate;
use crate::config::{self, HostingConfig, Source};
use crate::naming::{self, Parameter};
use crate::pipeline;
use crate::poll::Poller;
use crate::prompt::{self, Prompter};
use crate::provision::{self, Provisioner, StackContext};

const PIPELINE_POLL_INTERVAL: Duration = Duration::from_secs(10);
const CERTIFICATE_POLL_INTERVAL: Duration = Duration::from_secs(10);
const VALIDATION_POLL_INTERVAL: Duration = Duration::from_secs(10);
const VALIDATION_MAX_ATTEMPTS: u32 = 10;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot reach the cloud provider, check your credentials and network: {0}")]
    NoConnectivity(aws::Error),

    #[error(transparent)]
    Cloud(#[from] aws::Error),

    #[error(transparent)]
    Naming(#[from] naming::Error),

    #[error("provisioning: {0}")]
    Provision(#[from] provision::Error),

    #[error(transparent)]
    Prompt(#[from] prompt::Error),

    #[error("certificate: {0}")]
    Certificate(#[from] certificate::Error),

    #[error("pipeline: {0}")]
    Pipeline(#[from] pipeline::Error),

    #[error("bucket '{0}' does not exist, create it and upload your site archive first")]
    BucketMissing(String),

    #[error("expected parameter {0} was not published by the provisioning backend")]
    MissingParameter(String),

    #[error("repository connection {0} was not found")]
    ConnectionNotFound(String),

    #[error("the repository connection is still pending, complete the handshake and deploy again")]
    ConnectionNotCompleted,

    #[error("aborted")]
    Declined,
}

/// One deployment run over a loaded configuration. Every external effect
/// goes through the injected control plane, provisioner and prompter.
pub struct Deployment<'a> {
    config: &'a HostingConfig,
    project_dir: PathBuf,
    cloud: &'a dyn ControlPlane,
    backend: &'a dyn Provisioner,
    prompter: &'a dyn Prompter,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a> Deployment<'a> {
    pub fn new(
        config: &'a HostingConfig,
        project_dir: PathBuf,
        cloud: &'a dyn ControlPlane,
        backend: &'a dyn Provisioner,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            config,
            project_dir,
            cloud,
            backend,
            prompter,
            cancel: None,
        }
    }

    /// Long waits observe this signal and unwind cleanly when it fires.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Bring the hosting infrastructure in line with the configuration and
    /// run the pipeline to completion. Safe to re-run; every phase either
    /// converges or skips work that is already done.
    pub async fn run(&self) -> Result<(), Error> {
        let identity = self
            .cloud
            .check_identity()
            .await
            .map_err(Error::NoConnectivity)?;
        info!(
            "deploying as {} in account {}",
            identity.arn, identity.account
        );

        let certificate_arn = match &self.config.domain_name {
            Some(domain) => Some(self.ensure_certificate(domain).await?),
            None => None,
        };

        self.backend.bootstrap()?;

        let context = StackContext {
            config_dir: config::tool_dir(&self.project_dir),
            certificate_arn,
        };

        match &self.config.source {
            Source::Repository {
                repo_url,
                branch_name,
                ..
            } => {
                let connection_stack = naming::connection_stack_name(repo_url, branch_name)?;
                self.backend.deploy(&connection_stack, &context)?;
                self.await_connection().await?;
            }
            Source::Bucket { bucket, .. } => {
                if !self.cloud.bucket_exists(bucket).await {
                    return Err(Error::BucketMissing(bucket.clone()));
                }
            }
        }

        let main_stack = naming::main_stack_name(self.config)?;
        self.backend.deploy(&main_stack, &context)?;

        let site_url = self.site_url().await?;
        if let Some(domain) = &self.config.domain_name {
            self.associate_domain(domain, &site_url).await?;
        }
        self.print_summary(&site_url);

        let pipeline_name = naming::pipeline_name(self.config)?;
        pipeline::start(self.cloud, &pipeline_name).await?;
        let mut poller = self.poller(PIPELINE_POLL_INTERVAL);
        let status = pipeline::wait_for_completion(self.cloud, &mut poller, &pipeline_name).await?;
        pipeline::report(&status, &pipeline_name);
        Ok(())
    }

    /// Tear everything down again: stacks first, then the DNS record and
    /// certificate that were created alongside them.
    pub async fn destroy(&self) -> Result<(), Error> {
        self.cloud
            .check_identity()
            .await
            .map_err(Error::NoConnectivity)?;

        let question = "This deletes all hosting infrastructure for this project. Continue?";
        if !self.prompter.confirm(question, false)? {
            return Err(Error::Declined);
        }

        let certificate = match &self.config.domain_name {
            Some(domain) => self.cloud.find_certificate(domain).await?,
            None => None,
        };
        // The distribution URL disappears with the stack, read it up front.
        let site_url = {
            let path = naming::parameter_path(self.config, Parameter::DomainName)?;
            self.cloud.read_parameter(&path).await?
        };

        let context = StackContext {
            config_dir: config::tool_dir(&self.project_dir),
            certificate_arn: None,
        };
        self.backend.destroy_all(&context)?;

        if let (Some(domain), Some(zone), Some(url)) = (
            &self.config.domain_name,
            &self.config.hosted_zone_id,
            &site_url,
        ) {
            let target = url.strip_prefix("https://").unwrap_or(url);
            match self.cloud.lookup_alias(zone, domain, target).await? {
                AliasLookup::Matches => {
                    self.cloud.delete_alias(zone, domain, target).await?;
                    info!("deleted alias record for {domain}");
                }
                AliasLookup::Conflict { existing } => {
                    warn!("record for {domain} points at {existing}, leaving it untouched");
                }
                AliasLookup::Missing => {}
            }
        }

        // The certificate is detached once the stacks are gone.
        if let Some(certificate) = certificate {
            self.cloud.delete_certificate(&certificate.arn).await?;
            info!("deleted certificate {}", certificate.arn);
        }

        println!("All hosting infrastructure has been removed.");
        Ok(())
    }

    /// Print the configuration alongside what is actually live: the
    /// distribution URL, and the custom-domain mapping once certificate and
    /// DNS are in place.
    pub async fn show(&self) -> Result<(), Error> {
        self.cloud
            .check_identity()
            .await
            .map_err(Error::NoConnectivity)?;

        println!("Source: {}", self.config.origin_label());
        let path = naming::parameter_path(self.config, Parameter::DomainName)?;
        let Some(url) = self.cloud.read_parameter(&path).await? else {
            println!("The site has not been deployed yet.");
            return Ok(());
        };
        println!("URL:    {url}");

        if let Some(domain) = &self.config.domain_name {
            if self.domain_is_live(domain, &url).await? {
                println!("Domain: https://{domain} -> {url}");
            } else {
                println!("Domain: {domain} (not serving yet)");
            }
        }
        Ok(())
    }

    /// Follow the pipeline until it leaves the in-progress state and report
    /// where it ended up.
    pub async fn status(&self) -> Result<(), Error> {
        self.cloud
            .check_identity()
            .await
            .map_err(Error::NoConnectivity)?;

        let pipeline_name = naming::pipeline_name(self.config)?;
        let mut poller = self.poller(PIPELINE_POLL_INTERVAL);
        let status = pipeline::wait_for_completion(self.cloud, &mut poller, &pipeline_name).await?;
        pipeline::report(&status, &pipeline_name);
        Ok(())
    }

    /// The domain only serves traffic once its certificate is issued and,
    /// for zone-managed domains, the alias record points at the distribution.
    async fn domain_is_live(&self, domain: &str, site_url: &str) -> Result<bool, Error> {
        let issued = matches!(
            self.cloud.find_certificate(domain).await?,
            Some(certificate) if certificate.status.is_issued()
        );
        if !issued {
            return Ok(false);
        }
        match &self.config.hosted_zone_id {
            Some(zone) => {
                let target = site_url.strip_prefix("https://").unwrap_or(site_url);
                Ok(self.cloud.lookup_alias(zone, domain, target).await? == AliasLookup::Matches)
            }
            None => Ok(true),
        }
    }

    async fn ensure_certificate(&self, domain: &str) -> Result<String, Error> {
        let mut validation =
            self.bounded_poller(VALIDATION_POLL_INTERVAL, VALIDATION_MAX_ATTEMPTS);
        let mut issuance = self.poller(CERTIFICATE_POLL_INTERVAL);
        let arn = certificate::ensure(
            self.cloud,
            self.prompter,
            &mut validation,
            &mut issuance,
            domain,
            self.config.hosted_zone_id.as_deref(),
        )
        .await?;
        Ok(arn)
    }

    /// Repository sources cannot build until the user approves the
    /// provider-side connection in the console, which only a human can do.
    async fn await_connection(&self) -> Result<(), Error> {
        let arn_path = naming::parameter_path(self.config, Parameter::ConnectionArn)?;
        let Some(arn) = self.cloud.read_parameter(&arn_path).await? else {
            return Err(Error::MissingParameter(arn_path));
        };

        loop {
            match self.cloud.connection_state(&arn).await? {
                Some(ConnectionState::Available) => return Ok(()),
                Some(ConnectionState::Pending) => {
                    println!("\nThe repository connection is pending approval.");
                    println!(
                        "Open the connections page in the provider console and complete the handshake for:"
                    );
                    println!("  {arn}\n");
                    if !self
                        .prompter
                        .confirm("Have you completed the connection setup?", true)?
                    {
                        return Err(Error::ConnectionNotCompleted);
                    }
                }
                Some(ConnectionState::Other(state)) => {
                    warn!("repository connection {arn} is in state {state}");
                    return Ok(());
                }
                None => return Err(Error::ConnectionNotFound(arn)),
            }
        }
    }

    async fn associate_domain(&self, domain: &str, site_url: &str) -> Result<(), Error> {
        let target = site_url.strip_prefix("https://").unwrap_or(site_url);
        match &self.config.hosted_zone_id {
            Some(zone) => match self.cloud.lookup_alias(zone, domain, target).await? {
                AliasLookup::Matches => {
                    info!("alias record for {domain} already points at the distribution");
                }
                AliasLookup::Conflict { existing } => {
                    warn!(
                        "a record for {domain} already exists pointing at {existing}, leaving it untouched"
                    );
                }
                AliasLookup::Missing => {
                    let question = format!("Create a DNS record pointing {domain} at {target}?");
                    if self.prompter.confirm(&question, true)? {
                        self.cloud.create_alias(zone, domain, target).await?;
                        info!("created alias record for {domain}");
                    } else {
                        println!(
                            "Skipped. Point {domain} at {target} yourself to serve the site on your domain."
                        );
                    }
                }
            },
            None => {
                println!("\nTo serve the site on {domain}, create a CNAME record with your DNS provider:");
                println!("  Name:  {domain}");
                println!("  Value: {target}\n");
            }
        }
        Ok(())
    }

    /// The distribution URL the provisioning backend published for this
    /// deployment.
    pub async fn site_url(&self) -> Result<String, Error> {
        let path = naming::parameter_path(self.config, Parameter::DomainName)?;
        self.cloud
            .read_parameter(&path)
            .await?
            .ok_or(Error::MissingParameter(path))
    }

    fn print_summary(&self, site_url: &str) {
        println!("\nYour site is deployed from {}", self.config.origin_label());
        println!("Distribution URL: {site_url}");
        if let Some(domain) = &self.config.domain_name {
            println!("Custom domain:    https://{domain}");
        }
        println!();
    }

    fn poller(&self, interval: Duration) -> Poller {
        let poller = Poller::new(interval);
        match &self.cancel {
            Some(rx) => poller.with_cancel(rx.clone()),
            None => poller,
        }
    }

    fn bounded_poller(&self, interval: Duration, max_attempts: u32) -> Poller {
        let poller = Poller::bounded(interval, max_attempts);
        match &self.cancel {
            Some(rx) => poller.with_cancel(rx.clone()),
            None => poller,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::{
        CertificateDetail, CertificateRecord, CertificateStatus, Identity, ValidationRecord,
    };
    use crate::pipeline::{PipelineState, PipelineStatus};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct MockCloud {
        offline: bool,
        buckets: Vec<String>,
        certificate: Option<CertificateRecord>,
        parameters: HashMap<String, String>,
        alias: AliasLookup,
        pipeline_states: Mutex<VecDeque<PipelineStatus>>,
        pipelines_started: AtomicU32,
        aliases_created: AtomicU32,
        aliases_deleted: AtomicU32,
        certificates_requested: AtomicU32,
        certificates_deleted: AtomicU32,
    }

    impl MockCloud {
        fn new() -> Self {
            Self {
                offline: false,
                buckets: vec![],
                certificate: None,
                parameters: HashMap::new(),
                alias: AliasLookup::Missing,
                pipeline_states: Mutex::new(VecDeque::new()),
                pipelines_started: AtomicU32::new(0),
                aliases_created: AtomicU32::new(0),
                aliases_deleted: AtomicU32::new(0),
                certificates_requested: AtomicU32::new(0),
                certificates_deleted: AtomicU32::new(0),
            }
        }

        fn with_pipeline_states(self, states: &[PipelineState]) -> Self {
            let statuses = states
                .iter()
                .map(|state| PipelineStatus {
                    state: *state,
                    stage: "Deploy".to_string(),
                })
                .collect();
            *self.pipeline_states.lock().unwrap() = statuses;
            self
        }
    }

    #[async_trait]
    impl ControlPlane for MockCloud {
        async fn check_identity(&self) -> Result<Identity, aws::Error> {
            if self.offline {
                // Which error does not matter, only that the preflight fails.
                return Err(aws::Error::MissingCertificateArn);
            }
            Ok(Identity {
                account: "123456789012".to_string(),
                arn: "arn:aws:iam::123456789012:user/test".to_string(),
            })
        }
        async fn bucket_exists(&self, bucket_name: &str) -> bool {
            self.buckets.iter().any(|b| b == bucket_name)
        }
        async fn find_certificate(
            &self,
            _domain_name: &str,
        ) -> Result<Option<CertificateRecord>, aws::Error> {
            Ok(self.certificate.clone())
        }
        async fn request_certificate(&self, _domain_name: &str) -> Result<String, aws::Error> {
            self.certificates_requested.fetch_add(1, Ordering::SeqCst);
            Ok("arn:new".to_string())
        }
        async fn describe_certificate(&self, _arn: &str) -> Result<CertificateDetail, aws::Error> {
            Ok(CertificateDetail {
                status: CertificateStatus::Issued,
                validation_record: Some(ValidationRecord {
                    name: "_v.example.com.".to_string(),
                    value: "_t.acm-validations.aws.".to_string(),
                }),
            })
        }
        async fn delete_certificate(&self, _arn: &str) -> Result<(), aws::Error> {
            self.certificates_deleted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn lookup_alias(
            &self,
            _hosted_zone_id: &str,
            _record_name: &str,
            _expected_target: &str,
        ) -> Result<AliasLookup, aws::Error> {
            Ok(self.alias.clone())
        }
        async fn create_alias(
            &self,
            _hosted_zone_id: &str,
            _record_name: &str,
            _target: &str,
        ) -> Result<(), aws::Error> {
            self.aliases_created.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn delete_alias(
            &self,
            _hosted_zone_id: &str,
            _record_name: &str,
            _target: &str,
        ) -> Result<(), aws::Error> {
            self.aliases_deleted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn validation_cname_exists(
            &self,
            _hosted_zone_id: &str,
            _record_name: &str,
            _value: &str,
        ) -> Result<bool, aws::Error> {
            Ok(true)
        }
        async fn create_validation_cname(
            &self,
            _hosted_zone_id: &str,
            _record_name: &str,
            _value: &str,
        ) -> Result<(), aws::Error> {
            Ok(())
        }
        async fn pipeline_state(&self, _pipeline_name: &str) -> Result<PipelineStatus, aws::Error> {
            let mut states = self.pipeline_states.lock().unwrap();
            if states.len() > 1 {
                Ok(states.pop_front().unwrap())
            } else {
                Ok(states
                    .front()
                    .cloned()
                    .unwrap_or_else(PipelineStatus::unknown))
            }
        }
        async fn start_pipeline(&self, _pipeline_name: &str) -> Result<(), aws::Error> {
            self.pipelines_started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn connection_state(
            &self,
            _connection_arn: &str,
        ) -> Result<Option<ConnectionState>, aws::Error> {
            Ok(Some(ConnectionState::Available))
        }
        async fn read_parameter(&self, path: &str) -> Result<Option<String>, aws::Error> {
            Ok(self.parameters.get(path).cloned())
        }
        async fn write_parameter(&self, _path: &str, _value: &str) -> Result<(), aws::Error> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockBackend {
        bootstraps: AtomicU32,
        deploys: Mutex<Vec<String>>,
        destroys: AtomicU32,
    }

    impl Provisioner for MockBackend {
        fn bootstrap(&self) -> Result<(), provision::Error> {
            self.bootstraps.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn deploy(&self, stack_name: &str, _context: &StackContext) -> Result<(), provision::Error> {
            self.deploys.lock().unwrap().push(stack_name.to_string());
            Ok(())
        }
        fn destroy_all(&self, _context: &StackContext) -> Result<(), provision::Error> {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct YesPrompter;

    impl Prompter for YesPrompter {
        fn confirm(&self, _message: &str, _default: bool) -> Result<bool, prompt::Error> {
            Ok(true)
        }
        fn input(&self, _message: &str, default: Option<&str>) -> Result<String, prompt::Error> {
            Ok(default.unwrap_or_default().to_string())
        }
    }

    fn bucket_config(domain: Option<&str>, zone: Option<&str>) -> HostingConfig {
        HostingConfig {
            source: Source::Bucket {
                bucket: "releases".to_string(),
                path_prefix: "site".to_string(),
            },
            domain_name: domain.map(str::to_string),
            hosted_zone_id: zone.map(str::to_string),
        }
    }

    fn issued_certificate() -> CertificateRecord {
        CertificateRecord {
            arn: "arn:issued".to_string(),
            status: CertificateStatus::Issued,
        }
    }

    #[tokio::test]
    async fn bucket_deployment_converges_and_runs_the_pipeline() {
        let mut cloud = MockCloud::new().with_pipeline_states(&[PipelineState::Succeeded]);
        cloud.buckets.push("releases".to_string());
        cloud.parameters.insert(
            "/releases/DomainName".to_string(),
            "https://d111.cloudfront.net".to_string(),
        );
        let backend = MockBackend::default();
        let config = bucket_config(None, None);

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        deployment.run().await.unwrap();

        assert_eq!(backend.bootstraps.load(Ordering::SeqCst), 1);
        assert_eq!(*backend.deploys.lock().unwrap(), vec!["releases"]);
        assert_eq!(cloud.pipelines_started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_bucket_blocks_before_any_stack_is_touched() {
        let cloud = MockCloud::new();
        let backend = MockBackend::default();
        let config = bucket_config(None, None);

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        let result = deployment.run().await;

        match result {
            Err(Error::BucketMissing(bucket)) => assert_eq!(bucket, "releases"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(backend.deploys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn running_pipeline_is_not_restarted() {
        let mut cloud = MockCloud::new()
            .with_pipeline_states(&[PipelineState::InProgress, PipelineState::Succeeded]);
        cloud.buckets.push("releases".to_string());
        cloud.parameters.insert(
            "/releases/DomainName".to_string(),
            "https://d111.cloudfront.net".to_string(),
        );
        let backend = MockBackend::default();
        let config = bucket_config(None, None);

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        deployment.run().await.unwrap();

        assert_eq!(cloud.pipelines_started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn matching_alias_and_issued_certificate_cause_no_writes() {
        let mut cloud = MockCloud::new().with_pipeline_states(&[PipelineState::Succeeded]);
        cloud.buckets.push("releases".to_string());
        cloud.certificate = Some(issued_certificate());
        cloud.alias = AliasLookup::Matches;
        cloud.parameters.insert(
            "/releases/DomainName".to_string(),
            "https://d111.cloudfront.net".to_string(),
        );
        let backend = MockBackend::default();
        let config = bucket_config(Some("www.example.com"), Some("Z123"));

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        deployment.run().await.unwrap();

        assert_eq!(cloud.certificates_requested.load(Ordering::SeqCst), 0);
        assert_eq!(cloud.aliases_created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn conflicting_alias_does_not_block_the_deployment() {
        let mut cloud = MockCloud::new().with_pipeline_states(&[PipelineState::Succeeded]);
        cloud.buckets.push("releases".to_string());
        cloud.certificate = Some(issued_certificate());
        cloud.alias = AliasLookup::Conflict {
            existing: "legacy.example.net".to_string(),
        };
        cloud.parameters.insert(
            "/releases/DomainName".to_string(),
            "https://d111.cloudfront.net".to_string(),
        );
        let backend = MockBackend::default();
        let config = bucket_config(Some("www.example.com"), Some("Z123"));

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        deployment.run().await.unwrap();

        assert_eq!(cloud.aliases_created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_alias_is_created_with_consent() {
        let mut cloud = MockCloud::new().with_pipeline_states(&[PipelineState::Succeeded]);
        cloud.buckets.push("releases".to_string());
        cloud.certificate = Some(issued_certificate());
        cloud.parameters.insert(
            "/releases/DomainName".to_string(),
            "https://d111.cloudfront.net".to_string(),
        );
        let backend = MockBackend::default();
        let config = bucket_config(Some("www.example.com"), Some("Z123"));

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        deployment.run().await.unwrap();

        assert_eq!(cloud.aliases_created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn destroy_removes_stacks_alias_and_certificate() {
        let mut cloud = MockCloud::new();
        cloud.certificate = Some(issued_certificate());
        cloud.alias = AliasLookup::Matches;
        cloud.parameters.insert(
            "/releases/DomainName".to_string(),
            "https://d111.cloudfront.net".to_string(),
        );
        let backend = MockBackend::default();
        let config = bucket_config(Some("www.example.com"), Some("Z123"));

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        deployment.destroy().await.unwrap();

        assert_eq!(backend.destroys.load(Ordering::SeqCst), 1);
        assert_eq!(cloud.aliases_deleted.load(Ordering::SeqCst), 1);
        assert_eq!(cloud.certificates_deleted.load(Ordering::SeqCst), 1);
    }

    /// Confirms the teardown question and nothing else.
    struct SingleConfirmPrompter {
        confirms: AtomicU32,
    }

    impl Prompter for SingleConfirmPrompter {
        fn confirm(&self, _message: &str, _default: bool) -> Result<bool, prompt::Error> {
            assert_eq!(self.confirms.fetch_add(1, Ordering::SeqCst), 0, "teardown asks exactly one question");
            Ok(true)
        }
        fn input(&self, _message: &str, _default: Option<&str>) -> Result<String, prompt::Error> {
            panic!("teardown must not ask for input")
        }
    }

    #[tokio::test]
    async fn destroy_deletes_the_certificate_without_asking() {
        let mut cloud = MockCloud::new();
        cloud.certificate = Some(issued_certificate());
        let backend = MockBackend::default();
        let config = bucket_config(Some("www.example.com"), None);
        let prompter = SingleConfirmPrompter {
            confirms: AtomicU32::new(0),
        };

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &prompter);
        deployment.destroy().await.unwrap();

        assert_eq!(cloud.certificates_deleted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn certificate_issuance_is_polled_every_ten_seconds() {
        assert_eq!(CERTIFICATE_POLL_INTERVAL, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn destroy_fails_fast_without_connectivity() {
        let mut cloud = MockCloud::new();
        cloud.offline = true;
        let backend = MockBackend::default();
        let config = bucket_config(None, None);

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        let result = deployment.destroy().await;

        assert!(matches!(result, Err(Error::NoConnectivity(_))));
        assert_eq!(backend.destroys.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_follows_the_pipeline_until_it_finishes() {
        let mut cloud = MockCloud::new()
            .with_pipeline_states(&[PipelineState::InProgress, PipelineState::Succeeded]);
        cloud.parameters.insert(
            "/releases/DomainName".to_string(),
            "https://d111.cloudfront.net".to_string(),
        );
        let backend = MockBackend::default();
        let config = bucket_config(None, None);

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        deployment.status().await.unwrap();

        // Both queued states were consumed: the wait kept polling past the
        // in-progress observation.
        assert_eq!(cloud.pipeline_states.lock().unwrap().len(), 1);
        assert_eq!(cloud.pipelines_started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn status_requires_connectivity() {
        let mut cloud = MockCloud::new().with_pipeline_states(&[PipelineState::Succeeded]);
        cloud.offline = true;
        let backend = MockBackend::default();
        let config = bucket_config(None, None);

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        assert!(matches!(
            deployment.status().await,
            Err(Error::NoConnectivity(_))
        ));
    }

    #[tokio::test]
    async fn domain_counts_as_live_only_with_certificate_and_alias() {
        let backend = MockBackend::default();
        let config = bucket_config(Some("www.example.com"), Some("Z123"));
        let url = "https://d111.cloudfront.net";

        let mut cloud = MockCloud::new();
        cloud.certificate = Some(issued_certificate());
        cloud.alias = AliasLookup::Matches;
        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        assert!(deployment
            .domain_is_live("www.example.com", url)
            .await
            .unwrap());

        let mut cloud = MockCloud::new();
        cloud.certificate = Some(issued_certificate());
        cloud.alias = AliasLookup::Conflict {
            existing: "legacy.example.net".to_string(),
        };
        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        assert!(!deployment
            .domain_is_live("www.example.com", url)
            .await
            .unwrap());

        let cloud = MockCloud::new();
        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        assert!(!deployment
            .domain_is_live("www.example.com", url)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn show_surfaces_the_deployment_state() {
        let mut cloud = MockCloud::new();
        cloud.certificate = Some(issued_certificate());
        cloud.alias = AliasLookup::Matches;
        cloud.parameters.insert(
            "/releases/DomainName".to_string(),
            "https://d111.cloudfront.net".to_string(),
        );
        let backend = MockBackend::default();
        let config = bucket_config(Some("www.example.com"), Some("Z123"));

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        deployment.show().await.unwrap();

        // Never deployed: show reports that instead of failing.
        let cloud = MockCloud::new();
        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        deployment.show().await.unwrap();
    }

    #[tokio::test]
    async fn destroy_leaves_a_conflicting_record_untouched() {
        let mut cloud = MockCloud::new();
        cloud.alias = AliasLookup::Conflict {
            existing: "legacy.example.net".to_string(),
        };
        cloud.parameters.insert(
            "/releases/DomainName".to_string(),
            "https://d111.cloudfront.net".to_string(),
        );
        let backend = MockBackend::default();
        let config = bucket_config(Some("www.example.com"), Some("Z123"));

        let deployment =
            Deployment::new(&config, PathBuf::from("."), &cloud, &backend, &YesPrompter);
        deployment.destroy().await.unwrap();

        assert_eq!(cloud.aliases_deleted.load(Ordering::SeqCst), 0);
    }
}
