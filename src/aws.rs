use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_acm::types::{RecordType, ValidationMethod};
use aws_sdk_route53::types::{
    AliasTarget, Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use aws_sdk_ssm::types::ParameterType;
use log::debug;
use thiserror::Error;

use crate::naming::domain_variants;
use crate::pipeline::{self, PipelineState, PipelineStatus, StageStatus};

/// Fixed hosted-zone identifier shared by every CloudFront distribution.
/// Alias records targeting a distribution always point into this zone.
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

#[derive(Error, Debug)]
pub enum Error {
    #[error("identity check: {0}")]
    Identity(#[from] aws_sdk_sts::Error),

    #[error("certificate manager: {0}")]
    Certificates(#[from] aws_sdk_acm::Error),

    #[error("dns: {0}")]
    Dns(#[from] aws_sdk_route53::Error),

    #[error("parameter store: {0}")]
    Parameters(#[from] aws_sdk_ssm::Error),

    #[error("pipeline: {0}")]
    Pipeline(#[from] aws_sdk_codepipeline::Error),

    #[error("repository connection: {0}")]
    Connections(#[from] aws_sdk_codestarconnections::Error),

    #[error("malformed record set: {0}")]
    RecordSet(#[from] aws_smithy_types::error::operation::BuildError),

    #[error("certificate request returned no ARN")]
    MissingCertificateArn,

    #[error("certificate {0} has no detail record")]
    MissingCertificateDetail(String),
}

/// The identity the current credentials resolve to.
#[derive(Debug, Clone)]
pub struct Identity {
    pub account: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStatus {
    PendingValidation,
    Issued,
    Other(String),
}

impl CertificateStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "ISSUED" => CertificateStatus::Issued,
            "PENDING_VALIDATION" => CertificateStatus::PendingValidation,
            other => CertificateStatus::Other(other.to_string()),
        }
    }

    pub fn is_issued(&self) -> bool {
        *self == CertificateStatus::Issued
    }
}

/// A certificate observed in the provider account, never owned locally.
#[derive(Debug, Clone)]
pub struct CertificateRecord {
    pub arn: String,
    pub status: CertificateStatus,
}

/// The CNAME record the certificate authority asks us to publish to prove
/// control over the domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRecord {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct CertificateDetail {
    pub status: CertificateStatus,
    pub validation_record: Option<ValidationRecord>,
}

/// Result of probing the hosted zone for the distribution alias record.
/// A conflicting record is a named outcome, not an error: the caller decides
/// whether it blocks the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasLookup {
    Missing,
    Matches,
    Conflict { existing: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Available,
    Other(String),
}

/// One method per control-plane capability, each a single round trip. Retry
/// loops spanning several calls (issuance waits, pipeline polls) belong to
/// the orchestrator, not here.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn check_identity(&self) -> Result<Identity, Error>;

    /// Existence probe. Not-found responses and access errors are collapsed
    /// into `false`, matching the behavior callers rely on.
    async fn bucket_exists(&self, bucket_name: &str) -> bool;

    async fn find_certificate(&self, domain_name: &str)
        -> Result<Option<CertificateRecord>, Error>;
    async fn request_certificate(&self, domain_name: &str) -> Result<String, Error>;
    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetail, Error>;
    async fn delete_certificate(&self, arn: &str) -> Result<(), Error>;

    async fn lookup_alias(
        &self,
        hosted_zone_id: &str,
        record_name: &str,
        expected_target: &str,
    ) -> Result<AliasLookup, Error>;
    async fn create_alias(
        &self,
        hosted_zone_id: &str,
        record_name: &str,
        target: &str,
    ) -> Result<(), Error>;
    async fn delete_alias(
        &self,
        hosted_zone_id: &str,
        record_name: &str,
        target: &str,
    ) -> Result<(), Error>;

    async fn validation_cname_exists(
        &self,
        hosted_zone_id: &str,
        record_name: &str,
        value: &str,
    ) -> Result<bool, Error>;
    async fn create_validation_cname(
        &self,
        hosted_zone_id: &str,
        record_name: &str,
        value: &str,
    ) -> Result<(), Error>;

    async fn pipeline_state(&self, pipeline_name: &str) -> Result<PipelineStatus, Error>;
    async fn start_pipeline(&self, pipeline_name: &str) -> Result<(), Error>;

    async fn connection_state(&self, connection_arn: &str)
        -> Result<Option<ConnectionState>, Error>;

    async fn read_parameter(&self, path: &str) -> Result<Option<String>, Error>;
    async fn write_parameter(&self, path: &str, value: &str) -> Result<(), Error>;
}

/// Control-plane client over the provider SDK. Certificates and DNS are
/// pinned to us-east-1, the only region CloudFront accepts certificates from.
pub struct Aws {
    sts: aws_sdk_sts::Client,
    s3: aws_sdk_s3::Client,
    acm: aws_sdk_acm::Client,
    route53: aws_sdk_route53::Client,
    ssm: aws_sdk_ssm::Client,
    codepipeline: aws_sdk_codepipeline::Client,
    connections: aws_sdk_codestarconnections::Client,
}

impl Aws {
    pub async fn new() -> Self {
        let shared = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let us_east_1 = aws_config::Region::new("us-east-1");

        let acm = aws_sdk_acm::Client::from_conf(
            aws_sdk_acm::config::Builder::from(&shared)
                .region(us_east_1.clone())
                .build(),
        );
        let route53 = aws_sdk_route53::Client::from_conf(
            aws_sdk_route53::config::Builder::from(&shared)
                .region(us_east_1)
                .build(),
        );

        Self {
            sts: aws_sdk_sts::Client::new(&shared),
            s3: aws_sdk_s3::Client::new(&shared),
            acm,
            route53,
            ssm: aws_sdk_ssm::Client::new(&shared),
            codepipeline: aws_sdk_codepipeline::Client::new(&shared),
            connections: aws_sdk_codestarconnections::Client::new(&shared),
        }
    }

    async fn change_alias(
        &self,
        action: ChangeAction,
        hosted_zone_id: &str,
        record_name: &str,
        target: &str,
    ) -> Result<(), Error> {
        let alias = AliasTarget::builder()
            .hosted_zone_id(CLOUDFRONT_HOSTED_ZONE_ID)
            .dns_name(target)
            .evaluate_target_health(false)
            .build()?;
        let record_set = ResourceRecordSet::builder()
            .name(record_name)
            .r#type(RrType::A)
            .alias_target(alias)
            .build()?;
        let change = Change::builder()
            .action(action)
            .resource_record_set(record_set)
            .build()?;
        let batch = ChangeBatch::builder().changes(change).build()?;

        self.route53
            .change_resource_record_sets()
            .hosted_zone_id(hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(aws_sdk_route53::Error::from)?;
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for Aws {
    async fn check_identity(&self) -> Result<Identity, Error> {
        let response = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(aws_sdk_sts::Error::from)?;
        Ok(Identity {
            account: response.account().unwrap_or_default().to_string(),
            arn: response.arn().unwrap_or_default().to_string(),
        })
    }

    async fn bucket_exists(&self, bucket_name: &str) -> bool {
        match self.s3.head_bucket().bucket(bucket_name).send().await {
            Ok(_) => true,
            Err(err) => {
                // Access errors land here too, not just absence.
                debug!("head bucket '{bucket_name}' failed: {err}");
                false
            }
        }
    }

    async fn find_certificate(
        &self,
        domain_name: &str,
    ) -> Result<Option<CertificateRecord>, Error> {
        let variants = domain_variants(domain_name);
        let response = self
            .acm
            .list_certificates()
            .send()
            .await
            .map_err(aws_sdk_acm::Error::from)?;

        for summary in response.certificate_summary_list() {
            let covers = certificate_covers(
                summary.domain_name(),
                summary.subject_alternative_name_summaries(),
                &variants,
            );
            if !covers {
                continue;
            }
            let Some(arn) = summary.certificate_arn() else {
                continue;
            };
            let status = summary
                .status()
                .map(|s| CertificateStatus::parse(s.as_str()))
                .unwrap_or_else(|| CertificateStatus::Other("UNKNOWN".to_string()));
            return Ok(Some(CertificateRecord {
                arn: arn.to_string(),
                status,
            }));
        }
        Ok(None)
    }

    async fn request_certificate(&self, domain_name: &str) -> Result<String, Error> {
        let [primary, alternate] = domain_variants(domain_name);
        let response = self
            .acm
            .request_certificate()
            .domain_name(primary)
            .validation_method(ValidationMethod::Dns)
            .subject_alternative_names(alternate)
            .send()
            .await
            .map_err(aws_sdk_acm::Error::from)?;
        response
            .certificate_arn()
            .map(str::to_string)
            .ok_or(Error::MissingCertificateArn)
    }

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetail, Error> {
        let response = self
            .acm
            .describe_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map_err(aws_sdk_acm::Error::from)?;
        let certificate = response
            .certificate()
            .ok_or_else(|| Error::MissingCertificateDetail(arn.to_string()))?;

        let status = certificate
            .status()
            .map(|s| CertificateStatus::parse(s.as_str()))
            .unwrap_or_else(|| CertificateStatus::Other("UNKNOWN".to_string()));

        let validation_record = certificate
            .domain_validation_options()
            .iter()
            .find_map(|validation| {
                validation.resource_record().and_then(|record| match record.r#type() {
                    RecordType::Cname => Some(ValidationRecord {
                        name: record.name().to_string(),
                        value: record.value().to_string(),
                    }),
                    _ => None,
                })
            });

        Ok(CertificateDetail {
            status,
            validation_record,
        })
    }

    async fn delete_certificate(&self, arn: &str) -> Result<(), Error> {
        self.acm
            .delete_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map_err(aws_sdk_acm::Error::from)?;
        Ok(())
    }

    async fn lookup_alias(
        &self,
        hosted_zone_id: &str,
        record_name: &str,
        expected_target: &str,
    ) -> Result<AliasLookup, Error> {
        let response = self
            .route53
            .list_resource_record_sets()
            .hosted_zone_id(hosted_zone_id)
            .start_record_name(record_name)
            .start_record_type(RrType::A)
            .send()
            .await
            .map_err(aws_sdk_route53::Error::from)?;

        let matching = response.resource_record_sets().iter().find(|record_set| {
            dns_names_equal(record_set.name(), record_name)
                && matches!(record_set.r#type(), RrType::A)
        });
        let Some(record_set) = matching else {
            return Ok(AliasLookup::Missing);
        };

        let existing = record_set
            .alias_target()
            .map(|target| target.dns_name())
            .unwrap_or_default();
        if dns_names_equal(existing, expected_target) {
            Ok(AliasLookup::Matches)
        } else {
            Ok(AliasLookup::Conflict {
                existing: existing.to_string(),
            })
        }
    }

    async fn create_alias(
        &self,
        hosted_zone_id: &str,
        record_name: &str,
        target: &str,
    ) -> Result<(), Error> {
        self.change_alias(ChangeAction::Create, hosted_zone_id, record_name, target)
            .await
    }

    async fn delete_alias(
        &self,
        hosted_zone_id: &str,
        record_name: &str,
        target: &str,
    ) -> Result<(), Error> {
        self.change_alias(ChangeAction::Delete, hosted_zone_id, record_name, target)
            .await
    }

    async fn validation_cname_exists(
        &self,
        hosted_zone_id: &str,
        record_name: &str,
        value: &str,
    ) -> Result<bool, Error> {
        let response = self
            .route53
            .list_resource_record_sets()
            .hosted_zone_id(hosted_zone_id)
            .start_record_name(record_name)
            .start_record_type(RrType::Cname)
            .max_items(1)
            .send()
            .await
            .map_err(aws_sdk_route53::Error::from)?;

        let Some(first) = response.resource_record_sets().first() else {
            return Ok(false);
        };
        Ok(dns_names_equal(first.name(), record_name)
            && matches!(first.r#type(), RrType::Cname)
            && first
                .resource_records()
                .first()
                .map(|record| record.value() == value)
                .unwrap_or(false))
    }

    async fn create_validation_cname(
        &self,
        hosted_zone_id: &str,
        record_name: &str,
        value: &str,
    ) -> Result<(), Error> {
        let record = ResourceRecord::builder().value(value).build()?;
        let record_set = ResourceRecordSet::builder()
            .name(record_name)
            .r#type(RrType::Cname)
            .ttl(60)
            .resource_records(record)
            .build()?;
        let change = Change::builder()
            .action(ChangeAction::Create)
            .resource_record_set(record_set)
            .build()?;
        let batch = ChangeBatch::builder().changes(change).build()?;

        self.route53
            .change_resource_record_sets()
            .hosted_zone_id(hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(aws_sdk_route53::Error::from)?;
        Ok(())
    }

    async fn pipeline_state(&self, pipeline_name: &str) -> Result<PipelineStatus, Error> {
        let response = self
            .codepipeline
            .get_pipeline_state()
            .name(pipeline_name)
            .send()
            .await
            .map_err(aws_sdk_codepipeline::Error::from)?;

        let stages: Vec<StageStatus> = response
            .stage_states()
            .iter()
            .filter_map(|stage| {
                let execution = stage.latest_execution()?;
                Some(StageStatus {
                    name: stage.stage_name().unwrap_or("Unknown").to_string(),
                    state: parse_pipeline_state(execution.status().as_str()),
                })
            })
            .collect();

        Ok(pipeline::aggregate(&stages))
    }

    async fn start_pipeline(&self, pipeline_name: &str) -> Result<(), Error> {
        self.codepipeline
            .start_pipeline_execution()
            .name(pipeline_name)
            .send()
            .await
            .map_err(aws_sdk_codepipeline::Error::from)?;
        Ok(())
    }

    async fn connection_state(
        &self,
        connection_arn: &str,
    ) -> Result<Option<ConnectionState>, Error> {
        let response = self
            .connections
            .get_connection()
            .connection_arn(connection_arn)
            .send()
            .await
            .map_err(aws_sdk_codestarconnections::Error::from)?;

        Ok(response
            .connection()
            .and_then(|connection| connection.connection_status())
            .map(|status| match status.as_str() {
                "PENDING" => ConnectionState::Pending,
                "AVAILABLE" => ConnectionState::Available,
                other => ConnectionState::Other(other.to_string()),
            }))
    }

    async fn read_parameter(&self, path: &str) -> Result<Option<String>, Error> {
        match self.ssm.get_parameter().name(path).send().await {
            Ok(response) => Ok(response
                .parameter()
                .and_then(|parameter| parameter.value())
                .map(str::to_string)),
            Err(err) => {
                let err = aws_sdk_ssm::Error::from(err);
                if matches!(err, aws_sdk_ssm::Error::ParameterNotFound(_)) {
                    Ok(None)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn write_parameter(&self, path: &str, value: &str) -> Result<(), Error> {
        self.ssm
            .put_parameter()
            .name(path)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(true)
            .send()
            .await
            .map_err(aws_sdk_ssm::Error::from)?;
        Ok(())
    }
}

/// DNS names compare equal regardless of an optional trailing dot.
pub fn dns_names_equal(left: &str, right: &str) -> bool {
    left.trim_end_matches('.') == right.trim_end_matches('.')
}

/// A certificate counts for a domain only when it covers both the bare and
/// `www.`-prefixed variants, in any arrangement of primary name and
/// alternates.
fn certificate_covers(
    primary: Option<&str>,
    alternates: &[String],
    variants: &[String; 2],
) -> bool {
    variants.iter().all(|variant| {
        primary == Some(variant.as_str()) || alternates.iter().any(|alt| alt == variant)
    })
}

fn parse_pipeline_state(raw: &str) -> PipelineState {
    match raw {
        "InProgress" => PipelineState::InProgress,
        "Succeeded" => PipelineState::Succeeded,
        "Failed" => PipelineState::Failed,
        "Stopped" => PipelineState::Stopped,
        "Stopping" => PipelineState::Stopping,
        "Cancelled" => PipelineState::Cancelled,
        _ => PipelineState::Unknown,
    }
}
