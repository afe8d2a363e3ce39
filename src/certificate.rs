use log::info;
use thiserror::Error;

use crate::aws::{self, CertificateStatus, ControlPlane, ValidationRecord};
use crate::poll::{Clock, PollOutcome, Poller};
use crate::prompt::{self, Prompter};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Cloud(#[from] aws::Error),

    #[error(transparent)]
    Prompt(#[from] prompt::Error),

    #[error("the certificate authority did not publish a validation record in time")]
    ValidationTimeout,

    #[error("certificate issuance ended in state {0}")]
    IssuanceFailed(String),

    #[error("validation record was not confirmed, certificate issuance cannot proceed")]
    Declined,

    #[error("wait for certificate issuance was cancelled")]
    Cancelled,
}

/// Make sure an issued certificate covering both domain variants exists and
/// return its ARN. Reuses an existing certificate whenever one covers the
/// domain, issued or still validating; a new one is requested only when none
/// does.
pub async fn ensure<C: Clock>(
    cloud: &dyn ControlPlane,
    prompter: &dyn Prompter,
    validation: &mut Poller<C>,
    issuance: &mut Poller<C>,
    domain_name: &str,
    hosted_zone_id: Option<&str>,
) -> Result<String, Error> {
    let arn = match cloud.find_certificate(domain_name).await? {
        Some(existing) if existing.status.is_issued() => {
            info!("reusing issued certificate {}", existing.arn);
            return Ok(existing.arn);
        }
        Some(existing) => {
            info!(
                "certificate {} already exists and is awaiting validation",
                existing.arn
            );
            existing.arn
        }
        None => {
            let arn = cloud.request_certificate(domain_name).await?;
            info!("requested certificate {arn} for {domain_name}");
            arn
        }
    };

    let record = await_validation_record(cloud, validation, &arn).await?;
    publish_validation_record(cloud, prompter, hosted_zone_id, &record).await?;
    await_issuance(cloud, issuance, &arn).await?;
    Ok(arn)
}

/// The validation CNAME shows up on the certificate shortly after the
/// request; poll briefly for it.
async fn await_validation_record<C: Clock>(
    cloud: &dyn ControlPlane,
    poller: &mut Poller<C>,
    arn: &str,
) -> Result<ValidationRecord, Error> {
    let outcome = poller
        .run(
            || cloud.describe_certificate(arn),
            |detail| detail.validation_record.is_some(),
            |attempt, _| info!("waiting for validation record, attempt {attempt}"),
        )
        .await?;

    match outcome {
        PollOutcome::Done(detail) => detail.validation_record.ok_or(Error::ValidationTimeout),
        PollOutcome::TimedOut => Err(Error::ValidationTimeout),
        PollOutcome::Cancelled => Err(Error::Cancelled),
    }
}

/// With a hosted zone at hand the record is written directly; without one the
/// user has to create it at their registrar before issuance can finish.
async fn publish_validation_record(
    cloud: &dyn ControlPlane,
    prompter: &dyn Prompter,
    hosted_zone_id: Option<&str>,
    record: &ValidationRecord,
) -> Result<(), Error> {
    match hosted_zone_id {
        Some(zone) => {
            if cloud
                .validation_cname_exists(zone, &record.name, &record.value)
                .await?
            {
                info!("validation record already present in the hosted zone");
                return Ok(());
            }
            cloud
                .create_validation_cname(zone, &record.name, &record.value)
                .await?;
            info!("created validation record in hosted zone {zone}");
            Ok(())
        }
        None => {
            println!("\nCreate the following CNAME record with your DNS provider:");
            println!("  Name:  {}", record.name);
            println!("  Value: {}\n", record.value);
            if prompter.confirm("Have you created the validation record?", true)? {
                Ok(())
            } else {
                Err(Error::Declined)
            }
        }
    }
}

async fn await_issuance<C: Clock>(
    cloud: &dyn ControlPlane,
    poller: &mut Poller<C>,
    arn: &str,
) -> Result<(), Error> {
    println!("Waiting for the certificate to be issued. This can take several minutes...");
    let outcome = poller
        .run(
            || cloud.describe_certificate(arn),
            |detail| detail.status != CertificateStatus::PendingValidation,
            |attempt, _| info!("certificate still pending validation, attempt {attempt}"),
        )
        .await?;

    match outcome {
        PollOutcome::Done(detail) => match detail.status {
            CertificateStatus::Issued => {
                info!("certificate {arn} issued");
                Ok(())
            }
            CertificateStatus::Other(state) => Err(Error::IssuanceFailed(state)),
            CertificateStatus::PendingValidation => Err(Error::IssuanceFailed(
                "PENDING_VALIDATION".to_string(),
            )),
        },
        PollOutcome::TimedOut | PollOutcome::Cancelled => Err(Error::Cancelled),
    }
}
