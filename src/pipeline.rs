use std::fmt::{Display, Formatter};

use log::info;
use thiserror::Error;

use crate::aws;
use crate::aws::ControlPlane;
use crate::poll::{Clock, PollOutcome, Poller};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Cloud(#[from] aws::Error),

    #[error("wait for pipeline completion was cancelled")]
    Cancelled,
}

/// Aggregate execution state of the build pipeline. Re-derived on every
/// status query, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unknown,
    InProgress,
    Succeeded,
    Failed,
    Stopped,
    Stopping,
    Cancelled,
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PipelineState::Unknown => "Unknown",
            PipelineState::InProgress => "InProgress",
            PipelineState::Succeeded => "Succeeded",
            PipelineState::Failed => "Failed",
            PipelineState::Stopped => "Stopped",
            PipelineState::Stopping => "Stopping",
            PipelineState::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

/// Latest execution state of a single pipeline stage.
#[derive(Debug, Clone)]
pub struct StageStatus {
    pub name: String,
    pub state: PipelineState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub stage: String,
}

impl PipelineStatus {
    pub fn unknown() -> Self {
        Self {
            state: PipelineState::Unknown,
            stage: "Unknown".to_string(),
        }
    }
}

/// Collapse per-stage states into one aggregate: any in-progress stage
/// dominates, then any failed stage, otherwise the last stage's terminal
/// state. The reported stage name is always the last stage that executed.
pub fn aggregate(stages: &[StageStatus]) -> PipelineStatus {
    let Some(last) = stages.last() else {
        return PipelineStatus::unknown();
    };

    let mut in_progress = false;
    let mut failed = false;
    for stage in stages {
        match stage.state {
            PipelineState::InProgress => in_progress = true,
            PipelineState::Failed => failed = true,
            _ => {}
        }
    }

    let state = if in_progress {
        PipelineState::InProgress
    } else if failed {
        PipelineState::Failed
    } else {
        last.state
    };

    PipelineStatus {
        state,
        stage: last.name.clone(),
    }
}

/// Kick off a pipeline execution unless one is already running.
pub async fn start(cloud: &dyn ControlPlane, pipeline_name: &str) -> Result<(), Error> {
    let status = cloud.pipeline_state(pipeline_name).await?;
    if status.state == PipelineState::InProgress {
        info!("pipeline '{pipeline_name}' is already in progress, not starting another execution");
        return Ok(());
    }

    cloud.start_pipeline(pipeline_name).await?;
    info!("pipeline execution started");
    Ok(())
}

/// Poll until the pipeline leaves the in-progress state and return the final
/// aggregate status.
pub async fn wait_for_completion<C: Clock>(
    cloud: &dyn ControlPlane,
    poller: &mut Poller<C>,
    pipeline_name: &str,
) -> Result<PipelineStatus, Error> {
    let mut announced = false;
    let outcome = poller
        .run(
            || cloud.pipeline_state(pipeline_name),
            |status| status.state != PipelineState::InProgress,
            |_, _| {
                if !announced {
                    println!("\nThe pipeline is in progress, waiting for it to finish...\n");
                    announced = true;
                }
            },
        )
        .await?;

    match outcome {
        PollOutcome::Done(status) => Ok(status),
        PollOutcome::TimedOut | PollOutcome::Cancelled => Err(Error::Cancelled),
    }
}

/// Final report for a completed pipeline run. A failed run gets step-by-step
/// remediation guidance, anything else a plain status line.
pub fn report(status: &PipelineStatus, pipeline_name: &str) {
    if status.state == PipelineState::Failed {
        println!("\n\n *** ERROR ***\n");
        println!(
            "\nThe pipeline execution encountered an error on the stage '{}'.",
            status.stage
        );
        println!("To investigate and resolve the issue, please follow these steps:\n");
        println!(" 1. Visit the AWS Management Console and navigate to CodePipeline.");
        println!(" 2. Select the \"{pipeline_name}\" pipeline.");
        println!(" 3. Inspect the pipeline execution details and logs for error messages.");
        println!(" 4. Take the necessary actions to address the error.");
        println!(" 5. Once resolved, trigger a new execution by choosing 'Release change' in the console.\n");
    } else {
        println!("Current pipeline status: {}", status.state);
    }
}
