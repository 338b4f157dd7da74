//! Compilation pipeline
//!
//! Runs the stages from [`stages`] one after another on a command session.
//! The first failing stage ends the run with that stage's message; a
//! successful run carries the retrieved artifact.

pub mod stages;

pub use stages::{collect_artifact, PipelineStage, Stage, StageTemplates, Target};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::config::{Config, PipelineConfig};
use crate::error::{Error, Result};
use crate::events::{CompilerEvent, EventBus};
use crate::session::CommandSession;

/// Caller supplied target selection; unset fields use the configured defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationParameters {
    /// Microcontroller, e.g. `atmega328p`
    #[serde(alias = "mcu")]
    pub device: Option<String>,
    /// CPU clock define, e.g. `16000000L`
    #[serde(alias = "fcpu")]
    pub clock_rate: Option<String>,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationResult {
    pub success: bool,
    pub message: Option<String>,
    pub output: Option<String>,
}

impl CompilationResult {
    /// Successful run with its artifact
    pub fn succeeded(output: String) -> Self {
        Self {
            success: true,
            message: None,
            output: Some(output),
        }
    }

    /// Failed run with a stage message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            output: None,
        }
    }
}

/// Sequential stage runner
#[derive(Debug, Clone)]
pub struct Pipeline {
    layout: PipelineConfig,
    work_prompt: String,
    events: Arc<EventBus>,
}

impl Pipeline {
    /// Create a pipeline publishing to `events`
    pub fn new(config: &Config, events: Arc<EventBus>) -> Self {
        Self {
            layout: config.pipeline.clone(),
            work_prompt: config.session.work_prompt.clone(),
            events,
        }
    }

    /// Fill unset parameters with the configured defaults
    pub fn resolve_target(&self, parameters: Option<&CompilationParameters>) -> Target {
        let pick = |value: Option<&String>, default: &str| {
            value
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Target {
            device: pick(
                parameters.and_then(|p| p.device.as_ref()),
                &self.layout.default_device,
            ),
            clock_rate: pick(
                parameters.and_then(|p| p.clock_rate.as_ref()),
                &self.layout.default_clock_rate,
            ),
        }
    }

    /// Render the stages for a source file
    pub fn plan(&self, source: &str, parameters: Option<&CompilationParameters>) -> Vec<PipelineStage> {
        let target = self.resolve_target(parameters);
        StageTemplates::new(&self.layout, &self.work_prompt).plan(source, &target)
    }

    /// Run every stage on `session`
    ///
    /// Stage failures become a failed [`CompilationResult`] and publish a
    /// `commandError` event. Only errors that leave the session unusable for
    /// this run without a command having been sent (a command already in
    /// flight) are returned as `Err`.
    pub async fn run(
        &self,
        session: &mut CommandSession,
        source: &str,
        parameters: Option<&CompilationParameters>,
    ) -> Result<CompilationResult> {
        let run_id = uuid::Uuid::new_v4();
        let target = self.resolve_target(parameters);
        let span = info_span!("compile", %run_id, device = %target.device, clock = %target.clock_rate);

        self.run_stages(session, source, &target).instrument(span).await
    }

    async fn run_stages(
        &self,
        session: &mut CommandSession,
        source: &str,
        target: &Target,
    ) -> Result<CompilationResult> {
        let plan = StageTemplates::new(&self.layout, &self.work_prompt).plan(source, target);
        let mut artifact = None;

        for PipelineStage { stage, spec } in plan {
            debug!("Running stage '{}'", stage);

            let lines = match session.run(&spec).await {
                Ok(lines) => lines,
                Err(err @ Error::CommandInFlight) => return Err(err),
                Err(err) => {
                    let diagnostic = err
                        .diagnostic()
                        .map(str::to_string)
                        .unwrap_or_else(|| err.to_string());
                    error!("Stage '{}' failed: {}", stage, err);
                    self.events.publish(CompilerEvent::CommandError(diagnostic));
                    return Ok(CompilationResult::failed(stage.failure_message()));
                }
            };

            if stage == Stage::RetrieveArtifact {
                artifact = Some(collect_artifact(&lines));
            }
            if let Some(event) = stage.completion_event() {
                self.events.publish(event);
            }
            info!("Stage '{}' complete", stage);
        }

        Ok(CompilationResult::succeeded(artifact.unwrap_or_default()))
    }
}
