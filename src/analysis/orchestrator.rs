use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::analysis::error::AnalysisError;
use crate::analysis::extract::extract;
use crate::analysis::prompt::{richness_repair_instruction, JSON_REPAIR_INSTRUCTION};
use crate::analysis::types::{ParsedAnalysis, Prompt};
use crate::analysis::validate::{validate, RichnessRules, RichnessViolation};
use crate::llm::{CompletionClient, CompletionOptions, CompletionRequest};

pub const MAX_COMPLETION_CALLS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionSettings {
    // Deadline for each provider call. The in-flight call is dropped when it
    // passes.
    pub call_timeout: Duration,
    pub first: CompletionOptions,
    pub json_repair: CompletionOptions,
    pub richness_repair: CompletionOptions,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(90),
            first: CompletionOptions {
                temperature: 0.4,
                max_tokens: 1600,
            },
            json_repair: CompletionOptions {
                temperature: 0.2,
                max_tokens: 1600,
            },
            richness_repair: CompletionOptions {
                temperature: 0.35,
                max_tokens: 1800,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairPath {
    FirstAttempt,
    JsonRepaired,
    RichnessRepaired,
    RichnessRepairStillThin,
    FirstParseFallback,
}

impl RepairPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairPath::FirstAttempt => "first_attempt",
            RepairPath::JsonRepaired => "json_repaired",
            RepairPath::RichnessRepaired => "richness_repaired",
            RepairPath::RichnessRepairStillThin => "richness_repair_still_thin",
            RepairPath::FirstParseFallback => "first_parse_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub analysis: ParsedAnalysis,
    pub completion_calls: u8,
    pub path: RepairPath,
    pub rich: bool,
}

impl AnalysisOutcome {
    pub fn retry_count(&self) -> u8 {
        self.completion_calls.saturating_sub(1)
    }
}

#[derive(Debug)]
enum OrchestratorState {
    Initial,
    AwaitingFirstCompletion,
    ExtractingFirst(String),
    AwaitingJsonRepair,
    AwaitingRichnessRepair {
        fallback: ParsedAnalysis,
        violations: Vec<RichnessViolation>,
    },
    Done(AnalysisOutcome),
    Exhausted,
}

impl OrchestratorState {
    fn name(&self) -> &'static str {
        match self {
            OrchestratorState::Initial => "initial",
            OrchestratorState::AwaitingFirstCompletion => "awaiting_first_completion",
            OrchestratorState::ExtractingFirst(_) => "extracting_first",
            OrchestratorState::AwaitingJsonRepair => "awaiting_json_repair",
            OrchestratorState::AwaitingRichnessRepair { .. } => "awaiting_richness_repair",
            OrchestratorState::Done(_) => "done",
            OrchestratorState::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Default)]
struct AttemptState {
    calls: u8,
    last_failure: Option<String>,
    repair_sent: bool,
}

pub struct RetryOrchestrator<'a> {
    client: &'a dyn CompletionClient,
    rules: RichnessRules,
    settings: CompletionSettings,
}

impl<'a> RetryOrchestrator<'a> {
    pub fn new(
        client: &'a dyn CompletionClient,
        rules: RichnessRules,
        settings: CompletionSettings,
    ) -> Self {
        Self {
            client,
            rules,
            settings,
        }
    }

    pub async fn run(&self, prompt: &Prompt) -> Result<AnalysisOutcome, AnalysisError> {
        let mut attempt = AttemptState::default();
        let mut state = OrchestratorState::Initial;

        loop {
            debug!(
                "Orchestrator state={} calls={} last_failure={:?}",
                state.name(),
                attempt.calls,
                attempt.last_failure
            );
            state = match state {
                OrchestratorState::Initial => OrchestratorState::AwaitingFirstCompletion,
                OrchestratorState::AwaitingFirstCompletion => {
                    let raw = self
                        .call(&mut attempt, prompt, None, self.settings.first)
                        .await?;
                    OrchestratorState::ExtractingFirst(raw)
                }
                OrchestratorState::ExtractingFirst(raw) => match extract(&raw) {
                    Ok(mut parsed) => {
                        finalize(&mut parsed);
                        match validate(&parsed, &self.rules) {
                            Ok(()) => OrchestratorState::Done(AnalysisOutcome {
                                analysis: parsed,
                                completion_calls: attempt.calls,
                                path: RepairPath::FirstAttempt,
                                rich: true,
                            }),
                            Err(failure) => {
                                info!("First analysis too thin, requesting richer output: {}", failure);
                                attempt.last_failure = Some(failure.to_string());
                                OrchestratorState::AwaitingRichnessRepair {
                                    fallback: parsed,
                                    violations: failure.0,
                                }
                            }
                        }
                    }
                    Err(failure) => {
                        warn!(
                            "First analysis could not be extracted ({}): {}",
                            failure.kind(),
                            failure
                        );
                        attempt.last_failure = Some(failure.kind().to_string());
                        OrchestratorState::AwaitingJsonRepair
                    }
                },
                OrchestratorState::AwaitingJsonRepair => {
                    let raw = self
                        .call(
                            &mut attempt,
                            prompt,
                            Some(JSON_REPAIR_INSTRUCTION.to_string()),
                            self.settings.json_repair,
                        )
                        .await?;
                    match extract(&raw) {
                        Ok(mut parsed) => {
                            finalize(&mut parsed);
                            let rich = match validate(&parsed, &self.rules) {
                                Ok(()) => true,
                                Err(failure) => {
                                    info!("JSON-repaired analysis is thin, returning it anyway: {}", failure);
                                    false
                                }
                            };
                            OrchestratorState::Done(AnalysisOutcome {
                                analysis: parsed,
                                completion_calls: attempt.calls,
                                path: RepairPath::JsonRepaired,
                                rich,
                            })
                        }
                        Err(failure) => {
                            warn!(
                                "JSON repair could not be extracted ({}): {}",
                                failure.kind(),
                                failure
                            );
                            attempt.last_failure = Some(failure.kind().to_string());
                            OrchestratorState::Exhausted
                        }
                    }
                }
                OrchestratorState::AwaitingRichnessRepair {
                    fallback,
                    violations,
                } => {
                    let instruction =
                        richness_repair_instruction(&violations, self.rules.weekly_schema);
                    let raw = self
                        .call(
                            &mut attempt,
                            prompt,
                            Some(instruction),
                            self.settings.richness_repair,
                        )
                        .await?;
                    match extract(&raw) {
                        Ok(mut parsed) => {
                            finalize(&mut parsed);
                            match validate(&parsed, &self.rules) {
                                Ok(()) => OrchestratorState::Done(AnalysisOutcome {
                                    analysis: parsed,
                                    completion_calls: attempt.calls,
                                    path: RepairPath::RichnessRepaired,
                                    rich: true,
                                }),
                                Err(failure) => {
                                    warn!("Richness repair still thin, returning it: {}", failure);
                                    OrchestratorState::Done(AnalysisOutcome {
                                        analysis: parsed,
                                        completion_calls: attempt.calls,
                                        path: RepairPath::RichnessRepairStillThin,
                                        rich: false,
                                    })
                                }
                            }
                        }
                        Err(failure) => {
                            warn!(
                                "Richness repair could not be extracted ({}), keeping first analysis",
                                failure.kind()
                            );
                            OrchestratorState::Done(AnalysisOutcome {
                                analysis: fallback,
                                completion_calls: attempt.calls,
                                path: RepairPath::FirstParseFallback,
                                rich: false,
                            })
                        }
                    }
                }
                OrchestratorState::Done(outcome) => {
                    info!(
                        "Analysis finished: path={} calls={} rich={}",
                        outcome.path.as_str(),
                        outcome.completion_calls,
                        outcome.rich
                    );
                    return Ok(outcome);
                }
                OrchestratorState::Exhausted => {
                    warn!(
                        "Analysis exhausted after {} calls, last failure: {:?}",
                        attempt.calls, attempt.last_failure
                    );
                    return Err(AnalysisError::UnparseableResponse);
                }
            };
        }
    }

    async fn call(
        &self,
        attempt: &mut AttemptState,
        prompt: &Prompt,
        follow_up: Option<String>,
        options: CompletionOptions,
    ) -> Result<String, AnalysisError> {
        if attempt.calls >= MAX_COMPLETION_CALLS || (follow_up.is_some() && attempt.repair_sent) {
            return Err(AnalysisError::Internal(
                "completion call budget exhausted".to_string(),
            ));
        }
        attempt.repair_sent |= follow_up.is_some();
        attempt.calls += 1;

        let request = CompletionRequest {
            instruction: prompt.instruction_text.clone(),
            image_data_uri: prompt.image_data_uri.clone(),
            follow_up,
            options,
        };
        match tokio::time::timeout(self.settings.call_timeout, self.client.complete(&request)).await
        {
            Ok(result) => result.map_err(|err| {
                warn!("Completion call {} failed: {}", attempt.calls, err);
                AnalysisError::from(err)
            }),
            Err(_) => {
                warn!(
                    "Completion call {} exceeded {:?}",
                    attempt.calls, self.settings.call_timeout
                );
                Err(AnalysisError::Timeout)
            }
        }
    }
}

fn finalize(parsed: &mut ParsedAnalysis) {
    if !parsed.has_timestamp() {
        parsed.timestamp = Some(Value::String(
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        ));
    }
    for (field, value) in parsed.out_of_range_confidences() {
        warn!("Confidence out of range for {}: {}", field, value);
    }
}
