//! Batch generation timing against an external serving engine
//!
//! Sends a list of prompts with one set of sampling parameters to a
//! [`GenerationEngine`], times the whole batch and reports each completion.

mod http_engine;

pub use http_engine::HttpGenerationEngine;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

use crate::error::{GateError, GateResult};

/// Sampling configuration shared by every prompt in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: usize,
}

impl Default for SamplingParams {
    fn default() -> Self {
        SamplingParams {
            temperature: 0.8,
            top_p: 0.95,
            max_new_tokens: 64,
        }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> GateResult<()> {
        if !(self.temperature > 0.0) {
            return Err(GateError::InvalidConfiguration(format!(
                "temperature must be > 0, got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(GateError::InvalidConfiguration(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if self.max_new_tokens == 0 {
            return Err(GateError::InvalidConfiguration(
                "max_new_tokens must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One generated completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub prompt: String,
    pub text: String,
}

/// Batch text generation.
#[allow(async_fn_in_trait)]
pub trait GenerationEngine {
    /// Generate one completion per prompt, in prompt order.
    async fn generate(
        &self,
        prompts: &[String],
        params: &SamplingParams,
    ) -> GateResult<Vec<Completion>>;
}

/// Completions of a timed batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub completions: Vec<Completion>,
    pub elapsed: Duration,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for completion in &self.completions {
            writeln!(
                f,
                "Prompt: {:?}, Generated: {:?}",
                completion.prompt, completion.text
            )?;
        }
        writeln!(f)?;
        write!(f, "Time taken: {:.2}s", self.elapsed.as_secs_f64())
    }
}

/// Prompts used when none are given.
pub fn default_prompts() -> Vec<String> {
    vec![
        "Hello, my name is".to_string(),
        "CMU's PhD students are".to_string(),
    ]
}

/// Generate completions for `prompts` and time the call.
pub async fn run_batch<E: GenerationEngine>(
    engine: &E,
    prompts: &[String],
    params: &SamplingParams,
) -> GateResult<BatchReport> {
    params.validate()?;
    if prompts.is_empty() {
        return Err(GateError::InvalidConfiguration(
            "at least one prompt is required".to_string(),
        ));
    }

    let start = Instant::now();
    let completions = engine.generate(prompts, params).await?;
    let elapsed = start.elapsed();

    if completions.len() != prompts.len() {
        return Err(GateError::Generation(format!(
            "engine returned {} completions for {} prompts",
            completions.len(),
            prompts.len()
        )));
    }

    info!(
        "Generated {} completions in {:.2}s",
        completions.len(),
        elapsed.as_secs_f64()
    );
    Ok(BatchReport {
        completions,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        let params = SamplingParams::default();
        assert_eq!(params.temperature, 0.8);
        assert_eq!(params.top_p, 0.95);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let bad = [
            SamplingParams {
                temperature: 0.0,
                ..Default::default()
            },
            SamplingParams {
                temperature: f32::NAN,
                ..Default::default()
            },
            SamplingParams {
                top_p: 0.0,
                ..Default::default()
            },
            SamplingParams {
                top_p: 1.5,
                ..Default::default()
            },
            SamplingParams {
                max_new_tokens: 0,
                ..Default::default()
            },
        ];
        for params in bad {
            assert!(params.validate().is_err(), "{:?}", params);
        }
    }

    #[test]
    fn test_report_format() {
        let report = BatchReport {
            completions: vec![Completion {
                prompt: "Hello, my name is".to_string(),
                text: " Ada".to_string(),
            }],
            elapsed: Duration::from_millis(1234),
        };
        assert_eq!(
            report.to_string(),
            "Prompt: \"Hello, my name is\", Generated: \" Ada\"\n\nTime taken: 1.23s"
        );
    }
}
