//! Sources of strategy code.
//!
//! Code comes either from a language model or from a mutation engine. Both
//! sit behind [`StrategyProducer`]; the executor never learns which one ran.

use crate::error::Error;
use crate::executor::{ContainerExecutor, ExecuteOptions};
use crate::Result;
use async_trait::async_trait;
use rand::Rng;
use sandbox_proto::ExecutionResult;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// How a submission was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    Llm,
    Mutation,
}

impl fmt::Display for GenerationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Llm => "llm",
            Self::Mutation => "mutation",
        })
    }
}

/// Produces strategy source code from feedback on earlier iterations
#[async_trait]
pub trait StrategyProducer: Send + Sync {
    fn method(&self) -> GenerationMethod;

    async fn produce(&self, feedback: &str) -> Result<String>;
}

/// Pick the language model when `roll` falls below `innovation_rate`.
///
/// `roll` is a uniform sample from `[0, 1)`; a rate of 0 always mutates and
/// a rate of 1 always asks the model.
pub fn choose_method(innovation_rate: f64, roll: f64) -> GenerationMethod {
    if roll < innovation_rate {
        GenerationMethod::Llm
    } else {
        GenerationMethod::Mutation
    }
}

/// One producer of each kind plus the rate at which the model is used
pub struct StrategySource {
    llm: Arc<dyn StrategyProducer>,
    mutation: Arc<dyn StrategyProducer>,
    innovation_rate: f64,
}

impl StrategySource {
    pub fn new(llm: Arc<dyn StrategyProducer>, mutation: Arc<dyn StrategyProducer>, innovation_rate: f64) -> Self {
        Self {
            llm,
            mutation,
            innovation_rate: innovation_rate.clamp(0.0, 1.0),
        }
    }

    pub fn innovation_rate(&self) -> f64 {
        self.innovation_rate
    }

    pub fn producer(&self, method: GenerationMethod) -> &Arc<dyn StrategyProducer> {
        match method {
            GenerationMethod::Llm => &self.llm,
            GenerationMethod::Mutation => &self.mutation,
        }
    }

    pub fn next_method(&self) -> GenerationMethod {
        choose_method(self.innovation_rate, rand::thread_rng().gen::<f64>())
    }
}

/// What one iteration produced and how it ran
#[derive(Debug, Clone, Serialize)]
pub struct IterationOutcome {
    pub method: GenerationMethod,
    pub code: String,
    pub result: ExecutionResult,
}

/// Produce code with a randomly chosen method and execute it.
pub async fn run_iteration(
    source: &StrategySource,
    executor: &ContainerExecutor,
    feedback: &str,
    options: ExecuteOptions,
) -> Result<IterationOutcome> {
    run_iteration_with(source, source.next_method(), executor, feedback, options).await
}

/// [`run_iteration`] with the method already decided.
pub async fn run_iteration_with(
    source: &StrategySource,
    method: GenerationMethod,
    executor: &ContainerExecutor,
    feedback: &str,
    options: ExecuteOptions,
) -> Result<IterationOutcome> {
    let producer = source.producer(method);
    let code = producer.produce(feedback).await?;
    if code.trim().is_empty() {
        return Err(Error::Producer(format!("{} producer returned no code", method)));
    }
    info!("Generated {} bytes of strategy code via {}", code.len(), method);

    let result = executor.execute(&code, options).await;
    Ok(IterationOutcome { method, code, result })
}
