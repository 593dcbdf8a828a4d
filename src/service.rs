//! Request surface consumed by the editor backend.
//!
//! [`WorkflowService`] ties the pipeline store, the compiler and the
//! simulation runner together. Authorization happens upstream.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::codegen::bindings::{referenced_secrets, secret_env_var};
use crate::codegen::{BindingContext, ChainRegistry, CodeGenerator, GeneratedWorkflow};
use crate::error::ServiceError;
use crate::logs::Subscription;
use crate::parse::types::Pipeline;
use crate::secrets::SecretResolver;
use crate::simulation::{LaunchOptions, SimulationRunner, SimulationSession};
use crate::validate::{Diagnostic, Validator, is_compilable, merge_warnings};

/// Source of pipeline definitions.
pub trait PipelineStore: Send + Sync {
    fn get(&self, pipeline_id: &str) -> Option<Pipeline>;
}

#[derive(Debug, Default)]
pub struct InMemoryPipelineStore {
    pipelines: RwLock<HashMap<String, Pipeline>>,
}

impl InMemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a pipeline under its id.
    pub fn insert(&self, pipeline: Pipeline) {
        self.pipelines
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pipeline.id.clone(), pipeline);
    }

    pub fn remove(&self, pipeline_id: &str) -> Option<Pipeline> {
        self.pipelines
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(pipeline_id)
    }
}

impl PipelineStore for InMemoryPipelineStore {
    fn get(&self, pipeline_id: &str) -> Option<Pipeline> {
        self.pipelines
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(pipeline_id)
            .cloned()
    }
}

pub struct WorkflowService<S, R> {
    store: S,
    secrets: R,
    generator: CodeGenerator,
    chains: ChainRegistry,
    runner: SimulationRunner,
}

impl<S: PipelineStore, R: SecretResolver> WorkflowService<S, R> {
    pub fn new(store: S, secrets: R, runner: SimulationRunner) -> Self {
        Self {
            store,
            secrets,
            generator: CodeGenerator::default(),
            chains: ChainRegistry::default(),
            runner,
        }
    }

    pub fn with_generator(mut self, generator: CodeGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_chains(mut self, chains: ChainRegistry) -> Self {
        self.chains = chains;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn runner(&self) -> &SimulationRunner {
        &self.runner
    }

    fn pipeline(&self, pipeline_id: &str) -> Result<Pipeline, ServiceError> {
        self.store
            .get(pipeline_id)
            .ok_or_else(|| ServiceError::PipelineNotFound(pipeline_id.to_string()))
    }

    /// Every diagnostic for the stored pipeline.
    pub fn validate(&self, pipeline_id: &str) -> Result<Vec<Diagnostic>, ServiceError> {
        let pipeline = self.pipeline(pipeline_id)?;
        Ok(Validator::new(self.generator.schemas()).validate(&pipeline))
    }

    #[tracing::instrument(skip(self))]
    pub fn compile(&self, pipeline_id: &str) -> Result<GeneratedWorkflow, ServiceError> {
        let pipeline = self.pipeline(pipeline_id)?;
        self.compile_pipeline(&pipeline)
    }

    fn compile_pipeline(&self, pipeline: &Pipeline) -> Result<GeneratedWorkflow, ServiceError> {
        let diagnostics = Validator::new(self.generator.schemas()).validate(pipeline);
        if !is_compilable(&diagnostics) {
            tracing::info!(
                errors = diagnostics.iter().filter(|d| d.is_error()).count(),
                "pipeline failed validation"
            );
            return Err(ServiceError::ValidationFailed { diagnostics });
        }

        let ctx = BindingContext::new(&self.secrets, &self.chains);
        let mut generated = self.generator.compile(pipeline, &ctx)?;
        generated.warnings = merge_warnings(diagnostics, std::mem::take(&mut generated.warnings));
        Ok(generated)
    }

    /// Compile the stored pipeline and start a simulation of the result.
    #[tracing::instrument(skip(self))]
    pub fn simulate(&self, pipeline_id: &str) -> Result<String, ServiceError> {
        if let Some(session_id) = self.runner.active_session(pipeline_id) {
            return Err(ServiceError::Conflict {
                pipeline_id: pipeline_id.to_string(),
                session_id,
            });
        }

        let pipeline = self.pipeline(pipeline_id)?;
        let generated = self.compile_pipeline(&pipeline)?;
        let options = LaunchOptions {
            env: self.secret_env(&pipeline),
        };
        let session_id = self.runner.start_with(pipeline_id, generated.code, options)?;
        tracing::info!(session_id = %session_id, "simulation requested");
        Ok(session_id)
    }

    /// Resolved values of every secret the pipeline references.
    fn secret_env(&self, pipeline: &Pipeline) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for node in &pipeline.nodes {
            let Some(schema) = self.generator.schemas().get(&node.kind) else {
                continue;
            };
            for name in referenced_secrets(node, &schema.bindings) {
                if let Some(value) = self.secrets.resolve(name) {
                    env.insert(secret_env_var(name), value.expose().to_string());
                }
            }
        }
        env
    }

    pub fn subscribe(&self, session_id: &str) -> Result<Subscription, ServiceError> {
        self.runner
            .subscribe(session_id)
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))
    }

    pub fn stop(&self, session_id: &str) -> Result<(), ServiceError> {
        Ok(self.runner.stop(session_id)?)
    }

    pub fn session(&self, session_id: &str) -> Result<SimulationSession, ServiceError> {
        self.runner
            .session(session_id)
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))
    }
}
