/// ONNX Runtime backed [`TensorModel`]
///
/// Sessions are created with an execution-provider fallback chain
/// (TensorRT -> CUDA -> CPU) driven by `RecognitionConfig::execution_provider`.
use crate::config::RecognitionConfig;
use crate::model::TensorModel;
use anyhow::{anyhow, Context, Result};
use ndarray::{Array, ArrayD, IxDyn};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
        TensorRTExecutionProvider,
    },
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use std::sync::Mutex;
use std::time::Instant;

/// Output tensor names tried in order; exporters disagree on naming
const OUTPUT_NAMES: &[&str] = &["output0", "output", "logits", "embedding", "embeddings", "boxes"];

pub struct OnnxModel {
    name: String,
    session: Mutex<Session>,
    execution_provider: &'static str,
}

impl OnnxModel {
    pub fn load(
        name: impl Into<String>,
        model_path: &str,
        config: &RecognitionConfig,
    ) -> Result<Self> {
        let name = name.into();
        let (session, execution_provider) = create_session(model_path, config)
            .with_context(|| format!("Failed to load {} model", name))?;

        tracing::info!(
            model = %name,
            path = model_path,
            provider = execution_provider,
            device = config.device_id,
            "Initialized ONNX model"
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            execution_provider,
        })
    }

    pub fn execution_provider(&self) -> &'static str {
        self.execution_provider
    }
}

impl TensorModel for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let input_tensor = Value::from_array(input)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("Failed to lock {} session: {}", self.name, e))?;

        let inference_start = Instant::now();
        let outputs = session.run(ort::inputs![input_tensor])?;
        telemetry::metrics::INFERENCE_TIME
            .with_label_values(&[self.name.as_str()])
            .observe(inference_start.elapsed().as_secs_f64());

        let output_value = OUTPUT_NAMES
            .iter()
            .find_map(|name| outputs.get(*name))
            .with_context(|| {
                format!(
                    "No output tensor found for {} (tried: {})",
                    self.name,
                    OUTPUT_NAMES.join(", ")
                )
            })?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;

        let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        Ok(Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?)
    }
}

fn providers_for(provider: &str, device_id: i32) -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    if provider == "TensorRT" {
        providers.push(
            TensorRTExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
        );
    }
    providers.push(CUDAExecutionProvider::default().with_device_id(device_id).build());
    providers.push(CPUExecutionProvider::default().build());
    providers
}

fn commit(
    model_path: &str,
    config: &RecognitionConfig,
    providers: Vec<ExecutionProviderDispatch>,
) -> Result<Session> {
    let mut builder = Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(config.intra_threads)
        .context("Failed to set intra threads")?
        .with_inter_threads(config.inter_threads)
        .context("Failed to set inter threads")?;

    if !providers.is_empty() {
        builder = builder
            .with_execution_providers(providers)
            .context("Failed to set execution providers")?;
    }

    builder
        .commit_from_file(model_path)
        .context("Failed to load model from file")
}

/// Build a session, walking down from the preferred provider to CPU
fn create_session(model_path: &str, config: &RecognitionConfig) -> Result<(Session, &'static str)> {
    let attempts: &[&'static str] = match config.execution_provider.to_uppercase().as_str() {
        "TENSORRT" => &["TensorRT", "CUDA"],
        "CUDA" => &["CUDA"],
        _ => &[],
    };

    for &provider in attempts {
        tracing::info!("Attempting {} for {}", provider, model_path);
        match commit(model_path, config, providers_for(provider, config.device_id)) {
            Ok(session) => return Ok((session, provider)),
            Err(e) => {
                tracing::warn!("{} failed for {}, falling back: {:#}", provider, model_path, e)
            }
        }
    }

    tracing::info!("Using CPU for {}", model_path);
    let session = commit(model_path, config, Vec::new())?;
    Ok((session, "CPU"))
}
