use std::{
    error::Error,
    fs::File,
    io::{self, Write},
    path::PathBuf,
};

use burn::{
    backend::Autodiff,
    config::Config,
    module::Module,
    optim::Optimizer,
    tensor::{backend::Backend, Distribution, Tensor},
};
use burn_ndarray::NdArray;
use clap::{Parser, Subcommand};
use fetal_network::{
    model::{self, EnvelopeNet},
    InputShape,
};
use fetal_train::{
    fetal_envelope_model,
    optim::{self, OptimizerKind, TunedOptimizer},
    CompiledModel, TrainingConfig,
};
use tracing::Level;

type SmokeBackend = Autodiff<NdArray<f32>>;

#[derive(Parser)]
#[command(version = "0.1.0")]
#[command(about = "Fetal envelope segmentation network")]
struct Cli {
    #[arg(
        short,
        long,
        help = "Activate tracing and write results to the specified file after truncating or creating it"
    )]
    trace_file: Option<PathBuf>,
    #[arg(
        short,
        long,
        help = "Load the training configuration from a JSON file instead of using the defaults"
    )]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Print the layer chain of the network")]
    Summary {
        #[arg(short, long, help = "Input shape as DEPTHxHEIGHTxWIDTH")]
        input_shape: Option<InputShape>,
    },
    #[command(about = "Compile the model and train it on one batch of random input")]
    Smoke {
        #[arg(short, long, help = "Input shape as DEPTHxHEIGHTxWIDTH")]
        input_shape: Option<InputShape>,
        #[arg(short, long, default_value_t = 1)]
        batch_size: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SmokeError {
    #[error("batch size must be non-zero")]
    EmptyBatch,
}

fn initialize_tracing(trace_file: PathBuf) -> Result<(), Box<dyn Error>> {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(File::create(trace_file)?)
        .event_format(tracing_subscriber::fmt::format().without_time().json())
        .with_thread_ids(true)
        .with_max_level(Level::TRACE)
        .finish();

    Ok(tracing::subscriber::set_global_default(subscriber)?)
}

fn load_config(path: Option<PathBuf>) -> Result<TrainingConfig, Box<dyn Error>> {
    let config = match path {
        Some(path) => TrainingConfig::load(path)?,
        None => TrainingConfig::new(model::FetalNetConfig::new()),
    };

    tracing::info!(%config, "loaded configuration");

    Ok(config)
}

fn summary<B: Backend>(input_shape: InputShape, output: &mut impl Write) -> io::Result<()> {
    let network = EnvelopeNet::<B>::new(input_shape);

    for layer in network.summary() {
        writeln!(output, "{layer}")?;
    }
    writeln!(output, "parameters: {}", network.num_params())
}

fn smoke_step<O>(
    mut model: CompiledModel<SmokeBackend, O>,
    batch_size: usize,
) -> Result<(), Box<dyn Error>>
where
    O: Optimizer<EnvelopeNet<SmokeBackend>, SmokeBackend>,
{
    let input_shape = model.network().input_shape();
    let [_, height, width] = model::plan(input_shape)
        .last()
        .map(|layer| layer.output_shape)
        .ok_or("network has no layers")?;

    let images = Tensor::random(input_shape.batch_dims(batch_size), Distribution::Default);
    let masks = Tensor::cat(
        vec![
            Tensor::ones([batch_size, 1, height, width]),
            Tensor::zeros([batch_size, 1, height, width]),
        ],
        1,
    );

    let loss = model.train_on_batch(images.clone(), masks);
    let probabilities = model.predict(images.inner());

    println!("loss ({:?}): {loss}", model.loss());
    println!("prediction shape: {:?}", probabilities.dims());

    Ok(())
}

fn smoke(
    config: &TrainingConfig,
    input_shape: InputShape,
    batch_size: usize,
) -> Result<(), Box<dyn Error>> {
    if batch_size == 0 {
        return Err(SmokeError::EmptyBatch.into());
    }

    fn compile<O>(
        config: &TrainingConfig,
        input_shape: InputShape,
        optimizer: impl FnOnce(f64) -> TunedOptimizer<O>,
    ) -> Result<CompiledModel<SmokeBackend, O>, Box<dyn Error>>
    where
        O: Optimizer<EnvelopeNet<SmokeBackend>, SmokeBackend>,
    {
        Ok(fetal_envelope_model(
            input_shape,
            optimizer,
            config.initial_learning_rate,
            config.loss_function,
        )?)
    }

    match config.optimizer {
        OptimizerKind::Adam => smoke_step(
            compile(config, input_shape, optim::adam::<SmokeBackend>)?,
            batch_size,
        ),
        OptimizerKind::Sgd => smoke_step(
            compile(config, input_shape, optim::sgd::<SmokeBackend>)?,
            batch_size,
        ),
    }
}

pub fn cli() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Some(trace_file) = cli.trace_file {
        initialize_tracing(trace_file)?;
    }

    let config = load_config(cli.config)?;
    let configured_shape = config.network.input_shape()?;

    match cli.command {
        Command::Summary { input_shape } => Ok(summary::<NdArray<f32>>(
            input_shape.unwrap_or(configured_shape),
            &mut io::stdout().lock(),
        )?),
        Command::Smoke {
            input_shape,
            batch_size,
        } => smoke(
            &config,
            input_shape.unwrap_or(configured_shape),
            batch_size,
        ),
    }
}
