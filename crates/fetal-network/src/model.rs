use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AvgPool2d, AvgPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, ReLU,
    },
    tensor::{activation, backend::Backend, Tensor},
};
use std::fmt::Display;

use crate::{InputShape, InputShapeError};

const KERNEL_LENGTH: usize = 3;
const BATCH_NORM: bool = true;

pub const DOWNSAMPLING_BLOCKS: usize = 3;
pub const DOWNSAMPLING_FILTERS: usize = 16;
pub const HIDDEN_CHANNELS: usize = 1000;
/// Envelope and background.
pub const CLASSES: usize = 2;

// Running statistics keep 99% of their value per batch. Burn's momentum is the weight of the
// newest batch.
const BATCH_NORM_EPSILON: f64 = 1e-3;
const BATCH_NORM_MOMENTUM: f64 = 0.01;

/// Average pooling halves each spatial extent, rounding up.
fn pooled_extent(extent: usize) -> usize {
    extent.div_ceil(2)
}

fn batch_norm<B: Backend>(features: usize) -> BatchNorm<B, 2> {
    BatchNormConfig::new(features)
        .with_epsilon(BATCH_NORM_EPSILON)
        .with_momentum(BATCH_NORM_MOMENTUM)
        .init()
}

/// Bound of the Glorot uniform distribution for a same-padded convolution.
fn glorot_limit(input_channels: usize, output_channels: usize) -> f64 {
    let receptive_field = KERNEL_LENGTH * KERNEL_LENGTH;
    let fans = (input_channels + output_channels) * receptive_field;

    (6.0 / fans as f64).sqrt()
}

fn same_conv<B: Backend>(input_channels: usize, output_channels: usize) -> Conv2d<B> {
    let limit = glorot_limit(input_channels, output_channels);

    // Biases are drawn from the same distribution as the kernel.
    Conv2dConfig::new(
        [input_channels, output_channels],
        [KERNEL_LENGTH, KERNEL_LENGTH],
    )
    .with_padding(PaddingConfig2d::Same)
    .with_initializer(Initializer::Uniform {
        min: -limit,
        max: limit,
    })
    .init()
}

/// 2x2 average pooling with stride 2 that keeps `ceil(n / 2)` of each extent.
///
/// An odd extent gets one cell of padding on both sides, so the first window covers only the
/// first row or column. Padded cells are left out of the average.
fn same_avg_pool(height: usize, width: usize) -> AvgPool2d {
    AvgPool2dConfig::new([2, 2])
        .with_strides([2, 2])
        .with_padding(PaddingConfig2d::Explicit(height % 2, width % 2))
        .with_count_include_pad(false)
        .init()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Input,
    Downsampling,
    Projection,
    Softmax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Tanh,
}

/// One node of the layer chain, with the `[channels, height, width]` shape it outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSummary {
    pub kind: LayerKind,
    pub activation: Option<Activation>,
    pub batch_norm: bool,
    pub output_shape: [usize; 3],
}

impl LayerSummary {
    fn input(shape: InputShape) -> Self {
        Self {
            kind: LayerKind::Input,
            activation: None,
            batch_norm: false,
            output_shape: [shape.depth(), shape.height(), shape.width()],
        }
    }

    fn softmax(output_shape: [usize; 3]) -> Self {
        Self {
            kind: LayerKind::Softmax,
            activation: None,
            batch_norm: false,
            output_shape,
        }
    }
}

impl Display for LayerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            LayerKind::Input => "input",
            LayerKind::Downsampling => "downsampling",
            LayerKind::Projection => "projection",
            LayerKind::Softmax => "softmax",
        };
        let activation = match self.activation {
            Some(Activation::Relu) => "relu",
            Some(Activation::Tanh) => "tanh",
            None => "-",
        };
        let [channels, height, width] = self.output_shape;

        write!(
            f,
            "{kind:<14}{activation:<6}{:<10}{channels}x{height}x{width}",
            if self.batch_norm { "bnorm" } else { "-" },
        )
    }
}

/// The layer chain a network built for `shape` consists of, computed without allocating weights.
pub fn plan(shape: InputShape) -> Vec<LayerSummary> {
    let mut layers = vec![LayerSummary::input(shape)];
    let mut height = shape.height();
    let mut width = shape.width();

    for _ in 0..DOWNSAMPLING_BLOCKS {
        height = pooled_extent(height);
        width = pooled_extent(width);

        layers.push(LayerSummary {
            kind: LayerKind::Downsampling,
            activation: Some(Activation::Relu),
            batch_norm: BATCH_NORM,
            output_shape: [DOWNSAMPLING_FILTERS, height, width],
        });
    }

    for (channels, batch_norm) in [(HIDDEN_CHANNELS, BATCH_NORM), (CLASSES, false)] {
        layers.push(LayerSummary {
            kind: LayerKind::Projection,
            activation: Some(Activation::Tanh),
            batch_norm,
            output_shape: [channels, height, width],
        });
    }

    layers.push(LayerSummary::softmax([CLASSES, height, width]));

    layers
}

#[derive(Module, Debug)]
struct DownsamplingBlock<B: Backend> {
    conv: Conv2d<B>,
    activation: ReLU,
    avg_pool: AvgPool2d,
    batch_norm: Option<BatchNorm<B, 2>>,
}

impl<B: Backend> DownsamplingBlock<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.activation.forward(x);
        let x = self.avg_pool.forward(x);

        match &self.batch_norm {
            Some(batch_norm) => batch_norm.forward(x),
            None => x,
        }
    }
}

#[derive(Config, Debug)]
struct DownsamplingBlockConfig {
    input_channels: usize,
    input_height: usize,
    input_width: usize,
    batch_norm: bool,
}

impl DownsamplingBlockConfig {
    fn init<B: Backend>(&self) -> DownsamplingBlock<B> {
        DownsamplingBlock {
            conv: same_conv(self.input_channels, DOWNSAMPLING_FILTERS),
            activation: ReLU::default(),
            avg_pool: same_avg_pool(self.input_height, self.input_width),
            batch_norm: self
                .batch_norm
                .then(|| batch_norm(DOWNSAMPLING_FILTERS)),
        }
    }
}

/// A fully-connected layer expressed as a convolution, so the spatial layout survives.
#[derive(Module, Debug)]
struct ProjectionBlock<B: Backend> {
    output_channels: usize,
    conv: Conv2d<B>,
    batch_norm: Option<BatchNorm<B, 2>>,
}

impl<B: Backend> ProjectionBlock<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input).tanh();

        match &self.batch_norm {
            Some(batch_norm) => batch_norm.forward(x),
            None => x,
        }
    }
}

#[derive(Config, Debug)]
struct ProjectionBlockConfig {
    input_channels: usize,
    output_channels: usize,
    batch_norm: bool,
}

impl ProjectionBlockConfig {
    fn init<B: Backend>(&self) -> ProjectionBlock<B> {
        ProjectionBlock {
            output_channels: self.output_channels,
            conv: same_conv(self.input_channels, self.output_channels),
            batch_norm: self.batch_norm.then(|| batch_norm(self.output_channels)),
        }
    }
}

/// Segments a stack of slices into per-pixel envelope and background probabilities.
///
/// Three downsampling blocks reduce each spatial extent by a factor of 8 (rounding up at every
/// stage), then two projections bring the channels to [`CLASSES`], and a softmax over the channel
/// axis turns the scores into probabilities.
#[derive(Module, Debug)]
pub struct EnvelopeNet<B: Backend> {
    depth: usize,
    height: usize,
    width: usize,
    downsampling_blocks: Vec<DownsamplingBlock<B>>,
    projection_blocks: Vec<ProjectionBlock<B>>,
}

impl<B: Backend> EnvelopeNet<B> {
    pub fn new(input_shape: InputShape) -> Self {
        let mut downsampling_blocks = Vec::with_capacity(DOWNSAMPLING_BLOCKS);
        let mut channels = input_shape.depth();
        let mut height = input_shape.height();
        let mut width = input_shape.width();

        for _ in 0..DOWNSAMPLING_BLOCKS {
            downsampling_blocks.push(
                DownsamplingBlockConfig::new(channels, height, width, BATCH_NORM).init(),
            );

            channels = DOWNSAMPLING_FILTERS;
            height = pooled_extent(height);
            width = pooled_extent(width);
        }

        Self {
            depth: input_shape.depth(),
            height: input_shape.height(),
            width: input_shape.width(),
            downsampling_blocks,
            projection_blocks: vec![
                ProjectionBlockConfig::new(DOWNSAMPLING_FILTERS, HIDDEN_CHANNELS, BATCH_NORM)
                    .init(),
                // The final projection is never normalized.
                ProjectionBlockConfig::new(HIDDEN_CHANNELS, CLASSES, false).init(),
            ],
        }
    }

    pub fn input_shape(&self) -> InputShape {
        InputShape {
            depth: self.depth,
            height: self.height,
            width: self.width,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self
            .downsampling_blocks
            .iter()
            .fold(input, |x, block| block.forward(x));
        let x = self
            .projection_blocks
            .iter()
            .fold(x, |x, block| block.forward(x));

        activation::softmax(x, 1)
    }

    /// The layer chain as built, read back from the blocks themselves.
    pub fn summary(&self) -> Vec<LayerSummary> {
        let shape = self.input_shape();
        let mut layers = vec![LayerSummary::input(shape)];
        let mut height = shape.height();
        let mut width = shape.width();

        for block in &self.downsampling_blocks {
            height = pooled_extent(height);
            width = pooled_extent(width);

            layers.push(LayerSummary {
                kind: LayerKind::Downsampling,
                activation: Some(Activation::Relu),
                batch_norm: block.batch_norm.is_some(),
                output_shape: [DOWNSAMPLING_FILTERS, height, width],
            });
        }

        for block in &self.projection_blocks {
            layers.push(LayerSummary {
                kind: LayerKind::Projection,
                activation: Some(Activation::Tanh),
                batch_norm: block.batch_norm.is_some(),
                output_shape: [block.output_channels, height, width],
            });
        }

        let channels = self
            .projection_blocks
            .last()
            .map_or(DOWNSAMPLING_FILTERS, |block| block.output_channels);
        layers.push(LayerSummary::softmax([channels, height, width]));

        layers
    }
}

#[derive(Config, Debug)]
pub struct FetalNetConfig {
    #[config(default = 5)]
    depth: usize,
    #[config(default = 128)]
    height: usize,
    #[config(default = 128)]
    width: usize,
}

impl FetalNetConfig {
    pub fn from_input_shape(shape: InputShape) -> Self {
        Self::new()
            .with_depth(shape.depth())
            .with_height(shape.height())
            .with_width(shape.width())
    }

    pub fn input_shape(&self) -> Result<InputShape, InputShapeError> {
        InputShape::new(self.depth, self.height, self.width)
    }

    pub fn init<B: Backend>(&self) -> Result<EnvelopeNet<B>, InputShapeError> {
        Ok(EnvelopeNet::new(self.input_shape()?))
    }
}
