use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion, Tensor},
    LearningRate,
};
use fetal_network::{metrics::LossFunction, model::EnvelopeNet, InputShape};
use tracing::instrument;

use crate::optim::TunedOptimizer;

/// The loss every compiled model trains against, whatever loss was requested.
pub const TRAINING_LOSS: LossFunction = LossFunction::BinaryCrossEntropy;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum CompileError {
    #[error("learning rate must be positive and finite, got {0}")]
    InvalidLearningRate(LearningRate),
}

/// A network wired to an optimizer and a loss, ready to be trained batch by batch.
#[derive(Debug)]
pub struct CompiledModel<B: AutodiffBackend, O> {
    network: EnvelopeNet<B>,
    optimizer: TunedOptimizer<O>,
    loss: LossFunction,
    requested_loss: LossFunction,
}

impl<B, O> CompiledModel<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<EnvelopeNet<B>, B>,
{
    pub fn network(&self) -> &EnvelopeNet<B> {
        &self.network
    }

    pub fn optimizer(&self) -> &TunedOptimizer<O> {
        &self.optimizer
    }

    pub fn loss(&self) -> LossFunction {
        self.loss
    }

    /// The loss passed to [`fetal_envelope_model`]. Training does not use it.
    pub fn requested_loss(&self) -> LossFunction {
        self.requested_loss
    }

    /// Runs a single optimization step and returns the loss before the update.
    ///
    /// `masks` holds one-hot class targets with the same dimensions as the network output.
    pub fn train_on_batch(&mut self, images: Tensor<B, 4>, masks: Tensor<B, 4>) -> f32 {
        let probabilities = self.network.forward(images);
        let loss = self.loss.forward(probabilities, masks);
        let value = loss.clone().into_scalar().elem::<f32>();

        let gradients = GradientsParams::from_grads(loss.backward(), &self.network);
        self.network = self
            .optimizer
            .step::<B, _>(self.network.clone(), gradients);

        tracing::debug!(loss = value, "trained on batch");

        value
    }

    /// Per-pixel class probabilities, computed with the running normalization statistics.
    pub fn predict(&self, images: Tensor<B::InnerBackend, 4>) -> Tensor<B::InnerBackend, 4> {
        self.network.valid().forward(images)
    }
}

/// Builds the envelope network for `input_shape` and compiles it with the optimizer `optimizer`
/// constructs for `initial_learning_rate`.
///
/// The model always trains against binary cross-entropy. `loss_function` is only recorded as the
/// requested loss.
#[instrument(name = "compile envelope model", skip(optimizer))]
pub fn fetal_envelope_model<B, O, F>(
    input_shape: InputShape,
    optimizer: F,
    initial_learning_rate: LearningRate,
    loss_function: LossFunction,
) -> Result<CompiledModel<B, O>, CompileError>
where
    B: AutodiffBackend,
    O: Optimizer<EnvelopeNet<B>, B>,
    F: FnOnce(LearningRate) -> TunedOptimizer<O>,
{
    if !initial_learning_rate.is_finite() || initial_learning_rate <= 0.0 {
        return Err(CompileError::InvalidLearningRate(initial_learning_rate));
    }

    let network = EnvelopeNet::new(input_shape);

    if loss_function != TRAINING_LOSS {
        tracing::debug!(
            requested = ?loss_function,
            used = ?TRAINING_LOSS,
            "ignoring requested loss"
        );
    }

    tracing::debug!(%input_shape, "compiled envelope model");

    Ok(CompiledModel {
        network,
        optimizer: optimizer(initial_learning_rate),
        loss: TRAINING_LOSS,
        requested_loss: loss_function,
    })
}
