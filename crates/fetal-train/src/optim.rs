use burn::{
    module::AutodiffModule,
    optim::{
        adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer, Sgd, SgdConfig,
    },
    tensor::backend::AutodiffBackend,
    LearningRate,
};
use fetal_network::model::EnvelopeNet;
use serde::{Deserialize, Serialize};

pub type AdamOptimizer<B> =
    OptimizerAdaptor<Adam<<B as AutodiffBackend>::InnerBackend>, EnvelopeNet<B>, B>;
pub type SgdOptimizer<B> =
    OptimizerAdaptor<Sgd<<B as AutodiffBackend>::InnerBackend>, EnvelopeNet<B>, B>;

/// An optimizer bound to the learning rate it was constructed with.
#[derive(Debug)]
pub struct TunedOptimizer<O> {
    optimizer: O,
    learning_rate: LearningRate,
}

impl<O> TunedOptimizer<O> {
    pub fn new(optimizer: O, learning_rate: LearningRate) -> Self {
        Self {
            optimizer,
            learning_rate,
        }
    }

    pub fn learning_rate(&self) -> LearningRate {
        self.learning_rate
    }

    pub fn step<B, M>(&mut self, module: M, gradients: GradientsParams) -> M
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        self.optimizer.step(self.learning_rate, module, gradients)
    }
}

pub fn adam<B: AutodiffBackend>(learning_rate: LearningRate) -> TunedOptimizer<AdamOptimizer<B>> {
    TunedOptimizer::new(AdamConfig::new().with_epsilon(1e-7).init(), learning_rate)
}

pub fn sgd<B: AutodiffBackend>(learning_rate: LearningRate) -> TunedOptimizer<SgdOptimizer<B>> {
    TunedOptimizer::new(SgdConfig::new().init(), learning_rate)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    Sgd,
}
