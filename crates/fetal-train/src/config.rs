use burn::config::Config;
use fetal_network::{metrics::LossFunction, model::FetalNetConfig};

use crate::optim::OptimizerKind;

/// Loaded JSON must list every field; the defaults only apply to [`TrainingConfig::new`].
#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub network: FetalNetConfig,
    #[config(default = "OptimizerKind::Adam")]
    pub optimizer: OptimizerKind,
    #[config(default = 5e-4)]
    pub initial_learning_rate: f64,
    /// Recorded on the compiled model but not trained against.
    #[config(default = "LossFunction::DiceCoefficient")]
    pub loss_function: LossFunction,
}

#[cfg(test)]
mod tests {
    use burn::config::Config;
    use fetal_network::{metrics::LossFunction, model::FetalNetConfig, InputShape};

    use super::TrainingConfig;
    use crate::optim::OptimizerKind;

    #[test]
    fn defaults_match_the_reference_setup() {
        let config = TrainingConfig::new(FetalNetConfig::new());

        assert_eq!(config.network.input_shape(), Ok(InputShape::DEFAULT));
        assert_eq!(config.optimizer, OptimizerKind::Adam);
        assert_eq!(config.initial_learning_rate, 5e-4);
        assert_eq!(config.loss_function, LossFunction::DiceCoefficient);
    }

    #[test]
    fn complete_json_overrides_every_field() {
        let config = TrainingConfig::load_binary(
            br#"{
                "network": {"depth": 3, "height": 64, "width": 64},
                "optimizer": "Sgd",
                "initial_learning_rate": 0.01,
                "loss_function": "BinaryCrossEntropy"
            }"#,
        )
        .unwrap();

        assert_eq!(config.network.input_shape(), InputShape::new(3, 64, 64));
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.initial_learning_rate, 0.01);
        assert_eq!(config.loss_function, LossFunction::BinaryCrossEntropy);
    }

    #[test]
    fn saved_json_loads_back() {
        let config = TrainingConfig::new(FetalNetConfig::new().with_depth(7))
            .with_optimizer(OptimizerKind::Sgd)
            .with_initial_learning_rate(2e-3);

        let loaded = TrainingConfig::load_binary(config.to_string().as_bytes()).unwrap();

        assert_eq!(loaded.network.input_shape(), InputShape::new(7, 128, 128));
        assert_eq!(loaded.optimizer, OptimizerKind::Sgd);
        assert_eq!(loaded.initial_learning_rate, 2e-3);
        assert_eq!(loaded.loss_function, LossFunction::DiceCoefficient);
    }

    #[test]
    fn partial_json_is_rejected() {
        let result = TrainingConfig::load_binary(
            br#"{"network": {"depth": 3, "height": 64, "width": 64}, "optimizer": "Sgd"}"#,
        );

        assert!(result.is_err());
    }
}
