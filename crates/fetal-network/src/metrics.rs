use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

// Probabilities are kept this far away from 0 and 1 so the logarithms stay finite.
const EPSILON: f32 = 1e-7;
const DICE_SMOOTHING: f32 = 1.0;

/// Mean binary cross-entropy over every element.
pub fn binary_cross_entropy<B: Backend, const D: usize>(
    probabilities: Tensor<B, D>,
    targets: Tensor<B, D>,
) -> Tensor<B, 1> {
    let probabilities = probabilities.clamp(EPSILON, 1.0 - EPSILON);

    let positive = targets.clone().mul(probabilities.clone().log());
    let negative = targets
        .neg()
        .add_scalar(1.0)
        .mul(probabilities.neg().add_scalar(1.0).log());

    positive.add(negative).neg().mean()
}

/// Smoothed overlap between predicted and target masks over the whole batch. 1 means the masks
/// coincide.
pub fn dice_coefficient<B: Backend, const D: usize>(
    probabilities: Tensor<B, D>,
    targets: Tensor<B, D>,
) -> Tensor<B, 1> {
    let intersection = targets.clone().mul(probabilities.clone()).sum();
    let total = targets.sum().add(probabilities.sum());

    intersection
        .mul_scalar(2.0)
        .add_scalar(DICE_SMOOTHING)
        .div(total.add_scalar(DICE_SMOOTHING))
}

pub fn dice_coefficient_loss<B: Backend, const D: usize>(
    probabilities: Tensor<B, D>,
    targets: Tensor<B, D>,
) -> Tensor<B, 1> {
    dice_coefficient(probabilities, targets).neg()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossFunction {
    BinaryCrossEntropy,
    DiceCoefficient,
}

impl LossFunction {
    pub fn forward<B: Backend, const D: usize>(
        &self,
        probabilities: Tensor<B, D>,
        targets: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        match self {
            Self::BinaryCrossEntropy => binary_cross_entropy(probabilities, targets),
            Self::DiceCoefficient => dice_coefficient_loss(probabilities, targets),
        }
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Shape, Tensor};
    use burn_ndarray::NdArray;
    use test_case::test_case;

    use super::{binary_cross_entropy, dice_coefficient, LossFunction};

    type TestBackend = NdArray<f32>;

    fn tensor(values: [f32; 4]) -> Tensor<TestBackend, 2> {
        Tensor::from_floats(values).reshape(Shape::new([2, 2]))
    }

    fn scalar(tensor: Tensor<TestBackend, 1>) -> f32 {
        tensor.into_data().value[0]
    }

    #[test]
    fn cross_entropy_of_perfect_prediction_is_near_zero() {
        let mask = tensor([1.0, 0.0, 0.0, 1.0]);

        assert!(scalar(binary_cross_entropy(mask.clone(), mask)) < 1e-5);
    }

    #[test]
    fn cross_entropy_of_uniform_prediction_is_ln_2() {
        let loss = binary_cross_entropy(tensor([0.5; 4]), tensor([1.0, 0.0, 0.0, 1.0]));

        assert!((scalar(loss) - std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn cross_entropy_stays_finite_for_confident_mistakes() {
        let loss =
            binary_cross_entropy(tensor([0.0, 1.0, 1.0, 0.0]), tensor([1.0, 0.0, 0.0, 1.0]));

        assert!(scalar(loss).is_finite());
    }

    #[test]
    fn dice_of_identical_masks_is_one() {
        let mask = tensor([1.0, 0.0, 1.0, 1.0]);

        assert!((scalar(dice_coefficient(mask.clone(), mask)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dice_of_disjoint_masks_is_only_smoothing() {
        let dice =
            dice_coefficient(tensor([1.0, 1.0, 0.0, 0.0]), tensor([0.0, 0.0, 1.0, 1.0]));

        // (2 * 0 + 1) / (2 + 2 + 1)
        assert!((scalar(dice) - 0.2).abs() < 1e-6);
    }

    #[test_case(LossFunction::BinaryCrossEntropy, 0.0; "cross entropy")]
    #[test_case(LossFunction::DiceCoefficient, -1.0; "dice")]
    fn loss_of_perfect_prediction(loss_function: LossFunction, expected: f32) {
        let mask = tensor([0.0, 1.0, 1.0, 0.0]);

        let loss = loss_function.forward(mask.clone(), mask);

        assert!((scalar(loss) - expected).abs() < 1e-5);
    }
}
