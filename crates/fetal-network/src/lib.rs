use std::{fmt::Display, num::ParseIntError, str::FromStr};

pub mod metrics;
pub mod model;

/// The shape of a single example: `depth` slices of `height` by `width` pixels.
///
/// The slices are fed to the network as input channels, so a batch of examples has the layout
/// `[batch, depth, height, width]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputShape {
    depth: usize,
    height: usize,
    width: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum InputShapeError {
    #[error("input {0} must be non-zero")]
    ZeroExtent(&'static str),
}

impl InputShape {
    pub const DEFAULT: Self = Self {
        depth: 5,
        height: 128,
        width: 128,
    };

    pub fn new(depth: usize, height: usize, width: usize) -> Result<Self, InputShapeError> {
        for (extent, name) in [(depth, "depth"), (height, "height"), (width, "width")] {
            if extent == 0 {
                return Err(InputShapeError::ZeroExtent(name));
            }
        }

        Ok(Self {
            depth,
            height,
            width,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// The dimensions of a batch of `batch_size` examples of this shape.
    pub fn batch_dims(&self, batch_size: usize) -> [usize; 4] {
        [batch_size, self.depth, self.height, self.width]
    }
}

impl Default for InputShape {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Display for InputShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.depth, self.height, self.width)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseInputShapeError {
    #[error("input shape must have 3 parts separated by 'x'")]
    InvalidPartAmount,
    #[error("extent must be an unsigned integer")]
    InvalidExtent(#[source] ParseIntError),
    #[error("input shape is invalid")]
    InvalidShape(#[source] InputShapeError),
}

impl FromStr for InputShape {
    type Err = ParseInputShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let extents = s
            .trim()
            .split('x')
            .map(|extent| {
                extent
                    .trim()
                    .parse::<usize>()
                    .map_err(ParseInputShapeError::InvalidExtent)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let &[depth, height, width] = extents.as_slice() else {
            return Err(ParseInputShapeError::InvalidPartAmount);
        };

        Self::new(depth, height, width).map_err(ParseInputShapeError::InvalidShape)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use test_case::test_case;

    use crate::{InputShape, InputShapeError, ParseInputShapeError};

    #[test_case("5x128x128", 5, 128, 128; "default shape")]
    #[test_case("1x7x9", 1, 7, 9; "odd extents")]
    #[test_case(" 3 x 64 x 32 ", 3, 64, 32; "surrounding whitespace")]
    fn parse_valid_shapes(text: &str, depth: usize, height: usize, width: usize) {
        let shape = InputShape::from_str(text).unwrap();

        assert_eq!(shape, InputShape::new(depth, height, width).unwrap());
    }

    #[test]
    fn display_matches_parse_format() {
        let shape = InputShape::new(5, 128, 96).unwrap();

        assert_eq!(shape.to_string(), "5x128x96");
    }

    #[test_case("5x128"; "too few parts")]
    #[test_case("5x128x128x2"; "too many parts")]
    fn parse_rejects_part_amount(text: &str) {
        assert_eq!(
            InputShape::from_str(text),
            Err(ParseInputShapeError::InvalidPartAmount)
        );
    }

    #[test]
    fn parse_rejects_non_integers() {
        assert!(matches!(
            InputShape::from_str("5x128xwide"),
            Err(ParseInputShapeError::InvalidExtent(_))
        ));
    }

    #[test_case(0, 128, 128, "depth")]
    #[test_case(5, 0, 128, "height")]
    #[test_case(5, 128, 0, "width")]
    fn zero_extents_are_rejected(depth: usize, height: usize, width: usize, name: &'static str) {
        assert_eq!(
            InputShape::new(depth, height, width),
            Err(InputShapeError::ZeroExtent(name))
        );
    }

    #[test]
    fn batch_dims_put_depth_on_the_channel_axis() {
        assert_eq!(InputShape::DEFAULT.batch_dims(4), [4, 5, 128, 128]);
    }
}
