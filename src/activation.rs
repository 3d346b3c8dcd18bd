//! Recurrence nonlinearity.
//!
//! Every layer computes a pre-activation sum `z` per hidden unit and stores
//! `h = activation(z)`. Both values are kept in the reserve buffer, and the
//! backward pass evaluates the derivative at the *pre-activation* `z`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Element-wise nonlinearity of a vanilla RNN.
pub enum Activation {
    #[cfg_attr(feature = "serde", serde(rename = "relu"))]
    ReLU,
    #[default]
    Tanh,
}

impl Activation {
    #[inline]
    pub fn forward(self, x: f32) -> f32 {
        match self {
            Activation::ReLU => {
                if x > 0.0 {
                    x
                } else {
                    0.0
                }
            }
            Activation::Tanh => x.tanh(),
        }
    }

    /// Derivative with respect to the pre-activation value `x`.
    ///
    /// ReLU uses the `x > 0` test, so the derivative at exactly `0.0` is `0.0`.
    #[inline]
    pub fn derivative(self, x: f32) -> f32 {
        match self {
            Activation::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
        }
    }
}
