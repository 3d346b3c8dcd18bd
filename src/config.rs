//! Network configuration.
//!
//! `RnnBuilder` is the recommended way to describe a network. It validates
//! every field up front, so the engines can assume a consistent `RnnConfig`
//! and only check buffer sizes against the batch profile.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Activation, Error, ParameterLayout, Result, Rnn, RowExecutor};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Unidirectional,
    /// A second, reverse-time recurrence per layer with its own weights.
    Bidirectional,
}

impl Direction {
    #[inline]
    pub const fn count(self) -> usize {
        match self {
            Direction::Unidirectional => 1,
            Direction::Bidirectional => 2,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Layer 0 multiplies the input by its own input weight matrix.
    #[default]
    Linear,
    /// Layer 0 adds the raw input to its pre-activation; requires
    /// `input_size == hidden_size` and has no input weights.
    Skip,
}

/// Immutable shape and mode description of a network.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RnnConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub direction: Direction,
    pub bias: bool,
    pub input_mode: InputMode,
    pub activation: Activation,
}

impl RnnConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(Error::InvalidConfig("input_size must be > 0".to_owned()));
        }
        if self.hidden_size == 0 {
            return Err(Error::InvalidConfig("hidden_size must be > 0".to_owned()));
        }
        if self.num_layers == 0 {
            return Err(Error::InvalidConfig("num_layers must be > 0".to_owned()));
        }
        if self.input_mode == InputMode::Skip && self.input_size != self.hidden_size {
            return Err(Error::InvalidConfig(format!(
                "skip input mode requires input_size == hidden_size, got {} and {}",
                self.input_size, self.hidden_size
            )));
        }
        if ParameterLayout::checked_len(self).is_none() {
            return Err(Error::InvalidConfig(format!(
                "parameter count overflows usize (hidden_size {}, num_layers {})",
                self.hidden_size, self.num_layers
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn num_directions(&self) -> usize {
        self.direction.count()
    }

    #[inline]
    pub fn is_bidirectional(&self) -> bool {
        self.direction == Direction::Bidirectional
    }

    /// Width of one packed frame in the output, reserve and workspace buffers.
    #[inline]
    pub fn frame_width(&self) -> usize {
        self.hidden_size * self.num_directions()
    }

    /// Columns of layer `layer`'s input weight matrix.
    #[inline]
    pub fn layer_input_size(&self, layer: usize) -> usize {
        if layer > 0 {
            self.frame_width()
        } else if self.input_mode == InputMode::Skip {
            0
        } else {
            self.input_size
        }
    }
}

#[derive(Debug, Clone)]
/// Builder for an [`Rnn`].
///
/// ```rust
/// use packed_rnn::{Activation, Direction, RnnBuilder};
///
/// # fn main() -> packed_rnn::Result<()> {
/// let rnn = RnnBuilder::new(4, 8)?
///     .num_layers(2)?
///     .direction(Direction::Bidirectional)
///     .activation(Activation::Tanh)
///     .build()?;
/// assert_eq!(rnn.config().frame_width(), 16);
/// # Ok(())
/// # }
/// ```
pub struct RnnBuilder {
    config: RnnConfig,
    executor: RowExecutor,
}

impl RnnBuilder {
    /// Start a single-layer, unidirectional, biased tanh network.
    pub fn new(input_size: usize, hidden_size: usize) -> Result<Self> {
        if input_size == 0 {
            return Err(Error::InvalidConfig("input_size must be > 0".to_owned()));
        }
        if hidden_size == 0 {
            return Err(Error::InvalidConfig("hidden_size must be > 0".to_owned()));
        }
        Ok(Self {
            config: RnnConfig {
                input_size,
                hidden_size,
                num_layers: 1,
                direction: Direction::Unidirectional,
                bias: true,
                input_mode: InputMode::Linear,
                activation: Activation::Tanh,
            },
            executor: RowExecutor::Sequential,
        })
    }

    pub fn num_layers(mut self, num_layers: usize) -> Result<Self> {
        if num_layers == 0 {
            return Err(Error::InvalidConfig("num_layers must be > 0".to_owned()));
        }
        self.config.num_layers = num_layers;
        Ok(self)
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.config.direction = direction;
        self
    }

    pub fn bidirectional(self, bidirectional: bool) -> Self {
        self.direction(if bidirectional {
            Direction::Bidirectional
        } else {
            Direction::Unidirectional
        })
    }

    pub fn bias(mut self, bias: bool) -> Self {
        self.config.bias = bias;
        self
    }

    /// Skip mode is checked against the sizes in [`RnnBuilder::build`].
    pub fn input_mode(mut self, input_mode: InputMode) -> Self {
        self.config.input_mode = input_mode;
        self
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.config.activation = activation;
        self
    }

    /// Row executor used by all three passes.
    pub fn executor(mut self, executor: RowExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn build_config(&self) -> Result<RnnConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    pub fn build(self) -> Result<Rnn> {
        let config = self.build_config()?;
        Rnn::with_executor(config, self.executor)
    }
}
