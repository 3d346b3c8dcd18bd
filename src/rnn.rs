//! The network handle.
//!
//! `Rnn` owns nothing but its configuration, the derived parameter layout and
//! the row executor. Parameters, activations and gradients are flat buffers
//! owned by the caller, and every pass takes them explicitly:
//!
//! 1. [`Rnn::forward_train`] fills the output, the final hidden state and the
//!    reserve buffer.
//! 2. [`Rnn::backward_data`] reads the reserve buffer and fills the input
//!    gradient, the initial-hidden-state gradient and the workspace.
//! 3. [`Rnn::backward_weights`] reads the reserve buffer and the workspace and
//!    fills the parameter gradient.
//!
//! Each pass has an `_into` form that writes into caller buffers and an
//! allocating form. The `_into` forms validate every buffer length before
//! touching anything and zero what they fill, so buffers can be reused.

use crate::{
    Error, FrameLayout, PackedBatchProfile, ParameterLayout, Result, RnnConfig, RowExecutor,
    StateLayout,
};

/// Network handle: configuration, parameter layout and row executor.
#[derive(Debug, Clone)]
pub struct Rnn {
    config: RnnConfig,
    layout: ParameterLayout,
    executor: RowExecutor,
}

/// Results of [`Rnn::forward_train`].
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardOutput {
    /// `F x (D*H)` last-layer activations.
    pub output: Vec<f32>,
    /// `(L*D) x N x H`.
    pub final_hidden: Vec<f32>,
    /// Pre-activation region followed by the activated region.
    pub reserve: Vec<f32>,
}

/// Results of [`Rnn::forward_infer`].
#[derive(Debug, Clone, PartialEq)]
pub struct InferOutput {
    /// `F x (D*H)` last-layer activations.
    pub output: Vec<f32>,
    /// `(L*D) x N x H`.
    pub final_hidden: Vec<f32>,
}

/// Results of [`Rnn::backward_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct BackwardDataOutput {
    /// `F x I`.
    pub input_grad: Vec<f32>,
    /// `(L*D) x N x H`.
    pub initial_hidden_grad: Vec<f32>,
    /// Gradient with respect to every pre-activation, `L x F x (D*H)`.
    pub workspace: Vec<f32>,
}

impl Rnn {
    pub fn new(config: RnnConfig) -> Result<Self> {
        Self::with_executor(config, RowExecutor::Sequential)
    }

    pub fn with_executor(config: RnnConfig, executor: RowExecutor) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            layout: ParameterLayout::new(&config),
            config,
            executor,
        })
    }

    #[inline]
    pub fn config(&self) -> &RnnConfig {
        &self.config
    }

    #[inline]
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    #[inline]
    pub fn executor(&self) -> &RowExecutor {
        &self.executor
    }

    /// Swap the row executor; results do not depend on it.
    pub fn set_executor(&mut self, executor: RowExecutor) {
        self.executor = executor;
    }

    #[inline]
    pub fn param_len(&self) -> usize {
        self.layout.len()
    }

    #[inline]
    pub fn input_len(&self, profile: &PackedBatchProfile) -> usize {
        profile.total_frames() * self.config.input_size
    }

    #[inline]
    pub fn output_len(&self, profile: &PackedBatchProfile) -> usize {
        profile.total_frames() * self.config.frame_width()
    }

    /// Length of an initial/final hidden state or of its gradient.
    #[inline]
    pub fn hidden_len(&self, profile: &PackedBatchProfile) -> usize {
        self.state_layout(profile).len()
    }

    #[inline]
    pub fn reserve_len(&self, profile: &PackedBatchProfile) -> usize {
        self.frame_layout(profile).reserve_len()
    }

    #[inline]
    pub fn workspace_len(&self, profile: &PackedBatchProfile) -> usize {
        self.frame_layout(profile).region_len()
    }

    #[inline]
    pub fn state_layout(&self, profile: &PackedBatchProfile) -> StateLayout {
        StateLayout::new(&self.config, profile)
    }

    #[inline]
    pub fn frame_layout(&self, profile: &PackedBatchProfile) -> FrameLayout {
        FrameLayout::new(&self.config, profile)
    }

    /// Checks that every buffer length for `profile` fits in `usize`.
    ///
    /// The engines call this before any size query, so the queries can be
    /// used unchecked for a profile that passed.
    pub fn check_profile(&self, profile: &PackedBatchProfile) -> Result<()> {
        let cfg = &self.config;
        let frames = profile.total_frames();
        let region = cfg
            .num_layers
            .checked_mul(frames)
            .and_then(|v| v.checked_mul(cfg.frame_width()));
        let reserve = region.and_then(|v| v.checked_mul(2));
        let input = frames.checked_mul(cfg.input_size);
        let hidden = (cfg.num_layers * cfg.num_directions())
            .checked_mul(profile.max_batch())
            .and_then(|v| v.checked_mul(cfg.hidden_size));

        if reserve.is_none() || input.is_none() || hidden.is_none() {
            return Err(Error::InvalidProfile(format!(
                "{frames} frames of batch up to {} overflow the buffer sizes of this network",
                profile.max_batch()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, RnnBuilder};

    #[test]
    fn size_queries_follow_the_profile() {
        let rnn = RnnBuilder::new(4, 3)
            .unwrap()
            .num_layers(2)
            .unwrap()
            .direction(Direction::Bidirectional)
            .build()
            .unwrap();
        let profile = PackedBatchProfile::new(vec![3, 2, 2]).unwrap();

        assert_eq!(rnn.input_len(&profile), 7 * 4);
        assert_eq!(rnn.output_len(&profile), 7 * 6);
        assert_eq!(rnn.hidden_len(&profile), 2 * 2 * 3 * 3);
        assert_eq!(rnn.workspace_len(&profile), 2 * 7 * 6);
        assert_eq!(rnn.reserve_len(&profile), 2 * 2 * 7 * 6);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn oversized_profiles_are_rejected() {
        let rnn = RnnBuilder::new(1, 1 << 16)
            .unwrap()
            .num_layers(1 << 10)
            .unwrap()
            .build()
            .unwrap();
        let profile = PackedBatchProfile::uniform(1 << 20, 1 << 20).unwrap();
        assert!(matches!(
            rnn.check_profile(&profile),
            Err(Error::InvalidProfile(_))
        ));
        assert!(rnn.check_profile(&PackedBatchProfile::uniform(2, 3).unwrap()).is_ok());
    }
}
