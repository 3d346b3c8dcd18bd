//! Backward pass with respect to the parameters.
//!
//! Consumes the workspace left by [`Rnn::backward_data`] (`dL/dz` for every
//! pre-activation) together with the activated half of the reserve buffer.
//! Every parameter gradient is a sum of outer products over frames, so the
//! traversal order does not matter here except to know which rows of a step
//! were fed by the previous step and which by the initial hidden state.

use crate::error::ensure_len;
use crate::matmul::{add_column_sums, matmul};
use crate::{InputMode, MatView, PackedBatchProfile, Result, Rnn, TimeOrder};

impl Rnn {
    /// Parameter gradients in a fresh buffer laid out like the parameters.
    pub fn backward_weights(
        &self,
        profile: &PackedBatchProfile,
        input: &[f32],
        initial_hidden: Option<&[f32]>,
        reserve: &[f32],
        workspace: &[f32],
    ) -> Result<Vec<f32>> {
        self.check_profile(profile)?;
        let mut grad = vec![0.0; self.param_len()];
        self.backward_weights_into(profile, input, initial_hidden, reserve, workspace, &mut grad)?;
        Ok(grad)
    }

    /// Parameter gradients into `param_grad`, which is zeroed first.
    ///
    /// `initial_hidden` must be the same state given to the forward pass;
    /// `None` contributes nothing to the recurrent weight gradient.
    pub fn backward_weights_into(
        &self,
        profile: &PackedBatchProfile,
        input: &[f32],
        initial_hidden: Option<&[f32]>,
        reserve: &[f32],
        workspace: &[f32],
        param_grad: &mut [f32],
    ) -> Result<()> {
        self.check_profile(profile)?;
        ensure_len("input", input.len(), self.input_len(profile))?;
        if let Some(hx) = initial_hidden {
            ensure_len("initial_hidden", hx.len(), self.hidden_len(profile))?;
        }
        ensure_len("reserve", reserve.len(), self.reserve_len(profile))?;
        ensure_len("workspace", workspace.len(), self.workspace_len(profile))?;
        ensure_len("param_grad", param_grad.len(), self.param_len())?;

        log::debug!(
            "backward_weights: params={} frames={} initial_hidden={}",
            self.param_len(),
            profile.total_frames(),
            initial_hidden.is_some()
        );

        let frames = self.frame_layout(profile);
        let dw = &mut param_grad[..self.param_len()];
        dw.fill(0.0);

        let act = &reserve[frames.activated_offset()..][..frames.region_len()];
        let ws = &workspace[..frames.region_len()];

        for layer in 0..self.config().num_layers {
            self.input_weight_grad(profile, layer, input, act, ws, dw);
            for dir in 0..self.config().num_directions() {
                self.recurrent_weight_grad(profile, layer, dir, initial_hidden, act, ws, dw);
            }

            // Both biases are added to every pre-activation, so they share a gradient.
            let dz = frames.layer(layer);
            let layout = self.layout();
            for range in [layout.input_biases(layer), layout.recurrent_biases(layer)]
                .into_iter()
                .flatten()
            {
                add_column_sums(ws, dz, &mut dw[range]);
            }
        }
        Ok(())
    }

    /// `dW_in(layer) += dz^T * x` where `x` is the input or the previous
    /// layer's activations.
    fn input_weight_grad(
        &self,
        profile: &PackedBatchProfile,
        layer: usize,
        input: &[f32],
        act: &[f32],
        ws: &[f32],
        dw: &mut [f32],
    ) {
        let cfg = self.config();
        if cfg.layer_input_size(layer) == 0 {
            return;
        }
        let frames = self.frame_layout(profile);
        let (src, src_view) = if layer == 0 {
            debug_assert_eq!(cfg.input_mode, InputMode::Linear);
            (input, MatView::dense(0, profile.total_frames(), cfg.input_size))
        } else {
            (act, frames.layer(layer - 1))
        };
        matmul(
            self.executor(),
            1.0,
            ws,
            frames.layer(layer).t(),
            src,
            src_view,
            1.0,
            dw,
            self.layout().input_weights(layer),
        );
    }

    /// `dW_rec(layer, dir) += dz_t^T * h_prev` over every step of `dir`.
    #[allow(clippy::too_many_arguments)]
    fn recurrent_weight_grad(
        &self,
        profile: &PackedBatchProfile,
        layer: usize,
        dir: usize,
        hx: Option<&[f32]>,
        act: &[f32],
        ws: &[f32],
        dw: &mut [f32],
    ) {
        let exec = self.executor();
        let frames = self.frame_layout(profile);
        let state = self.state_layout(profile);
        let dst = self.layout().recurrent_weight(layer, dir);

        let order = TimeOrder::of_direction(dir);
        for t in profile.steps(order) {
            let carried = profile.carried_rows(t, order);
            let starting = profile.starting_rows(t, order);
            let dz = frames.frames(layer, dir, profile.frame_range(t));

            if let Some(prev) = profile.prev_step(t, order).filter(|_| carried > 0) {
                let h_prev = frames
                    .frames(layer, dir, profile.frame_range(prev))
                    .row_slice(0, carried);
                matmul(
                    exec,
                    1.0,
                    ws,
                    dz.row_slice(0, carried).t(),
                    act,
                    h_prev,
                    1.0,
                    dw,
                    dst,
                );
            }
            if let (Some(hx), false) = (hx, starting.is_empty()) {
                matmul(
                    exec,
                    1.0,
                    ws,
                    dz.row_slice(starting.start, starting.len()).t(),
                    hx,
                    state.rows(layer, dir, starting),
                    1.0,
                    dw,
                    dst,
                );
            }
        }
    }
}
