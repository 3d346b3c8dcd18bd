//! Forward pass.
//!
//! Layers run strictly in order. Inside a layer the input contribution of all
//! frames is computed with one GEMM, then each direction walks its timesteps
//! and adds the recurrent contribution before applying the nonlinearity.
//!
//! The running hidden state of each `(layer, direction)` lives in the final
//! hidden-state buffer: at every step rows `0..batch_at(t)` are overwritten,
//! so once the walk is over each row holds the last activation its sequence
//! produced in that direction.

use crate::error::ensure_len;
use crate::matmul::matmul;
use crate::rnn::{ForwardOutput, InferOutput};
use crate::{InputMode, MatView, PackedBatchProfile, Result, Rnn, TimeOrder};

impl Rnn {
    /// Training forward pass; allocates and returns every output.
    ///
    /// `initial_hidden = None` means "absent": the recurrent multiply for rows
    /// that would read it is skipped. The result equals an all-zero state.
    pub fn forward_train(
        &self,
        profile: &PackedBatchProfile,
        input: &[f32],
        initial_hidden: Option<&[f32]>,
        params: &[f32],
    ) -> Result<ForwardOutput> {
        self.check_profile(profile)?;
        let mut out = ForwardOutput {
            output: vec![0.0; self.output_len(profile)],
            final_hidden: vec![0.0; self.hidden_len(profile)],
            reserve: vec![0.0; self.reserve_len(profile)],
        };
        self.forward_train_into(
            profile,
            input,
            initial_hidden,
            params,
            &mut out.output,
            Some(&mut out.final_hidden),
            &mut out.reserve,
        )?;
        Ok(out)
    }

    /// Training forward pass into caller buffers.
    ///
    /// Pass `final_hidden = None` to suppress the final hidden state.
    #[allow(clippy::too_many_arguments)]
    pub fn forward_train_into(
        &self,
        profile: &PackedBatchProfile,
        input: &[f32],
        initial_hidden: Option<&[f32]>,
        params: &[f32],
        output: &mut [f32],
        final_hidden: Option<&mut [f32]>,
        reserve: &mut [f32],
    ) -> Result<()> {
        self.check_forward_buffers(profile, input, initial_hidden, params, output)?;
        ensure_len("reserve", reserve.len(), self.reserve_len(profile))?;
        if let Some(hy) = final_hidden.as_deref() {
            ensure_len("final_hidden", hy.len(), self.hidden_len(profile))?;
        }

        log::debug!(
            "forward_train: layers={} dirs={} hidden={} steps={} frames={}",
            self.config().num_layers,
            self.config().num_directions(),
            self.config().hidden_size,
            profile.seq_len(),
            profile.total_frames()
        );

        let mut scratch;
        let hy = match final_hidden {
            Some(hy) => hy,
            None => {
                scratch = vec![0.0; self.hidden_len(profile)];
                scratch.as_mut_slice()
            }
        };
        self.run_forward(profile, input, initial_hidden, params, output, hy, reserve);
        Ok(())
    }

    /// Inference forward pass; the intermediates are discarded.
    pub fn forward_infer(
        &self,
        profile: &PackedBatchProfile,
        input: &[f32],
        initial_hidden: Option<&[f32]>,
        params: &[f32],
    ) -> Result<InferOutput> {
        self.check_profile(profile)?;
        let mut out = InferOutput {
            output: vec![0.0; self.output_len(profile)],
            final_hidden: vec![0.0; self.hidden_len(profile)],
        };
        self.forward_infer_into(
            profile,
            input,
            initial_hidden,
            params,
            &mut out.output,
            Some(&mut out.final_hidden),
        )?;
        Ok(out)
    }

    /// Inference forward pass into caller buffers.
    ///
    /// Each layer reads the previous layer's activations, so this still
    /// allocates a scratch buffer of [`Rnn::reserve_len`] floats per call.
    /// Callers that run inference in a loop and want no allocation can use
    /// [`Rnn::forward_train_into`] with a reused reserve instead; its output
    /// and final state are identical.
    pub fn forward_infer_into(
        &self,
        profile: &PackedBatchProfile,
        input: &[f32],
        initial_hidden: Option<&[f32]>,
        params: &[f32],
        output: &mut [f32],
        final_hidden: Option<&mut [f32]>,
    ) -> Result<()> {
        self.check_forward_buffers(profile, input, initial_hidden, params, output)?;
        if let Some(hy) = final_hidden.as_deref() {
            ensure_len("final_hidden", hy.len(), self.hidden_len(profile))?;
        }

        log::debug!(
            "forward_infer: layers={} steps={} frames={}",
            self.config().num_layers,
            profile.seq_len(),
            profile.total_frames()
        );

        let mut reserve = vec![0.0; self.reserve_len(profile)];
        let mut scratch;
        let hy = match final_hidden {
            Some(hy) => hy,
            None => {
                scratch = vec![0.0; self.hidden_len(profile)];
                scratch.as_mut_slice()
            }
        };
        self.run_forward(
            profile,
            input,
            initial_hidden,
            params,
            output,
            hy,
            &mut reserve,
        );
        Ok(())
    }

    fn check_forward_buffers(
        &self,
        profile: &PackedBatchProfile,
        input: &[f32],
        initial_hidden: Option<&[f32]>,
        params: &[f32],
        output: &[f32],
    ) -> Result<()> {
        self.check_profile(profile)?;
        ensure_len("input", input.len(), self.input_len(profile))?;
        ensure_len("params", params.len(), self.param_len())?;
        ensure_len("output", output.len(), self.output_len(profile))?;
        if let Some(hx) = initial_hidden {
            ensure_len("initial_hidden", hx.len(), self.hidden_len(profile))?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_forward(
        &self,
        profile: &PackedBatchProfile,
        input: &[f32],
        hx: Option<&[f32]>,
        params: &[f32],
        output: &mut [f32],
        hy: &mut [f32],
        reserve: &mut [f32],
    ) {
        let frames = self.frame_layout(profile);
        let state = self.state_layout(profile);

        let reserve = &mut reserve[..frames.reserve_len()];
        reserve.fill(0.0);
        hy[..state.len()].fill(0.0);

        let (pre, act) = reserve.split_at_mut(frames.activated_offset());

        for layer in 0..self.config().num_layers {
            log::trace!("forward layer {layer}");
            self.add_input_contribution(profile, layer, input, params, pre, act);
            for dir in 0..self.config().num_directions() {
                self.run_direction(profile, layer, dir, hx, params, pre, act, hy);
            }
        }

        let last = frames.layer(self.config().num_layers - 1);
        let len = last.rows * last.cols;
        output[..len].copy_from_slice(&act[last.offset..last.offset + len]);
    }

    /// Input weights (or the raw input in skip mode) plus the input bias,
    /// for every frame of `layer`.
    fn add_input_contribution(
        &self,
        profile: &PackedBatchProfile,
        layer: usize,
        input: &[f32],
        params: &[f32],
        pre: &mut [f32],
        act: &[f32],
    ) {
        let cfg = self.config();
        let exec = self.executor();
        let layout = self.layout();
        let frames = self.frame_layout(profile);
        let dst = frames.layer(layer);
        let n_frames = profile.total_frames();
        let h = cfg.hidden_size;

        if layer > 0 {
            matmul(
                exec,
                1.0,
                act,
                frames.layer(layer - 1),
                params,
                layout.input_weights(layer).t(),
                1.0,
                pre,
                dst,
            );
        } else {
            match cfg.input_mode {
                InputMode::Linear => matmul(
                    exec,
                    1.0,
                    input,
                    MatView::dense(0, n_frames, cfg.input_size),
                    params,
                    layout.input_weights(0).t(),
                    1.0,
                    pre,
                    dst,
                ),
                InputMode::Skip => {
                    let width = cfg.input_size;
                    exec.for_each_row(pre, dst.offset, dst.rows, dst.cols, dst.ld, |f, row| {
                        let x = &input[f * width..][..h];
                        for dir_cols in row.chunks_mut(h) {
                            for (z, &v) in dir_cols.iter_mut().zip(x) {
                                *z += v;
                            }
                        }
                    });
                }
            }
        }

        if let Some(bias) = layout.input_biases(layer) {
            let bias = &params[bias];
            exec.for_each_row(pre, dst.offset, dst.rows, dst.cols, dst.ld, |_, row| {
                for (z, &b) in row.iter_mut().zip(bias) {
                    *z += b;
                }
            });
        }
    }

    /// Recurrent contribution and nonlinearity for one direction of `layer`.
    #[allow(clippy::too_many_arguments)]
    fn run_direction(
        &self,
        profile: &PackedBatchProfile,
        layer: usize,
        dir: usize,
        hx: Option<&[f32]>,
        params: &[f32],
        pre: &mut [f32],
        act: &mut [f32],
        hy: &mut [f32],
    ) {
        let exec = self.executor();
        let layout = self.layout();
        let frames = self.frame_layout(profile);
        let state = self.state_layout(profile);
        let activation = self.config().activation;
        let h = self.config().hidden_size;
        let stride = frames.stride();
        let w = layout.recurrent_weight(layer, dir).t();
        let bias = layout.recurrent_bias(layer, dir).map(|r| &params[r]);

        let order = TimeOrder::of_direction(dir);
        for t in profile.steps(order) {
            let n = profile.batch_at(t);
            let carried = profile.carried_rows(t, order);
            let starting = profile.starting_rows(t, order);
            let dst = frames.frames(layer, dir, profile.frame_range(t));

            if carried > 0 {
                matmul(
                    exec,
                    1.0,
                    hy,
                    state.rows(layer, dir, 0..carried),
                    params,
                    w,
                    1.0,
                    pre,
                    dst.row_slice(0, carried),
                );
            }
            // Rows that have not been visited yet in this direction start
            // from the initial hidden state, whatever `t` is.
            if let (Some(hx), false) = (hx, starting.is_empty()) {
                matmul(
                    exec,
                    1.0,
                    hx,
                    state.rows(layer, dir, starting.clone()),
                    params,
                    w,
                    1.0,
                    pre,
                    dst.row_slice(starting.start, starting.len()),
                );
            }
            if let Some(bias) = bias {
                exec.for_each_row(pre, dst.offset, n, h, stride, |_, row| {
                    for (z, &b) in row.iter_mut().zip(bias) {
                        *z += b;
                    }
                });
            }

            let pre_ro: &[f32] = &*pre;
            exec.for_each_row(act, dst.offset, n, h, stride, |r, row| {
                let z = &pre_ro[dst.offset + r * stride..][..h];
                for (y, &zv) in row.iter_mut().zip(z) {
                    *y = activation.forward(zv);
                }
            });

            let act_ro: &[f32] = &*act;
            let hv = state.rows(layer, dir, 0..n);
            exec.for_each_row(hy, hv.offset, n, h, h, |r, row| {
                row.copy_from_slice(&act_ro[dst.offset + r * stride..][..h]);
            });
        }
    }
}
