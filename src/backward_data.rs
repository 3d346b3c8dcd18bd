//! Backward pass with respect to the data.
//!
//! Layers are visited last to first, and each direction replays its
//! timesteps in the opposite order of its forward walk. The workspace ends up
//! holding `dL/dz` for every pre-activation, which the weight pass consumes.
//!
//! The initial-hidden-state gradient buffer doubles as the running
//! `dL/dh_prev` of each direction: after step `t` rows `0..batch_at(t)` hold
//! the gradient for the previous step of the forward walk. Rows that read the
//! initial state at `t` are never touched again, so once the replay is over
//! every row holds its gradient with respect to the initial state.

use crate::error::ensure_len;
use crate::matmul::matmul;
use crate::rnn::BackwardDataOutput;
use crate::{InputMode, MatView, PackedBatchProfile, Result, Rnn, TimeOrder};

impl Rnn {
    /// Data gradients; allocates and returns every output.
    ///
    /// `final_hidden_grad = None` means "absent" and skips its injection.
    pub fn backward_data(
        &self,
        profile: &PackedBatchProfile,
        output_grad: &[f32],
        final_hidden_grad: Option<&[f32]>,
        params: &[f32],
        reserve: &[f32],
    ) -> Result<BackwardDataOutput> {
        self.check_profile(profile)?;
        let mut out = BackwardDataOutput {
            input_grad: vec![0.0; self.input_len(profile)],
            initial_hidden_grad: vec![0.0; self.hidden_len(profile)],
            workspace: vec![0.0; self.workspace_len(profile)],
        };
        self.backward_data_into(
            profile,
            output_grad,
            final_hidden_grad,
            params,
            reserve,
            &mut out.input_grad,
            Some(&mut out.initial_hidden_grad),
            &mut out.workspace,
        )?;
        Ok(out)
    }

    /// Data gradients into caller buffers.
    ///
    /// Pass `initial_hidden_grad = None` to suppress that output.
    #[allow(clippy::too_many_arguments)]
    pub fn backward_data_into(
        &self,
        profile: &PackedBatchProfile,
        output_grad: &[f32],
        final_hidden_grad: Option<&[f32]>,
        params: &[f32],
        reserve: &[f32],
        input_grad: &mut [f32],
        initial_hidden_grad: Option<&mut [f32]>,
        workspace: &mut [f32],
    ) -> Result<()> {
        self.check_profile(profile)?;
        let hidden_len = self.hidden_len(profile);
        ensure_len("output_grad", output_grad.len(), self.output_len(profile))?;
        if let Some(dhy) = final_hidden_grad {
            ensure_len("final_hidden_grad", dhy.len(), hidden_len)?;
        }
        ensure_len("params", params.len(), self.param_len())?;
        ensure_len("reserve", reserve.len(), self.reserve_len(profile))?;
        ensure_len("input_grad", input_grad.len(), self.input_len(profile))?;
        if let Some(dhx) = initial_hidden_grad.as_deref() {
            ensure_len("initial_hidden_grad", dhx.len(), hidden_len)?;
        }
        ensure_len("workspace", workspace.len(), self.workspace_len(profile))?;

        log::debug!(
            "backward_data: layers={} dirs={} hidden={} steps={} frames={}",
            self.config().num_layers,
            self.config().num_directions(),
            self.config().hidden_size,
            profile.seq_len(),
            profile.total_frames()
        );

        let mut scratch;
        let dhx = match initial_hidden_grad {
            Some(dhx) => dhx,
            None => {
                scratch = vec![0.0; hidden_len];
                scratch.as_mut_slice()
            }
        };

        let frames = self.frame_layout(profile);
        let workspace = &mut workspace[..frames.region_len()];
        workspace.fill(0.0);
        dhx[..hidden_len].fill(0.0);
        input_grad[..self.input_len(profile)].fill(0.0);

        let pre = &reserve[..frames.region_len()];
        let num_layers = self.config().num_layers;

        for layer in (0..num_layers).rev() {
            log::trace!("backward_data layer {layer}");
            if layer + 1 == num_layers {
                self.seed_from_output(profile, output_grad, workspace);
            } else {
                self.seed_from_next_layer(profile, layer, params, workspace);
            }
            for dir in 0..self.config().num_directions() {
                self.replay_direction(
                    profile,
                    layer,
                    dir,
                    final_hidden_grad,
                    params,
                    pre,
                    workspace,
                    dhx,
                );
            }
        }

        self.reduce_input_grad(profile, params, workspace, input_grad);
        Ok(())
    }

    fn seed_from_output(&self, profile: &PackedBatchProfile, dy: &[f32], ws: &mut [f32]) {
        let frames = self.frame_layout(profile);
        let dst = frames.layer(self.config().num_layers - 1);
        let width = dst.cols;
        self.executor()
            .for_each_row(ws, dst.offset, dst.rows, dst.cols, dst.ld, |f, row| {
                for (g, &d) in row.iter_mut().zip(&dy[f * width..][..width]) {
                    *g += d;
                }
            });
    }

    /// `dL/dh` of `layer` from `dL/dz` of `layer + 1` through its input weights.
    fn seed_from_next_layer(
        &self,
        profile: &PackedBatchProfile,
        layer: usize,
        params: &[f32],
        ws: &mut [f32],
    ) {
        let frames = self.frame_layout(profile);
        let (lower, upper) = ws.split_at_mut((layer + 1) * frames.layer_len());
        let next = MatView::dense(0, profile.total_frames(), frames.stride());
        matmul(
            self.executor(),
            1.0,
            upper,
            next,
            params,
            self.layout().input_weights(layer + 1),
            1.0,
            lower,
            frames.layer(layer),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn replay_direction(
        &self,
        profile: &PackedBatchProfile,
        layer: usize,
        dir: usize,
        dhy: Option<&[f32]>,
        params: &[f32],
        pre: &[f32],
        ws: &mut [f32],
        dhx: &mut [f32],
    ) {
        let exec = self.executor();
        let frames = self.frame_layout(profile);
        let state = self.state_layout(profile);
        let activation = self.config().activation;
        let h = self.config().hidden_size;
        let stride = frames.stride();
        let w = self.layout().recurrent_weight(layer, dir);
        let slot = state.rows(layer, dir, 0..0).offset;

        let order = TimeOrder::of_direction(dir);
        for t in profile.steps(order).rev() {
            let n = profile.batch_at(t);
            let dst = frames.frames(layer, dir, profile.frame_range(t));
            // Rows `0..continued` fed the next step of the walk; the rest
            // ended here and are final-state rows for this direction.
            let continued = profile.continued_rows(t, order);

            let running: &[f32] = &*dhx;
            exec.for_each_row(ws, dst.offset, n, h, stride, |r, row| {
                let incoming = if r < continued {
                    Some(&running[slot + r * h..][..h])
                } else {
                    dhy.map(|g| &g[slot + r * h..][..h])
                };
                if let Some(incoming) = incoming {
                    for (g, &d) in row.iter_mut().zip(incoming) {
                        *g += d;
                    }
                }
                let z = &pre[dst.offset + r * stride..][..h];
                for (g, &zv) in row.iter_mut().zip(z) {
                    *g *= activation.derivative(zv);
                }
            });

            matmul(
                exec,
                1.0,
                ws,
                dst,
                params,
                w,
                0.0,
                dhx,
                state.rows(layer, dir, 0..n),
            );
        }
    }

    fn reduce_input_grad(
        &self,
        profile: &PackedBatchProfile,
        params: &[f32],
        ws: &[f32],
        dx: &mut [f32],
    ) {
        let cfg = self.config();
        let frames = self.frame_layout(profile);
        let first = frames.layer(0);
        let n_frames = profile.total_frames();

        match cfg.input_mode {
            InputMode::Linear => matmul(
                self.executor(),
                1.0,
                ws,
                first,
                params,
                self.layout().input_weights(0),
                1.0,
                dx,
                MatView::dense(0, n_frames, cfg.input_size),
            ),
            InputMode::Skip => {
                let h = cfg.hidden_size;
                let stride = frames.stride();
                self.executor()
                    .for_each_row(dx, 0, n_frames, h, cfg.input_size, |f, row| {
                        for dir_cols in ws[first.offset + f * stride..][..stride].chunks(h) {
                            for (g, &d) in row.iter_mut().zip(dir_cols) {
                                *g += d;
                            }
                        }
                    });
            }
        }
    }
}
