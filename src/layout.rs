//! Offset arithmetic for every flat buffer the engines touch.
//!
//! Nothing here is stored: each offset is a pure function of the
//! configuration (and, for per-frame buffers, of the batch profile). The
//! engines never compute an index themselves; they ask for a [`MatView`] or a
//! range and hand it to the GEMM or to a row loop.
//!
//! Parameter buffer, per layer `l` in order:
//!
//! ```text
//! [ input weights, all directions: (D*H) x in(l) ]
//! [ recurrent weights, direction 0: H x H ] [ direction 1: H x H ]
//! ```
//!
//! followed, if bias is enabled, by one bias segment holding per layer
//! `[ input bias: D*H ] [ recurrent bias: D*H ]`. Every weight row belongs to
//! one hidden unit, so direction `d` owns rows `d*H..(d+1)*H` of the input
//! weight block.

use std::ops::Range;

use crate::{MatView, PackedBatchProfile, RnnConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    InputWeight,
    RecurrentWeight,
    InputBias,
    RecurrentBias,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterLayout {
    hidden: usize,
    dirs: usize,
    num_layers: usize,
    first_input: usize,
    bias: bool,
}

impl ParameterLayout {
    pub fn new(config: &RnnConfig) -> Self {
        Self {
            hidden: config.hidden_size,
            dirs: config.num_directions(),
            num_layers: config.num_layers,
            first_input: config.layer_input_size(0),
            bias: config.bias,
        }
    }

    /// Parameter count of `config`, or `None` if it overflows `usize`.
    pub fn checked_len(config: &RnnConfig) -> Option<usize> {
        let h = config.hidden_size;
        let dirs = config.num_directions();
        let stride = h.checked_mul(dirs)?;
        let block = |input: usize| input.checked_add(h)?.checked_mul(h)?.checked_mul(dirs);
        let first = block(config.layer_input_size(0))?;
        let rest = block(stride)?.checked_mul(config.num_layers.checked_sub(1)?)?;
        let bias = if config.bias {
            config.num_layers.checked_mul(2)?.checked_mul(stride)?
        } else {
            0
        };
        first.checked_add(rest)?.checked_add(bias)
    }

    #[inline]
    fn stride(&self) -> usize {
        self.hidden * self.dirs
    }

    #[inline]
    fn input_size(&self, layer: usize) -> usize {
        if layer == 0 {
            self.first_input
        } else {
            self.stride()
        }
    }

    #[inline]
    fn layer_block_len(&self, layer: usize) -> usize {
        self.dirs * (self.input_size(layer) + self.hidden) * self.hidden
    }

    /// First weight of layer `layer`.
    #[inline]
    pub fn layer_offset(&self, layer: usize) -> usize {
        debug_assert!(layer <= self.num_layers);
        if layer == 0 {
            0
        } else {
            self.layer_block_len(0) + (layer - 1) * self.layer_block_len(1)
        }
    }

    /// Scalars in the weight segment.
    #[inline]
    pub fn weights_len(&self) -> usize {
        self.layer_offset(self.num_layers)
    }

    /// Start of the bias segment (equals `weights_len`).
    #[inline]
    pub fn bias_offset(&self) -> usize {
        self.weights_len()
    }

    /// Scalars in the whole parameter buffer.
    #[inline]
    pub fn len(&self) -> usize {
        let bias = if self.bias {
            self.num_layers * 2 * self.stride()
        } else {
            0
        };
        self.weights_len() + bias
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn has_bias(&self) -> bool {
        self.bias
    }

    /// `(D*H) x in(layer)` input weights of all directions.
    #[inline]
    pub fn input_weights(&self, layer: usize) -> MatView {
        MatView::dense(
            self.layer_offset(layer),
            self.stride(),
            self.input_size(layer),
        )
    }

    /// `H x in(layer)` input weights of one direction.
    #[inline]
    pub fn input_weight(&self, layer: usize, dir: usize) -> MatView {
        debug_assert!(dir < self.dirs);
        self.input_weights(layer)
            .row_slice(dir * self.hidden, self.hidden)
    }

    /// `H x H` recurrent weights of one direction.
    #[inline]
    pub fn recurrent_weight(&self, layer: usize, dir: usize) -> MatView {
        debug_assert!(dir < self.dirs);
        let h = self.hidden;
        let base = self.layer_offset(layer) + self.stride() * self.input_size(layer);
        MatView::dense(base + dir * h * h, h, h)
    }

    /// Input bias of all directions (`D*H` scalars), if bias is enabled.
    #[inline]
    pub fn input_biases(&self, layer: usize) -> Option<Range<usize>> {
        self.bias.then(|| {
            let start = self.bias_offset() + layer * 2 * self.stride();
            start..start + self.stride()
        })
    }

    /// Recurrent bias of all directions (`D*H` scalars), if bias is enabled.
    #[inline]
    pub fn recurrent_biases(&self, layer: usize) -> Option<Range<usize>> {
        self.bias.then(|| {
            let start = self.bias_offset() + (layer * 2 + 1) * self.stride();
            start..start + self.stride()
        })
    }

    #[inline]
    pub fn input_bias(&self, layer: usize, dir: usize) -> Option<Range<usize>> {
        self.input_biases(layer).map(|r| self.dir_part(r, dir))
    }

    #[inline]
    pub fn recurrent_bias(&self, layer: usize, dir: usize) -> Option<Range<usize>> {
        self.recurrent_biases(layer).map(|r| self.dir_part(r, dir))
    }

    #[inline]
    fn dir_part(&self, all: Range<usize>, dir: usize) -> Range<usize> {
        let start = all.start + dir * self.hidden;
        start..start + self.hidden
    }

    /// Flat range of one `(layer, direction, kind)` block.
    ///
    /// `None` for bias kinds when bias is disabled, and for the input weights
    /// of layer 0 in skip-input mode.
    pub fn range(&self, layer: usize, dir: usize, kind: ParamKind) -> Option<Range<usize>> {
        match kind {
            ParamKind::InputWeight => {
                let v = self.input_weight(layer, dir);
                let len = v.rows * v.cols;
                (len > 0).then_some(v.offset..v.offset + len)
            }
            ParamKind::RecurrentWeight => {
                let v = self.recurrent_weight(layer, dir);
                Some(v.offset..v.offset + v.rows * v.cols)
            }
            ParamKind::InputBias => self.input_bias(layer, dir),
            ParamKind::RecurrentBias => self.recurrent_bias(layer, dir),
        }
    }
}

/// Layout of a hidden-state tensor: `(L*D) x N x H`, slot `l*D + d`.
///
/// Shared by the initial/final hidden states and their gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayout {
    hidden: usize,
    dirs: usize,
    num_layers: usize,
    batch: usize,
}

impl StateLayout {
    pub fn new(config: &RnnConfig, profile: &PackedBatchProfile) -> Self {
        Self {
            hidden: config.hidden_size,
            dirs: config.num_directions(),
            num_layers: config.num_layers,
            batch: profile.max_batch(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.num_layers * self.dirs * self.batch * self.hidden
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows `rows` of slot `(layer, dir)` as an `n x H` view.
    #[inline]
    pub fn rows(&self, layer: usize, dir: usize, rows: Range<usize>) -> MatView {
        let slot = (layer * self.dirs + dir) * self.batch;
        MatView::dense(
            (slot + rows.start) * self.hidden,
            rows.end - rows.start,
            self.hidden,
        )
    }
}

/// Layout of per-frame buffers: the two reserve regions and the workspace.
///
/// One region is `L x F x (D*H)`; within a layer, frame `f` is row `f` and
/// direction `d` owns columns `d*H..(d+1)*H`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    hidden: usize,
    dirs: usize,
    num_layers: usize,
    frames: usize,
}

impl FrameLayout {
    pub fn new(config: &RnnConfig, profile: &PackedBatchProfile) -> Self {
        Self {
            hidden: config.hidden_size,
            dirs: config.num_directions(),
            num_layers: config.num_layers,
            frames: profile.total_frames(),
        }
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.hidden * self.dirs
    }

    /// Scalars in one region (the workspace size).
    #[inline]
    pub fn region_len(&self) -> usize {
        self.num_layers * self.layer_len()
    }

    /// Scalars in the reserve buffer: pre-activation plus activated region.
    #[inline]
    pub fn reserve_len(&self) -> usize {
        2 * self.region_len()
    }

    /// Start of the activated region inside the reserve buffer.
    #[inline]
    pub fn activated_offset(&self) -> usize {
        self.region_len()
    }

    #[inline]
    pub fn layer_len(&self) -> usize {
        self.frames * self.stride()
    }

    /// All frames and both directions of `layer`, relative to its region.
    #[inline]
    pub fn layer(&self, layer: usize) -> MatView {
        MatView::dense(layer * self.layer_len(), self.frames, self.stride())
    }

    /// Frames `frames` of one direction of `layer`, relative to its region.
    #[inline]
    pub fn frames(&self, layer: usize, dir: usize, frames: Range<usize>) -> MatView {
        MatView::new(
            layer * self.layer_len() + frames.start * self.stride() + dir * self.hidden,
            frames.end - frames.start,
            self.hidden,
            self.stride(),
        )
    }

    /// Index of `(frame, column)` of `layer`, relative to its region.
    #[inline]
    pub fn index(&self, layer: usize, frame: usize, column: usize) -> usize {
        layer * self.layer_len() + frame * self.stride() + column
    }
}
