//! Reference CPU implementation of a vanilla RNN over packed ragged batches.
//!
//! `packed-rnn` runs a multi-layer, optionally bidirectional Elman RNN over
//! variable-length sequences packed time-major, and computes exact gradients
//! for the input, the initial hidden state and every parameter. It is meant as
//! a readable ground truth for accelerated implementations.
//!
//! # Packed batches
//!
//! Sequences are sorted by length, longest first. A [`PackedBatchProfile`]
//! records `batch_at[t]`, the number of sequences still alive at step `t`,
//! which must be non-increasing. Frames are stored time-major: all rows of
//! step 0, then all rows of step 1, and so on. Row `r` of every step belongs
//! to the same sequence.
//!
//! # Buffers
//!
//! All tensors are flat `f32` buffers owned by the caller.
//!
//! - input: `F x I`, output: `F x (D*H)`, where `F` is the total frame count
//! - initial/final hidden state and their gradients: `(L*D) x N x H`, slot
//!   `layer * D + dir`
//! - parameters: see [`ParameterLayout`]
//! - reserve: pre-activations then activations, each `L x F x (D*H)`
//! - workspace: `L x F x (D*H)` pre-activation gradients
//!
//! Size queries on [`Rnn`] give every length for a profile. The engines check
//! lengths before touching any buffer and return [`Error::BufferTooSmall`] on
//! a short one.
//!
//! # Panics vs `Result`
//!
//! - Public engine entry points validate shapes and return [`Result`].
//! - [`matmul`] trusts its views. An out-of-bounds view is a programming error
//!   and panics.
//!
//! # Quick start
//!
//! ```rust
//! use packed_rnn::{Direction, PackedBatchProfile, RnnBuilder};
//!
//! # fn main() -> packed_rnn::Result<()> {
//! let rnn = RnnBuilder::new(3, 4)?
//!     .num_layers(2)?
//!     .direction(Direction::Bidirectional)
//!     .build()?;
//! // Three sequences of lengths 3, 2 and 1.
//! let profile = PackedBatchProfile::new(vec![3, 2, 1])?;
//! let params = rnn.init_params_with_seed(0);
//! let input = vec![0.1; rnn.input_len(&profile)];
//!
//! let fwd = rnn.forward_train(&profile, &input, None, &params)?;
//! let dy = vec![1.0; rnn.output_len(&profile)];
//! let bwd = rnn.backward_data(&profile, &dy, None, &params, &fwd.reserve)?;
//! let dw = rnn.backward_weights(&profile, &input, None, &fwd.reserve, &bwd.workspace)?;
//!
//! assert_eq!(fwd.output.len(), 6 * 8);
//! assert_eq!(bwd.input_grad.len(), 6 * 3);
//! assert_eq!(dw.len(), rnn.param_len());
//! # Ok(())
//! # }
//! ```
//!
//! # MSRV
//!
//! This crate's minimum supported Rust version (MSRV) is specified in `Cargo.toml`.

pub mod activation;
pub mod backward_data;
pub mod backward_weights;
pub mod config;
pub mod error;
pub mod forward;
pub mod init;
pub mod layout;
pub mod matmul;
pub mod parallel;
pub mod profile;
pub mod rnn;

#[cfg(feature = "serde")]
pub mod serde_model;

pub use activation::Activation;
pub use config::{Direction, InputMode, RnnBuilder, RnnConfig};
pub use error::{Error, Result};
pub use layout::{FrameLayout, ParamKind, ParameterLayout, StateLayout};
pub use matmul::{MatView, matmul};
pub use parallel::RowExecutor;
pub use profile::{PackedBatchProfile, TimeOrder};
pub use rnn::{BackwardDataOutput, ForwardOutput, InferOutput, Rnn};

#[cfg(feature = "serde")]
pub use serde_model::{CHECKPOINT_FORMAT_VERSION, Checkpoint};
