//! Checkpoints (feature: `serde`).
//!
//! A checkpoint is a versioned JSON document holding the network
//! configuration and the flat parameter buffer in its canonical layout. The
//! `Rnn` handle itself is never serialized; the row executor is a runtime
//! choice and is not part of the format.
//!
//! Loading validates the format version, the configuration, the parameter
//! count implied by it and that every parameter is finite.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, Rnn, RnnConfig};

use std::path::Path;

pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub config: RnnConfig,
    /// Flat parameters in the layout of [`crate::ParameterLayout`].
    pub params: Vec<f32>,
}

impl Checkpoint {
    /// Snapshot `params` for `rnn`; the buffer must match its parameter count.
    pub fn new(rnn: &Rnn, params: &[f32]) -> Result<Self> {
        let checkpoint = Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            config: *rnn.config(),
            params: params.to_vec(),
        };
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    pub fn validate(&self) -> Result<()> {
        if self.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported checkpoint format_version {}; expected {}",
                self.format_version, CHECKPOINT_FORMAT_VERSION
            )));
        }
        self.config
            .validate()
            .map_err(|e| Error::InvalidData(format!("invalid config: {e}")))?;

        let expected = crate::ParameterLayout::new(&self.config).len();
        if self.params.len() != expected {
            return Err(Error::InvalidData(format!(
                "params length {} does not match the configuration ({expected})",
                self.params.len()
            )));
        }
        if self.params.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "params must contain only finite values".to_owned(),
            ));
        }
        Ok(())
    }

    /// Validated network handle and parameter buffer.
    pub fn into_parts(self) -> Result<(Rnn, Vec<f32>)> {
        self.validate()?;
        let rnn = Rnn::new(self.config)?;
        Ok((rnn, self.params))
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidData(format!("failed to serialize checkpoint: {e}")))
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::InvalidData(format!("failed to serialize checkpoint: {e}")))
    }

    /// Parse and validate a checkpoint.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let checkpoint: Checkpoint = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse checkpoint json: {e}")))?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    /// Save as pretty-printed JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::InvalidData(format!("failed to write {}: {e}", p.display())))?;
        log::debug!("saved checkpoint to {}", p.display());
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::InvalidData(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }
}

impl Rnn {
    /// Shorthand for [`Checkpoint::new`].
    pub fn checkpoint(&self, params: &[f32]) -> Result<Checkpoint> {
        Checkpoint::new(self, params)
    }
}
